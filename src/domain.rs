use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HarvestError;

pub const COL_ID: &str = "id";
pub const COL_TITLE: &str = "title";
pub const COL_URL: &str = "url";
pub const COL_NOTES: &str = "notes";
pub const COL_AUTHOR: &str = "author";
pub const COL_MAINTAINER: &str = "maintainer";
pub const COL_MAINTAINER_EMAIL: &str = "maintainer_email";
pub const COL_LICENCE: &str = "licence";
pub const COL_LICENCE_URL: &str = "licence_url";
pub const COL_TAGS: &str = "tags";
pub const COL_GROUPS: &str = "groups";
pub const COL_VERSION: &str = "version";

/// Separator used inside the `tags` cell.
pub const TAG_SEPARATOR: &str = ", ";

/// Namespace for name-derived dataset identities. Changing it changes every dataset id.
pub const DATASET_NAMESPACE: Uuid = Uuid::from_u128(0x6f2c_1a9e_3b5d_4e07_9a41_c8d2_75e0_b316);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid =
            normalized.len() == 2 && normalized.chars().all(|ch| ch.is_ascii_lowercase());
        if !is_valid {
            return Err(HarvestError::InvalidLanguage(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = HarvestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageCode> for String {
    fn from(value: LanguageCode) -> Self {
        value.0
    }
}

/// How rows of a translated sheet are matched with rows of the base sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Row `i` of every sheet describes the same dataset.
    #[default]
    Positional,
    /// Rows are joined on the `id` column.
    Keyed,
}

/// One data row of a language sheet, keyed by the header row's column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    index: usize,
    cells: HashMap<String, String>,
}

impl Row {
    pub fn new(index: usize, cells: HashMap<String, String>) -> Self {
        Self { index, cells }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<K, V, I>(index: usize, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            index,
            cells: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Zero-based row index inside the sheet.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Cell value, or an empty string when the column is absent.
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn natural_key(&self) -> Option<&str> {
        self.get(COL_ID)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|value| value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub url: String,
    pub name: String,
    pub format: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTriple {
    pub lang_code: LanguageCode,
    pub term: String,
    pub term_translation: String,
}

impl TranslationTriple {
    pub fn new(lang_code: &LanguageCode, term: &str, term_translation: &str) -> Self {
        Self {
            lang_code: lang_code.clone(),
            term: term.to_string(),
            term_translation: term_translation.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    /// Derived from the natural key; identical across harvests.
    Stable,
    /// Random fallback for rows without a natural key.
    Unstable,
}

/// Self-contained harvest unit passed from gather to import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub identity: Identity,
    #[serde(rename = "datasetID")]
    pub natural_key: String,
    pub title: String,
    pub url: String,
    pub notes: String,
    pub author: String,
    pub maintainer: String,
    pub maintainer_email: String,
    pub license_id: String,
    pub license_url: String,
    pub tags: Vec<String>,
    pub groups: Vec<String>,
    pub resources: Vec<ResourceDescriptor>,
    pub translations: Vec<TranslationTriple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_org: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
}

impl DatasetRecord {
    pub fn is_stable(&self) -> bool {
        self.identity == Identity::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: Option<String>,
}

/// Deterministic dataset id for a natural key.
pub fn stable_id(natural_key: &str) -> Uuid {
    Uuid::new_v5(&DATASET_NAMESPACE, natural_key.trim().as_bytes())
}

/// Lower-cased extension of the final path segment, or `""` when there is none.
/// Leading dots of a file name do not start an extension.
pub fn guess_format(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let stem = base.trim_start_matches('.');
    match stem.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Splits a tag cell on `", "`. An empty cell has no tags.
pub fn split_tags(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    value.split(TAG_SEPARATOR).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_language_code() {
        let lang: LanguageCode = " FR ".parse().unwrap();
        assert_eq!(lang.as_str(), "fr");
        let err = "fra".parse::<LanguageCode>().unwrap_err();
        assert_matches!(err, HarvestError::InvalidLanguage(_));
    }

    #[test]
    fn format_is_extension_only() {
        assert_eq!(guess_format("Report.PDF"), "pdf");
        assert_eq!(guess_format("README"), "");
        assert_eq!(guess_format("archive.tar.gz"), "gz");
        assert_eq!(guess_format("ch.bar.x1/data"), "");
        assert_eq!(guess_format(".hidden"), "");
    }

    #[test]
    fn stable_id_is_deterministic() {
        assert_eq!(stable_id("x1"), stable_id("x1"));
        assert_ne!(stable_id("x1"), stable_id("x2"));
        assert_eq!(stable_id(" x1 "), stable_id("x1"));
    }

    #[test]
    fn split_tags_keeps_duplicates() {
        assert_eq!(split_tags("a, b, a"), vec!["a", "b", "a"]);
        assert!(split_tags("").is_empty());
        assert_eq!(split_tags("a,b"), vec!["a,b"]);
    }
}
