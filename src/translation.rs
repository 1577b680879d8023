use std::collections::{BTreeMap, HashMap};

use crate::domain::{
    Alignment, COL_AUTHOR, COL_GROUPS, COL_LICENCE, COL_MAINTAINER, COL_NOTES, COL_TAGS,
    COL_TITLE, LanguageCode, OrganizationDescriptor, Row, TranslationTriple, split_tags,
};
use crate::error::RowError;
use crate::munge::munge_tag;

/// Columns translated one-to-one between language sheets.
pub const TRANSLATED_FIELDS: [&str; 6] = [
    COL_TITLE,
    COL_NOTES,
    COL_AUTHOR,
    COL_MAINTAINER,
    COL_LICENCE,
    COL_GROUPS,
];

pub struct TranslationDeriver<'a> {
    base_language: &'a LanguageCode,
    organization: &'a BTreeMap<LanguageCode, OrganizationDescriptor>,
}

impl<'a> TranslationDeriver<'a> {
    pub fn new(
        base_language: &'a LanguageCode,
        organization: &'a BTreeMap<LanguageCode, OrganizationDescriptor>,
    ) -> Self {
        Self {
            base_language,
            organization,
        }
    }

    /// Triples for every aligned `(base, other)` row pair. The slices must have equal length.
    pub fn derive(
        &self,
        base_rows: &[Row],
        other_rows: &[Row],
        lang: &LanguageCode,
    ) -> Result<Vec<TranslationTriple>, RowError> {
        if base_rows.len() != other_rows.len() {
            return Err(failed(
                lang,
                format!(
                    "{} base rows but {} translated rows",
                    base_rows.len(),
                    other_rows.len()
                ),
            ));
        }

        let mut triples = Vec::new();
        for (base, other) in base_rows.iter().zip(other_rows) {
            self.derive_pair(base, other, lang, &mut triples)?;
        }
        Ok(triples)
    }

    fn derive_pair(
        &self,
        base: &Row,
        other: &Row,
        lang: &LanguageCode,
        triples: &mut Vec<TranslationTriple>,
    ) -> Result<(), RowError> {
        for field in TRANSLATED_FIELDS {
            let term = required(base, field, self.base_language)?;
            let translation = required(other, field, lang)?;
            triples.extend(non_empty_triple(lang, term, translation));
        }

        let base_tags = split_tags(required(base, COL_TAGS, self.base_language)?);
        let other_tags = split_tags(required(other, COL_TAGS, lang)?);
        if base_tags.len() == other_tags.len() {
            triples.extend(
                base_tags.iter().zip(&other_tags).map(|(term, translation)| {
                    TranslationTriple::new(lang, &munge_tag(term), &munge_tag(translation))
                }),
            );
        } else {
            tracing::debug!(
                row = base.index(),
                %lang,
                base = base_tags.len(),
                translated = other_tags.len(),
                "tag counts differ; skipping tag translations"
            );
        }
        Ok(())
    }

    /// Static name/description translations of the owning organization for every non-base
    /// language in `languages`.
    pub fn organization_triples(&self, languages: &[LanguageCode]) -> Vec<TranslationTriple> {
        let Some(base) = self.organization.get(self.base_language) else {
            return Vec::new();
        };
        languages
            .iter()
            .filter(|lang| *lang != self.base_language)
            .filter_map(|lang| self.organization.get(lang).map(|entry| (lang, entry)))
            .flat_map(|(lang, entry)| {
                [
                    non_empty_triple(lang, &base.name, &entry.name),
                    non_empty_triple(lang, &base.description, &entry.description),
                ]
            })
            .flatten()
            .collect()
    }
}

/// One translated sheet, ready to hand out the counterpart of a base row.
pub struct AlignedSheet<'r> {
    lang: LanguageCode,
    rows: &'r [Row],
    by_key: Option<HashMap<&'r str, Vec<&'r Row>>>,
}

impl<'r> AlignedSheet<'r> {
    pub fn new(lang: LanguageCode, rows: &'r [Row], alignment: Alignment) -> Self {
        let by_key = match alignment {
            Alignment::Positional => None,
            Alignment::Keyed => {
                let mut map: HashMap<&'r str, Vec<&'r Row>> = HashMap::new();
                for row in rows {
                    if let Some(key) = row.natural_key() {
                        map.entry(key).or_default().push(row);
                    }
                }
                Some(map)
            }
        };
        Self { lang, rows, by_key }
    }

    pub fn lang(&self) -> &LanguageCode {
        &self.lang
    }

    /// Counterpart of the base row found at `position` in the base sheet.
    pub fn counterpart(&self, position: usize, base: &Row) -> Result<&'r Row, RowError> {
        match &self.by_key {
            None => {
                let other = self.rows.get(position).ok_or_else(|| {
                    failed(&self.lang, format!("no row at position {position}"))
                })?;
                if let (Some(base_key), Some(other_key)) = (base.natural_key(), other.natural_key())
                {
                    if base_key != other_key {
                        tracing::warn!(
                            lang = %self.lang,
                            base_key,
                            other_key,
                            "positional alignment pairs rows with different ids"
                        );
                    }
                }
                Ok(other)
            }
            Some(by_key) => {
                let key = base
                    .natural_key()
                    .ok_or_else(|| failed(&self.lang, "base row has no id to join on"))?;
                match by_key.get(key).map(Vec::as_slice) {
                    Some([row]) => Ok(*row),
                    Some(rows) if rows.len() > 1 => {
                        Err(failed(&self.lang, format!("id {key} appears {} times", rows.len())))
                    }
                    _ => Err(failed(&self.lang, format!("no row with id {key}"))),
                }
            }
        }
    }
}

/// Blank cells have nothing to translate, and the catalog rejects empty terms.
fn non_empty_triple(
    lang: &LanguageCode,
    term: &str,
    translation: &str,
) -> Option<TranslationTriple> {
    (!term.trim().is_empty() && !translation.trim().is_empty())
        .then(|| TranslationTriple::new(lang, term, translation))
}

fn required<'r>(row: &'r Row, column: &str, lang: &LanguageCode) -> Result<&'r str, RowError> {
    row.get(column).ok_or_else(|| {
        failed(
            lang,
            format!("row {} has no column {column}", row.index()),
        )
    })
}

fn failed(lang: &LanguageCode, message: impl Into<String>) -> RowError {
    RowError::TranslationDerivationFailed {
        lang: lang.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::default_organization;

    fn organization() -> BTreeMap<LanguageCode, OrganizationDescriptor> {
        default_organization()
            .into_iter()
            .map(|(lang, entry)| (lang.parse().unwrap(), entry))
            .collect()
    }

    fn row(index: usize, id: &str, title: &str, tags: &str) -> Row {
        Row::from_pairs(
            index,
            [
                ("id", id),
                ("title", title),
                ("notes", "n"),
                ("author", "a"),
                ("maintainer", "m"),
                ("licence", "l"),
                ("groups", "g"),
                ("tags", tags),
            ],
        )
    }

    #[test]
    fn length_mismatch_fails() {
        let de: LanguageCode = "de".parse().unwrap();
        let fr: LanguageCode = "fr".parse().unwrap();
        let org = organization();
        let deriver = TranslationDeriver::new(&de, &org);
        let err = deriver
            .derive(&[row(7, "x1", "A", "")], &[], &fr)
            .unwrap_err();
        assert_matches!(err, RowError::TranslationDerivationFailed { .. });
    }

    #[test]
    fn missing_column_fails() {
        let de: LanguageCode = "de".parse().unwrap();
        let fr: LanguageCode = "fr".parse().unwrap();
        let org = organization();
        let deriver = TranslationDeriver::new(&de, &org);
        let other = Row::from_pairs(7, [("title", "B")]);
        let err = deriver
            .derive(&[row(7, "x1", "A", "")], &[other], &fr)
            .unwrap_err();
        assert_matches!(err, RowError::TranslationDerivationFailed { .. });
    }

    #[test]
    fn organization_triples_skip_base() {
        let de: LanguageCode = "de".parse().unwrap();
        let org = organization();
        let deriver = TranslationDeriver::new(&de, &org);
        let languages = ["de", "fr", "it", "en"]
            .iter()
            .map(|lang| lang.parse().unwrap())
            .collect::<Vec<LanguageCode>>();
        let triples = deriver.organization_triples(&languages);
        assert_eq!(triples.len(), 6);
        assert!(triples.iter().all(|t| t.lang_code.as_str() != "de"));
        assert_eq!(triples[0].term, "Schweizerisches Bundesarchiv");
    }

    #[test]
    fn blank_cells_emit_no_triples() {
        let de: LanguageCode = "de".parse().unwrap();
        let fr: LanguageCode = "fr".parse().unwrap();
        let org = organization();
        let deriver = TranslationDeriver::new(&de, &org);
        let base = Row::from_pairs(
            7,
            [
                ("title", "Census"),
                ("notes", ""),
                ("author", " "),
                ("maintainer", ""),
                ("licence", "cc-by"),
                ("groups", "Stats"),
                ("tags", ""),
            ],
        );
        let other = Row::from_pairs(
            7,
            [
                ("title", "Recensement"),
                ("notes", "Remarques"),
                ("author", "Auteur"),
                ("maintainer", ""),
                ("licence", ""),
                ("groups", "Statistiques"),
                ("tags", ""),
            ],
        );

        let triples = deriver.derive(&[base], &[other], &fr).unwrap();
        let terms = triples.iter().map(|t| t.term.as_str()).collect::<Vec<_>>();
        assert_eq!(terms, vec!["Census", "Stats"]);
        assert!(
            triples
                .iter()
                .all(|t| !t.term.trim().is_empty() && !t.term_translation.trim().is_empty())
        );
    }

    #[test]
    fn organization_without_description_emits_name_only() {
        let de: LanguageCode = "de".parse().unwrap();
        let fr: LanguageCode = "fr".parse().unwrap();
        let mut org = organization();
        if let Some(entry) = org.get_mut(&fr) {
            entry.description = String::new();
        }
        let deriver = TranslationDeriver::new(&de, &org);
        let triples = deriver.organization_triples(&[de.clone(), fr]);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].term_translation, "Archives fédérales suisses");
    }

    #[test]
    fn keyed_alignment_joins_on_id() {
        let fr: LanguageCode = "fr".parse().unwrap();
        let rows = vec![row(7, "x2", "Deux", ""), row(8, "x1", "Un", "")];
        let sheet = AlignedSheet::new(fr, &rows, Alignment::Keyed);
        let found = sheet.counterpart(0, &row(7, "x1", "Eins", "")).unwrap();
        assert_eq!(found.get("title"), Some("Un"));

        let err = sheet.counterpart(0, &row(7, "x9", "?", "")).unwrap_err();
        assert_matches!(err, RowError::TranslationDerivationFailed { .. });
    }

    #[test]
    fn keyed_alignment_rejects_duplicates() {
        let fr: LanguageCode = "fr".parse().unwrap();
        let rows = vec![row(7, "x1", "Un", ""), row(8, "x1", "Un bis", "")];
        let sheet = AlignedSheet::new(fr, &rows, Alignment::Keyed);
        let err = sheet.counterpart(0, &row(7, "x1", "Eins", "")).unwrap_err();
        assert_matches!(err, RowError::TranslationDerivationFailed { .. });
    }

    #[test]
    fn positional_alignment_runs_out_of_rows() {
        let fr: LanguageCode = "fr".parse().unwrap();
        let rows = vec![row(7, "x1", "Un", "")];
        let sheet = AlignedSheet::new(fr, &rows, Alignment::Positional);
        assert!(sheet.counterpart(0, &row(7, "x1", "Eins", "")).is_ok());
        assert!(sheet.counterpart(1, &row(8, "x2", "Zwei", "")).is_err());
    }
}
