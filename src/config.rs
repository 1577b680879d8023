use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{Alignment, LanguageCode, OrganizationDescriptor};
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "sfa-harvest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub store_host: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub department_prefix: Option<String>,
    #[serde(default)]
    pub metadata_file: Option<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub organization: Option<BTreeMap<String, OrganizationDescriptor>>,
    #[serde(default)]
    pub alignment: Option<Alignment>,
    #[serde(default)]
    pub catalog: Option<CatalogEntry>,
    #[serde(default)]
    pub queue_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub bucket: String,
    pub host: String,
    pub region: String,
    pub credentials: Option<Credentials>,
}

impl StoreSettings {
    pub fn endpoint(&self) -> String {
        format!("https://{}.{}", self.bucket, self.host)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store: StoreSettings,
    pub base_url: String,
    pub department_prefix: String,
    pub metadata_file: String,
    /// Sheet order of the workbook; the first entry is the base language.
    pub languages: Vec<LanguageCode>,
    pub organization: BTreeMap<LanguageCode, OrganizationDescriptor>,
    pub alignment: Alignment,
    pub catalog: CatalogSettings,
    pub queue_dir: PathBuf,
}

impl ResolvedConfig {
    pub fn base_language(&self) -> &LanguageCode {
        &self.languages[0]
    }

    pub fn base_organization(&self) -> &OrganizationDescriptor {
        &self.organization[self.base_language()]
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(HarvestError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        let mut resolved = Self::resolve_config(config)?;
        apply_env_overrides(&mut resolved);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let bucket = config
            .bucket
            .unwrap_or_else(|| "bar-opendata-ch".to_string());
        let host = config
            .store_host
            .unwrap_or_else(|| "s3.amazonaws.com".to_string());
        let base_url = config
            .base_url
            .unwrap_or_else(|| format!("http://{bucket}.{host}"))
            .trim_end_matches('/')
            .to_string();

        let languages = config
            .languages
            .unwrap_or_else(default_languages)
            .iter()
            .map(|value| value.parse())
            .collect::<Result<Vec<LanguageCode>, HarvestError>>()?;
        if languages.is_empty() {
            return Err(HarvestError::InvalidConfig(
                "at least one language is required".to_string(),
            ));
        }

        let organization = config
            .organization
            .unwrap_or_else(default_organization)
            .into_iter()
            .map(|(lang, descriptor)| Ok((lang.parse()?, descriptor)))
            .collect::<Result<BTreeMap<LanguageCode, _>, HarvestError>>()?;
        if !organization.contains_key(&languages[0]) {
            return Err(HarvestError::InvalidConfig(format!(
                "organization entry missing for base language {}",
                languages[0]
            )));
        }

        let catalog = config.catalog.unwrap_or_default();

        Ok(ResolvedConfig {
            store: StoreSettings {
                bucket,
                host,
                region: config.region.unwrap_or_else(|| "eu-west-1".to_string()),
                credentials: config.credentials,
            },
            base_url,
            department_prefix: config
                .department_prefix
                .unwrap_or_else(|| "ch.bar.".to_string()),
            metadata_file: config
                .metadata_file
                .unwrap_or_else(|| "OGD@Bund Metadaten BAR.xlsx".to_string()),
            languages,
            organization,
            alignment: config.alignment.unwrap_or_default(),
            catalog: CatalogSettings {
                url: catalog
                    .url
                    .unwrap_or_else(|| "http://localhost:5000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key: catalog.api_key,
            },
            queue_dir: PathBuf::from(config.queue_dir.unwrap_or_else(|| ".sfa-harvest".to_string())),
        })
    }
}

fn apply_env_overrides(config: &mut ResolvedConfig) {
    let access = std::env::var("SFA_ACCESS_KEY").ok();
    let secret = std::env::var("SFA_SECRET_KEY").ok();
    if let (Some(access_key), Some(secret_key)) = (access, secret) {
        if !access_key.trim().is_empty() && !secret_key.trim().is_empty() {
            config.store.credentials = Some(Credentials {
                access_key: access_key.trim().to_string(),
                secret_key: secret_key.trim().to_string(),
            });
        }
    }
    if let Ok(api_key) = std::env::var("CKAN_API_KEY") {
        if !api_key.trim().is_empty() {
            config.catalog.api_key = Some(api_key.trim().to_string());
        }
    }
}

pub fn default_languages() -> Vec<String> {
    vec![
        "de".to_string(),
        "fr".to_string(),
        "it".to_string(),
        "en".to_string(),
    ]
}

pub fn default_organization() -> BTreeMap<String, OrganizationDescriptor> {
    let website = Some("https://www.bar.admin.ch".to_string());
    let entries = [
        (
            "de",
            "Schweizerisches Bundesarchiv",
            "Das Schweizerische Bundesarchiv BAR bewertet, sichert und erschliesst Unterlagen des Bundes.",
        ),
        (
            "fr",
            "Archives fédérales suisses",
            "Les Archives fédérales suisses AFS évaluent, conservent et inventorient les documents de la Confédération.",
        ),
        (
            "it",
            "Archivio federale svizzero",
            "L'Archivio federale svizzero AFS valuta, conserva e inventaria gli atti della Confederazione.",
        ),
        (
            "en",
            "Swiss Federal Archives",
            "The Swiss Federal Archives SFA appraise, preserve and catalogue the records of the Confederation.",
        ),
    ];
    entries
        .into_iter()
        .map(|(lang, name, description)| {
            (
                lang.to_string(),
                OrganizationDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                    website: website.clone(),
                },
            )
        })
        .collect()
}
