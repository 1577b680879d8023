use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failure scoped to a single dataset row. Gather logs these and skips the row.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum RowError {
    #[error("resource listing unavailable for {key}: {message}")]
    ResourceListUnavailable { key: String, message: String },

    #[error("translation derivation failed for {lang}: {message}")]
    TranslationDerivationFailed { lang: String, message: String },

    #[error("malformed row {row}: {message}")]
    MalformedRow { row: usize, message: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("metadata source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("import of {guid} failed: {message}")]
    ImportFailed { guid: String, message: String },

    #[error("missing config file sfa-harvest.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid language code: {0}")]
    InvalidLanguage(String),

    #[error("object store request failed: {0}")]
    StoreHttp(String),

    #[error("object store returned status {status}: {message}")]
    StoreStatus { status: u16, message: String },

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("catalog action {action} failed: {message}")]
    CatalogAction { action: String, message: String },

    #[error("harvest job not found: {0}")]
    JobNotFound(String),

    #[error("harvest job {0} failed during gather")]
    JobFailed(String),

    #[error("invalid harvest object {id}: {message}")]
    InvalidObject { id: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    pub(crate) fn import(guid: &str, err: impl std::fmt::Display) -> Self {
        HarvestError::ImportFailed {
            guid: guid.to_string(),
            message: err.to_string(),
        }
    }
}
