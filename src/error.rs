use crate::query::SourceKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Rejections raised before any source is touched.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Search pattern must not be empty")]
    EmptyPattern,

    #[error("Search scope must not be empty")]
    EmptyScope,

    #[error("No known source in scope: {0}")]
    NoKnownScope(String),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("No items selected for replacement")]
    NoItems,
}

#[derive(Error, Debug)]
pub enum RfsrError {
    #[error("Invalid query: {0}")]
    Validation(#[from] ValidationError),

    #[error("Source '{kind}' unavailable: {reason}")]
    SourceUnavailable { kind: SourceKind, reason: String },

    #[error("Failed to write '{container}': {source}")]
    ItemWrite {
        container: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path rejected: {0}")]
    PathRejected(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("An unexpected error occurred: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RfsrError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RfsrError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, RfsrError>;
