//! Error types for loader manifest operations

use std::io;

use thiserror::Error;
use zip::result::ZipError;

use crate::config::ConfigError;

/// Result type for loader manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors from loader manifest operations
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid entry pattern: {0}")]
    Pattern(#[from] regex_lite::Error),

    #[error("invalid priority {0:?}: expected two ASCII digits")]
    InvalidPriority(String),

    #[error("invalid dependency name {0:?}")]
    InvalidName(String),
}
