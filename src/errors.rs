use std::sync::Arc;
use thiserror::Error;

/// Crate-wide error type.
///
/// Cloneable so a single download outcome can be handed to every caller that
/// joined the same in-flight key. Sources that are not `Clone` are kept behind `Arc`.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(Arc<config::ConfigError>),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Resolution error: could not find a source url in resolver output")]
    NoSourceLocator,

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Extraction error: track is age-restricted")]
    AgeRestricted,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Whether another extraction attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Extraction(_))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(Arc::new(error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Json(Arc::new(error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Http(Arc::new(error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
