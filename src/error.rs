//! Error types for dpg-catalog

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed record {file}: {reason}")]
    MalformedRecord { file: String, reason: String },

    #[error("Reference table '{key}' failed to load: {reason}")]
    ReferenceLoad { key: String, reason: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Reference data not ready: {0}")]
    NotReady(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
