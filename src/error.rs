//! Error types for the shiftscan crate

use thiserror::Error;

/// Result type for shiftscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for shiftscan operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A well-formed success body was missing an expected field
    #[error("response missing expected field: {0}")]
    MissingField(String),

    /// Invalid request URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid scan configuration, surfaced before any request is issued
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// CSV output error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error on the output or log file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
