//! Common error types for vigil filters

use thiserror::Error;

/// Common result type for vigil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across vigil filters
#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration field absent
    #[error("Missing parameter: '{0}'")]
    MissingField(String),

    /// Configuration field present with the wrong primitive type
    #[error("'{field}' needs to be {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    /// File not found, unreadable, or malformed backend artifact
    #[error("Resource error: {0}")]
    Resource(String),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
