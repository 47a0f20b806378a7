//! Common error types for Playola

use thiserror::Error;

use crate::api::ApiError;

/// Common result type for Playola operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Playola crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server payload is missing a required field or has the wrong shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote API call failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
