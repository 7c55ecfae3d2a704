//! Error types for cachefill

use thiserror::Error;

use crate::reporting::ErrorCode;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the cache or loading batches.
///
/// Failures raised by a caller-supplied backing fetch are not represented here;
/// the loader hands them back in the caller's own error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The cache store could not be reached or rejected the operation
    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A cached value could not be decoded
    #[error("Malformed cache entry for key {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a backend failure on a named endpoint.
    pub fn unavailable(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable(format!("{}: {}", endpoint, reason))
    }

    /// Classify this error for reporting purposes.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) => ErrorCode::BadUserInput,
            _ => ErrorCode::InternalServerError,
        }
    }
}
