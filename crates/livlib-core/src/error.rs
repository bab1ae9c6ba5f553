//! Error types for the Living Library pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using livlib's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Fragment not found
    #[error("Fragment not found: {0}")]
    FragmentNotFound(Uuid),

    /// Caller may not act on this fragment
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Fragment changed state underneath the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Fragment has not finished analysis
    #[error("Fragment not ready: {0}")]
    NotReady(Uuid),

    /// Vectors of unequal length were compared
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding, classification, or lexical provider failed or timed out
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Every retrieval method failed
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::SearchUnavailable(_) | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
