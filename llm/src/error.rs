//! Error types for LLM calls.

use thiserror::Error;

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to a model.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider is missing credentials or settings.
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The provider answered with a non-success status.
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
