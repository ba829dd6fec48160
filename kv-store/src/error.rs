//! Error types for the key/value store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, KvError>;

/// Errors that can occur while reading or writing tool data.
#[derive(Error, Debug)]
pub enum KvError {
    /// Tool or key name cannot be stored.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Reading or writing a backing file failed.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored value has the wrong shape.
    #[error("corrupt data for {tool}: {message}")]
    Corrupt { tool: String, message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KvError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
