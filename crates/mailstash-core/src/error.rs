//! Error types for the core library.

use thiserror::Error;

use crate::adapter::AdapterError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote mailbox operation failed.
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Message parsing failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailstash_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search query was rejected before execution.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Page request was out of range or malformed.
    #[error("Invalid page request: {0}")]
    InvalidPage(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
