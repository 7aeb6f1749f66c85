//! Error types for the archive

use thiserror::Error;

use lantern_core::MessageId;

/// Errors that can occur in archive operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while touching the log
    #[error("I/O error: {0}")]
    Io(String),

    /// Error while encoding or decoding a log line
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The message id is already archived
    #[error("Duplicate message: {0}")]
    Duplicate(MessageId),

    /// The log writer is not open
    #[error("Log file not open")]
    LogNotOpen,

    /// A lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for archive operations
pub type StoreResult<T> = Result<T, StoreError>;
