//! Error types for the courier

use thiserror::Error;

use lantern_core::MessageId;

/// Errors that can occur in courier operations
#[derive(Debug, Error)]
pub enum CourierError {
    /// The message is already queued
    #[error("Message already queued: {0}")]
    Duplicate(MessageId),

    /// The queue is at capacity and holds only emergencies
    #[error("Queue full with emergency traffic")]
    QueueFull,

    /// A lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

/// Result type alias for courier operations
pub type CourierResult<T> = Result<T, CourierError>;
