//! Error types for the mesh layer

use thiserror::Error;

/// Errors that can occur in mesh operations
#[derive(Debug, Error)]
pub enum MeshError {
    /// Failed to bind the local endpoint
    #[error("failed to bind endpoint: {0}")]
    Bind(String),

    /// Failed to subscribe to a room topic
    #[error("failed to subscribe to room: {0}")]
    Subscribe(String),

    /// Failed to broadcast a frame
    #[error("failed to broadcast: {0}")]
    Broadcast(String),

    /// Failed to encode a frame
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Failed to decode a frame
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// A frame carried a signature that does not verify
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// A room ticket could not be parsed
    #[error("invalid room ticket: {0}")]
    InvalidTicket(String),

    /// Already joined this room
    #[error("already joined room")]
    AlreadyJoined,

    /// The gossip stream closed
    #[error("mesh stream closed")]
    Closed,

    /// Generic mesh error
    #[error("mesh error: {0}")]
    Other(String),
}

impl From<postcard::Error> for MeshError {
    fn from(e: postcard::Error) -> Self {
        MeshError::Encode(e.to_string())
    }
}

/// Result type for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;
