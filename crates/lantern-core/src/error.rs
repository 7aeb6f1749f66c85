//! Error types for Lantern core

use thiserror::Error;

/// Top-level error type for core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
