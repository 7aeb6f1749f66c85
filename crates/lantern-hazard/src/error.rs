//! Error types for hazard records

use thiserror::Error;

use lantern_core::CoreError;

/// Errors raised while building hazard records
#[derive(Debug, Error)]
pub enum HazardError {
    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Coordinate error: {0}")]
    Coordinates(#[from] CoreError),
}

/// Result type alias for hazard operations
pub type HazardResult<T> = Result<T, HazardError>;
