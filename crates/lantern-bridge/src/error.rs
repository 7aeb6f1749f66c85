//! Error types for the HTTP bridge

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors raised while serving bridge requests
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request body or query string was unusable
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The station's outbound path is gone
    #[error("Outbound channel closed")]
    ChannelClosed,

    #[error("Archive error: {0}")]
    Store(#[from] lantern_store::StoreError),

    #[error("Invalid report: {0}")]
    Hazard(#[from] lantern_hazard::HazardError),

    #[error("Invalid coordinates: {0}")]
    Core(#[from] lantern_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::BadRequest(_) | BridgeError::Hazard(_) | BridgeError::Core(_) => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::ChannelClosed | BridgeError::Store(_) | BridgeError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Bridge request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = BridgeError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_closed_channel_maps_to_500() {
        let response = BridgeError::ChannelClosed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
