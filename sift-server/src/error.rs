//! Error types for the HTTP facade
//!
//! Every failure leaves the service as a JSON error payload with a fixed
//! status code; nothing propagates to the client as an unhandled fault.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. retraining already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request body over the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// sift-common error
    #[error(transparent)]
    Common(#[from] sift_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => {
                let code = match err {
                    sift_common::Error::Decode(_) => "DECODE_ERROR",
                    sift_common::Error::Validation(_) => "VALIDATION_ERROR",
                    sift_common::Error::Storage(_) => "STORAGE_ERROR",
                    sift_common::Error::Training(_) => "TRAINING_ERROR",
                    sift_common::Error::Model(_) => "MODEL_ERROR",
                    _ => "INTERNAL_ERROR",
                };
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        } else {
            tracing::debug!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
