//! HTTP API handlers for sift-server

pub mod feedback;
pub mod health;
pub mod predict;
pub mod retraining;

pub use feedback::feedback_routes;
pub use health::health_routes;
pub use predict::predict_routes;
pub use retraining::retraining_routes;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;

use crate::ApiError;

/// Unwrap a JSON body, turning framework rejections into our 400 payload
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })
}

/// A present, non-blank string field
pub(crate) fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(sift_common::Error::Validation(format!("'{}' is required", field)).into()),
    }
}
