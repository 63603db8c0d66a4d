//! Feedback endpoint

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use serde::Deserialize;
use sift_common::{Error, LabelValue};

use super::{json_body, required};
use crate::feedback::{FeedbackReceipt, FeedbackSubmission};
use crate::image_codec::ImagePayload;
use crate::{ApiError, ApiResult, AppState};

/// Request payload for POST /submit_feedback
///
/// All fields are optional at the serde level so a missing field is reported
/// as a validation error naming it.
#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub image: Option<String>,
    pub image_label: Option<String>,
    /// String label or class index
    pub model_prediction: Option<LabelValue>,
    /// String label or class index
    pub user_feedback: Option<LabelValue>,
    pub platform: Option<String>,
}

/// POST /submit_feedback
///
/// **Request:**
/// `{"image": "...", "image_label": "...", "model_prediction": 1,
///   "user_feedback": "not sensitive", "platform": "instagram"}`
/// **Response:** `{"message": "...", "id": "...", "need_for_train": true}`
///
/// **Errors:**
/// - 400 Bad Request: malformed JSON, missing or empty field, undecodable base64
/// - 500 Internal Server Error: storage failure
pub async fn submit_feedback(
    State(state): State<AppState>,
    body: Result<Json<SubmitFeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<FeedbackReceipt>> {
    let request = json_body(body)?;

    let encoded = required("image", request.image)?;
    let image_label = required("image_label", request.image_label)?;
    let model_prediction = required_label("model_prediction", request.model_prediction)?;
    let user_feedback = required_label("user_feedback", request.user_feedback)?;
    let platform = required("platform", request.platform)?;

    let payload = ImagePayload::from_data_url(&encoded).map_err(|e| match e {
        Error::Decode(msg) => ApiError::from(Error::Validation(format!("invalid image: {}", msg))),
        other => ApiError::from(other),
    })?;

    let receipt = state
        .submitter
        .submit(FeedbackSubmission {
            image: payload.bytes,
            image_label,
            model_prediction,
            user_feedback,
            platform,
        })
        .await?;

    Ok(Json(receipt))
}

fn required_label(field: &str, value: Option<LabelValue>) -> ApiResult<LabelValue> {
    match value {
        Some(value) if !value.is_blank() => Ok(value),
        _ => Err(Error::Validation(format!("'{}' is required", field)).into()),
    }
}

/// Build feedback routes
pub fn feedback_routes() -> Router<AppState> {
    Router::new().route("/submit_feedback", post(submit_feedback))
}
