//! Inference endpoint

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sift_common::Sensitivity;
use tracing::info;

use super::{json_body, required};
use crate::image_codec::ImagePayload;
use crate::{ApiResult, AppState};

/// Request payload for POST /process_image
#[derive(Debug, Deserialize)]
pub struct ProcessImageRequest {
    /// Base64 image, optionally wrapped in a data URL
    pub image: Option<String>,
}

/// Response payload for POST /process_image
#[derive(Debug, Serialize)]
pub struct ProcessImageResponse {
    /// Predicted class index
    pub prediction: usize,
    pub label: Sensitivity,
    pub probabilities: Vec<f32>,
}

/// POST /process_image
///
/// **Request:** `{"image": "data:image/png;base64,..."}`
/// **Response:** `{"prediction": 1, "label": "sensitive", "probabilities": [0.1, 0.9]}`
///
/// **Errors:**
/// - 400 Bad Request: malformed JSON or missing image
/// - 500 Internal Server Error: undecodable image or inference failure
pub async fn process_image(
    State(state): State<AppState>,
    body: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessImageResponse>> {
    let request = json_body(body)?;
    let encoded = required("image", request.image)?;

    let payload = ImagePayload::from_data_url(&encoded)?;
    let image = payload.decode_image()?;
    info!(
        media_type = payload.media_type.as_deref().unwrap_or("unknown"),
        width = image.width(),
        height = image.height(),
        "Processing image"
    );

    let prediction = state.predictor.predict(image).await?;

    Ok(Json(ProcessImageResponse {
        prediction: prediction.class_index,
        label: prediction.label,
        probabilities: prediction.probabilities,
    }))
}

/// Build inference routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/process_image", post(process_image))
}
