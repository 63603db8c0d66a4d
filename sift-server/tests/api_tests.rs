//! Integration tests for sift-server API endpoints
//!
//! Tests cover:
//! - POST /process_image: predictions, padding restore, body limit, 400/500 mapping
//! - POST /submit_feedback: need-for-train flag, validation errors
//! - GET /health
//! - GET /retraining/status and POST /retraining/run

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use helpers::*;
use serde_json::{json, Value};
use sift_server::build_router;
use sift_server::db::FeedbackStore;
use sift_server::retraining::CycleOutcome;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: environment whose active model separates bright from dark
async fn setup_env() -> TestEnv {
    TestEnv::new(SEPARATING, Arc::new(FixedTrainer::new(SEPARATING))).await
}

/// Test helper: Create JSON POST request
fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn feedback_body(model_prediction: Value, user_feedback: Value) -> Value {
    json!({
        "image": data_url(&png(255)),
        "image_label": "holiday photo",
        "model_prediction": model_prediction,
        "user_feedback": user_feedback,
        "platform": "instagram",
    })
}

// =============================================================================
// POST /process_image
// =============================================================================

#[tokio::test]
async fn test_process_image_predicts_sensitive_for_bright_image() {
    let env = setup_env().await;
    let app = build_router(env.state.clone());

    let response = app
        .oneshot(post_json("/process_image", json!({ "image": data_url(&png(250)) })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["prediction"], 1);
    assert_eq!(body["label"], "sensitive");
    assert_eq!(body["probabilities"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_process_image_accepts_bare_base64() {
    let env = setup_env().await;
    let app = build_router(env.state.clone());
    let encoded = data_url(&png(0));
    let bare = encoded.trim_start_matches("data:image/png;base64,");

    let response = app
        .oneshot(post_json("/process_image", json!({ "image": bare })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["prediction"], 0);
    assert_eq!(body["label"], "not-sensitive");
}

#[tokio::test]
async fn test_process_image_restores_missing_padding() {
    let env = setup_env().await;

    // Find an image whose encoding ends in "==" and strip both characters
    let encoded = (1u32..=64)
        .flat_map(|w| (1u32..=8).map(move |h| data_url(&png_sized(w, h, 200))))
        .find(|url| url.ends_with("=="))
        .expect("some PNG encodes with two padding characters");
    let stripped = encoded.trim_end_matches('=').to_string();

    let response = build_router(env.state.clone())
        .oneshot(post_json("/process_image", json!({ "image": stripped })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_process_image_accepts_image_above_two_megabytes() {
    let env = setup_env().await;
    let image = noisy_png(900, 900);
    assert!(image.len() > 2 * 1024 * 1024, "fixture is {} bytes", image.len());

    let response = build_router(env.state.clone())
        .oneshot(post_json("/process_image", json!({ "image": data_url(&image) })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body["prediction"].as_u64().unwrap() < 2);
}

#[tokio::test]
async fn test_feedback_accepts_image_above_two_megabytes() {
    let env = setup_env().await;
    let image = noisy_png(900, 900);
    let mut body = feedback_body(json!(0), json!("sensitive"));
    body["image"] = json!(data_url(&image));

    let response = build_router(env.state.clone())
        .oneshot(post_json("/submit_feedback", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let stored = env.store.get(body["id"].as_str().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.image.len(), image.len());
}

#[tokio::test]
async fn test_body_over_configured_limit_is_payload_too_large() {
    let env = setup_env().await;
    let mut state = env.state.clone();
    state.max_body_bytes = 1024;

    let response = build_router(state)
        .oneshot(post_json("/process_image", json!({ "image": data_url(&noisy_png(64, 64)) })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_process_image_missing_image_is_bad_request() {
    let env = setup_env().await;

    let response = build_router(env.state.clone())
        .oneshot(post_json("/process_image", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_process_image_malformed_json_is_bad_request() {
    let env = setup_env().await;
    let request = Request::builder()
        .method("POST")
        .uri("/process_image")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = build_router(env.state.clone()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_process_image_undecodable_image_is_server_error() {
    let env = setup_env().await;
    let garbage = data_url(b"definitely not a picture");

    let response = build_router(env.state.clone())
        .oneshot(post_json("/process_image", json!({ "image": garbage })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "DECODE_ERROR");
    assert!(body["error"]["message"].is_string());
}

// =============================================================================
// POST /submit_feedback
// =============================================================================

#[tokio::test]
async fn test_feedback_disagreement_needs_training() {
    let env = setup_env().await;

    let response = build_router(env.state.clone())
        .oneshot(post_json(
            "/submit_feedback",
            feedback_body(json!("not sensitive"), json!("sensitive")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["message"], "Feedback submitted successfully");
    assert_eq!(body["need_for_train"], true);

    let id = body["id"].as_str().unwrap();
    let stored = env.store.get(id).await.unwrap().unwrap();
    assert!(stored.need_for_train);
    assert_eq!(stored.image, png(255));
    assert_eq!(stored.user_feedback, "sensitive");
}

#[tokio::test]
async fn test_feedback_agreement_with_integer_prediction() {
    let env = setup_env().await;

    let response = build_router(env.state.clone())
        .oneshot(post_json(
            "/submit_feedback",
            feedback_body(json!(1), json!("The image is sensitive.")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["need_for_train"], false);
    assert_eq!(env.store.count_needing_training().await.unwrap(), 0);
}

#[tokio::test]
async fn test_feedback_missing_field_is_bad_request() {
    let env = setup_env().await;
    let mut body = feedback_body(json!(0), json!("sensitive"));
    body.as_object_mut().unwrap().remove("platform");

    let response = build_router(env.state.clone())
        .oneshot(post_json("/submit_feedback", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("platform"));
}

#[tokio::test]
async fn test_feedback_blank_label_is_bad_request() {
    let env = setup_env().await;

    let response = build_router(env.state.clone())
        .oneshot(post_json(
            "/submit_feedback",
            feedback_body(json!(0), json!("   ")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feedback_invalid_base64_is_bad_request() {
    let env = setup_env().await;
    let mut body = feedback_body(json!(0), json!("sensitive"));
    body["image"] = json!("data:image/png;base64,@@@@");

    let response = build_router(env.state.clone())
        .oneshot(post_json("/submit_feedback", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(env.store.count_needing_training().await.unwrap(), 0);
}

#[tokio::test]
async fn test_feedback_storage_failure_is_server_error() {
    let env = setup_env().await;
    env.store.pool().close().await;

    let response = build_router(env.state.clone())
        .oneshot(post_json(
            "/submit_feedback",
            feedback_body(json!(0), json!("sensitive")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "STORAGE_ERROR");
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let env = setup_env().await;

    let response = build_router(env.state.clone())
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sift-server");
    assert!(body["version"].is_string());
    assert!(body["active_model"].as_str().unwrap().ends_with("initial-model"));
}

// =============================================================================
// Retraining endpoints
// =============================================================================

#[tokio::test]
async fn test_retraining_status_counts_pending_feedback() {
    let env = setup_env().await;
    env.seed_flagged(2, 1).await;

    let response = build_router(env.state.clone())
        .oneshot(get("/retraining/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pending_feedback"], 3);
    assert_eq!(body["running"], false);
    assert!(body.get("last_cycle").is_none());
}

#[tokio::test]
async fn test_retraining_run_is_accepted_and_reported() {
    let env = TestEnv::new(ALWAYS_NOT_SENSITIVE, Arc::new(FixedTrainer::new(SEPARATING))).await;
    env.seed_flagged(4, 4).await;

    let response = build_router(env.state.clone())
        .oneshot(post_json("/retraining/run", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The cycle runs in the background
    let mut report = None;
    for _ in 0..100 {
        report = env.state.orchestrator.last_report().await;
        if report.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let report = report.expect("cycle should finish");
    assert!(matches!(report.outcome, Some(CycleOutcome::Promoted(_))));

    let response = build_router(env.state.clone())
        .oneshot(get("/retraining/status"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pending_feedback"], 0);
    assert_eq!(body["last_cycle"]["outcome"]["outcome"], "promoted");
}
