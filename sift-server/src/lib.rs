//! sift-server library interface
//!
//! Exposes the service components and router for the binary and for
//! integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod feedback;
pub mod image_codec;
pub mod model;
pub mod predictor;
pub mod retraining;
pub mod scheduler;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sift_common::config::DEFAULT_MAX_BODY_BYTES;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::FeedbackStore;
use crate::feedback::FeedbackSubmitter;
use crate::model::ModelRegistry;
use crate::predictor::Predictor;
use crate::retraining::{RetrainingOrchestrator, RetrainingSettings, Trainer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub predictor: Predictor,
    pub submitter: FeedbackSubmitter,
    pub orchestrator: Arc<RetrainingOrchestrator>,
    pub registry: Arc<ModelRegistry>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Request body limit applied by [`build_router`]
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wire the components around one store, registry and trainer
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        registry: Arc<ModelRegistry>,
        trainer: Arc<dyn Trainer>,
        settings: RetrainingSettings,
    ) -> Self {
        let sensitive_class = settings.sensitive_class;
        let orchestrator = Arc::new(RetrainingOrchestrator::new(
            store.clone(),
            registry.clone(),
            trainer,
            settings,
        ));

        Self {
            predictor: Predictor::new(registry.clone(), sensitive_class),
            submitter: FeedbackSubmitter::new(store, sensitive_class),
            orchestrator,
            registry,
            startup_time: Utc::now(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .merge(api::predict_routes())
        .merge(api::feedback_routes())
        .merge(api::retraining_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
