//! Retraining control endpoints

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::Serialize;
use tracing::{error, info};

use crate::retraining::CycleReport;
use crate::{ApiError, ApiResult, AppState};

/// Response payload for GET /retraining/status
#[derive(Debug, Serialize)]
pub struct RetrainingStatus {
    /// Documents waiting for the next cycle
    pub pending_feedback: u64,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}

/// Response payload for POST /retraining/run
#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub message: String,
}

/// GET /retraining/status
pub async fn retraining_status(State(state): State<AppState>) -> ApiResult<Json<RetrainingStatus>> {
    Ok(Json(RetrainingStatus {
        pending_feedback: state.orchestrator.pending_count().await?,
        running: state.orchestrator.is_running(),
        last_cycle: state.orchestrator.last_report().await,
    }))
}

/// POST /retraining/run
///
/// Starts a cycle in the background and returns immediately.
///
/// **Errors:**
/// - 409 Conflict: a cycle is already running
pub async fn run_retraining(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    if state.orchestrator.is_running() {
        return Err(ApiError::Conflict("a retraining cycle is already running".to_string()));
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        match orchestrator.run_cycle().await {
            Ok(outcome) => info!(outcome = ?outcome, "Requested retraining cycle complete"),
            Err(e) => error!(error = %e, "Requested retraining cycle failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            message: "Retraining cycle started".to_string(),
        }),
    ))
}

/// Build retraining routes
pub fn retraining_routes() -> Router<AppState> {
    Router::new()
        .route("/retraining/status", get(retraining_status))
        .route("/retraining/run", post(run_retraining))
}
