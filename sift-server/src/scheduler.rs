//! Retraining schedule
//!
//! - `disabled`: cycles only run on request (`POST /retraining/run`, `retrain`)
//! - `once`: one cycle at startup, before the listener binds
//! - `interval`: a background task runs a cycle every `interval_secs`

use sift_common::config::{RetrainingConfig, ScheduleMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::retraining::RetrainingOrchestrator;

/// Apply the configured schedule
///
/// `once` completes its cycle before returning. `interval` returns the
/// handle of the spawned background task.
pub async fn start(
    orchestrator: Arc<RetrainingOrchestrator>,
    config: &RetrainingConfig,
) -> Option<JoinHandle<()>> {
    match config.schedule {
        ScheduleMode::Disabled => {
            info!("Scheduled retraining disabled");
            None
        }
        ScheduleMode::Once => {
            run_startup_cycle(&orchestrator).await;
            None
        }
        ScheduleMode::Interval => Some(spawn_interval(
            orchestrator,
            Duration::from_secs(config.interval_secs.max(1)),
        )),
    }
}

/// Run a single cycle, logging instead of propagating failure
pub async fn run_startup_cycle(orchestrator: &RetrainingOrchestrator) {
    info!("Running startup retraining cycle");
    match orchestrator.run_cycle().await {
        Ok(outcome) => info!(outcome = ?outcome, "Startup retraining cycle complete"),
        Err(e) => error!(error = %e, "Startup retraining cycle failed; continuing with active model"),
    }
}

/// Run a cycle every `period`, starting one period from now
pub fn spawn_interval(orchestrator: Arc<RetrainingOrchestrator>, period: Duration) -> JoinHandle<()> {
    info!(interval_secs = period.as_secs(), "Starting retraining scheduler");

    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            if let Err(e) = orchestrator.run_cycle().await {
                error!(error = %e, "Scheduled retraining cycle failed");
            }
        }
    })
}
