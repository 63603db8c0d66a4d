//! Retraining orchestrator
//!
//! # Cycle
//! SELECT → PREPARE → SPLIT → BASELINE → FINE-TUNE → COMPARE/PROMOTE → CLEAR
//!
//! - **SELECT**: documents whose need-for-train flag is set
//! - **PREPARE**: decode images, label from the user's feedback
//! - **SPLIT**: seeded stratified train/eval split
//! - **BASELINE**: active model accuracy on the eval partition
//! - **FINE-TUNE**: [`Trainer`] produces a candidate from the active model
//! - **COMPARE/PROMOTE**: candidate replaces the active model only if strictly better
//! - **CLEAR**: flags are cleared for the whole batch, promoted or not
//!
//! A failure anywhere before CLEAR leaves the flags set so the batch is retried
//! by the next cycle. Only one cycle runs at a time.

pub mod dataset;
pub mod evaluate;
pub mod trainer;

pub use trainer::{CommandTrainer, Trainer, TrainingParams, TrainingRequest};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sift_common::config::RetrainingConfig;
use sift_common::{time, uuid_utils, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::db::FeedbackStore;
use crate::model::ModelRegistry;
use dataset::{class_counts, prepare, stratified_split};
use evaluate::evaluate;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct RetrainingSettings {
    pub eval_split: f64,
    pub split_seed: u64,
    pub params: TrainingParams,
    /// Parent of the per-cycle scratch directories
    pub work_root: PathBuf,
    pub sensitive_class: usize,
}

impl RetrainingSettings {
    pub fn from_config(config: &RetrainingConfig, sensitive_class: usize) -> Self {
        Self {
            eval_split: config.eval_split,
            split_seed: config.split_seed,
            params: TrainingParams {
                num_epochs: config.num_epochs,
                batch_size: config.batch_size,
            },
            work_root: config.work_dir.clone(),
            sensitive_class,
        }
    }
}

/// Numbers from a cycle that reached the comparison step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub baseline_accuracy: f64,
    pub candidate_accuracy: f64,
    pub train_samples: usize,
    pub eval_samples: usize,
    /// Documents whose flag was cleared
    pub cleared: u64,
    /// Documents dropped because their image could not be decoded
    pub skipped: usize,
    /// New active model directory, when promoted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing was flagged
    NoCandidates,
    /// Another cycle holds the run lock
    AlreadyRunning,
    /// A partition came out empty; flags are left for a later cycle
    InsufficientSamples {
        candidates: usize,
        train_samples: usize,
        eval_samples: usize,
    },
    /// Candidate beat the baseline and is now active
    Promoted(CycleSummary),
    /// Candidate did not beat the baseline and was discarded
    Retained(CycleSummary),
}

/// Record of the most recent finished cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CycleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs retraining cycles against the feedback store and model registry
pub struct RetrainingOrchestrator {
    store: Arc<dyn FeedbackStore>,
    registry: Arc<ModelRegistry>,
    trainer: Arc<dyn Trainer>,
    settings: RetrainingSettings,
    run_lock: Mutex<()>,
    last_report: RwLock<Option<CycleReport>>,
}

impl RetrainingOrchestrator {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        registry: Arc<ModelRegistry>,
        trainer: Arc<dyn Trainer>,
        settings: RetrainingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            trainer,
            settings,
            run_lock: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// True while a cycle holds the run lock
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Most recent finished cycle, if any
    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Number of documents waiting for the next cycle
    pub async fn pending_count(&self) -> Result<u64> {
        self.store.count_needing_training().await
    }

    /// Run one cycle
    ///
    /// Returns [`CycleOutcome::AlreadyRunning`] without waiting when another
    /// cycle is in progress.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Retraining cycle already in progress, skipping");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        let started_at = time::now();
        let result = self.run_locked().await;

        let report = CycleReport {
            started_at,
            finished_at: time::now(),
            outcome: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        *self.last_report.write().await = Some(report);

        match &result {
            Ok(outcome) => info!(outcome = ?outcome, "Retraining cycle finished"),
            Err(e) => warn!(error = %e, "Retraining cycle failed; flags left set"),
        }

        result
    }

    async fn run_locked(&self) -> Result<CycleOutcome> {
        let documents = self.store.find_needing_training().await?;
        if documents.is_empty() {
            return Ok(CycleOutcome::NoCandidates);
        }
        let candidates = documents.len();
        info!(candidates, "Starting retraining cycle");

        let sensitive_class = self.settings.sensitive_class;
        let batch = tokio::task::spawn_blocking(move || prepare(documents, sensitive_class))
            .await
            .map_err(|e| Error::Training(format!("sample preparation failed: {}", e)))?;

        let split = stratified_split(batch.samples, self.settings.eval_split, self.settings.split_seed);
        if split.train.is_empty() || split.eval.is_empty() {
            info!(
                candidates,
                train = split.train.len(),
                eval = split.eval.len(),
                "Not enough usable samples to retrain"
            );
            return Ok(CycleOutcome::InsufficientSamples {
                candidates,
                train_samples: split.train.len(),
                eval_samples: split.eval.len(),
            });
        }
        info!(
            train = split.train.len(),
            eval = split.eval.len(),
            train_classes = ?class_counts(&split.train),
            eval_classes = ?class_counts(&split.eval),
            "Split feedback samples"
        );

        let work_dir = self.settings.work_root.join(format!(
            "cycle-{}-{}",
            time::compact_stamp(time::now()),
            uuid_utils::short_suffix()
        ));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self
            .train_and_compare(split.train, split.eval, &work_dir, &batch.document_ids, batch.skipped)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(dir = %work_dir.display(), error = %e, "Failed to remove retraining work directory");
        }

        result
    }

    async fn train_and_compare(
        &self,
        train: Vec<dataset::Sample>,
        eval: Vec<dataset::Sample>,
        work_dir: &Path,
        document_ids: &[String],
        skipped: usize,
    ) -> Result<CycleOutcome> {
        let train_samples = train.len();
        let eval: Arc<[dataset::Sample]> = Arc::from(eval);
        let eval_samples = eval.len();

        let active = self.registry.active().await;
        let baseline_accuracy = evaluate(active.classifier.clone(), eval.clone()).await?;
        info!(baseline_accuracy, model_dir = %active.dir.display(), "Baseline evaluated");

        let candidate_dir = self
            .trainer
            .train(TrainingRequest {
                base_model_dir: &active.dir,
                train: &train,
                eval: &eval,
                params: &self.settings.params,
                work_dir,
            })
            .await?;

        let candidate = self.registry.load_candidate(&candidate_dir).await?;
        let candidate_accuracy = evaluate(candidate, eval.clone()).await?;
        info!(baseline_accuracy, candidate_accuracy, "Candidate evaluated");

        let model_dir = if candidate_accuracy > baseline_accuracy {
            Some(self.registry.promote(&candidate_dir).await?)
        } else {
            info!("Candidate did not improve on the active model; discarding");
            None
        };

        let cleared = self.store.clear_need_for_train(document_ids).await?;

        let summary = CycleSummary {
            baseline_accuracy,
            candidate_accuracy,
            train_samples,
            eval_samples,
            cleared,
            skipped,
            model_dir,
        };

        Ok(if summary.model_dir.is_some() {
            CycleOutcome::Promoted(summary)
        } else {
            CycleOutcome::Retained(summary)
        })
    }
}
