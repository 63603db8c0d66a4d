//! Fine-tuning seam
//!
//! The training loop itself belongs to an ML framework. [`Trainer`] hands it
//! the base model, the two partitions and the hyperparameters, and expects a
//! complete model directory back.

use async_trait::async_trait;
use image::ImageFormat;
use serde::Serialize;
use sift_common::{Error, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::dataset::Sample;
use crate::model::is_complete_model_dir;

/// Hyperparameters passed through to the trainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingParams {
    pub num_epochs: u32,
    pub batch_size: u32,
}

/// Everything a trainer needs for one fine-tuning run
#[derive(Debug, Clone, Copy)]
pub struct TrainingRequest<'a> {
    /// Directory of the model to start from (the active model)
    pub base_model_dir: &'a Path,
    pub train: &'a [Sample],
    /// Evaluated once per epoch by the trainer
    pub eval: &'a [Sample],
    pub params: &'a TrainingParams,
    /// Scratch directory owned by this cycle; removed afterwards
    pub work_dir: &'a Path,
}

/// Fine-tunes a copy of a model
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train and return the directory holding the resulting model
    async fn train(&self, request: TrainingRequest<'_>) -> Result<PathBuf>;
}

/// Manifest line describing one image for the external trainer
#[derive(Debug, Serialize)]
struct ManifestEntry {
    id: String,
    path: PathBuf,
    label: usize,
}

/// Runs an external fine-tuning program
///
/// Invocation:
///
/// ```text
/// <command...> --base-model <dir> --train <train.json> --eval <eval.json>
///              --output <dir> --epochs <n> --batch-size <n>
/// ```
///
/// Manifests are JSON arrays of `{id, path, label}` pointing at PNG files. Success means exit
/// status zero and a complete model directory at `--output`.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    command: Vec<String>,
}

impl CommandTrainer {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("trainer command must not be empty".to_string()));
        }
        Ok(Self { command })
    }

    async fn write_partition(dir: &Path, name: &str, samples: &[Sample]) -> Result<PathBuf> {
        let image_dir = dir.join(name);
        tokio::fs::create_dir_all(&image_dir).await?;

        let mut manifest = Vec::with_capacity(samples.len());
        for sample in samples {
            let mut png = Cursor::new(Vec::new());
            sample
                .image
                .write_to(&mut png, ImageFormat::Png)
                .map_err(|e| Error::Training(format!("failed to encode {}: {}", sample.document_id, e)))?;
            let path = image_dir.join(format!("{}.png", sample.document_id));
            tokio::fs::write(&path, png.into_inner()).await?;
            manifest.push(ManifestEntry {
                id: sample.document_id.clone(),
                path,
                label: sample.label,
            });
        }

        let manifest_path = dir.join(format!("{}.json", name));
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| Error::Internal(format!("failed to serialize manifest: {}", e)))?;
        tokio::fs::write(&manifest_path, json).await?;
        Ok(manifest_path)
    }
}

#[async_trait]
impl Trainer for CommandTrainer {
    async fn train(&self, request: TrainingRequest<'_>) -> Result<PathBuf> {
        let dataset_dir = request.work_dir.join("dataset");
        let output_dir = request.work_dir.join("output");
        tokio::fs::create_dir_all(&output_dir).await?;

        let train_manifest = Self::write_partition(&dataset_dir, "train", request.train).await?;
        let eval_manifest = Self::write_partition(&dataset_dir, "eval", request.eval).await?;

        let (program, leading_args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Config("trainer command must not be empty".to_string()))?;

        tracing::info!(
            program = %program,
            base_model = %request.base_model_dir.display(),
            train_samples = request.train.len(),
            eval_samples = request.eval.len(),
            epochs = request.params.num_epochs,
            batch_size = request.params.batch_size,
            "Starting fine-tuning command"
        );

        let output = tokio::process::Command::new(program)
            .args(leading_args)
            .arg("--base-model")
            .arg(request.base_model_dir)
            .arg("--train")
            .arg(&train_manifest)
            .arg("--eval")
            .arg(&eval_manifest)
            .arg("--output")
            .arg(&output_dir)
            .arg("--epochs")
            .arg(request.params.num_epochs.to_string())
            .arg("--batch-size")
            .arg(request.params.batch_size.to_string())
            .current_dir(request.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Training(format!("failed to start trainer '{}': {}", program, e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "sift_server::trainer", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Training(format!(
                "trainer exited with {}: {}",
                output.status,
                tail(&stderr, 20)
            )));
        }

        if !is_complete_model_dir(&output_dir) {
            return Err(Error::Training(format!(
                "trainer finished but {} does not hold a complete model",
                output_dir.display()
            )));
        }

        Ok(output_dir)
    }
}

/// Last `max_lines` lines of a block of text
fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
