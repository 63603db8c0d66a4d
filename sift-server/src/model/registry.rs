//! Active model registry
//!
//! Owns the models root folder:
//!
//! ```text
//! models_root/
//!   active_model.toml          pointer: model_dir = "model-20250101T120000Z-1a2b3c4d"
//!   model-20250101T120000Z-1a2b3c4d/
//!     model.onnx
//!     preprocessor.json
//!   .staging-<id>/             partially copied candidate (removed on open)
//! ```
//!
//! Promotion copies a candidate into a staging directory, renames it to a
//! fresh versioned directory, loads it, and only then replaces the pointer
//! file (temp file + rename). A crash at any step leaves the pointer naming
//! a complete directory. In memory, requests clone the active classifier
//! `Arc` under a read lock, so a swap never exposes a half-loaded model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_common::{time, uuid_utils, Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{is_complete_model_dir, ClassifierLoader, ImageClassifier};

/// Pointer file naming the active model directory
pub const POINTER_FILE: &str = "active_model.toml";
const POINTER_TMP_FILE: &str = ".active_model.toml.tmp";
const STAGING_PREFIX: &str = ".staging-";
const VERSION_PREFIX: &str = "model-";

/// Contents of the pointer file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePointer {
    /// Model directory, relative to the models root unless absolute
    pub model_dir: PathBuf,
    pub updated_at: DateTime<Utc>,
}

/// The model currently served
#[derive(Clone)]
pub struct ActiveModel {
    pub dir: PathBuf,
    pub classifier: Arc<dyn ImageClassifier>,
    pub activated_at: DateTime<Utc>,
}

impl std::fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveModel")
            .field("dir", &self.dir)
            .field("activated_at", &self.activated_at)
            .finish()
    }
}

/// Registry of the active model and its on-disk versions
pub struct ModelRegistry {
    models_root: PathBuf,
    loader: Arc<dyn ClassifierLoader>,
    active: RwLock<ActiveModel>,
}

impl ModelRegistry {
    /// Open the registry, cleaning up interrupted promotions
    ///
    /// When no pointer exists yet, `initial_model_dir` becomes the active
    /// model and the pointer is written for it.
    pub async fn open(
        models_root: &Path,
        loader: Arc<dyn ClassifierLoader>,
        initial_model_dir: Option<&Path>,
    ) -> Result<Self> {
        std::fs::create_dir_all(models_root)?;
        remove_staging_dirs(models_root);

        let pointer_path = models_root.join(POINTER_FILE);
        let model_dir = if pointer_path.exists() {
            let pointer = read_pointer(models_root)?;
            resolve_model_dir(models_root, &pointer.model_dir)
        } else {
            let initial = initial_model_dir.ok_or_else(|| {
                Error::Config(format!(
                    "no active model: {} is missing and no initial model directory is configured",
                    pointer_path.display()
                ))
            })?;
            write_pointer(models_root, initial)?;
            info!(model_dir = %initial.display(), "Initialized active model pointer");
            initial.to_path_buf()
        };

        if !is_complete_model_dir(&model_dir) {
            return Err(Error::Model(format!(
                "active model directory is incomplete: {}",
                model_dir.display()
            )));
        }

        let classifier = load_blocking(loader.clone(), model_dir.clone()).await?;
        info!(model_dir = %model_dir.display(), "Active model loaded");

        Ok(Self {
            models_root: models_root.to_path_buf(),
            loader,
            active: RwLock::new(ActiveModel {
                dir: model_dir,
                classifier,
                activated_at: time::now(),
            }),
        })
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Snapshot of the active model
    pub async fn active(&self) -> ActiveModel {
        self.active.read().await.clone()
    }

    /// Classifier currently served
    pub async fn classifier(&self) -> Arc<dyn ImageClassifier> {
        self.active.read().await.classifier.clone()
    }

    /// Load a model directory that is not (yet) active
    pub async fn load_candidate(&self, model_dir: &Path) -> Result<Arc<dyn ImageClassifier>> {
        if !is_complete_model_dir(model_dir) {
            return Err(Error::Model(format!(
                "candidate model directory is incomplete: {}",
                model_dir.display()
            )));
        }
        load_blocking(self.loader.clone(), model_dir.to_path_buf()).await
    }

    /// Make `candidate_dir` the active model
    ///
    /// Returns the new versioned directory. The candidate directory itself is
    /// left untouched.
    pub async fn promote(&self, candidate_dir: &Path) -> Result<PathBuf> {
        if !is_complete_model_dir(candidate_dir) {
            return Err(Error::Model(format!(
                "refusing to promote incomplete model directory: {}",
                candidate_dir.display()
            )));
        }

        let root = self.models_root.clone();
        let candidate = candidate_dir.to_path_buf();
        let version_dir = tokio::task::spawn_blocking(move || stage_version(&root, &candidate))
            .await
            .map_err(|e| Error::Internal(format!("staging task failed: {}", e)))??;

        let classifier = match load_blocking(self.loader.clone(), version_dir.clone()).await {
            Ok(classifier) => classifier,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&version_dir);
                return Err(e);
            }
        };

        let previous = {
            let mut active = self.active.write().await;
            if let Err(e) =
                write_pointer(&self.models_root, relative_to(&self.models_root, &version_dir))
            {
                let _ = std::fs::remove_dir_all(&version_dir);
                return Err(e);
            }
            let previous = std::mem::replace(
                &mut *active,
                ActiveModel {
                    dir: version_dir.clone(),
                    classifier,
                    activated_at: time::now(),
                },
            );
            previous.dir
        };

        info!(
            model_dir = %version_dir.display(),
            previous = %previous.display(),
            "Promoted new active model"
        );

        if is_managed_version(&self.models_root, &previous) {
            if let Err(e) = std::fs::remove_dir_all(&previous) {
                warn!(dir = %previous.display(), error = %e, "Failed to remove superseded model directory");
            }
        }

        Ok(version_dir)
    }
}

/// Read and parse the pointer file
pub fn read_pointer(models_root: &Path) -> Result<ActivePointer> {
    let path = models_root.join(POINTER_FILE);
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
}

/// Atomically replace the pointer file
pub fn write_pointer(models_root: &Path, model_dir: &Path) -> Result<()> {
    let pointer = ActivePointer {
        model_dir: model_dir.to_path_buf(),
        updated_at: time::now(),
    };
    let content = toml::to_string(&pointer)
        .map_err(|e| Error::Internal(format!("failed to serialize pointer: {}", e)))?;

    let tmp_path = models_root.join(POINTER_TMP_FILE);
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, models_root.join(POINTER_FILE))?;
    Ok(())
}

fn resolve_model_dir(models_root: &Path, model_dir: &Path) -> PathBuf {
    if model_dir.is_absolute() {
        model_dir.to_path_buf()
    } else {
        models_root.join(model_dir)
    }
}

fn relative_to<'a>(models_root: &Path, dir: &'a Path) -> &'a Path {
    dir.strip_prefix(models_root).unwrap_or(dir)
}

fn is_managed_version(models_root: &Path, dir: &Path) -> bool {
    dir.parent() == Some(models_root)
        && dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(VERSION_PREFIX))
}

/// Copy the candidate into staging, then rename it to a versioned directory
fn stage_version(models_root: &Path, candidate: &Path) -> Result<PathBuf> {
    let suffix = uuid_utils::short_suffix();
    let staging = models_root.join(format!("{}{}", STAGING_PREFIX, suffix));
    let version_dir = models_root.join(format!(
        "{}{}-{}",
        VERSION_PREFIX,
        time::compact_stamp(time::now()),
        suffix
    ));

    if let Err(e) = copy_dir_recursive(candidate, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, &version_dir)?;
    Ok(version_dir)
}

/// Recursively copy a directory tree
pub fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_staging_dirs(models_root: &Path) {
    let Ok(entries) = std::fs::read_dir(models_root) else {
        return;
    };
    for entry in entries.flatten() {
        let is_staging = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(STAGING_PREFIX));
        if is_staging {
            warn!(dir = %entry.path().display(), "Removing interrupted model staging directory");
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                warn!(dir = %entry.path().display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

async fn load_blocking(
    loader: Arc<dyn ClassifierLoader>,
    model_dir: PathBuf,
) -> Result<Arc<dyn ImageClassifier>> {
    tokio::task::spawn_blocking(move || loader.load(&model_dir))
        .await
        .map_err(|e| Error::Internal(format!("model loading task failed: {}", e)))?
}
