//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SIFT_ROOT_FOLDER`)
//! 3. OS-dependent compiled default (fallback)
//!
//! Config file priority order:
//! 1. Command-line argument
//! 2. Environment variable (`SIFT_CONFIG`)
//! 3. `<config_dir>/sift/config.toml` if present
//! 4. Built-in defaults
//!
//! Individual values can then be overridden with `SIFT_PORT`,
//! `SIFT_DATABASE_PATH`, `SIFT_MODELS_ROOT` and `SIFT_MODEL_DIR`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ROOT_FOLDER_ENV: &str = "SIFT_ROOT_FOLDER";
pub const CONFIG_FILE_ENV: &str = "SIFT_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub retraining: RetrainingConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body; base64 images are about 4/3 of the file size
    pub max_body_bytes: usize,
}

/// 32 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Feedback store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; relative paths resolve against the root folder
    pub path: PathBuf,
    /// Upper bound on retrying "database is locked" errors
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sift.db"),
            max_lock_wait_ms: 5000,
        }
    }
}

/// Model serving settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding versioned model directories and the active pointer
    pub models_root: PathBuf,
    /// Model served when no active pointer exists yet (first run)
    pub initial_model_dir: Option<PathBuf>,
    /// Input size used when a model's preprocessor settings omit it
    pub default_input_width: u32,
    pub default_input_height: u32,
    /// Class index the model uses for "sensitive"
    pub sensitive_class: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            initial_model_dir: None,
            default_input_width: 224,
            default_input_height: 224,
            sensitive_class: crate::labels::DEFAULT_SENSITIVE_CLASS,
        }
    }
}

/// When the retraining cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Never run automatically
    Disabled,
    /// Run once, synchronously, at startup
    Once,
    /// Run every `interval_secs`
    Interval,
}

/// Retraining cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainingConfig {
    pub schedule: ScheduleMode,
    pub interval_secs: u64,
    /// Fraction of samples held out for evaluation
    pub eval_split: f64,
    pub num_epochs: u32,
    pub batch_size: u32,
    /// Seed for the stratified split
    pub split_seed: u64,
    /// Program and leading arguments of the external fine-tuning command
    pub trainer_command: Vec<String>,
    /// Scratch space for per-cycle datasets and trainer output
    pub work_dir: PathBuf,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleMode::Once,
            interval_secs: 86_400,
            eval_split: 0.2,
            num_epochs: 1,
            batch_size: 4,
            split_seed: 42,
            trainer_command: vec!["python3".to_string(), "train.py".to_string()],
            work_dir: PathBuf::from("work"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve, load, override and validate the configuration
    ///
    /// Relative paths are anchored at `root_folder`.
    pub fn load(cli_config: Option<&Path>, root_folder: &Path) -> Result<Self> {
        let mut config = match resolve_config_file(cli_config) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.anchor_paths(root_folder);
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIFT_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("SIFT_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("SIFT_PORT is not a valid port: {}", port)))?;
        }
        if let Ok(path) = std::env::var("SIFT_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SIFT_MODELS_ROOT") {
            self.model.models_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SIFT_MODEL_DIR") {
            self.model.initial_model_dir = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Make relative paths absolute under the root folder
    pub fn anchor_paths(&mut self, root_folder: &Path) {
        for path in [
            &mut self.database.path,
            &mut self.model.models_root,
            &mut self.retraining.work_dir,
        ] {
            if path.is_relative() {
                *path = root_folder.join(&*path);
            }
        }
        if let Some(path) = self.model.initial_model_dir.as_mut() {
            if path.is_relative() {
                *path = root_folder.join(&*path);
            }
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let split = self.retraining.eval_split;
        if !(split > 0.0 && split < 1.0) {
            return Err(Error::Config(format!(
                "retraining.eval_split must be between 0 and 1 (exclusive), got {}",
                split
            )));
        }
        if self.retraining.num_epochs == 0 {
            return Err(Error::Config("retraining.num_epochs must be at least 1".to_string()));
        }
        if self.retraining.batch_size == 0 {
            return Err(Error::Config("retraining.batch_size must be at least 1".to_string()));
        }
        if self.retraining.trainer_command.is_empty() {
            return Err(Error::Config("retraining.trainer_command must not be empty".to_string()));
        }
        if self.retraining.schedule == ScheduleMode::Interval && self.retraining.interval_secs == 0 {
            return Err(Error::Config("retraining.interval_secs must be at least 1".to_string()));
        }
        if self.model.sensitive_class > 1 {
            return Err(Error::Config(format!(
                "model.sensitive_class must be 0 or 1, got {}",
                self.model.sensitive_class
            )));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Config("server.max_body_bytes must be non-zero".to_string()));
        }
        if self.model.default_input_width == 0 || self.model.default_input_height == 0 {
            return Err(Error::Config("model input size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Root folder resolution: CLI argument, then environment, then OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder: {}", root_folder.display());
    }
    Ok(())
}

fn resolve_config_file(cli_config: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_config {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("sift").join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("sift"),
        None => {
            warn!("Could not determine local data directory, using ./sift_data");
            PathBuf::from("./sift_data")
        }
    }
}
