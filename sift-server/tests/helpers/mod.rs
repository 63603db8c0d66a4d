//! Shared fixtures for sift-server integration tests
//!
//! Models here are not ONNX graphs: `model.onnx` holds a JSON threshold and
//! the fake classifier predicts class 1 when the normalized mean pixel value
//! exceeds it. Bright images stand in for sensitive ones.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use sift_common::db::{init_database, FeedbackDocument};
use sift_common::{time, uuid_utils, Error, Result};
use sift_server::db::{FeedbackStore, SqliteFeedbackStore};
use sift_server::model::{
    ClassifierLoader, ImageClassifier, ImageTensor, ModelRegistry, ProcessorConfig, MODEL_FILE,
    PROCESSOR_FILE,
};
use sift_server::retraining::{RetrainingSettings, Trainer, TrainingParams, TrainingRequest};
use sift_server::AppState;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Never exceeded: the model always predicts class 0
pub const ALWAYS_NOT_SENSITIVE: f32 = 2.0;
/// Separates black (-1.0) from white (1.0) after normalization
pub const SEPARATING: f32 = 0.0;

#[derive(Debug, Serialize, Deserialize)]
struct ThresholdModel {
    threshold: f32,
}

pub struct ThresholdClassifier {
    threshold: f32,
    processor: ProcessorConfig,
}

impl ImageClassifier for ThresholdClassifier {
    fn processor(&self) -> &ProcessorConfig {
        &self.processor
    }

    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        Ok(if input.mean() > self.threshold {
            vec![0.0, 4.0]
        } else {
            vec![4.0, 0.0]
        })
    }
}

/// Loads [`ThresholdClassifier`] models and counts loads
#[derive(Default)]
pub struct ThresholdLoader {
    pub loads: AtomicUsize,
}

impl ClassifierLoader for ThresholdLoader {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn ImageClassifier>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(model_dir.join(MODEL_FILE))?;
        let model: ThresholdModel = serde_json::from_str(&content)
            .map_err(|e| Error::Model(format!("bad test model: {}", e)))?;
        let processor = ProcessorConfig::load_from_dir(model_dir, (8, 8))?;
        Ok(Arc::new(ThresholdClassifier {
            threshold: model.threshold,
            processor,
        }))
    }
}

/// Write a complete model directory
pub fn write_model(dir: &Path, threshold: f32) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(MODEL_FILE),
        serde_json::to_string(&ThresholdModel { threshold }).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join(PROCESSOR_FILE),
        r#"{"input_width": 8, "input_height": 8, "num_classes": 2}"#,
    )
    .unwrap();
}

/// Threshold of the model a directory holds
pub fn model_threshold(dir: &Path) -> f32 {
    let content = std::fs::read_to_string(dir.join(MODEL_FILE)).unwrap();
    serde_json::from_str::<ThresholdModel>(&content).unwrap().threshold
}

/// Trainer writing a model with a fixed threshold, recording what it saw
pub struct FixedTrainer {
    pub threshold: f32,
    pub calls: AtomicUsize,
    pub last_params: std::sync::Mutex<Option<TrainingParams>>,
}

impl FixedTrainer {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            calls: AtomicUsize::new(0),
            last_params: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Trainer for FixedTrainer {
    async fn train(&self, request: TrainingRequest<'_>) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(request.params.clone());
        assert!(!request.train.is_empty());
        assert!(!request.eval.is_empty());

        let output = request.work_dir.join("output");
        write_model(&output, self.threshold);
        Ok(output)
    }
}

/// Trainer that always fails
pub struct FailingTrainer;

#[async_trait]
impl Trainer for FailingTrainer {
    async fn train(&self, _request: TrainingRequest<'_>) -> Result<PathBuf> {
        Err(Error::Training("optimizer diverged".to_string()))
    }
}

/// Solid-colour 4x4 PNG
pub fn png(value: u8) -> Vec<u8> {
    png_sized(4, 4, value)
}

pub fn png_sized(width: u32, height: u32, value: u8) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// PNG filled with pseudo-random pixels, so it barely compresses
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut channel = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([channel(), channel(), channel()])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

pub fn feedback_document(image: Vec<u8>, user_feedback: &str) -> FeedbackDocument {
    FeedbackDocument {
        id: uuid_utils::generate_id(),
        image,
        image_label: "test".to_string(),
        model_prediction: "0".to_string(),
        user_feedback: user_feedback.to_string(),
        platform: "test".to_string(),
        need_for_train: true,
        timestamp: time::now(),
    }
}

/// A full service wired to fakes inside a temporary root folder
pub struct TestEnv {
    pub root: TempDir,
    pub store: Arc<SqliteFeedbackStore>,
    pub registry: Arc<ModelRegistry>,
    pub loader: Arc<ThresholdLoader>,
    pub state: AppState,
}

impl TestEnv {
    pub async fn new(initial_threshold: f32, trainer: Arc<dyn Trainer>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let initial = root.path().join("initial-model");
        write_model(&initial, initial_threshold);

        let pool = init_database(&root.path().join("sift.db")).await.unwrap();
        let store = Arc::new(SqliteFeedbackStore::new(pool, 1000));

        let loader = Arc::new(ThresholdLoader::default());
        let registry = Arc::new(
            ModelRegistry::open(&root.path().join("models"), loader.clone(), Some(&initial))
                .await
                .unwrap(),
        );

        let settings = RetrainingSettings {
            eval_split: 0.5,
            split_seed: 42,
            params: TrainingParams {
                num_epochs: 3,
                batch_size: 2,
            },
            work_root: root.path().join("work"),
            sensitive_class: 1,
        };
        let state = AppState::new(store.clone(), registry.clone(), trainer, settings);

        Self {
            root,
            store,
            registry,
            loader,
            state,
        }
    }

    /// Insert flagged feedback: `bright` sensitive and `dark` not-sensitive images
    pub async fn seed_flagged(&self, bright: usize, dark: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for _ in 0..bright {
            let doc = feedback_document(png(255), "sensitive");
            ids.push(doc.id.clone());
            self.store.insert(&doc).await.unwrap();
        }
        for _ in 0..dark {
            let doc = feedback_document(png(0), "not sensitive");
            ids.push(doc.id.clone());
            self.store.insert(&doc).await.unwrap();
        }
        ids
    }

    pub fn models_root(&self) -> PathBuf {
        self.root.path().join("models")
    }

    pub fn work_root(&self) -> PathBuf {
        self.root.path().join("work")
    }
}
