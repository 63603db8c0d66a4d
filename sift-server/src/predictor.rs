//! Predictor: one forward pass over the active model

use image::DynamicImage;
use sift_common::{Error, Result, Sensitivity};
use std::sync::Arc;

use crate::model::{classify, ModelRegistry};

/// Result of a prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: Sensitivity,
    pub probabilities: Vec<f32>,
}

/// Serves predictions from whichever model the registry currently marks active
#[derive(Clone)]
pub struct Predictor {
    registry: Arc<ModelRegistry>,
    sensitive_class: usize,
}

impl Predictor {
    pub fn new(registry: Arc<ModelRegistry>, sensitive_class: usize) -> Self {
        Self {
            registry,
            sensitive_class,
        }
    }

    /// Classify a decoded image
    pub async fn predict(&self, image: DynamicImage) -> Result<Prediction> {
        // Hold the model handle, not the registry lock, for the forward pass
        let classifier = self.registry.classifier().await;

        let classification = tokio::task::spawn_blocking(move || classify(&*classifier, &image))
            .await
            .map_err(|e| Error::Internal(format!("inference task failed: {}", e)))??;

        tracing::debug!(
            class_index = classification.class_index,
            probabilities = ?classification.probabilities,
            "Prediction computed"
        );

        Ok(Prediction {
            class_index: classification.class_index,
            label: Sensitivity::from_class_index(classification.class_index, self.sensitive_class),
            probabilities: classification.probabilities,
        })
    }
}
