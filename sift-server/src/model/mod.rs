//! Image classifier seam
//!
//! The served model is an external collaborator reached through two traits:
//! [`ClassifierLoader`] turns a model directory into an [`ImageClassifier`],
//! and [`ImageClassifier::forward`] runs one forward pass over a preprocessed
//! tensor. Production uses the ONNX backend in [`onnx`]; tests substitute
//! fakes.
//!
//! A model directory contains:
//! - `model.onnx`: the network
//! - `preprocessor.json`: input size, normalization and class count

pub mod onnx;
pub mod preprocess;
pub mod registry;

pub use onnx::{OnnxClassifier, OnnxLoader};
pub use preprocess::{preprocess, ImageTensor, ProcessorConfig};
pub use registry::{ActiveModel, ModelRegistry};

use image::DynamicImage;
use sift_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Network file inside a model directory
pub const MODEL_FILE: &str = "model.onnx";
/// Preprocessor settings file inside a model directory
pub const PROCESSOR_FILE: &str = "preprocessor.json";

/// A loaded classification model
pub trait ImageClassifier: Send + Sync {
    /// Preprocessing settings the model expects
    fn processor(&self) -> &ProcessorConfig;

    /// Run one forward pass and return raw class scores (logits)
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Loads classifiers from model directories
pub trait ClassifierLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn ImageClassifier>>;
}

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Index of the highest-scoring class
    pub class_index: usize,
    /// Softmax over the class scores
    pub probabilities: Vec<f32>,
}

/// Preprocess, run a forward pass and take the argmax
pub fn classify(classifier: &dyn ImageClassifier, image: &DynamicImage) -> Result<Classification> {
    let processor = classifier.processor();
    let input = preprocess(image, processor);
    let logits = classifier.forward(&input)?;

    if logits.len() != processor.num_classes {
        return Err(Error::Model(format!(
            "model produced {} scores, expected {}",
            logits.len(),
            processor.num_classes
        )));
    }

    let class_index = argmax(&logits)
        .ok_or_else(|| Error::Model("model produced no finite scores".to_string()))?;

    Ok(Classification {
        class_index,
        probabilities: softmax(&logits),
    })
}

/// True when a directory holds every file a model needs
pub fn is_complete_model_dir(dir: &Path) -> bool {
    dir.join(MODEL_FILE).is_file() && dir.join(PROCESSOR_FILE).is_file()
}

/// Index of the largest finite value
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|v| v / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 2.5, -1.0]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.5]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1000.0, 1001.0, 999.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(argmax(&probs), Some(1));
    }
}
