//! ONNX classifier backend (tract)

use sift_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tract_onnx::prelude::*;

use super::{ClassifierLoader, ImageClassifier, ImageTensor, ProcessorConfig, MODEL_FILE};

type Plan = TypedRunnableModel<TypedModel>;

/// Classifier backed by an optimized tract plan
pub struct OnnxClassifier {
    plan: Plan,
    processor: ProcessorConfig,
}

impl OnnxClassifier {
    /// Load and optimize `model.onnx` for the processor's fixed input shape
    pub fn load(model_dir: &Path, processor: ProcessorConfig) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let shape = tvec!(
            1,
            3,
            processor.input_height as usize,
            processor.input_width as usize
        );

        let plan = tract_onnx::onnx()
            .model_for_path(&model_path)
            .and_then(|model| {
                model.with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                Error::Model(format!("failed to load {}: {}", model_path.display(), e))
            })?;

        Ok(Self { plan, processor })
    }
}

impl ImageClassifier for OnnxClassifier {
    fn processor(&self) -> &ProcessorConfig {
        &self.processor
    }

    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let [batch, channels, height, width] = input.shape();
        let array = tract_ndarray::Array4::from_shape_vec(
            (batch, channels, height, width),
            input.data.clone(),
        )
        .map_err(|e| Error::Model(format!("input tensor shape mismatch: {}", e)))?;

        let outputs = self
            .plan
            .run(tvec!(array.into_tensor().into()))
            .map_err(|e| Error::Model(format!("forward pass failed: {}", e)))?;

        let logits = outputs
            .first()
            .ok_or_else(|| Error::Model("model returned no outputs".to_string()))?
            .to_array_view::<f32>()
            .map_err(|e| Error::Model(format!("unexpected output type: {}", e)))?;

        Ok(logits.iter().copied().collect())
    }
}

/// Loads [`OnnxClassifier`]s, defaulting the input size from configuration
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    default_size: (u32, u32),
}

impl OnnxLoader {
    pub fn new(default_width: u32, default_height: u32) -> Self {
        Self {
            default_size: (default_width, default_height),
        }
    }
}

impl ClassifierLoader for OnnxLoader {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn ImageClassifier>> {
        let processor = ProcessorConfig::load_from_dir(model_dir, self.default_size)?;
        tracing::info!(
            model_dir = %model_dir.display(),
            input_width = processor.input_width,
            input_height = processor.input_height,
            num_classes = processor.num_classes,
            "Loading ONNX classifier"
        );
        Ok(Arc::new(OnnxClassifier::load(model_dir, processor)?))
    }
}
