//! Image preprocessing
//!
//! Produces a `[1, 3, H, W]` float tensor in channel-major order, scaled by
//! `rescale_factor` and normalized per channel with `image_mean`/`image_std`.

use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use sift_common::{Error, Result};
use std::path::Path;

use super::PROCESSOR_FILE;

/// Preprocessing settings stored next to the model weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
    pub rescale_factor: f32,
    pub num_classes: usize,
    /// Optional human-readable class names, indexed by class
    pub labels: Vec<String>,
}

/// On-disk form; the input size may be omitted and taken from configuration
#[derive(Debug, Deserialize)]
struct StoredProcessorConfig {
    input_width: Option<u32>,
    input_height: Option<u32>,
    #[serde(default = "default_mean")]
    image_mean: [f32; 3],
    #[serde(default = "default_std")]
    image_std: [f32; 3],
    #[serde(default = "default_rescale")]
    rescale_factor: f32,
    #[serde(default = "default_num_classes")]
    num_classes: usize,
    #[serde(default)]
    labels: Vec<String>,
}

fn default_mean() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_std() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_rescale() -> f32 {
    1.0 / 255.0
}

fn default_num_classes() -> usize {
    2
}

impl ProcessorConfig {
    /// Settings for a binary classifier of the given input size
    pub fn binary(input_width: u32, input_height: u32) -> Self {
        Self {
            input_width,
            input_height,
            image_mean: default_mean(),
            image_std: default_std(),
            rescale_factor: default_rescale(),
            num_classes: default_num_classes(),
            labels: Vec::new(),
        }
    }

    /// Parse settings, filling a missing input size from `default_size`
    pub fn from_json_str(content: &str, default_size: (u32, u32)) -> Result<Self> {
        let stored: StoredProcessorConfig = serde_json::from_str(content)
            .map_err(|e| Error::Model(format!("invalid {}: {}", PROCESSOR_FILE, e)))?;

        let config = Self {
            input_width: stored.input_width.unwrap_or(default_size.0),
            input_height: stored.input_height.unwrap_or(default_size.1),
            image_mean: stored.image_mean,
            image_std: stored.image_std,
            rescale_factor: stored.rescale_factor,
            num_classes: stored.num_classes,
            labels: stored.labels,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read `preprocessor.json` from a model directory
    pub fn load_from_dir(model_dir: &Path, default_size: (u32, u32)) -> Result<Self> {
        let path = model_dir.join(PROCESSOR_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Model(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&content, default_size)
    }

    fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(Error::Model("input size must be non-zero".to_string()));
        }
        if self.image_std.iter().any(|s| *s <= 0.0) {
            return Err(Error::Model("image_std entries must be positive".to_string()));
        }
        if self.num_classes < 2 {
            return Err(Error::Model("num_classes must be at least 2".to_string()));
        }
        if !self.labels.is_empty() && self.labels.len() != self.num_classes {
            return Err(Error::Model(format!(
                "{} labels given for {} classes",
                self.labels.len(),
                self.num_classes
            )));
        }
        Ok(())
    }
}

/// Preprocessed model input, batch size 1, channel-major
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub width: usize,
    pub height: usize,
    /// `3 * height * width` values: all R, then all G, then all B
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height, self.width]
    }

    /// Mean over every value, handy for diagnostics
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// Resize and normalize an image into the model's input tensor
pub fn preprocess(image: &DynamicImage, processor: &ProcessorConfig) -> ImageTensor {
    let width = processor.input_width;
    let height = processor.input_height;
    let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let plane = (width as usize) * (height as usize);
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            let scaled = pixel[channel] as f32 * processor.rescale_factor;
            data[channel * plane + i] =
                (scaled - processor.image_mean[channel]) / processor.image_std[channel];
        }
    }

    ImageTensor {
        width: width as usize,
        height: height as usize,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_tensor_shape_follows_processor() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([0, 0, 0])));
        let tensor = preprocess(&image, &ProcessorConfig::binary(16, 8));
        assert_eq!(tensor.shape(), [1, 3, 8, 16]);
        assert_eq!(tensor.data.len(), 3 * 8 * 16);
    }

    #[test]
    fn test_normalization_channel_major() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 255])));
        let tensor = preprocess(&image, &ProcessorConfig::binary(2, 2));
        // (1.0 - 0.5) / 0.5 = 1.0 and (0.0 - 0.5) / 0.5 = -1.0
        assert!(tensor.data[..4].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(tensor.data[4..8].iter().all(|v| (*v + 1.0).abs() < 1e-6));
        assert!(tensor.data[8..].iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_missing_size_uses_default() {
        let config = ProcessorConfig::from_json_str(r#"{"num_classes": 2}"#, (512, 512)).unwrap();
        assert_eq!((config.input_width, config.input_height), (512, 512));

        let config =
            ProcessorConfig::from_json_str(r#"{"input_width": 224, "input_height": 224}"#, (512, 512))
                .unwrap();
        assert_eq!((config.input_width, config.input_height), (224, 224));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(ProcessorConfig::from_json_str(r#"{"num_classes": 1}"#, (8, 8)).is_err());
        assert!(ProcessorConfig::from_json_str(r#"{"image_std": [0, 1, 1]}"#, (8, 8)).is_err());
        assert!(ProcessorConfig::from_json_str(r#"{"labels": ["a"]}"#, (8, 8)).is_err());
        assert!(ProcessorConfig::from_json_str("not json", (8, 8)).is_err());
    }
}
