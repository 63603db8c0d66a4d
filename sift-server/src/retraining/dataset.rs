//! Training sample preparation and stratified splitting

use image::DynamicImage;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sift_common::db::FeedbackDocument;
use sift_common::LabelValue;
use std::collections::BTreeMap;
use tracing::warn;

use crate::image_codec::decode_image_bytes;

/// One decoded training example
#[derive(Debug, Clone)]
pub struct Sample {
    /// Feedback document the sample came from
    pub document_id: String,
    pub image: DynamicImage,
    /// Class index derived from the user's feedback
    pub label: usize,
}

/// Output of the prepare step
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub samples: Vec<Sample>,
    /// Every selected document, including ones that could not be decoded
    pub document_ids: Vec<String>,
    /// Documents whose image could not be decoded
    pub skipped: usize,
}

/// Convert flagged documents into labelled samples
///
/// The label is the user's feedback normalized to a binary class index.
/// Undecodable images are skipped but keep their id in `document_ids` so the
/// cycle still clears them; they can never become usable.
pub fn prepare(documents: Vec<FeedbackDocument>, sensitive_class: usize) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for document in documents {
        batch.document_ids.push(document.id.clone());

        let image = match decode_image_bytes(&document.image) {
            Ok(image) => image,
            Err(e) => {
                warn!(id = %document.id, error = %e, "Skipping feedback with undecodable image");
                batch.skipped += 1;
                continue;
            }
        };

        let label = LabelValue::Text(document.user_feedback)
            .normalize(sensitive_class)
            .class_index(sensitive_class);

        batch.samples.push(Sample {
            document_id: document.id,
            image,
            label,
        });
    }

    batch
}

/// Train/eval partitions
#[derive(Debug, Default)]
pub struct Split {
    pub train: Vec<Sample>,
    pub eval: Vec<Sample>,
}

/// Split samples so each class keeps its proportion in both partitions
///
/// Per class with `n` samples, `round(n * eval_fraction)` go to eval,
/// clamped to `[1, n - 1]` when `n >= 2`. A class with a single sample goes
/// to train. The shuffle is seeded, so a batch always splits the same way.
pub fn stratified_split(samples: Vec<Sample>, eval_fraction: f64, seed: u64) -> Split {
    let mut by_class: BTreeMap<usize, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        by_class.entry(sample.label).or_default().push(sample);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = Split::default();

    for (_, mut group) in by_class {
        group.shuffle(&mut rng);
        let n = group.len();
        let eval_count = if n < 2 {
            0
        } else {
            ((n as f64 * eval_fraction).round() as usize).clamp(1, n - 1)
        };

        let train_part = group.split_off(eval_count);
        split.eval.extend(group);
        split.train.extend(train_part);
    }

    split
}

/// Count of samples per class index
pub fn class_counts(samples: &[Sample]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for sample in samples {
        *counts.entry(sample.label).or_insert(0) += 1;
    }
    counts
}
