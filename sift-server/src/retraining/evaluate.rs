//! Held-out accuracy

use sift_common::{Error, Result};
use std::sync::Arc;

use super::dataset::Sample;
use crate::model::{classify, ImageClassifier};

/// Fraction of samples whose top-1 class matches the label
pub fn accuracy(classifier: &dyn ImageClassifier, samples: &[Sample]) -> Result<f64> {
    if samples.is_empty() {
        return Err(Error::Training("cannot evaluate on an empty set".to_string()));
    }

    let mut correct = 0usize;
    for sample in samples {
        let classification = classify(classifier, &sample.image)?;
        if classification.class_index == sample.label {
            correct += 1;
        }
    }

    Ok(correct as f64 / samples.len() as f64)
}

/// [`accuracy`] on a blocking thread
pub async fn evaluate(classifier: Arc<dyn ImageClassifier>, samples: Arc<[Sample]>) -> Result<f64> {
    tokio::task::spawn_blocking(move || accuracy(&*classifier, &samples))
        .await
        .map_err(|e| Error::Training(format!("evaluation task failed: {}", e)))?
}
