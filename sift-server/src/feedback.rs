//! Feedback submitter
//!
//! Decides whether a submission should feed the next retraining cycle and
//! writes it to the feedback store. The flag is computed once, here, by
//! normalizing both sides to [`Sensitivity`].

use serde::Serialize;
use sift_common::db::FeedbackDocument;
use sift_common::{time, uuid_utils, LabelValue, Result, Sensitivity};
use std::sync::Arc;

use crate::db::FeedbackStore;

/// Validated feedback submission
#[derive(Debug, Clone)]
pub struct FeedbackSubmission {
    pub image: Vec<u8>,
    pub image_label: String,
    pub model_prediction: LabelValue,
    pub user_feedback: LabelValue,
    pub platform: String,
}

/// Acknowledgement returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackReceipt {
    pub message: String,
    pub id: String,
    pub need_for_train: bool,
}

/// Writes feedback documents
#[derive(Clone)]
pub struct FeedbackSubmitter {
    store: Arc<dyn FeedbackStore>,
    sensitive_class: usize,
}

impl FeedbackSubmitter {
    pub fn new(store: Arc<dyn FeedbackStore>, sensitive_class: usize) -> Self {
        Self {
            store,
            sensitive_class,
        }
    }

    /// True when the user disagrees with the model
    pub fn needs_training(&self, model_prediction: &LabelValue, user_feedback: &LabelValue) -> bool {
        let predicted: Sensitivity = model_prediction.normalize(self.sensitive_class);
        let reported: Sensitivity = user_feedback.normalize(self.sensitive_class);
        predicted != reported
    }

    /// Store one submission
    pub async fn submit(&self, submission: FeedbackSubmission) -> Result<FeedbackReceipt> {
        let need_for_train =
            self.needs_training(&submission.model_prediction, &submission.user_feedback);

        let document = FeedbackDocument {
            id: uuid_utils::generate_id(),
            image: submission.image,
            image_label: submission.image_label,
            model_prediction: submission.model_prediction.to_stored(),
            user_feedback: submission.user_feedback.to_stored(),
            platform: submission.platform,
            need_for_train,
            timestamp: time::now(),
        };

        self.store.insert(&document).await?;

        tracing::info!(
            id = %document.id,
            platform = %document.platform,
            need_for_train,
            "Feedback stored"
        );

        Ok(FeedbackReceipt {
            message: "Feedback submitted successfully".to_string(),
            id: document.id,
            need_for_train,
        })
    }
}
