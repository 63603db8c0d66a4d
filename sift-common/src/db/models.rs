//! Feedback document model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored feedback submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackDocument {
    /// Random UUIDv4 primary key
    pub id: String,
    /// Raw image bytes
    #[serde(skip)]
    pub image: Vec<u8>,
    /// Label supplied by the user (intended ground truth)
    pub image_label: String,
    /// Prediction as the client saw it at serving time
    pub model_prediction: String,
    /// Label or agreement signal supplied by the user
    pub user_feedback: String,
    /// Client surface tag (e.g. "instagram")
    pub platform: String,
    /// Prediction and feedback disagreed; set once at insertion, only ever cleared
    pub need_for_train: bool,
    pub timestamp: DateTime<Utc>,
}
