//! Feedback store access
//!
//! [`FeedbackStore`] is the seam the submitter and the retraining
//! orchestrator depend on; [`SqliteFeedbackStore`] is the production
//! implementation on top of the shared SQLite pool.

pub mod feedback;
pub mod retry;

pub use feedback::{FeedbackStore, SqliteFeedbackStore};
pub use retry::retry_on_lock;
