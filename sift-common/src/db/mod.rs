//! Database initialization and models

pub mod init;
pub mod models;

pub use init::{init_database, init_database_with_timeout};
pub use models::FeedbackDocument;
