//! Common error types for SIFT

use thiserror::Error;

/// Common result type for SIFT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across SIFT components
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed image, base64 payload or data URL
    #[error("Decode error: {0}")]
    Decode(String),

    /// Missing or invalid required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Document store unreachable or write rejected (wraps sqlx::Error)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Fine-tuning or evaluation failure
    #[error("Training error: {0}")]
    Training(String),

    /// Model artifact could not be loaded or executed
    #[error("Model error: {0}")]
    Model(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
