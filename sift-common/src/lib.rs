//! # SIFT Common Library
//!
//! Shared code for the SIFT sensitive-image service:
//! - Error taxonomy shared by the server and its tools
//! - Service configuration loading
//! - Database initialization and the feedback document model
//! - Sensitivity label normalization
//! - Time and identifier helpers

pub mod config;
pub mod db;
pub mod error;
pub mod labels;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use labels::{LabelValue, Sensitivity};
