//! Sensitivity label normalization
//!
//! Clients report predictions and feedback either as numeric class indices
//! (`0`, `1`) or as strings (`"sensitive"`, `"not-sensitive"`, `"unsure"`,
//! `"The image is sensitive."`). Everything is folded into the binary
//! [`Sensitivity`] before comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class index the served models use for "sensitive" unless configured otherwise
pub const DEFAULT_SENSITIVE_CLASS: usize = 1;

/// Canonical binary label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sensitivity {
    Sensitive,
    NotSensitive,
}

impl Sensitivity {
    /// Map a model class index onto the binary label
    pub fn from_class_index(index: usize, sensitive_class: usize) -> Self {
        if index == sensitive_class {
            Sensitivity::Sensitive
        } else {
            Sensitivity::NotSensitive
        }
    }

    /// Class index used when training a binary model
    pub fn class_index(self, sensitive_class: usize) -> usize {
        match self {
            Sensitivity::Sensitive => sensitive_class,
            Sensitivity::NotSensitive => {
                if sensitive_class == 0 {
                    1
                } else {
                    0
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sensitivity::Sensitive => "sensitive",
            Sensitivity::NotSensitive => "not-sensitive",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw label as sent by a client: a class index or free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Index(i64),
    Text(String),
}

impl LabelValue {
    /// Fold the raw value into the canonical binary label
    pub fn normalize(&self, sensitive_class: usize) -> Sensitivity {
        match self {
            LabelValue::Index(n) => index_label(*n, sensitive_class),
            LabelValue::Text(text) => {
                let trimmed = text.trim();
                if let Ok(n) = trimmed.parse::<i64>() {
                    return index_label(n, sensitive_class);
                }
                let folded = trimmed.trim_end_matches('.').to_lowercase();
                match folded.as_str() {
                    "sensitive" | "the image is sensitive" => Sensitivity::Sensitive,
                    _ => Sensitivity::NotSensitive,
                }
            }
        }
    }

    /// True for an empty or whitespace-only text value
    pub fn is_blank(&self) -> bool {
        matches!(self, LabelValue::Text(text) if text.trim().is_empty())
    }

    /// Serving-time representation persisted with a feedback document
    pub fn to_stored(&self) -> String {
        match self {
            LabelValue::Index(n) => n.to_string(),
            LabelValue::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Text(value.to_string())
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Index(value)
    }
}

fn index_label(n: i64, sensitive_class: usize) -> Sensitivity {
    if n >= 0 && n as usize == sensitive_class {
        Sensitivity::Sensitive
    } else {
        Sensitivity::NotSensitive
    }
}
