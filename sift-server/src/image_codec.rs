//! Image payload decoding
//!
//! Clients send images as base64 data URLs (`data:image/png;base64,....`).
//! Browser extensions frequently strip the trailing `=` padding, so padding
//! is restored before decoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use sift_common::{Error, Result};

/// A decoded data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Media type from the data URL header, if one was present
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Decode a data URL or a bare base64 string
    pub fn from_data_url(input: &str) -> Result<Self> {
        let input = input.trim();
        let (media_type, encoded) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, encoded) = rest
                    .split_once(',')
                    .ok_or_else(|| Error::Decode("data URL has no ',' separator".to_string()))?;
                let media_type = header
                    .split(';')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                (media_type, encoded)
            }
            None => (None, input),
        };

        let bytes = decode_base64(encoded)?;
        if bytes.is_empty() {
            return Err(Error::Decode("image payload is empty".to_string()));
        }

        Ok(Self { media_type, bytes })
    }

    /// Decode the image bytes into pixels
    pub fn decode_image(&self) -> Result<DynamicImage> {
        decode_image_bytes(&self.bytes)
    }
}

/// Decode standard base64, tolerating missing padding and embedded whitespace
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let padded = restore_padding(encoded);
    STANDARD
        .decode(padded.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {}", e)))
}

/// Append `=` until the length is a multiple of 4
pub fn restore_padding(encoded: &str) -> String {
    let mut cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }
    cleaned
}

/// Decode raw image bytes (format guessed from content)
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::Decode(format!("unreadable image: {}", e)))
}
