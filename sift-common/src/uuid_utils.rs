//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new UUIDv4 rendered as a document identifier
pub fn generate_id() -> String {
    generate().to_string()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Short hexadecimal suffix for directory names
pub fn short_suffix() -> String {
    generate().simple().to_string()[..8].to_string()
}
