//! Random opaque tokens.

/// 32 lowercase hex characters of randomness.
pub fn generate() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
