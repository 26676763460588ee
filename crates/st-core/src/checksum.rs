//! SHA-256 checksum utility for change-unit drift detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Compute SHA256 checksum of a string
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Derive a stable row id from its natural key parts.
///
/// Seeded rows get the same id in every environment, so an inverse that
/// re-inserts deleted rows restores their original identifiers.
pub fn derive_id(parts: &[&str]) -> Uuid {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
