//! Checksum calculation for migration scripts

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of a migration script
///
/// Operators compare this against the file they actually ran to confirm the
/// applied text matches the release.
///
/// Returns the lowercase hexadecimal digest of the full script, rollback
/// section included.
#[must_use]
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
