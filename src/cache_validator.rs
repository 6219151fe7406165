use hex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Integrity-validated cache payloads
///
/// Registry verification results live in a shared cache for a day; a
/// corrupted or tampered entry must degrade to a fresh registry lookup,
/// never flow into a lead as fact. Entries are stored as JSON alongside a
/// SHA-256 checksum and re-verified on every read.

/// A cache payload with its integrity checksum.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedEntry {
    /// JSON-serialized payload.
    data: String,
    /// Hex SHA-256 of `data`.
    checksum: String,
}

impl SealedEntry {
    /// Serializes and seals a payload for caching.
    pub fn seal<T: Serialize>(payload: &T) -> Option<Self> {
        let data = serde_json::to_string(payload).ok()?;
        let checksum = compute_checksum(&data);
        Some(Self { data, checksum })
    }

    /// Verifies the checksum and deserializes the payload.
    ///
    /// Returns `None` on checksum mismatch or JSON shape drift; callers
    /// treat that as a cache miss.
    pub fn open<T: DeserializeOwned>(&self) -> Option<T> {
        if compute_checksum(&self.data) != self.checksum {
            tracing::warn!(
                "Cache validation failed: checksum mismatch (payload length {})",
                self.data.len()
            );
            return None;
        }
        serde_json::from_str(&self.data).ok()
    }

    /// Checksum verification without deserializing.
    pub fn is_valid(&self) -> bool {
        compute_checksum(&self.data) == self.checksum
    }
}

fn compute_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
