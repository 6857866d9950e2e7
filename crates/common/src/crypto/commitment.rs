use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a BLAKE3 hash in bytes
pub const BLAKE3_HASH_SIZE: usize = 32;

/// Commitment to a participant's symmetric key for one epoch
///
/// The bucket never sees key material; it only records this opaque string
/// so participants can look up which key decrypts content from a given
/// block-height window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHash(String);

impl KeyHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Hex encoded BLAKE3 commitment over raw key material
    pub fn commit(key_material: &[u8]) -> Self {
        Self(blake3::hash(key_material).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
