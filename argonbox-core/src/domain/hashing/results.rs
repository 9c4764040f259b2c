//! Terminal values of a hash operation

use serde::{Deserialize, Serialize};

/// Successful hash output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    /// Raw hash bytes
    pub hash: Vec<u8>,
    /// `hash` rendered as lowercase hex, two digits per byte
    pub hash_hex: String,
    /// Canonical encoded string produced by the primitive
    pub encoded: String,
}

impl HashResult {
    /// Build a result from the raw hash and the encoded string
    pub fn new(hash: Vec<u8>, encoded: String) -> Self {
        let hash_hex = hex::encode(&hash);
        Self {
            hash,
            hash_hex,
            encoded,
        }
    }
}

/// Hashing failure reported by (or on behalf of) the primitive
///
/// `code` is the primitive's raw status. Codes are kept opaque: the primitive
/// owns its error vocabulary and the message is resolved through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct HashError {
    pub message: String,
    pub code: i32,
}

impl HashError {
    /// Sentinel code for failures where the primitive never returned a status
    pub const NO_STATUS: i32 = i32::MIN;

    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// A failure raised before the primitive produced a status (e.g. a trap)
    pub fn without_status(message: impl Into<String>) -> Self {
        Self::new(message, Self::NO_STATUS)
    }

    /// Whether `code` came from the primitive itself
    pub fn has_native_status(&self) -> bool {
        self.code != Self::NO_STATUS
    }
}
