//! Compiled module images

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::SandboxResult;

/// Immutable bytes of a compiled module, identified by their SHA-256 digest
#[derive(Clone)]
pub struct BinaryImage {
    bytes: Arc<[u8]>,
    digest: [u8; 32],
}

impl BinaryImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let digest = Sha256::digest(&bytes).into();
        Self { bytes, digest }
    }

    /// An image with no content, for backends that carry their own primitive
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for BinaryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryImage")
            .field("len", &self.bytes.len())
            .field("sha256", &self.digest_hex())
            .finish()
    }
}

/// Supplier of the compiled module
///
/// Loading may involve I/O, so it is asynchronous.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Produce the image bytes
    async fn load(&self) -> SandboxResult<BinaryImage>;
}
