//! Binary image suppliers

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::domain::image::{BinaryImage, ImageSource};
use crate::domain::traits::{SandboxError, SandboxResult};

/// Image already held in memory
#[derive(Debug, Clone)]
pub struct StaticImage {
    image: BinaryImage,
}

impl StaticImage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            image: BinaryImage::new(bytes.into()),
        }
    }
}

impl From<BinaryImage> for StaticImage {
    fn from(image: BinaryImage) -> Self {
        Self { image }
    }
}

#[async_trait]
impl ImageSource for StaticImage {
    fn describe(&self) -> String {
        format!("static image ({} bytes)", self.image.len())
    }

    async fn load(&self) -> SandboxResult<BinaryImage> {
        Ok(self.image.clone())
    }
}

/// Image embedded as base64 text, decoded once on first load
///
/// Whitespace in the text is ignored so that wrapped output of common
/// encoders can be pasted as is.
#[derive(Debug)]
pub struct Base64Image {
    text: String,
    decoded: tokio::sync::OnceCell<BinaryImage>,
}

impl Base64Image {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            decoded: tokio::sync::OnceCell::new(),
        }
    }

    fn decode(&self) -> SandboxResult<BinaryImage> {
        let compact: String = self.text.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SandboxError::InvalidImage(format!("invalid base64 image: {}", e)))?;
        Ok(BinaryImage::new(bytes))
    }
}

#[async_trait]
impl ImageSource for Base64Image {
    fn describe(&self) -> String {
        format!("base64 image ({} chars)", self.text.len())
    }

    async fn load(&self) -> SandboxResult<BinaryImage> {
        self.decoded
            .get_or_try_init(|| async { self.decode() })
            .await
            .cloned()
    }
}

/// Image read from disk on every load
#[derive(Debug, Clone)]
pub struct FileImage {
    path: PathBuf,
}

impl FileImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ImageSource for FileImage {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn load(&self) -> SandboxResult<BinaryImage> {
        let bytes = tokio::fs::read(&self.path).await?;
        debug!(path = %self.path.display(), size = bytes.len(), "Loaded module image");
        Ok(BinaryImage::new(bytes))
    }
}
