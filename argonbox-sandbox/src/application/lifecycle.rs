//! Sandbox lifecycle use case
//!
//! Produces one fresh, capacity-sized sandbox instance per hash request.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::image::{BinaryImage, ImageSource};
use crate::domain::limits::calculate_memory_limits;
use crate::domain::traits::{SandboxBackend, SandboxError, SandboxInstance, SandboxResult};

/// Creates sandbox instances from a backend and an image source
#[derive(Clone)]
pub struct SandboxLifecycle {
    backend: Arc<dyn SandboxBackend>,
    image: Option<Arc<dyn ImageSource>>,
}

impl SandboxLifecycle {
    /// Lifecycle for a backend that executes the image from `image`
    pub fn new(backend: Arc<dyn SandboxBackend>, image: Arc<dyn ImageSource>) -> Self {
        Self {
            backend,
            image: Some(image),
        }
    }

    /// Lifecycle for a backend that carries its own primitive
    pub fn without_image(backend: Arc<dyn SandboxBackend>) -> Self {
        Self {
            backend,
            image: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SandboxBackend> {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Instantiate a fresh sandbox sized for `memory_cost_kib`
    ///
    /// A zero cost leaves the module's default memory in place.
    #[instrument(skip(self), fields(backend = %self.backend.name()))]
    pub async fn create_sandbox(
        &self,
        memory_cost_kib: u32,
    ) -> SandboxResult<Box<dyn SandboxInstance>> {
        if !self.backend.is_available() {
            return Err(SandboxError::NotSupported(format!(
                "{} backend is not available",
                self.backend.name()
            )));
        }

        let image = match (&self.image, self.backend.requires_image()) {
            (Some(source), true) => {
                debug!(source = %source.describe(), "Loading module image");
                source.load().await?
            }
            (None, true) => {
                return Err(SandboxError::InvalidImage(format!(
                    "{} backend requires a module image but none is configured",
                    self.backend.name()
                )));
            }
            (_, false) => BinaryImage::empty(),
        };

        self.create_sandbox_from(memory_cost_kib, &image).await
    }

    /// Instantiate a fresh sandbox from an image already in hand
    pub async fn create_sandbox_from(
        &self,
        memory_cost_kib: u32,
        image: &BinaryImage,
    ) -> SandboxResult<Box<dyn SandboxInstance>> {
        let limits = calculate_memory_limits(memory_cost_kib);
        debug!(
            initial_pages = limits.map(|l| l.initial_pages),
            maximum_pages = limits.map(|l| l.maximum_pages),
            image_len = image.len(),
            "Creating sandbox"
        );

        self.backend.instantiate(image, limits).await
    }
}

impl std::fmt::Debug for SandboxLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxLifecycle")
            .field("backend", &self.backend.name())
            .field("image", &self.image.as_ref().map(|source| source.describe()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::abi::ModuleAbi;
    use crate::infrastructure::image::StaticImage;
    use crate::infrastructure::native::NativeSandbox;
    use crate::infrastructure::wasm::WasmSandbox;

    #[tokio::test]
    async fn test_native_lifecycle_needs_no_image() {
        let lifecycle = SandboxLifecycle::without_image(Arc::new(NativeSandbox::new()));
        let instance = lifecycle.create_sandbox(1024).await.unwrap();
        assert_eq!(instance.memory_pages(), 512);
        assert_eq!(lifecycle.backend_name(), "native");
    }

    #[tokio::test]
    async fn test_wasm_lifecycle_without_image_fails() {
        let backend = Arc::new(WasmSandbox::new(ModuleAbi::default()).unwrap());
        let lifecycle = SandboxLifecycle::without_image(backend);
        let err = lifecycle.create_sandbox(1024).await.err().expect("expected error");
        assert!(matches!(err, SandboxError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_explicit_image_is_used() {
        let backend = Arc::new(WasmSandbox::new(ModuleAbi::default()).unwrap());
        let lifecycle = SandboxLifecycle::without_image(backend);
        let image = BinaryImage::new(
            include_str!("../../tests/fixtures/mock_argon2.wat")
                .as_bytes()
                .to_vec(),
        );
        let instance = lifecycle.create_sandbox_from(0, &image).await.unwrap();
        assert_eq!(instance.memory_pages(), 2);
    }

    #[tokio::test]
    async fn test_malformed_image_fails_instantiation() {
        let backend = Arc::new(WasmSandbox::new(ModuleAbi::default()).unwrap());
        let lifecycle =
            SandboxLifecycle::new(backend, Arc::new(StaticImage::new(b"nope".to_vec())));
        let err = lifecycle.create_sandbox(16).await.err().expect("expected error");
        assert!(matches!(err, SandboxError::InvalidImage(_)));
    }
}
