//! Sandbox backend selector
//!
//! Builds the configured backend and its image source.

use std::sync::Arc;
use tracing::{debug, info};

use argonbox_core::config::SandboxConfig;

use crate::application::lifecycle::SandboxLifecycle;
use crate::domain::abi::ModuleAbi;
use crate::domain::image::ImageSource;
use crate::domain::traits::{SandboxBackend, SandboxError, SandboxResult};
use crate::infrastructure::image::{Base64Image, FileImage};
use crate::infrastructure::native::NativeSandbox;
use crate::infrastructure::wasm::WasmSandbox;

/// Sandbox backend selector
///
/// Chooses between:
/// 1. WASM - runs the configured module image under Wasmtime
/// 2. Native - in-process reference primitive, used when no image is configured
pub struct SandboxSelector;

impl SandboxSelector {
    /// Build a lifecycle for the backend named in `config`
    pub fn select(config: &SandboxConfig) -> SandboxResult<SandboxLifecycle> {
        let requested = config.backend.to_lowercase();
        let name = match requested.as_str() {
            "auto" => Self::best_available(config),
            other => other,
        };

        let backend = Self::select_by_name(name, config).ok_or_else(|| {
            SandboxError::NotSupported(format!("backend '{}' is not available", config.backend))
        })?;
        info!(backend = backend.name(), requested = %config.backend, "Selected sandbox backend");

        let lifecycle = match Self::image_source(config) {
            Some(image) if backend.requires_image() => SandboxLifecycle::new(backend, image),
            _ => SandboxLifecycle::without_image(backend),
        };
        Ok(lifecycle)
    }

    /// Select a specific backend by name
    ///
    /// Valid names: "wasm", "native", "auto"
    pub fn select_by_name(name: &str, config: &SandboxConfig) -> Option<Arc<dyn SandboxBackend>> {
        match name.to_lowercase().as_str() {
            "auto" => Self::select_by_name(Self::best_available(config), config),

            "native" => {
                debug!("Using in-process reference backend");
                Some(Arc::new(NativeSandbox::new()))
            }

            "wasm" => match WasmSandbox::new(ModuleAbi::from(&config.exports)) {
                Ok(sandbox) if config.cache_modules => Some(Arc::new(sandbox)),
                Ok(sandbox) => Some(Arc::new(sandbox.without_module_cache())),
                Err(e) => {
                    debug!("WASM backend requested but not available: {}", e);
                    None
                }
            },

            _ => {
                debug!("Unknown sandbox backend: {}", name);
                None
            }
        }
    }

    /// Name of the backend "auto" resolves to
    pub fn best_available(config: &SandboxConfig) -> &'static str {
        if config.has_image() { "wasm" } else { "native" }
    }

    /// Image source for the configured module, a path taking precedence
    pub fn image_source(config: &SandboxConfig) -> Option<Arc<dyn ImageSource>> {
        if let Some(path) = &config.image_path {
            return Some(Arc::new(FileImage::new(path)));
        }
        config
            .image_base64
            .as_ref()
            .map(|text| Arc::new(Base64Image::new(text.clone())) as Arc<dyn ImageSource>)
    }
}
