//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Argon2Variant, HashParams};

/// Backend names accepted by `sandbox.backend`
pub const SANDBOX_BACKENDS: &[&str] = &["auto", "wasm", "native"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub hashing: HashingConfig,
    pub sandbox: SandboxConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "argonbox_sandbox=debug"
    pub level: String,
    /// Output format: "json", "pretty" or "compact"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Defaults substituted for unset fields of a hash request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Iterations
    pub time_cost: u32,
    /// Working memory in KiB
    pub memory_cost_kib: u32,
    pub parallelism: u32,
    /// Raw hash length in bytes
    pub hash_length: u32,
    pub variant: Argon2Variant,
}

impl Default for HashingConfig {
    fn default() -> Self {
        let params = HashParams::default();
        Self {
            time_cost: params.time_cost,
            memory_cost_kib: params.memory_cost_kib,
            parallelism: params.parallelism,
            hash_length: params.hash_length,
            variant: params.variant,
        }
    }
}

impl HashingConfig {
    /// Convert to the parameter set used when resolving requests
    pub fn to_hash_params(&self) -> HashParams {
        HashParams {
            time_cost: self.time_cost,
            memory_cost_kib: self.memory_cost_kib,
            parallelism: self.parallelism,
            hash_length: self.hash_length,
            variant: self.variant,
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Backend preference: "auto", "wasm" or "native"
    ///
    /// "auto" picks the wasm backend when an image is configured and falls
    /// back to the in-process reference backend otherwise.
    pub backend: String,
    /// Path to the compiled Argon2 module
    pub image_path: Option<PathBuf>,
    /// Base64-encoded compiled Argon2 module (used when no path is set)
    pub image_base64: Option<String>,
    /// Reuse compiled modules across calls (instances are never reused)
    pub cache_modules: bool,
    /// Export names of the compiled module
    pub exports: ExportsConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            image_path: None,
            image_base64: None,
            cache_modules: true,
            exports: ExportsConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Whether a binary image is configured at all
    pub fn has_image(&self) -> bool {
        self.image_path.is_some() || self.image_base64.is_some()
    }
}

/// Names under which the compiled module exports the primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportsConfig {
    pub hash: String,
    pub error_message: String,
    pub malloc: String,
    pub free: String,
    pub memory: String,
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            hash: "argon2_hash".to_string(),
            error_message: "argon2_error_message".to_string(),
            malloc: "malloc".to_string(),
            free: "free".to_string(),
            memory: "memory".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.logging.validate()?;
        self.hashing.validate()?;
        self.sandbox.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from `config/` and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_dir("config")
    }

    /// Load configuration from files in `dir` and environment variables
    ///
    /// Sources, lowest priority first: `default`, `$ENV`, `local` (all
    /// optional, any format the `config` crate understands), then
    /// `ARGONBOX__SECTION__KEY` environment variables.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let env = std::env::var("ENV").ok();
        Self::load_layers(dir.as_ref(), env.as_deref())
    }

    fn load_layers(dir: &Path, env: Option<&str>) -> Result<Self, ConfigLoadError> {
        let source = |name: &str| {
            config::File::with_name(&dir.join(name).to_string_lossy()).required(false)
        };
        debug!(dir = %dir.display(), "Loading configuration");

        let mut builder = config::Config::builder().add_source(source("default"));

        if let Some(env) = env {
            debug!(env, "Adding environment configuration layer");
            builder = builder.add_source(source(env));
        }

        builder = builder
            .add_source(source("local"))
            .add_source(config::Environment::with_prefix("ARGONBOX").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
