//! Configuration validation module

use crate::config::{ExportsConfig, HashingConfig, LoggingConfig, SANDBOX_BACKENDS, SandboxConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Logging configuration error: {message}")]
    Logging { message: String },

    #[error("Hashing configuration error: {message}")]
    Hashing { message: String },

    #[error("Sandbox configuration error: {message}")]
    Sandbox { message: String },
}

impl ValidationError {
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn hashing(message: impl Into<String>) -> Self {
        Self::Hashing {
            message: message.into(),
        }
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox {
            message: message.into(),
        }
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.level.trim().is_empty() {
            return Err(ValidationError::logging("level cannot be empty"));
        }
        match self.format.as_str() {
            "json" | "pretty" | "compact" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "format must be json, pretty or compact, got '{}'",
                other
            ))),
        }
    }
}

impl Validate for HashingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // Defaults are substituted for zero request fields, so they must be non-zero themselves
        if self.time_cost == 0 {
            return Err(ValidationError::hashing("time_cost must be > 0"));
        }
        if self.memory_cost_kib == 0 {
            return Err(ValidationError::hashing("memory_cost_kib must be > 0"));
        }
        if self.parallelism == 0 {
            return Err(ValidationError::hashing("parallelism must be > 0"));
        }
        if self.hash_length == 0 {
            return Err(ValidationError::hashing("hash_length must be > 0"));
        }
        Ok(())
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let backend = self.backend.to_lowercase();
        if !SANDBOX_BACKENDS.contains(&backend.as_str()) {
            return Err(ValidationError::sandbox(format!(
                "backend must be one of {:?}, got '{}'",
                SANDBOX_BACKENDS, self.backend
            )));
        }
        if backend == "wasm" && !self.has_image() {
            return Err(ValidationError::sandbox(
                "wasm backend requires image_path or image_base64",
            ));
        }
        if self
            .image_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(ValidationError::sandbox("image_path cannot be empty"));
        }
        self.exports.validate()
    }
}

impl Validate for ExportsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let names = [
            ("hash", &self.hash),
            ("error_message", &self.error_message),
            ("malloc", &self.malloc),
            ("free", &self.free),
            ("memory", &self.memory),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(ValidationError::sandbox(format!(
                    "exports.{} cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}
