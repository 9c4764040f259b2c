//! Service wiring: configuration to a ready hasher

use tracing::info;

use argonbox_core::config::{Validate, ValidationError};
use argonbox_core::{Argon2Variant, Config, HashRequest, HashResult};
use argonbox_sandbox::{Argon2Hasher, HashExecutionError, SandboxError, SandboxSelector};

/// Password hashing façade
///
/// Every call runs in its own sandbox; the service itself only holds the
/// selected backend, the image source and the configured defaults, so it is
/// cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct Argon2Service {
    hasher: Argon2Hasher,
}

impl Argon2Service {
    /// Build the service described by `config`
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        config.validate()?;
        let lifecycle = SandboxSelector::select(&config.sandbox)?;
        let hasher = Argon2Hasher::new(lifecycle, config.hashing.to_hash_params());

        info!(
            backend = hasher.lifecycle().backend_name(),
            variant = %hasher.defaults().variant,
            "Argon2 service ready"
        );
        Ok(Self { hasher })
    }

    pub fn new(hasher: Argon2Hasher) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &Argon2Hasher {
        &self.hasher
    }

    pub fn backend_name(&self) -> &'static str {
        self.hasher.lifecycle().backend_name()
    }

    pub async fn hash(&self, request: &HashRequest) -> Result<HashResult, ServiceError> {
        Ok(self.hasher.hash(request).await?)
    }

    /// Hash `password` with `salt` using the configured defaults
    pub async fn hash_text(&self, password: &str, salt: &str) -> Result<HashResult, ServiceError> {
        self.hash(&HashRequest::new(password, salt)).await
    }

    pub async fn verify(
        &self,
        password: &str,
        encoded: &str,
        variant: Option<Argon2Variant>,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .hasher
            .verify(password.as_bytes(), encoded, variant)
            .await?)
    }
}

/// Error type for the façade
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("Sandbox setup failed: {0}")]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Hash(#[from] HashExecutionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_native_backend() {
        let service = Argon2Service::from_config(&Config::default()).unwrap();
        assert_eq!(service.backend_name(), "native");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.hashing.time_cost = 0;
        assert!(matches!(
            Argon2Service::from_config(&config),
            Err(ServiceError::Config(_))
        ));
    }
}
