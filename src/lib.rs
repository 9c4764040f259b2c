//! Argonbox - Argon2 password hashing in an isolated sandbox
//!
//! This is the top-level crate that wires configuration, backend selection
//! and the hasher together behind [`Argon2Service`].

mod service;

pub use argonbox_core::{
    Argon2Variant, Config, HashError, HashParams, HashRequest, HashResult, init_tracing,
};
pub use service::{Argon2Service, ServiceError};

// Re-export for convenience
pub use argonbox_core;
pub use argonbox_sandbox;
