//! Argonbox Core - Foundation crate for the argonbox password hasher
//!
//! This crate provides the pieces shared by the sandbox layer and the façade:
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] — Hash requests, effective parameters, results and errors
//! - [`logging`] — Structured logging with tracing
//!
//! # Configuration
//!
//! ```rust,ignore
//! use argonbox_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `ARGONBOX__` prefix with double underscore separators:
//!
//! ```bash
//! ARGONBOX__HASHING__TIME_COST=3
//! ARGONBOX__SANDBOX__IMAGE_PATH=/opt/argon2/argon2.wasm
//! ```
//!
//! # Logging
//!
//! ```rust,ignore
//! use argonbox_core::{Config, init_tracing};
//!
//! init_tracing(&Config::default().logging)?;
//! ```

pub mod config;
pub mod domain;
pub mod logging;

pub use config::Config;
pub use domain::{Argon2Variant, HashError, HashParams, HashRequest, HashResult};
pub use logging::init_tracing;
