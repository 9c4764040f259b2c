//! Argonbox Sandbox - Argon2 hashing through an isolated module
//!
//! This crate drives a compiled Argon2 primitive inside a sandbox with its own
//! linear memory. It owns the boundary: sizing the memory region, copying
//! inputs in and outputs out, translating status codes, and releasing every
//! native buffer regardless of outcome.
//!
//! # Architecture
//!
//! | Layer | Type | Role |
//! |-------|------|------|
//! | Lifecycle | [`SandboxLifecycle`] | One fresh instance per request, sized by [`calculate_memory_limits`] |
//! | Orchestrator | [`Argon2Hasher`] | Buffers, native call, result and error translation |
//! | Backends | [`WasmSandbox`], [`NativeSandbox`] | Wasmtime module, or the in-process reference primitive |
//!
//! Instances are never pooled. The WASM backend caches compiled modules by
//! image digest; stores and memories are always new.
//!
//! # Usage
//!
//! ```rust,ignore
//! use argonbox_core::{Config, HashRequest};
//! use argonbox_sandbox::{Argon2Hasher, SandboxSelector};
//!
//! let config = Config::load()?;
//! let lifecycle = SandboxSelector::select(&config.sandbox)?;
//! let hasher = Argon2Hasher::new(lifecycle, config.hashing.to_hash_params());
//!
//! let result = hasher.hash(&HashRequest::new("password", "somesalt")).await?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::hasher::{Argon2Hasher, ENCODED_BUFFER_LEN, HashExecutionError};
pub use application::lifecycle::SandboxLifecycle;
pub use application::selector::SandboxSelector;
pub use domain::abi::{ModuleAbi, ModuleAbiBuilder};
pub use domain::image::{BinaryImage, ImageSource};
pub use domain::limits::{MAX_PAGES, MemoryLimits, WASM_PAGE_SIZE, calculate_memory_limits};
pub use domain::traits::{
    NativeHashArgs, SandboxBackend, SandboxError, SandboxInstance, SandboxResult, SandboxStats,
};
pub use infrastructure::image::{Base64Image, FileImage, StaticImage};
pub use infrastructure::native::NativeSandbox;
pub use infrastructure::wasm::WasmSandbox;
