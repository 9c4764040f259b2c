//! Sandbox traits and error types

use async_trait::async_trait;
use thiserror::Error;

use super::image::BinaryImage;
use super::limits::MemoryLimits;

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur while creating or driving a sandbox
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Sandbox backend not supported on this platform
    #[error("Sandbox not supported: {0}")]
    NotSupported(String),

    /// Failed to create sandbox
    #[error("Failed to create sandbox: {0}")]
    CreationFailed(String),

    /// The binary image could not be decoded or compiled
    #[error("Invalid module image: {0}")]
    InvalidImage(String),

    /// A required export is absent or has the wrong signature
    #[error("Missing or mistyped export '{name}': {reason}")]
    MissingExport { name: String, reason: String },

    /// The module's allocator could not satisfy a request
    #[error("Native allocation of {size} bytes failed")]
    AllocationFailed { size: u32 },

    /// A host access fell outside the linear memory
    #[error("Memory access out of bounds: {len} bytes at {address:#x} (memory size {memory_size})")]
    OutOfBounds {
        address: u32,
        len: usize,
        memory_size: usize,
    },

    /// The module trapped during a call
    #[error("Sandbox trap: {0}")]
    Trap(String),

    /// I/O error while loading the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandbox-specific platform error
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Arguments of a single native hash invocation
///
/// Addresses point into the sandbox's linear memory. Lengths of the password
/// and salt exclude their NUL terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHashArgs {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
    pub pwd: u32,
    pub pwd_len: u32,
    pub salt: u32,
    pub salt_len: u32,
    pub hash: u32,
    pub hash_len: u32,
    pub encoded: u32,
    pub encoded_len: u32,
    pub variant: i32,
    pub version: u32,
}

/// A live, single-use execution environment
///
/// An instance owns its linear memory. It is created for one hash operation
/// and dropped when that operation completes.
pub trait SandboxInstance: Send {
    /// Allocate `size` bytes inside the sandbox and return the address
    fn allocate(&mut self, size: u32) -> SandboxResult<u32>;

    /// Release a buffer previously returned by [`allocate`](Self::allocate)
    fn free(&mut self, address: u32) -> SandboxResult<()>;

    /// Read-only view of the whole linear memory
    fn memory(&self) -> &[u8];

    /// Mutable view of the whole linear memory
    fn memory_mut(&mut self) -> &mut [u8];

    /// Current size of the linear memory in 64 KiB pages
    fn memory_pages(&self) -> u64;

    /// Invoke the native hash entry point and return its status code
    fn hash_native(&mut self, args: &NativeHashArgs) -> SandboxResult<i32>;

    /// Resolve a status code to the address of a NUL-terminated message
    fn error_message_native(&mut self, code: i32) -> SandboxResult<u32>;

    /// Number of buffers currently allocated, when the backend tracks it
    fn live_allocations(&self) -> Option<usize> {
        None
    }
}

/// Trait for sandbox backend implementations
///
/// - `WasmSandbox`: runs the supplied module under Wasmtime
/// - `NativeSandbox`: in-process reference primitive over an emulated linear memory
///
/// Note: This trait is dyn-compatible for runtime polymorphism.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Get the backend name for logging/debugging
    fn name(&self) -> &'static str;

    /// Check if this backend is available on the current system
    fn is_available(&self) -> bool;

    /// Whether this backend executes the supplied binary image
    ///
    /// Backends that carry their own primitive ignore the image.
    fn requires_image(&self) -> bool {
        true
    }

    /// Create a fresh instance from `image`
    ///
    /// With `limits`, the instance's linear memory is created with
    /// `limits.initial_pages` and may grow up to `limits.maximum_pages`.
    /// Without, the module's own default memory is used.
    async fn instantiate(
        &self,
        image: &BinaryImage,
        limits: Option<MemoryLimits>,
    ) -> SandboxResult<Box<dyn SandboxInstance>>;
}

/// Statistics about one sandboxed hash operation
#[derive(Debug, Clone, Default)]
pub struct SandboxStats {
    /// Time spent creating the instance
    pub setup_time_us: u64,
    /// Time spent inside the native hash call
    pub execution_time_us: u64,
    /// Linear memory size when the call finished
    pub memory_pages: u64,
    /// Frees that failed during cleanup
    pub failed_frees: u32,
}
