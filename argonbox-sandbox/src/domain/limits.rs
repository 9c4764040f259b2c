//! Linear memory sizing
//!
//! Sizes the isolated memory region for a requested Argon2 memory cost:
//! - the requested working set, rounded up to whole pages
//! - floored at 256 pages
//! - plus a 256-page margin for the primitive's bookkeeping and the runtime
//! - capped at the largest region addressable by a 32-bit module
//!
//! These values must stay fixed for output compatibility with existing
//! deployments of the primitive.

/// Size of one linear memory page in bytes (64 KiB)
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Upper bound for any region: (2 GiB - 64 KiB) / 64 KiB
pub const MAX_PAGES: u64 = (2 * 1024 * 1024 * 1024 - 64 * 1024) / WASM_PAGE_SIZE;

/// Minimum page count before the margin is added, and the margin itself
pub const RESERVED_PAGES: u64 = 256;

/// Calculated page limits for one sandbox instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    /// Pages reserved at instantiation
    pub initial_pages: u64,
    /// Pages the region may grow to
    pub maximum_pages: u64,
}

impl MemoryLimits {
    /// Initial size in bytes
    pub fn initial_bytes(&self) -> u64 {
        self.initial_pages * WASM_PAGE_SIZE
    }

    /// Maximum size in bytes
    pub fn maximum_bytes(&self) -> u64 {
        self.maximum_pages * WASM_PAGE_SIZE
    }
}

/// Pages needed to hold `memory_cost_kib` KiB, rounded up
pub fn requested_pages(memory_cost_kib: u32) -> u64 {
    (u64::from(memory_cost_kib) * 1024).div_ceil(WASM_PAGE_SIZE)
}

/// Calculate the memory limits for a requested Argon2 memory cost
///
/// Returns `None` for a zero cost: no explicit region is created and the
/// module's default, growable memory is used instead.
///
/// # Example
///
/// ```rust
/// use argonbox_sandbox::{MAX_PAGES, calculate_memory_limits};
///
/// let limits = calculate_memory_limits(1024).unwrap();
/// assert_eq!(limits.initial_pages, 512);
/// assert_eq!(limits.maximum_pages, MAX_PAGES);
///
/// assert!(calculate_memory_limits(0).is_none());
/// ```
pub fn calculate_memory_limits(memory_cost_kib: u32) -> Option<MemoryLimits> {
    if memory_cost_kib == 0 {
        return None;
    }

    let initial_pages =
        (requested_pages(memory_cost_kib).max(RESERVED_PAGES) + RESERVED_PAGES).min(MAX_PAGES);

    Some(MemoryLimits {
        initial_pages,
        maximum_pages: MAX_PAGES,
    })
}
