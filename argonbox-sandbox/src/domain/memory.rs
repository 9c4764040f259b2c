//! Bounds-checked access to a linear memory view

use super::traits::{SandboxError, SandboxResult};

fn out_of_bounds(memory: &[u8], address: u32, len: usize) -> SandboxError {
    SandboxError::OutOfBounds {
        address,
        len,
        memory_size: memory.len(),
    }
}

/// Borrow `len` bytes at `address`
pub fn slice_at(memory: &[u8], address: u32, len: usize) -> SandboxResult<&[u8]> {
    let start = address as usize;
    start
        .checked_add(len)
        .and_then(|end| memory.get(start..end))
        .ok_or_else(|| out_of_bounds(memory, address, len))
}

/// Copy `bytes` into memory at `address`
pub fn write_at(memory: &mut [u8], address: u32, bytes: &[u8]) -> SandboxResult<()> {
    let start = address as usize;
    let memory_size = memory.len();
    start
        .checked_add(bytes.len())
        .and_then(|end| memory.get_mut(start..end))
        .ok_or(SandboxError::OutOfBounds {
            address,
            len: bytes.len(),
            memory_size,
        })?
        .copy_from_slice(bytes);
    Ok(())
}

/// Borrow the bytes of the NUL-terminated string at `address`
///
/// The scan stops at the first NUL, after `max_len` bytes, or at the end of
/// memory, whichever comes first. The terminator is not included.
pub fn c_str_at(memory: &[u8], address: u32, max_len: Option<usize>) -> SandboxResult<&[u8]> {
    let start = address as usize;
    let tail = memory
        .get(start..)
        .ok_or_else(|| out_of_bounds(memory, address, 1))?;
    let window = match max_len {
        Some(max) => &tail[..max.min(tail.len())],
        None => tail,
    };
    let len = window.iter().position(|b| *b == 0).unwrap_or(window.len());
    Ok(&window[..len])
}

/// Decode the NUL-terminated string at `address` as UTF-8
///
/// Invalid sequences are replaced rather than rejected.
pub fn read_c_string(memory: &[u8], address: u32, max_len: Option<usize>) -> SandboxResult<String> {
    c_str_at(memory, address, max_len).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}
