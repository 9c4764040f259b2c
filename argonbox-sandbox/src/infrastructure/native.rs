//! In-process reference backend
//!
//! Runs the Argon2 primitive from the `argon2` crate against an emulated
//! linear memory. The instance honors the same contract as a compiled module:
//! buffers live at 32-bit addresses inside a page-granular region, the
//! primitive reports integer status codes, and messages are NUL-terminated
//! strings stored in the region itself.
//!
//! Used when no module image is configured, and as a reference to check
//! compiled modules against.

use std::collections::{BTreeMap, HashMap};

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use tracing::debug;

use crate::domain::image::BinaryImage;
use crate::domain::limits::{MAX_PAGES, MemoryLimits, RESERVED_PAGES, WASM_PAGE_SIZE};
use crate::domain::memory::{slice_at, write_at};
use crate::domain::traits::{
    NativeHashArgs, SandboxBackend, SandboxError, SandboxInstance, SandboxResult,
};

/// Status codes of the reference primitive
pub mod status {
    pub const OK: i32 = 0;
    pub const OUTPUT_PTR_NULL: i32 = -1;
    pub const OUTPUT_TOO_SHORT: i32 = -2;
    pub const OUTPUT_TOO_LONG: i32 = -3;
    pub const PWD_TOO_LONG: i32 = -5;
    pub const SALT_TOO_SHORT: i32 = -6;
    pub const SALT_TOO_LONG: i32 = -7;
    pub const AD_TOO_LONG: i32 = -9;
    pub const SECRET_TOO_LONG: i32 = -11;
    pub const TIME_TOO_SMALL: i32 = -12;
    pub const MEMORY_TOO_LITTLE: i32 = -14;
    pub const MEMORY_TOO_MUCH: i32 = -15;
    pub const LANES_TOO_FEW: i32 = -16;
    pub const LANES_TOO_MANY: i32 = -17;
    pub const PWD_PTR_MISMATCH: i32 = -18;
    pub const SALT_PTR_MISMATCH: i32 = -19;
    pub const MEMORY_ALLOCATION_ERROR: i32 = -22;
    pub const INCORRECT_PARAMETER: i32 = -25;
    pub const INCORRECT_TYPE: i32 = -26;
    pub const ENCODING_FAIL: i32 = -31;
}

/// Message table of the reference primitive
const MESSAGES: &[(i32, &str)] = &[
    (0, "OK"),
    (-1, "Output pointer is NULL"),
    (-2, "Output is too short"),
    (-3, "Output is too long"),
    (-4, "Password is too short"),
    (-5, "Password is too long"),
    (-6, "Salt is too short"),
    (-7, "Salt is too long"),
    (-8, "Associated data is too short"),
    (-9, "Associated data is too long"),
    (-10, "Secret is too short"),
    (-11, "Secret is too long"),
    (-12, "Time cost is too small"),
    (-13, "Time cost is too large"),
    (-14, "Memory cost is too small"),
    (-15, "Memory cost is too large"),
    (-16, "Too few lanes"),
    (-17, "Too many lanes"),
    (-18, "Password pointer is NULL, but password length is not 0"),
    (-19, "Salt pointer is NULL, but salt length is not 0"),
    (-20, "Secret pointer is NULL, but secret length is not 0"),
    (-21, "Associated data pointer is NULL, but ad length is not 0"),
    (-22, "Memory allocation error"),
    (-23, "The free memory callback is NULL"),
    (-24, "The allocate memory callback is NULL"),
    (-25, "Argon2_Context context is NULL"),
    (-26, "There is no such version of Argon2"),
    (-27, "Output pointer mismatch"),
    (-28, "Not enough threads"),
    (-29, "Too many threads"),
    (-30, "Missing arguments"),
    (-31, "Encoding failed"),
    (-32, "Decoding failed"),
    (-33, "Threading failure"),
    (-34, "Some of encoded parameters are too long or too short"),
    (-35, "The password does not match the supplied hash"),
];

const UNKNOWN_MESSAGE: &str = "Unknown error code";

/// Start of the message table; lower addresses are never valid
const TABLE_BASE: u32 = 16;

/// Start of the allocator's heap
const HEAP_BASE: u32 = 4096;

const ALIGNMENT: u32 = 8;

/// Region size used when no explicit limits are requested
const DEFAULT_PAGES: u64 = RESERVED_PAGES;

/// In-process sandbox backend built on the `argon2` crate
#[derive(Debug, Default)]
pub struct NativeSandbox;

impl NativeSandbox {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxBackend for NativeSandbox {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn requires_image(&self) -> bool {
        false
    }

    async fn instantiate(
        &self,
        _image: &BinaryImage,
        limits: Option<MemoryLimits>,
    ) -> SandboxResult<Box<dyn SandboxInstance>> {
        let limits = limits.unwrap_or(MemoryLimits {
            initial_pages: DEFAULT_PAGES,
            maximum_pages: MAX_PAGES,
        });
        let instance = NativeInstance::new(limits)?;
        debug!(
            pages = instance.memory_pages(),
            "Native sandbox instantiated"
        );
        Ok(Box::new(instance))
    }
}

/// One emulated linear memory with a first-fit allocator
pub struct NativeInstance {
    memory: Vec<u8>,
    maximum_pages: u64,
    /// Live allocations, address to size
    allocations: BTreeMap<u32, u32>,
    messages: HashMap<i32, u32>,
    unknown_message: u32,
}

impl NativeInstance {
    pub fn new(limits: MemoryLimits) -> SandboxResult<Self> {
        let maximum_pages = limits.maximum_pages.min(MAX_PAGES);
        if limits.initial_pages > maximum_pages {
            return Err(SandboxError::CreationFailed(format!(
                "initial size of {} pages exceeds maximum of {}",
                limits.initial_pages, maximum_pages
            )));
        }
        // The heap must fit at least one page past the message table
        let pages = limits.initial_pages.max(1);

        let mut instance = Self {
            memory: vec![0; (pages * WASM_PAGE_SIZE) as usize],
            maximum_pages,
            allocations: BTreeMap::new(),
            messages: HashMap::with_capacity(MESSAGES.len()),
            unknown_message: 0,
        };
        instance.write_message_table()?;
        Ok(instance)
    }

    fn write_message_table(&mut self) -> SandboxResult<()> {
        let mut cursor = TABLE_BASE;
        for (code, message) in MESSAGES {
            self.messages.insert(*code, cursor);
            cursor = self.write_c_string(cursor, message)?;
        }
        self.unknown_message = cursor;
        self.write_c_string(cursor, UNKNOWN_MESSAGE)?;
        Ok(())
    }

    /// Write `text` plus a NUL at `address` and return the next free address
    fn write_c_string(&mut self, address: u32, text: &str) -> SandboxResult<u32> {
        write_at(&mut self.memory, address, text.as_bytes())?;
        let nul = address + text.len() as u32;
        write_at(&mut self.memory, nul, &[0])?;
        Ok(nul + 1)
    }

    fn maximum_bytes(&self) -> u64 {
        self.maximum_pages * WASM_PAGE_SIZE
    }

    /// Grow the region so that it spans at least `end` bytes
    fn ensure_capacity(&mut self, end: u64) -> bool {
        if end <= self.memory.len() as u64 {
            return true;
        }
        let pages = end.div_ceil(WASM_PAGE_SIZE);
        if pages > self.maximum_pages {
            return false;
        }
        self.memory.resize((pages * WASM_PAGE_SIZE) as usize, 0);
        true
    }

    /// First gap of at least `size` bytes at or after the heap base
    fn find_gap(&self, size: u32) -> u64 {
        let mut candidate = u64::from(HEAP_BASE);
        for (&address, &len) in &self.allocations {
            if candidate + u64::from(size) <= u64::from(address) {
                break;
            }
            candidate = align_up(u64::from(address) + u64::from(len));
        }
        candidate
    }

    fn read_input(&self, address: u32, len: u32) -> SandboxResult<Vec<u8>> {
        slice_at(&self.memory, address, len as usize)
            .map(<[u8]>::to_vec)
            .map_err(memory_fault)
    }

    /// Run the primitive; `Ok` carries its status code
    fn run_primitive(&mut self, args: &NativeHashArgs) -> SandboxResult<i32> {
        if args.hash == 0 {
            return Ok(status::OUTPUT_PTR_NULL);
        }
        if args.pwd == 0 && args.pwd_len != 0 {
            return Ok(status::PWD_PTR_MISMATCH);
        }
        if args.salt == 0 && args.salt_len != 0 {
            return Ok(status::SALT_PTR_MISMATCH);
        }

        let Some(algorithm) = algorithm(args.variant) else {
            return Ok(status::INCORRECT_TYPE);
        };
        let Ok(version) = Version::try_from(args.version) else {
            return Ok(status::INCORRECT_TYPE);
        };
        let params = match Params::new(
            args.memory_cost_kib,
            args.time_cost,
            args.parallelism,
            Some(args.hash_len as usize),
        ) {
            Ok(params) => params,
            Err(err) => return Ok(status_of(err)),
        };

        // The working set has to fit in the region, like the compiled primitive's would
        if u64::from(args.memory_cost_kib) * 1024 > self.maximum_bytes() {
            return Ok(status::MEMORY_ALLOCATION_ERROR);
        }

        let password = self.read_input(args.pwd, args.pwd_len)?;
        let salt = self.read_input(args.salt, args.salt_len)?;

        let mut output = vec![0u8; args.hash_len as usize];
        let argon2 = Argon2::new(algorithm, version, params);
        if let Err(err) = argon2.hash_password_into(&password, &salt, &mut output) {
            return Ok(status_of(err));
        }
        write_at(&mut self.memory, args.hash, &output).map_err(memory_fault)?;

        if args.encoded != 0 {
            let encoded = encode_string(args, algorithm, version, &salt, &output);
            if encoded.len() + 1 > args.encoded_len as usize {
                return Ok(status::ENCODING_FAIL);
            }
            write_at(&mut self.memory, args.encoded, encoded.as_bytes()).map_err(memory_fault)?;
            write_at(&mut self.memory, args.encoded + encoded.len() as u32, &[0])
                .map_err(memory_fault)?;
        }

        Ok(status::OK)
    }
}

impl SandboxInstance for NativeInstance {
    fn allocate(&mut self, size: u32) -> SandboxResult<u32> {
        let size = size.max(1);
        let address = self.find_gap(size);
        let end = address + u64::from(size);
        if end > u64::from(u32::MAX) || !self.ensure_capacity(end) {
            return Err(SandboxError::AllocationFailed { size });
        }
        // Bounded by u32::MAX above
        let address = address as u32;
        self.allocations.insert(address, size);
        Ok(address)
    }

    fn free(&mut self, address: u32) -> SandboxResult<()> {
        if address == 0 {
            return Ok(());
        }
        self.allocations
            .remove(&address)
            .map(|_| ())
            .ok_or_else(|| {
                SandboxError::Platform(format!("free of unallocated address {:#x}", address))
            })
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn memory_pages(&self) -> u64 {
        self.memory.len() as u64 / WASM_PAGE_SIZE
    }

    fn hash_native(&mut self, args: &NativeHashArgs) -> SandboxResult<i32> {
        self.run_primitive(args)
    }

    fn error_message_native(&mut self, code: i32) -> SandboxResult<u32> {
        Ok(self
            .messages
            .get(&code)
            .copied()
            .unwrap_or(self.unknown_message))
    }

    fn live_allocations(&self) -> Option<usize> {
        Some(self.allocations.len())
    }
}

fn align_up(address: u64) -> u64 {
    address.div_ceil(u64::from(ALIGNMENT)) * u64::from(ALIGNMENT)
}

/// A stray access inside the primitive faults, as it would in a compiled module
fn memory_fault(err: SandboxError) -> SandboxError {
    SandboxError::Trap(format!("memory fault: {}", err))
}

fn algorithm(variant: i32) -> Option<Algorithm> {
    match variant {
        0 => Some(Algorithm::Argon2d),
        1 => Some(Algorithm::Argon2i),
        2 => Some(Algorithm::Argon2id),
        _ => None,
    }
}

fn status_of(err: argon2::Error) -> i32 {
    match err {
        argon2::Error::OutputTooShort => status::OUTPUT_TOO_SHORT,
        argon2::Error::OutputTooLong => status::OUTPUT_TOO_LONG,
        argon2::Error::PwdTooLong => status::PWD_TOO_LONG,
        argon2::Error::SaltTooShort => status::SALT_TOO_SHORT,
        argon2::Error::SaltTooLong => status::SALT_TOO_LONG,
        argon2::Error::AdTooLong => status::AD_TOO_LONG,
        argon2::Error::SecretTooLong => status::SECRET_TOO_LONG,
        argon2::Error::TimeTooSmall => status::TIME_TOO_SMALL,
        argon2::Error::MemoryTooLittle => status::MEMORY_TOO_LITTLE,
        argon2::Error::MemoryTooMuch => status::MEMORY_TOO_MUCH,
        argon2::Error::ThreadsTooFew => status::LANES_TOO_FEW,
        argon2::Error::ThreadsTooMany => status::LANES_TOO_MANY,
        argon2::Error::AlgorithmInvalid | argon2::Error::VersionInvalid => status::INCORRECT_TYPE,
        argon2::Error::B64Encoding(_) => status::ENCODING_FAIL,
        _ => status::INCORRECT_PARAMETER,
    }
}

/// `$argon2i$v=19$m=65536,t=2,p=1$<salt>$<hash>` with unpadded base64
fn encode_string(
    args: &NativeHashArgs,
    algorithm: Algorithm,
    version: Version,
    salt: &[u8],
    hash: &[u8],
) -> String {
    format!(
        "${}$v={}$m={},t={},p={}${}${}",
        algorithm.as_str(),
        u32::from(version),
        args.memory_cost_kib,
        args.time_cost,
        args.parallelism,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash),
    )
}
