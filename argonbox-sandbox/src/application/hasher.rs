//! Hash request orchestration
//!
//! Drives one hash request through a fresh sandbox:
//!
//! 1. Resolve the effective parameters against the configured defaults
//! 2. Instantiate a sandbox sized for the memory cost
//! 3. Copy password and salt into native buffers, reserve the outputs
//! 4. Invoke the primitive and translate its status
//! 5. Read the outputs, then release every native buffer
//!
//! Buffers are owned by a guard that frees them on every exit path,
//! including unwinding out of the blocking task.

use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

use argonbox_core::domain::{
    ARGON2_VERSION, Argon2Variant, HashError, HashParams, HashRequest, HashResult,
};

use crate::application::lifecycle::SandboxLifecycle;
use crate::domain::memory::{read_c_string, slice_at, write_at};
use crate::domain::traits::{
    NativeHashArgs, SandboxError, SandboxInstance, SandboxResult, SandboxStats,
};

/// Size of the buffer that receives the encoded string
pub const ENCODED_BUFFER_LEN: u32 = 512;

/// Argon2 hasher running every request in its own sandbox
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use argonbox_core::{HashParams, HashRequest};
/// use argonbox_sandbox::{Argon2Hasher, NativeSandbox, SandboxLifecycle};
///
/// let lifecycle = SandboxLifecycle::without_image(Arc::new(NativeSandbox::new()));
/// let hasher = Argon2Hasher::new(lifecycle, HashParams::default());
///
/// let result = hasher.hash(&HashRequest::new("password", "somesalt")).await?;
/// println!("{}", result.encoded);
/// ```
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    lifecycle: SandboxLifecycle,
    defaults: HashParams,
}

impl Argon2Hasher {
    pub fn new(lifecycle: SandboxLifecycle, defaults: HashParams) -> Self {
        Self {
            lifecycle,
            defaults,
        }
    }

    /// Parameters substituted for unset request fields
    pub fn defaults(&self) -> &HashParams {
        &self.defaults
    }

    pub fn lifecycle(&self) -> &SandboxLifecycle {
        &self.lifecycle
    }

    /// Hash `request` in a fresh sandbox
    pub async fn hash(&self, request: &HashRequest) -> Result<HashResult, HashExecutionError> {
        self.hash_with_stats(request).await.map(|(result, _)| result)
    }

    /// Hash `request` and report timing and memory statistics
    #[instrument(skip(self, request), fields(backend = %self.lifecycle.backend_name()))]
    pub async fn hash_with_stats(
        &self,
        request: &HashRequest,
    ) -> Result<(HashResult, SandboxStats), HashExecutionError> {
        let params = request.resolve(&self.defaults);
        self.run(request.password.clone(), request.salt.clone(), params)
            .await
    }

    /// Check `password` against an encoded Argon2 hash
    ///
    /// The salt, costs and variant come from `encoded`. When `variant` is
    /// given it must match the encoded one. The recomputed hash is compared in
    /// constant time.
    #[instrument(skip(self, password, encoded), fields(backend = %self.lifecycle.backend_name()))]
    pub async fn verify(
        &self,
        password: &[u8],
        encoded: &str,
        variant: Option<Argon2Variant>,
    ) -> Result<bool, HashExecutionError> {
        let expected = EncodedHash::parse(encoded)?;
        if let Some(variant) = variant {
            if variant != expected.params.variant {
                return Err(HashExecutionError::InvalidEncoding(format!(
                    "expected {} but the hash uses {}",
                    variant, expected.params.variant
                )));
            }
        }

        let (computed, _) = self
            .run(password.to_vec(), expected.salt, expected.params)
            .await?;
        let matches: bool = computed.hash.ct_eq(&expected.hash).into();
        debug!(matches, "Verification finished");
        Ok(matches)
    }

    async fn run(
        &self,
        password: Vec<u8>,
        salt: Vec<u8>,
        params: HashParams,
    ) -> Result<(HashResult, SandboxStats), HashExecutionError> {
        if !self.lifecycle.is_available() {
            return Err(HashExecutionError::Environment(format!(
                "{} backend is not available",
                self.lifecycle.backend_name()
            )));
        }

        let setup_start = Instant::now();
        let instance = self
            .lifecycle
            .create_sandbox(params.memory_cost_kib)
            .await
            .map_err(HashExecutionError::Instantiation)?;
        let setup_time_us = setup_start.elapsed().as_micros() as u64;

        let (result, mut stats) = tokio::task::spawn_blocking(move || {
            execute(instance, &password, &salt, &params)
        })
        .await
        .map_err(|e| HashExecutionError::Aborted(e.to_string()))??;

        stats.setup_time_us = setup_time_us;
        info!(
            variant = %params.variant,
            time_cost = params.time_cost,
            memory_cost_kib = params.memory_cost_kib,
            setup_time_us = stats.setup_time_us,
            execution_time_us = stats.execution_time_us,
            memory_pages = stats.memory_pages,
            "Hash computed"
        );
        Ok((result, stats))
    }
}

/// Run the native call on a live instance; blocking
fn execute(
    mut instance: Box<dyn SandboxInstance>,
    password: &[u8],
    salt: &[u8],
    params: &HashParams,
) -> Result<(HashResult, SandboxStats), HashExecutionError> {
    let mut buffers = NativeBuffers::new(instance.as_mut());

    let pwd = buffers
        .place_c_string(password)
        .map_err(HashExecutionError::Allocation)?;
    let salt_address = buffers
        .place_c_string(salt)
        .map_err(HashExecutionError::Allocation)?;
    let hash = buffers
        .zeroed(params.hash_length)
        .map_err(HashExecutionError::Allocation)?;
    let encoded = buffers
        .zeroed(ENCODED_BUFFER_LEN)
        .map_err(HashExecutionError::Allocation)?;

    let args = NativeHashArgs {
        time_cost: params.time_cost,
        memory_cost_kib: params.memory_cost_kib,
        parallelism: params.parallelism,
        pwd,
        pwd_len: password.len() as u32,
        salt: salt_address,
        salt_len: salt.len() as u32,
        hash,
        hash_len: params.hash_length,
        encoded,
        encoded_len: ENCODED_BUFFER_LEN,
        variant: params.variant.as_native(),
        version: ARGON2_VERSION,
    };

    let call_start = Instant::now();
    let status = buffers.instance().hash_native(&args);
    let execution_time_us = call_start.elapsed().as_micros() as u64;

    let outcome = match status {
        Ok(0) => read_outputs(buffers.instance(), hash, params.hash_length, encoded),
        Ok(code) => {
            let message = error_message(buffers.instance(), code);
            Err(HashError::new(message, code))
        }
        Err(SandboxError::Trap(message)) => Err(HashError::without_status(message)),
        Err(err) => Err(HashError::without_status(err.to_string())),
    };

    let memory_pages = buffers.instance().memory_pages();
    let failed_frees = buffers.release();

    let result = outcome?;
    Ok((
        result,
        SandboxStats {
            setup_time_us: 0,
            execution_time_us,
            memory_pages,
            failed_frees,
        },
    ))
}

/// Copy the hash and the encoded string out of the instance
fn read_outputs(
    instance: &dyn SandboxInstance,
    hash: u32,
    hash_len: u32,
    encoded: u32,
) -> Result<HashResult, HashError> {
    let memory = instance.memory();
    let raw = slice_at(memory, hash, hash_len as usize)
        .map_err(|e| HashError::without_status(e.to_string()))?
        .to_vec();
    let text = read_c_string(memory, encoded, Some(ENCODED_BUFFER_LEN as usize))
        .map_err(|e| HashError::without_status(e.to_string()))?;
    Ok(HashResult::new(raw, text))
}

/// Resolve `code` through the primitive's own message table
///
/// A failed lookup yields an empty message so the status is still reported.
fn error_message(instance: &mut dyn SandboxInstance, code: i32) -> String {
    let message = match instance.error_message_native(code) {
        Ok(address) => read_c_string(instance.memory(), address, None),
        Err(err) => Err(err),
    };
    message.unwrap_or_else(|err| {
        warn!(code, error = %err, "Failed to resolve error message");
        String::new()
    })
}

/// Native buffers allocated for one call, freed when dropped
struct NativeBuffers<'a> {
    instance: &'a mut dyn SandboxInstance,
    addresses: Vec<u32>,
}

impl<'a> NativeBuffers<'a> {
    fn new(instance: &'a mut dyn SandboxInstance) -> Self {
        Self {
            instance,
            addresses: Vec::with_capacity(4),
        }
    }

    fn instance(&mut self) -> &mut dyn SandboxInstance {
        &mut *self.instance
    }

    fn allocate(&mut self, size: u32) -> SandboxResult<u32> {
        let address = self.instance.allocate(size)?;
        self.addresses.push(address);
        Ok(address)
    }

    /// Copy `bytes` followed by a NUL terminator into a new buffer
    fn place_c_string(&mut self, bytes: &[u8]) -> SandboxResult<u32> {
        let size = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| len.checked_add(1))
            .ok_or(SandboxError::AllocationFailed { size: u32::MAX })?;
        let address = self.allocate(size)?;
        let memory = self.instance.memory_mut();
        write_at(memory, address, bytes)?;
        write_at(memory, address + size - 1, &[0])?;
        Ok(address)
    }

    /// Allocate `size` bytes and clear them
    fn zeroed(&mut self, size: u32) -> SandboxResult<u32> {
        let address = self.allocate(size)?;
        let start = address as usize;
        let memory = self.instance.memory_mut();
        let memory_size = memory.len();
        start
            .checked_add(size as usize)
            .and_then(|end| memory.get_mut(start..end))
            .ok_or(SandboxError::OutOfBounds {
                address,
                len: size as usize,
                memory_size,
            })?
            .fill(0);
        Ok(address)
    }

    /// Free every buffer once; returns how many frees failed
    fn release(&mut self) -> u32 {
        let mut failed = 0;
        for address in self.addresses.drain(..) {
            if let Err(err) = self.instance.free(address) {
                warn!(address, error = %err, "Failed to free native buffer");
                failed += 1;
            }
        }
        failed
    }
}

impl Drop for NativeBuffers<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Fields recovered from an encoded Argon2 hash
#[derive(Debug)]
struct EncodedHash {
    params: HashParams,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl EncodedHash {
    /// Parse `$argon2<x>$v=<n>$m=<m>,t=<t>,p=<p>$<salt>$<hash>`
    ///
    /// Salt and hash are unpadded standard base64 of any length, matching
    /// what the primitive writes.
    fn parse(encoded: &str) -> Result<Self, HashExecutionError> {
        let invalid = |reason: String| HashExecutionError::InvalidEncoding(reason);

        let fields: Vec<&str> = encoded.split('$').collect();
        let [empty, algorithm, version, costs, salt, hash] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected 5 '$'-separated fields, found {}",
                fields.len().saturating_sub(1)
            )));
        };
        if !empty.is_empty() {
            return Err(invalid("encoded hash must start with '$'".to_string()));
        }

        let variant = match *algorithm {
            "argon2d" => Argon2Variant::Argon2d,
            "argon2i" => Argon2Variant::Argon2i,
            "argon2id" => Argon2Variant::Argon2id,
            other => return Err(invalid(format!("unsupported algorithm '{}'", other))),
        };

        match version.strip_prefix("v=").map(str::parse::<u32>) {
            Some(Ok(ARGON2_VERSION)) => {}
            _ => {
                return Err(invalid(format!(
                    "unsupported version '{}', expected v={}",
                    version, ARGON2_VERSION
                )));
            }
        }

        let (mut memory_cost_kib, mut time_cost, mut parallelism) = (None, None, None);
        for pair in costs.split(',') {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed parameter '{}'", pair)))?;
            let slot = match name {
                "m" => &mut memory_cost_kib,
                "t" => &mut time_cost,
                "p" => &mut parallelism,
                other => return Err(invalid(format!("unknown parameter '{}'", other))),
            };
            if slot.is_some() {
                return Err(invalid(format!("duplicate parameter '{}'", name)));
            }
            let value = value
                .parse::<u32>()
                .map_err(|e| invalid(format!("parameter '{}': {}", name, e)))?;
            *slot = Some(value);
        }
        let required = |value: Option<u32>, name: &str| {
            value.ok_or_else(|| invalid(format!("missing parameter '{}'", name)))
        };

        let decode = |text: &str, what: &str| {
            if text.is_empty() {
                return Err(invalid(format!("missing {}", what)));
            }
            STANDARD_NO_PAD
                .decode(text)
                .map_err(|e| invalid(format!("{}: {}", what, e)))
        };
        let salt = decode(*salt, "salt")?;
        let hash = decode(*hash, "hash")?;

        Ok(Self {
            params: HashParams {
                time_cost: required(time_cost, "t")?,
                memory_cost_kib: required(memory_cost_kib, "m")?,
                parallelism: required(parallelism, "p")?,
                hash_length: hash.len() as u32,
                variant,
            },
            salt,
            hash,
        })
    }
}

/// Error type for a sandboxed hash operation
#[derive(Debug, thiserror::Error)]
pub enum HashExecutionError {
    /// The sandbox backend cannot run here
    #[error("Sandbox environment unavailable: {0}")]
    Environment(String),

    /// The module image could not be loaded or instantiated
    #[error("Sandbox instantiation failed: {0}")]
    Instantiation(#[source] SandboxError),

    /// A native buffer could not be allocated or filled
    #[error("Native buffer allocation failed: {0}")]
    Allocation(#[source] SandboxError),

    /// The primitive reported a failure or trapped
    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),

    /// An encoded hash could not be parsed
    #[error("Invalid encoded hash: {0}")]
    InvalidEncoding(String),

    /// The blocking hash task panicked or was cancelled
    #[error("Hash task aborted: {0}")]
    Aborted(String),
}

impl HashExecutionError {
    /// The primitive's failure, when that is what this error carries
    pub fn hash_error(&self) -> Option<&HashError> {
        match self {
            Self::Hash(err) => Some(err),
            _ => None,
        }
    }
}
