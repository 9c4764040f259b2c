//! Hash request value objects

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Argon2 version passed to the primitive (v1.3)
pub const ARGON2_VERSION: u32 = 0x13;

/// Default number of iterations
pub const DEFAULT_TIME_COST: u32 = 300;

/// Default working memory in KiB
pub const DEFAULT_MEMORY_COST_KIB: u32 = 1 << 10;

/// Default degree of parallelism
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Default raw hash length in bytes
pub const DEFAULT_HASH_LENGTH: u32 = 64;

/// Argon2 sub-algorithm selector
///
/// The discriminants are the selector values understood by the native
/// primitive and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Argon2Variant {
    /// Data-dependent memory access
    Argon2d = 0,
    /// Data-independent memory access
    #[default]
    Argon2i = 1,
    /// Hybrid of the two
    Argon2id = 2,
}

impl Argon2Variant {
    /// Selector value passed across the sandbox boundary
    pub fn as_native(self) -> i32 {
        self as i32
    }

    /// Algorithm identifier used in encoded hash strings
    pub fn ident(self) -> &'static str {
        match self {
            Self::Argon2d => "argon2d",
            Self::Argon2i => "argon2i",
            Self::Argon2id => "argon2id",
        }
    }

    /// Look up a variant from its native selector value
    pub fn from_native(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Argon2d),
            1 => Some(Self::Argon2i),
            2 => Some(Self::Argon2id),
            _ => None,
        }
    }
}

impl fmt::Display for Argon2Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ident())
    }
}

/// Error returned when a variant name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown Argon2 variant '{0}' (expected argon2d, argon2i or argon2id)")]
pub struct ParseVariantError(pub String);

impl FromStr for Argon2Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "argon2d" | "d" | "0" => Ok(Self::Argon2d),
            "argon2i" | "i" | "1" => Ok(Self::Argon2i),
            "argon2id" | "id" | "2" => Ok(Self::Argon2id),
            _ => Err(ParseVariantError(s.to_string())),
        }
    }
}

/// Effective cost parameters for one hash operation
///
/// Every field is populated; this is what crosses the sandbox boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
    pub hash_length: u32,
    pub variant: Argon2Variant,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost_kib: DEFAULT_MEMORY_COST_KIB,
            parallelism: DEFAULT_PARALLELISM,
            hash_length: DEFAULT_HASH_LENGTH,
            variant: Argon2Variant::default(),
        }
    }
}

/// Inputs for a single hash operation
///
/// Cost fields are optional. An unset field, or one set to zero, is replaced
/// by the corresponding default when the request is resolved.
///
/// # Example
///
/// ```rust
/// use argonbox_core::domain::{Argon2Variant, HashParams, HashRequest};
///
/// let request = HashRequest::new("password", "somesalt")
///     .with_time_cost(2)
///     .with_memory_cost_kib(16)
///     .with_variant(Argon2Variant::Argon2id);
///
/// let params = request.resolve(&HashParams::default());
/// assert_eq!(params.time_cost, 2);
/// assert_eq!(params.hash_length, 64);
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRequest {
    /// Password bytes (UTF-8 when built from text)
    pub password: Vec<u8>,
    /// Salt bytes (UTF-8 when built from text)
    pub salt: Vec<u8>,
    pub time_cost: Option<u32>,
    pub memory_cost_kib: Option<u32>,
    pub parallelism: Option<u32>,
    pub hash_length: Option<u32>,
    pub variant: Option<Argon2Variant>,
}

impl HashRequest {
    /// Build a request from text; both strings are taken as their UTF-8 bytes
    pub fn new(password: &str, salt: &str) -> Self {
        Self::from_bytes(password.as_bytes(), salt.as_bytes())
    }

    /// Build a request from raw bytes
    pub fn from_bytes(password: impl Into<Vec<u8>>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
            salt: salt.into(),
            ..Self::default()
        }
    }

    pub fn with_time_cost(mut self, time_cost: u32) -> Self {
        self.time_cost = Some(time_cost);
        self
    }

    pub fn with_memory_cost_kib(mut self, memory_cost_kib: u32) -> Self {
        self.memory_cost_kib = Some(memory_cost_kib);
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_hash_length(mut self, hash_length: u32) -> Self {
        self.hash_length = Some(hash_length);
        self
    }

    pub fn with_variant(mut self, variant: Argon2Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Resolve the effective parameters, substituting `defaults` for any
    /// unset or zero field
    pub fn resolve(&self, defaults: &HashParams) -> HashParams {
        HashParams {
            time_cost: or_default(self.time_cost, defaults.time_cost),
            memory_cost_kib: or_default(self.memory_cost_kib, defaults.memory_cost_kib),
            parallelism: or_default(self.parallelism, defaults.parallelism),
            hash_length: or_default(self.hash_length, defaults.hash_length),
            variant: self.variant.unwrap_or(defaults.variant),
        }
    }
}

fn or_default(value: Option<u32>, default: u32) -> u32 {
    value.filter(|v| *v != 0).unwrap_or(default)
}

impl fmt::Debug for HashRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRequest")
            .field("password", &format_args!("<{} bytes>", self.password.len()))
            .field("salt_len", &self.salt.len())
            .field("time_cost", &self.time_cost)
            .field("memory_cost_kib", &self.memory_cost_kib)
            .field("parallelism", &self.parallelism)
            .field("hash_length", &self.hash_length)
            .field("variant", &self.variant)
            .finish()
    }
}
