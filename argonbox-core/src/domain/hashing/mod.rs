//! Argon2 hashing domain model

pub mod results;
pub mod value_objects;

pub use results::{HashError, HashResult};
pub use value_objects::{
    ARGON2_VERSION, Argon2Variant, DEFAULT_HASH_LENGTH, DEFAULT_MEMORY_COST_KIB,
    DEFAULT_PARALLELISM, DEFAULT_TIME_COST, HashParams, HashRequest, ParseVariantError,
};
