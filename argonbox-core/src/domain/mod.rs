//! Domain Layer - Password hashing value objects
//!
//! Types in this layer describe a single hash operation: what the caller asks
//! for, which parameters actually reach the primitive, and what comes back.

pub mod hashing;

pub use hashing::*;
