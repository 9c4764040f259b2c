//! Sandbox domain: traits, value objects and memory sizing

pub mod abi;
pub mod image;
pub mod limits;
pub mod memory;
pub mod traits;
