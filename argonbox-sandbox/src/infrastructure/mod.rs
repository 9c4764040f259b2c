//! Sandbox infrastructure implementations

pub mod image;
pub mod native;
pub mod wasm;
