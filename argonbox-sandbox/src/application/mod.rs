//! Sandbox use cases

pub mod hasher;
pub mod lifecycle;
pub mod selector;
