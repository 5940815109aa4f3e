//! Foundation module - shared building blocks
//!
//! - Math aliases and the owner-reported [`math::Transform`]
//! - Slot pool and handle-map re-exports backing every index
//! - Logger setup for binaries and tests

pub mod collections;
pub mod logging;
pub mod math;
