//! Utils Module - Helper Functions & Shared Utilities

pub mod address;
pub mod cache;
pub mod constants;
pub mod decoder;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use decoder::*;
pub use telemetry::*;
