//! Models Module - Data Structures & Configuration
//!
//! Request/result records, chain definitions and the error type.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
