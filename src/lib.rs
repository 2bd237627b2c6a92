//! Cross-Chain Tracer Library
//!
//! Follows tainted funds across EVM chains, Solana, UTXO chains and Tron:
//! - Forward, backward or bidirectional BFS from one source address
//! - Proportional taint splitting in fixed-point decimal
//! - Bridge detection by contract, selector and event topic
//! - Label, sanctions and USD price enrichment of the result graph

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{BridgeDetector, BridgeRegistry, TransactionTracer};
pub use models::{
    AppError, AppResult, CanonicalEvent, Category, Chain, ChainFamily, Direction, ErrorCode,
    TraceEdge, TraceNode, TraceRequest, TraceResult, TraceStatus, TracerConfig,
};
pub use providers::{AdapterRegistry, ChainAdapter};
pub use utils::{TelemetryStats, TraceTelemetry};
