//! Core Module - Traversal & Taint Engine
//!
//! Bridge detection, the trace graph, fixed-point taint arithmetic and the
//! BFS tracer that ties them to the chain adapters.

pub mod bridge;
pub mod graph;
pub mod taint;
pub mod tracer;

pub use bridge::{BridgeDetector, BridgeMatch, BridgeRegistry, Confidence, MatchKind};
pub use graph::TraceGraph;
pub use tracer::TransactionTracer;
