//! Type definitions for the cross-chain tracer
//! Request, canonical event and result records shared by adapters and the tracer

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::utils::address;

// ============================================
// REQUEST
// ============================================

/// Expansion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Follow funds to where they went
    Forward,
    /// Follow funds back to where they came from
    Backward,
    /// Both, merged into one graph
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
            Self::Both => "BOTH",
        }
    }

    /// Concrete expansion passes this direction runs
    pub fn passes(&self) -> &'static [Direction] {
        match self {
            Self::Forward => &[Direction::Forward],
            Self::Backward => &[Direction::Backward],
            Self::Both => &[Direction::Forward, Direction::Backward],
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "fwd" | "out" => Ok(Self::Forward),
            "backward" | "bwd" | "in" => Ok(Self::Backward),
            "both" => Ok(Self::Both),
            other => Err(AppError::invalid_parameter(format!("unknown direction '{}'", other))),
        }
    }
}

/// Taint propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaintModel {
    #[default]
    Proportional,
}

/// Value-movement category; declaration order is the expansion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Native,
    Token,
    Utxo,
    Bridge,
}

impl Category {
    pub const ORDERED: [Category; 4] = [
        Category::Native,
        Category::Token,
        Category::Utxo,
        Category::Bridge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Token => "token",
            Self::Utxo => "utxo",
            Self::Bridge => "bridge",
        }
    }
}

/// Optional block window for account-model adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockRange {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl BlockRange {
    pub fn is_open(&self) -> bool {
        self.from_block.is_none() && self.to_block.is_none()
    }
}

/// Trace parameters; immutable once the trace starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRequest {
    pub source_chain: Chain,
    pub source_address: String,
    pub direction: Direction,
    pub taint_model: TaintModel,
    /// Hop ceiling
    pub max_depth: u32,
    /// Node ceiling (source not counted)
    pub max_nodes: usize,
    /// Edges below this taint are pruned
    pub min_taint_threshold: Decimal,
    pub native_decay: Decimal,
    pub token_decay: Decimal,
    pub bridge_decay: Decimal,
    pub utxo_decay: Decimal,
    pub enable_native: bool,
    pub enable_token: bool,
    pub enable_bridge: bool,
    pub enable_utxo: bool,
    #[serde(default)]
    pub block_range: BlockRange,
}

impl TraceRequest {
    /// Request with default limits: depth 3, 100 nodes, threshold 0.001,
    /// bridge decay 0.95 and every category enabled
    pub fn new(source_chain: Chain, source_address: impl Into<String>) -> Self {
        Self {
            source_chain,
            source_address: source_address.into(),
            direction: Direction::Forward,
            taint_model: TaintModel::Proportional,
            max_depth: 3,
            max_nodes: 100,
            min_taint_threshold: Decimal::new(1, 3),
            native_decay: Decimal::ONE,
            token_decay: Decimal::ONE,
            bridge_decay: Decimal::new(95, 2),
            utxo_decay: Decimal::ONE,
            enable_native: true,
            enable_token: true,
            enable_bridge: true,
            enable_utxo: true,
            block_range: BlockRange::default(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_limits(mut self, max_depth: u32, max_nodes: usize) -> Self {
        self.max_depth = max_depth;
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_threshold(mut self, min_taint_threshold: Decimal) -> Self {
        self.min_taint_threshold = min_taint_threshold;
        self
    }

    pub fn decay_for(&self, category: Category) -> Decimal {
        match category {
            Category::Native => self.native_decay,
            Category::Token => self.token_decay,
            Category::Utxo => self.utxo_decay,
            Category::Bridge => self.bridge_decay,
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Native => self.enable_native,
            Category::Token => self.enable_token,
            Category::Utxo => self.enable_utxo,
            Category::Bridge => self.enable_bridge,
        }
    }

    /// Reject malformed or contradictory requests before any traversal
    pub fn validate(&self) -> AppResult<()> {
        address::validate(self.source_chain, &self.source_address)?;

        if self.max_depth == 0 {
            return Err(AppError::invalid_parameter("max_depth must be at least 1"));
        }
        if self.max_nodes == 0 {
            return Err(AppError::invalid_parameter("max_nodes must be at least 1"));
        }
        if self.min_taint_threshold < Decimal::ZERO || self.min_taint_threshold > Decimal::ONE {
            return Err(AppError::invalid_parameter(
                "min_taint_threshold must be within [0, 1]",
            ));
        }
        for category in Category::ORDERED {
            let decay = self.decay_for(category);
            if decay < Decimal::ZERO || decay > Decimal::ONE {
                return Err(AppError::invalid_parameter(format!(
                    "{}_decay must be within [0, 1], got {}",
                    category.as_str(),
                    decay
                )));
            }
        }
        if !Category::ORDERED.iter().any(|c| self.is_enabled(*c)) {
            return Err(AppError::invalid_parameter("every category is disabled"));
        }
        if let (Some(from), Some(to)) = (self.block_range.from_block, self.block_range.to_block) {
            if from > to {
                return Err(AppError::invalid_parameter(format!(
                    "block range is inverted ({} > {})",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

// ============================================
// CANONICAL EVENT
// ============================================

/// Normalized event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Transfer,
    TokenTransfer,
    UtxoSpend,
    Bridge,
    ContractCall,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::TokenTransfer => "token_transfer",
            Self::UtxoSpend => "utxo_spend",
            Self::Bridge => "bridge",
            Self::ContractCall => "contract_call",
            Self::Unknown => "unknown",
        }
    }
}

/// One leg of a multi-output transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTransfer {
    pub from_address: String,
    pub to_address: String,
    pub value: Decimal,
    /// Token contract / mint; `None` for the native asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Raw facts the bridge detector classifies on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeMetadata {
    /// Called contract / invoked program
    pub contract: Option<String>,
    /// 4-byte selector (EVM) or instruction discriminator, 0x-hex
    pub selector: Option<String>,
    /// topic0 of every receipt log
    #[serde(default)]
    pub topics: Vec<String>,
    /// Destination chain stated by the payload itself
    pub destination_chain_hint: Option<Chain>,
    /// Recipient on the destination chain
    pub recipient: Option<String>,
}

/// Chain-agnostic value movement produced by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub chain: Chain,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub event_type: EventType,
    /// Unix seconds; 0 when upstream does not report it
    pub timestamp: i64,
    /// Assigned by the tracer
    pub hop: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_transfers: Vec<SubTransfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeMetadata>,
}

impl CanonicalEvent {
    pub fn transfer(
        chain: Chain,
        tx_hash: impl Into<String>,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        value: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            chain,
            tx_hash: tx_hash.into(),
            from_address: from_address.into(),
            to_address: to_address.into(),
            value,
            asset: None,
            event_type: EventType::Transfer,
            timestamp,
            hop: 0,
            sub_transfers: Vec::new(),
            bridge: None,
        }
    }

    /// Legs used for taint splitting; an event without sub-transfers is its own leg
    pub fn legs(&self) -> Vec<SubTransfer> {
        if self.sub_transfers.is_empty() {
            vec![SubTransfer {
                from_address: self.from_address.clone(),
                to_address: self.to_address.clone(),
                value: self.value,
                asset: self.asset.clone(),
            }]
        } else {
            self.sub_transfers.clone()
        }
    }
}

// ============================================
// RESULT
// ============================================

/// Trace lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceStatus {
    Pending,
    Running,
    /// Frontier emptied
    Completed,
    /// A hard limit stopped the traversal; result is still usable
    Truncated,
    /// Internal error or cancellation; partial graph returned
    Failed,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Truncated => "TRUNCATED",
            Self::Failed => "FAILED",
        }
    }
}

/// Visited address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub chain: Chain,
    pub address: String,
    /// Sum of both ledgers; 1.0 for the source
    pub taint_received: Decimal,
    pub taint_sent: Decimal,
    /// Minimum hop at which the node was first reached
    pub hop_distance: u32,
    pub labels: BTreeSet<String>,
    pub taint_forward: Decimal,
    pub taint_backward: Decimal,
}

impl TraceNode {
    /// Result-map key, e.g. `ethereum:0xabc…`
    pub fn key(chain: Chain, address: &str) -> String {
        format!("{}:{}", chain.as_str(), address)
    }
}

/// Propagated taint along one transfer leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEdge {
    /// Chain the transaction executed on
    pub chain: Chain,
    pub from_address: String,
    pub to_address: String,
    pub tx_hash: String,
    pub value: Decimal,
    pub taint_value: Decimal,
    pub timestamp: i64,
    pub hop: u32,
    pub event_type: EventType,
    pub category: Category,
    /// Pass that produced the edge (FORWARD or BACKWARD)
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_from: Option<Chain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_to: Option<Chain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_confidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
}

impl TraceEdge {
    /// Chain of the node at the far end (`to_address` forward, `from_address` backward)
    pub fn counterpart_chain(&self) -> Chain {
        match self.direction {
            Direction::Backward => self.chain_from.unwrap_or(self.chain),
            _ => self.chain_to.unwrap_or(self.chain),
        }
    }
}

/// Failed adapter call, kept so partial data is visible to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub chain: Chain,
    pub address: String,
    pub category: Category,
    pub code: String,
    pub message: String,
}

/// Trace output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceResult {
    pub trace_id: String,
    pub source_chain: Chain,
    pub source_address: String,
    pub direction: Direction,
    pub taint_model: TaintModel,
    pub status: TraceStatus,
    /// Keyed `"<chain>:<address>"`
    pub nodes: BTreeMap<String, TraceNode>,
    pub edges: Vec<TraceEdge>,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_hop_reached: u32,
    /// Σ taint_received over non-source nodes
    pub total_taint_traced: Decimal,
    pub high_risk_addresses: Vec<String>,
    pub sanctioned_addresses: Vec<String>,
    pub adapter_failures: Vec<AdapterFailure>,
    pub started_at: DateTime<Utc>,
    pub execution_time_seconds: f64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TraceResult {
    /// Pretty JSON for export
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Edge list as CSV
    pub fn edges_csv(&self) -> String {
        let mut csv = String::from(
            "hop,direction,category,chain,from_address,to_address,tx_hash,value,asset,taint_value,value_usd,timestamp,event_type,bridge,chain_from,chain_to\n",
        );
        for e in &self.edges {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                e.hop,
                e.direction.as_str(),
                e.category.as_str(),
                e.chain,
                e.from_address,
                e.to_address,
                e.tx_hash,
                e.value,
                e.asset.as_deref().unwrap_or(""),
                e.taint_value,
                e.value_usd.map(|v| v.to_string()).unwrap_or_default(),
                e.timestamp,
                e.event_type.as_str(),
                csv_field(e.bridge.as_deref().unwrap_or("")),
                e.chain_from.map(|c| c.as_str()).unwrap_or(""),
                e.chain_to.map(|c| c.as_str()).unwrap_or(""),
            ));
        }
        csv
    }

    /// One-line human summary for logs
    pub fn summary(&self) -> String {
        let emoji = match self.status {
            TraceStatus::Completed if self.completed => "✅",
            TraceStatus::Completed | TraceStatus::Truncated => "🟡",
            _ => "🔴",
        };
        format!(
            "{} {} | {}:{} | nodes={} edges={} max_hop={} sanctioned={} high_risk={} failures={} | {:.2}s",
            emoji,
            self.status.as_str(),
            self.source_chain,
            self.source_address,
            self.total_nodes,
            self.total_edges,
            self.max_hop_reached,
            self.sanctioned_addresses.len(),
            self.high_risk_addresses.len(),
            self.adapter_failures.len(),
            self.execution_time_seconds
        )
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_request_defaults() {
        let req = TraceRequest::new(Chain::Ethereum, ADDR);
        assert_eq!(req.direction, Direction::Forward);
        assert_eq!(req.max_depth, 3);
        assert_eq!(req.max_nodes, 100);
        assert_eq!(req.min_taint_threshold.to_string(), "0.001");
        assert_eq!(req.decay_for(Category::Bridge).to_string(), "0.95");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_rejects_bad_parameters() {
        let req = TraceRequest::new(Chain::Ethereum, ADDR).with_limits(0, 10);
        assert!(req.validate().is_err());

        let mut req = TraceRequest::new(Chain::Ethereum, ADDR);
        req.token_decay = Decimal::new(15, 1);
        assert!(req.validate().is_err());

        let mut req = TraceRequest::new(Chain::Ethereum, ADDR);
        req.enable_native = false;
        req.enable_token = false;
        req.enable_bridge = false;
        req.enable_utxo = false;
        assert!(req.validate().is_err());

        let mut req = TraceRequest::new(Chain::Ethereum, ADDR);
        req.block_range = BlockRange { from_block: Some(10), to_block: Some(5) };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_request_rejects_bad_address() {
        let req = TraceRequest::new(Chain::Ethereum, "0x123");
        let err = req.validate().unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::InvalidAddress);
    }

    #[test]
    fn test_direction_parse_and_passes() {
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert_eq!(Direction::Both.passes().len(), 2);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_legs_without_sub_transfers() {
        let ev = CanonicalEvent::transfer(Chain::Ethereum, "0xaa", ADDR, "0xbb", Decimal::ONE, 0);
        let legs = ev.legs();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].to_address, "0xbb");
    }

    #[test]
    fn test_node_key() {
        assert_eq!(TraceNode::key(Chain::Base, "0xab"), "base:0xab");
    }

    #[test]
    fn test_csv_field_quotes() {
        assert_eq!(csv_field("Wormhole, Portal"), "\"Wormhole, Portal\"");
        assert_eq!(csv_field("Hop"), "Hop");
    }
}
