//! Bridge Registry & Detector
//!
//! The registry is built once (static data merged with an optional JSON
//! override file) and never mutated; reloading means building a new one.
//! The detector classifies canonical events against it:
//!
//! Match precedence: contract address → method selector → log topic0.
//!
//! Counterpart chain resolution:
//! 1. explicit hint in the event payload (high)
//! 2. exactly one counterpart chain / configured selector hint (high)
//! 3. topic0 → chain hint table (medium)
//! 4. recipient address shape (low)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{CanonicalEvent, Direction};
use crate::utils::address::{infer_family, normalize};
use crate::utils::constants::{STATIC_BRIDGES, STATIC_BRIDGE_TOPICS, STATIC_EXTRA_SELECTORS};

// ============================================
// REGISTRY DATA
// ============================================

/// Known bridge contract or program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeContract {
    pub address: String,
    pub chain: Chain,
    pub name: String,
    pub bridge_type: String,
    #[serde(default)]
    pub counterpart_chains: Vec<Chain>,
    #[serde(default)]
    pub method_selectors: Vec<String>,
}

/// Bridge event signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeTopic {
    pub topic: String,
    pub name: String,
    #[serde(default)]
    pub chain_hint: Option<Chain>,
}

/// Chain-specific bridge selector not tied to a listed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraSelector {
    pub chain: Chain,
    pub selector: String,
    pub name: String,
    #[serde(default)]
    pub chain_hint: Option<Chain>,
}

/// JSON override file layout
#[derive(Debug, Default, Deserialize)]
pub struct RegistryOverrides {
    #[serde(default)]
    pub contracts: Vec<BridgeContract>,
    #[serde(default)]
    pub topics: Vec<BridgeTopic>,
    #[serde(default)]
    pub extra_selectors: Vec<ExtraSelector>,
}

/// Everything known about one selector on one chain
#[derive(Debug, Clone, PartialEq)]
struct SelectorEntry {
    name: String,
    bridge_type: String,
    counterparts: Vec<Chain>,
}

/// Immutable bridge knowledge base
#[derive(Debug, Clone, Default)]
pub struct BridgeRegistry {
    contracts: HashMap<(Chain, String), BridgeContract>,
    selectors: HashMap<(Chain, String), SelectorEntry>,
    topics: HashMap<String, BridgeTopic>,
}

impl BridgeRegistry {
    /// Registry with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiled-in bridges, topics and extra selectors
    pub fn with_static() -> Self {
        let overrides = RegistryOverrides {
            contracts: STATIC_BRIDGES
                .iter()
                .map(|b| BridgeContract {
                    address: b.address.to_string(),
                    chain: b.chain,
                    name: b.name.to_string(),
                    bridge_type: b.bridge_type.to_string(),
                    counterpart_chains: b.counterparts.to_vec(),
                    method_selectors: b.selectors.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
            topics: STATIC_BRIDGE_TOPICS
                .iter()
                .map(|t| BridgeTopic {
                    topic: t.topic.to_string(),
                    name: t.name.to_string(),
                    chain_hint: t.chain_hint,
                })
                .collect(),
            extra_selectors: STATIC_EXTRA_SELECTORS
                .iter()
                .map(|s| ExtraSelector {
                    chain: s.chain,
                    selector: s.selector.to_string(),
                    name: s.name.to_string(),
                    chain_hint: s.chain_hint,
                })
                .collect(),
        };
        Self::empty().merged(overrides)
    }

    /// Static data, then the override file when one is given
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let registry = Self::with_static();
        let Some(path) = path else {
            return Ok(registry);
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::invalid_config(format!("bridge registry {}: {}", path.display(), e))
        })?;
        let overrides: RegistryOverrides = serde_json::from_str(&raw).map_err(|e| {
            AppError::invalid_config(format!("bridge registry {}: {}", path.display(), e))
        })?;

        let registry = registry.merged(overrides);
        info!(
            "🌉 Bridge registry: {} contracts, {} selectors, {} topics (overrides from {})",
            registry.contracts.len(),
            registry.selectors.len(),
            registry.topics.len(),
            path.display()
        );
        Ok(registry)
    }

    /// New registry with `overrides` applied; same address or topic replaces
    pub fn merged(mut self, overrides: RegistryOverrides) -> Self {
        for contract in overrides.contracts {
            let key = (contract.chain, normalize(contract.chain, &contract.address));
            self.contracts.insert(key, contract);
        }
        for topic in overrides.topics {
            self.topics.insert(topic.topic.to_lowercase(), topic);
        }
        self.rebuild_selectors(&overrides.extra_selectors);
        self
    }

    /// Selector index: contract selectors plus chain extras.
    /// A selector shared by several bridges unions their counterparts.
    fn rebuild_selectors(&mut self, extras: &[ExtraSelector]) {
        let retained_extras: Vec<((Chain, String), SelectorEntry)> = self
            .selectors
            .drain()
            .filter(|(_, entry)| entry.bridge_type == "selector")
            .collect();

        let mut contracts: Vec<&BridgeContract> = self.contracts.values().collect();
        contracts.sort_by(|a, b| (a.chain, &a.address).cmp(&(b.chain, &b.address)));

        let mut index: HashMap<(Chain, String), SelectorEntry> = retained_extras.into_iter().collect();
        for contract in contracts {
            for selector in &contract.method_selectors {
                let key = (contract.chain, selector.to_lowercase());
                match index.get_mut(&key) {
                    Some(entry) if entry.bridge_type != "selector" => {
                        for chain in &contract.counterpart_chains {
                            if !entry.counterparts.contains(chain) {
                                entry.counterparts.push(*chain);
                            }
                        }
                    }
                    Some(_) => {}
                    None => {
                        index.insert(
                            key,
                            SelectorEntry {
                                name: contract.name.clone(),
                                bridge_type: contract.bridge_type.clone(),
                                counterparts: contract.counterpart_chains.clone(),
                            },
                        );
                    }
                }
            }
        }

        for extra in extras {
            index.insert(
                (extra.chain, extra.selector.to_lowercase()),
                SelectorEntry {
                    name: extra.name.clone(),
                    bridge_type: "selector".to_string(),
                    counterparts: extra.chain_hint.into_iter().collect(),
                },
            );
        }

        self.selectors = index;
    }

    pub fn contract(&self, chain: Chain, address: &str) -> Option<&BridgeContract> {
        self.contracts.get(&(chain, normalize(chain, address)))
    }

    pub fn is_bridge(&self, chain: Chain, address: &str) -> bool {
        self.contract(chain, address).is_some()
    }

    fn selector(&self, chain: Chain, selector: &str) -> Option<&SelectorEntry> {
        self.selectors.get(&(chain, selector.to_lowercase()))
    }

    pub fn topic(&self, topic: &str) -> Option<&BridgeTopic> {
        self.topics.get(&topic.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

// ============================================
// DETECTOR
// ============================================

/// Which rule classified the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Address,
    Selector,
    Topic,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Selector => "selector",
            Self::Topic => "topic",
        }
    }
}

/// How the counterpart chain was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A classified bridge crossing
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeMatch {
    pub name: String,
    pub bridge_type: String,
    pub matched_by: MatchKind,
    /// Chain on the other side: destination when tracing forward, origin backward
    pub counterpart_chain: Option<Chain>,
    pub confidence: Option<Confidence>,
    /// Address on the counterpart chain when the payload names it
    pub recipient: Option<String>,
}

/// Match candidate before chain resolution
struct Candidate {
    name: String,
    bridge_type: String,
    matched_by: MatchKind,
    counterparts: Vec<Chain>,
}

pub struct BridgeDetector {
    registry: Arc<BridgeRegistry>,
}

impl BridgeDetector {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    /// Classify `event` as seen by a trace moving in `direction`.
    ///
    /// Forward looks at the receiving side (`to_address` / called contract);
    /// backward looks for a bridge releasing funds (`from_address`).
    pub fn classify(&self, event: &CanonicalEvent, direction: Direction) -> Option<BridgeMatch> {
        let candidate = self.candidate(event, direction)?;
        let (counterpart_chain, confidence) = self.resolve(event, direction, &candidate);

        debug!(
            "🌉 {} {} matched {} by {} → {:?} ({:?})",
            event.chain,
            event.tx_hash,
            candidate.name,
            candidate.matched_by.as_str(),
            counterpart_chain,
            confidence
        );

        Some(BridgeMatch {
            name: candidate.name,
            bridge_type: candidate.bridge_type,
            matched_by: candidate.matched_by,
            counterpart_chain,
            confidence,
            recipient: match direction {
                Direction::Backward => None,
                _ => event.bridge.as_ref().and_then(|m| m.recipient.clone()),
            },
        })
    }

    fn candidate(&self, event: &CanonicalEvent, direction: Direction) -> Option<Candidate> {
        let chain = event.chain;
        let metadata = event.bridge.as_ref();

        // 1. Address
        let side = match direction {
            Direction::Backward => &event.from_address,
            _ => &event.to_address,
        };
        let by_address = metadata
            .and_then(|m| m.contract.as_deref())
            .and_then(|c| self.registry.contract(chain, c))
            .or_else(|| self.registry.contract(chain, side));
        if let Some(contract) = by_address {
            return Some(Candidate {
                name: contract.name.clone(),
                bridge_type: contract.bridge_type.clone(),
                matched_by: MatchKind::Address,
                counterparts: contract.counterpart_chains.clone(),
            });
        }

        // Selector and topic rules describe outbound calls
        if direction == Direction::Backward {
            return None;
        }
        let metadata = metadata?;

        // 2. Selector
        if let Some(entry) = metadata
            .selector
            .as_deref()
            .and_then(|s| self.registry.selector(chain, s))
        {
            return Some(Candidate {
                name: entry.name.clone(),
                bridge_type: entry.bridge_type.clone(),
                matched_by: MatchKind::Selector,
                counterparts: entry.counterparts.clone(),
            });
        }

        // 3. Topic
        metadata
            .topics
            .iter()
            .find_map(|t| self.registry.topic(t))
            .map(|topic| Candidate {
                name: topic.name.clone(),
                bridge_type: "message".to_string(),
                matched_by: MatchKind::Topic,
                // resolved through the hint table, not as a contract counterpart
                counterparts: Vec::new(),
            })
    }

    fn resolve(
        &self,
        event: &CanonicalEvent,
        direction: Direction,
        candidate: &Candidate,
    ) -> (Option<Chain>, Option<Confidence>) {
        let chain = event.chain;
        let metadata = event.bridge.as_ref();
        let other_side = |c: &Chain| *c != chain;

        // (a) explicit hint
        if direction != Direction::Backward {
            if let Some(hint) = metadata
                .and_then(|m| m.destination_chain_hint)
                .filter(other_side)
            {
                return (Some(hint), Some(Confidence::High));
            }
        }

        // (b) single counterpart
        let counterparts: Vec<Chain> = candidate
            .counterparts
            .iter()
            .copied()
            .filter(other_side)
            .collect();
        if counterparts.len() == 1 {
            return (Some(counterparts[0]), Some(Confidence::High));
        }

        // (c) topic hint table
        if let Some(hint) = metadata
            .into_iter()
            .flat_map(|m| m.topics.iter())
            .filter_map(|t| self.registry.topic(t))
            .find_map(|t| t.chain_hint.filter(other_side))
        {
            return (Some(hint), Some(Confidence::Medium));
        }

        // (d) recipient address shape
        if direction != Direction::Backward {
            if let Some(inferred) = metadata
                .and_then(|m| m.recipient.as_deref())
                .and_then(infer_family)
                .map(|family| family.canonical_chain())
                .filter(other_side)
                .filter(|c| counterparts.is_empty() || counterparts.contains(c))
            {
                return (Some(inferred), Some(Confidence::Low));
            }
        }

        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{BridgeMetadata, EventType};
    use rust_decimal_macros::dec;

    const SENDER: &str = "0x1111111111111111111111111111111111111111";
    const PORTAL: &str = "0x3ee18b2214aff97000d974cf647e7c347e8fa585";
    const OP_BRIDGE: &str = "0x99c9fc46f92e8a1c0dec1b1747d010903e884be1";
    const SOL_RECIPIENT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn event(to: &str, metadata: Option<BridgeMetadata>) -> CanonicalEvent {
        let mut event = CanonicalEvent::transfer(Chain::Ethereum, "0xtx", SENDER, to, dec!(1), 0);
        event.bridge = metadata;
        event
    }

    fn detector() -> BridgeDetector {
        BridgeDetector::new(Arc::new(BridgeRegistry::with_static()))
    }

    #[test]
    fn test_single_counterpart_is_high_confidence() {
        let m = detector()
            .classify(&event(OP_BRIDGE, None), Direction::Forward)
            .unwrap();
        assert_eq!(m.matched_by, MatchKind::Address);
        assert_eq!(m.counterpart_chain, Some(Chain::Optimism));
        assert_eq!(m.confidence, Some(Confidence::High));
    }

    #[test]
    fn test_explicit_hint_wins_over_counterparts() {
        let meta = BridgeMetadata {
            contract: Some(PORTAL.to_string()),
            destination_chain_hint: Some(Chain::Base),
            ..Default::default()
        };
        let m = detector()
            .classify(&event(PORTAL, Some(meta)), Direction::Forward)
            .unwrap();
        assert_eq!(m.counterpart_chain, Some(Chain::Base));
        assert_eq!(m.confidence, Some(Confidence::High));
    }

    #[test]
    fn test_address_shape_is_last_resort() {
        let meta = BridgeMetadata {
            contract: Some(PORTAL.to_string()),
            recipient: Some(SOL_RECIPIENT.to_string()),
            ..Default::default()
        };
        let m = detector()
            .classify(&event(PORTAL, Some(meta)), Direction::Forward)
            .unwrap();
        assert_eq!(m.counterpart_chain, Some(Chain::Solana));
        assert_eq!(m.confidence, Some(Confidence::Low));
        assert_eq!(m.recipient.as_deref(), Some(SOL_RECIPIENT));
    }

    #[test]
    fn test_ambiguous_without_hints_is_unresolved() {
        let m = detector()
            .classify(&event(PORTAL, None), Direction::Forward)
            .unwrap();
        assert_eq!(m.name, "Wormhole Portal");
        assert!(m.counterpart_chain.is_none());
        assert!(m.confidence.is_none());
    }

    #[test]
    fn test_selector_match_on_unlisted_contract() {
        let meta = BridgeMetadata {
            contract: Some("0x2222222222222222222222222222222222222222".to_string()),
            selector: Some("0x439370B1".to_string()),
            ..Default::default()
        };
        let m = detector()
            .classify(
                &event("0x2222222222222222222222222222222222222222", Some(meta)),
                Direction::Forward,
            )
            .unwrap();
        assert_eq!(m.matched_by, MatchKind::Selector);
        assert_eq!(m.counterpart_chain, Some(Chain::Arbitrum));
    }

    #[test]
    fn test_topic_match_uses_hint_table() {
        let meta = BridgeMetadata {
            contract: Some("0x2222222222222222222222222222222222222222".to_string()),
            topics: vec![crate::utils::constants::POLYGON_STATE_SYNCED_TOPIC.to_string()],
            ..Default::default()
        };
        let m = detector()
            .classify(
                &event("0x2222222222222222222222222222222222222222", Some(meta)),
                Direction::Forward,
            )
            .unwrap();
        assert_eq!(m.matched_by, MatchKind::Topic);
        assert_eq!(m.counterpart_chain, Some(Chain::Polygon));
        assert_eq!(m.confidence, Some(Confidence::Medium));
    }

    #[test]
    fn test_address_precedence_over_selector() {
        let meta = BridgeMetadata {
            contract: Some(OP_BRIDGE.to_string()),
            selector: Some("0x439370b1".to_string()),
            ..Default::default()
        };
        let m = detector()
            .classify(&event(OP_BRIDGE, Some(meta)), Direction::Forward)
            .unwrap();
        assert_eq!(m.matched_by, MatchKind::Address);
        assert_eq!(m.counterpart_chain, Some(Chain::Optimism));
    }

    #[test]
    fn test_plain_transfer_not_a_bridge() {
        let e = event("0x2222222222222222222222222222222222222222", None);
        assert_eq!(e.event_type, EventType::Transfer);
        assert!(detector().classify(&e, Direction::Forward).is_none());
    }

    #[test]
    fn test_backward_matches_releasing_contract() {
        let mut e = CanonicalEvent::transfer(Chain::Ethereum, "0xtx", OP_BRIDGE, SENDER, dec!(1), 0);
        e.bridge = None;
        let m = detector().classify(&e, Direction::Backward).unwrap();
        assert_eq!(m.counterpart_chain, Some(Chain::Optimism));
        assert!(detector().classify(&e, Direction::Forward).is_none());
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let overrides: RegistryOverrides = serde_json::from_value(serde_json::json!({
            "contracts": [{
                "address": OP_BRIDGE,
                "chain": "ethereum",
                "name": "Custom OP",
                "bridge_type": "canonical_rollup",
                "counterpart_chains": ["base"]
            }],
            "topics": [],
            "extra_selectors": [{
                "chain": "bsc", "selector": "0xdeadbeef", "name": "BSC Thing", "chain_hint": "ethereum"
            }]
        }))
        .unwrap();
        let registry = Arc::new(BridgeRegistry::with_static().merged(overrides));
        assert_eq!(registry.contract(Chain::Ethereum, OP_BRIDGE).unwrap().name, "Custom OP");

        let detector = BridgeDetector::new(registry);
        let m = detector.classify(&event(OP_BRIDGE, None), Direction::Forward).unwrap();
        assert_eq!(m.counterpart_chain, Some(Chain::Base));

        let mut bsc = CanonicalEvent::transfer(Chain::Bsc, "0x1", SENDER, SENDER, dec!(1), 0);
        bsc.bridge = Some(BridgeMetadata {
            selector: Some("0xdeadbeef".into()),
            ..Default::default()
        });
        let m = detector.classify(&bsc, Direction::Forward).unwrap();
        assert_eq!(m.matched_by, MatchKind::Selector);
        assert_eq!(m.counterpart_chain, Some(Chain::Ethereum));
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let path = std::env::temp_dir().join(format!("registry_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        assert!(BridgeRegistry::load(Some(path.as_path())).is_err());
        let _ = std::fs::remove_file(path);
    }
}
