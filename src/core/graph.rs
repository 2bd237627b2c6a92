//! Arena-backed trace graph
//!
//! Nodes live in a `Vec` indexed by `(chain, address)`; edges are an
//! append-only list. Taint is credited per direction so a BOTH trace keeps
//! separate forward and backward ledgers that are summed for reporting.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::config::Chain;
use crate::models::types::{Direction, TraceEdge, TraceNode};

/// Index into the node arena
pub type NodeId = usize;

/// The source is always the first node
pub const SOURCE: NodeId = 0;

#[derive(Debug, Clone)]
pub struct TraceGraph {
    nodes: Vec<TraceNode>,
    index: HashMap<(Chain, String), NodeId>,
    edges: Vec<TraceEdge>,
    /// (pass, node) pairs already queued for expansion
    scheduled: HashSet<(Direction, NodeId)>,
}

impl TraceGraph {
    /// Graph holding only the source, taint 1.0 on every ledger
    pub fn with_source(chain: Chain, address: &str) -> Self {
        let source = TraceNode {
            chain,
            address: address.to_string(),
            taint_received: Decimal::ONE,
            taint_sent: Decimal::ZERO,
            hop_distance: 0,
            labels: BTreeSet::new(),
            taint_forward: Decimal::ONE,
            taint_backward: Decimal::ONE,
        };
        let mut index = HashMap::new();
        index.insert((chain, address.to_string()), SOURCE);

        Self {
            nodes: vec![source],
            index,
            edges: Vec::new(),
            scheduled: HashSet::new(),
        }
    }

    pub fn get(&self, chain: Chain, address: &str) -> Option<NodeId> {
        self.index.get(&(chain, address.to_string())).copied()
    }

    pub fn node(&self, id: NodeId) -> &TraceNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TraceNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TraceNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[TraceEdge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [TraceEdge] {
        &mut self.edges
    }

    /// Nodes other than the source
    pub fn discovered(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Create an untainted node at `hop`
    pub fn insert(&mut self, chain: Chain, address: &str, hop: u32) -> NodeId {
        if let Some(id) = self.get(chain, address) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(TraceNode {
            chain,
            address: address.to_string(),
            taint_received: Decimal::ZERO,
            taint_sent: Decimal::ZERO,
            hop_distance: hop,
            labels: BTreeSet::new(),
            taint_forward: Decimal::ZERO,
            taint_backward: Decimal::ZERO,
        });
        self.index.insert((chain, address.to_string()), id);
        id
    }

    /// Taint a node may pass on in `direction`
    pub fn ledger(&self, id: NodeId, direction: Direction) -> Decimal {
        let node = &self.nodes[id];
        match direction {
            Direction::Backward => node.taint_backward,
            _ => node.taint_forward,
        }
    }

    /// Append `edge`: `target` is credited on the edge's ledger, `sender`
    /// records it as sent. The source's received taint never changes.
    pub fn add_edge(&mut self, edge: TraceEdge, sender: NodeId, target: NodeId) {
        let taint = edge.taint_value;
        let direction = edge.direction;

        self.nodes[sender].taint_sent += taint;
        if target != SOURCE {
            let node = &mut self.nodes[target];
            match direction {
                Direction::Backward => node.taint_backward += taint,
                _ => node.taint_forward += taint,
            }
            node.taint_received = node.taint_forward + node.taint_backward;
        }
        self.edges.push(edge);
    }

    /// Queue `(direction, id)` for expansion; false if it already was
    pub fn schedule(&mut self, direction: Direction, id: NodeId) -> bool {
        self.scheduled.insert((direction, id))
    }

    pub fn max_hop(&self) -> u32 {
        self.nodes.iter().map(|n| n.hop_distance).max().unwrap_or(0)
    }

    /// Σ taint_received over non-source nodes
    pub fn total_taint(&self) -> Decimal {
        self.nodes.iter().skip(1).map(|n| n.taint_received).sum()
    }

    /// Result map keyed `"<chain>:<address>"` plus the edge list
    pub fn into_parts(self) -> (BTreeMap<String, TraceNode>, Vec<TraceEdge>) {
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| (TraceNode::key(n.chain, &n.address), n))
            .collect();
        (nodes, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{Category, EventType};
    use rust_decimal_macros::dec;

    fn edge(from: &str, to: &str, taint: Decimal, direction: Direction) -> TraceEdge {
        TraceEdge {
            chain: Chain::Ethereum,
            from_address: from.into(),
            to_address: to.into(),
            tx_hash: "0x1".into(),
            value: dec!(1),
            taint_value: taint,
            timestamp: 0,
            hop: 1,
            event_type: EventType::Transfer,
            category: Category::Native,
            direction,
            asset: None,
            value_usd: None,
            bridge: None,
            chain_from: None,
            chain_to: None,
            bridge_confidence: None,
            matched_by: None,
        }
    }

    #[test]
    fn test_taint_accumulates_across_paths() {
        let mut g = TraceGraph::with_source(Chain::Ethereum, "0xs");
        let a = g.insert(Chain::Ethereum, "0xa", 1);
        let b = g.insert(Chain::Ethereum, "0xb", 1);
        let d = g.insert(Chain::Ethereum, "0xd", 2);

        g.add_edge(edge("0xa", "0xd", dec!(0.3), Direction::Forward), a, d);
        g.add_edge(edge("0xb", "0xd", dec!(0.2), Direction::Forward), b, d);

        assert_eq!(g.node(d).taint_received, dec!(0.5));
        assert_eq!(g.node(a).taint_sent, dec!(0.3));
        assert_eq!(g.discovered(), 3);
        assert_eq!(g.max_hop(), 2);
    }

    #[test]
    fn test_source_taint_fixed_on_cycle() {
        let mut g = TraceGraph::with_source(Chain::Ethereum, "0xs");
        let a = g.insert(Chain::Ethereum, "0xa", 1);
        g.add_edge(edge("0xa", "0xs", dec!(0.4), Direction::Forward), a, SOURCE);
        assert_eq!(g.node(SOURCE).taint_received, Decimal::ONE);
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn test_direction_ledgers_are_separate() {
        let mut g = TraceGraph::with_source(Chain::Ethereum, "0xs");
        let x = g.insert(Chain::Ethereum, "0xx", 1);
        g.add_edge(edge("0xs", "0xx", dec!(0.6), Direction::Forward), SOURCE, x);
        g.add_edge(edge("0xx", "0xs", dec!(0.25), Direction::Backward), SOURCE, x);

        assert_eq!(g.ledger(x, Direction::Forward), dec!(0.6));
        assert_eq!(g.ledger(x, Direction::Backward), dec!(0.25));
        assert_eq!(g.node(x).taint_received, dec!(0.85));
        assert_eq!(g.total_taint(), dec!(0.85));
    }

    #[test]
    fn test_same_address_on_two_chains() {
        let mut g = TraceGraph::with_source(Chain::Ethereum, "0xs");
        let eth = g.insert(Chain::Ethereum, "0xa", 1);
        let base = g.insert(Chain::Base, "0xa", 1);
        assert_ne!(eth, base);
        assert!(g.schedule(Direction::Forward, eth));
        assert!(!g.schedule(Direction::Forward, eth));
        assert!(g.schedule(Direction::Backward, eth));

        let (nodes, _) = g.into_parts();
        assert!(nodes.contains_key("base:0xa"));
        assert!(nodes.contains_key("ethereum:0xa"));
    }
}
