//! Transaction Tracer
//!
//! Level-synchronous BFS over the transfer graph:
//! 1. every frontier node's taint is snapshotted at the start of the level
//! 2. adapter calls for the whole level fan out under a semaphore
//! 3. results are applied in frontier order, categories in
//!    native → token → utxo → bridge order
//!
//! Completion order of adapter calls never affects the result, so replaying
//! a request against deterministic adapters yields the same graph.

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::bridge::{BridgeDetector, BridgeMatch, BridgeRegistry};
use crate::core::graph::{NodeId, TraceGraph, SOURCE};
use crate::core::taint;
use crate::models::config::{Chain, TracerConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    AdapterFailure, BlockRange, CanonicalEvent, Category, Direction, EventType, SubTransfer,
    TraceEdge, TraceRequest, TraceResult, TraceStatus,
};
use crate::providers::adapter::{AdapterRegistry, ChainAdapter, FetchScope, PageRequest};
use crate::providers::enrichment::{
    BridgeLink, BridgeLinkSink, LabelProvider, NoopSink, PriceProvider, SanctionsProvider,
    StaticLabels,
};
use crate::utils::address;
use crate::utils::constants::is_high_risk_label;

/// Node queued for expansion in one pass
#[derive(Debug, Clone, Copy)]
struct FrontierItem {
    id: NodeId,
    direction: Direction,
    hop: u32,
}

/// One qualifying leg of a fetched event
struct Leg<'a> {
    event: &'a CanonicalEvent,
    transfer: SubTransfer,
    bridge: Option<BridgeMatch>,
}

/// Mutable state owned by one trace
struct TraceState {
    graph: TraceGraph,
    failures: Vec<AdapterFailure>,
    /// Nodes already reported as unreachable for lack of an adapter
    unavailable: HashSet<NodeId>,
    limit_hit: bool,
}

/// Why the traversal stopped early
enum Abort {
    Cancelled,
    Internal(AppError),
}

pub struct TransactionTracer {
    adapters: AdapterRegistry,
    detector: BridgeDetector,
    labels: Arc<dyn LabelProvider>,
    sanctions: Option<Arc<dyn SanctionsProvider>>,
    prices: Option<Arc<dyn PriceProvider>>,
    bridge_sink: Arc<dyn BridgeLinkSink>,
    config: TracerConfig,
}

impl TransactionTracer {
    pub fn new(adapters: AdapterRegistry, registry: Arc<BridgeRegistry>, config: TracerConfig) -> Self {
        Self {
            adapters,
            detector: BridgeDetector::new(registry),
            labels: Arc::new(StaticLabels::default()),
            sanctions: None,
            prices: None,
            bridge_sink: Arc::new(NoopSink),
            config,
        }
    }

    pub fn with_labels(mut self, labels: Arc<dyn LabelProvider>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_sanctions(mut self, sanctions: Arc<dyn SanctionsProvider>) -> Self {
        self.sanctions = Some(sanctions);
        self
    }

    pub fn with_prices(mut self, prices: Arc<dyn PriceProvider>) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn with_bridge_sink(mut self, sink: Arc<dyn BridgeLinkSink>) -> Self {
        self.bridge_sink = sink;
        self
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    // ============================================
    // ENTRY POINTS
    // ============================================

    /// Run a trace with only the configured timeout as a deadline
    pub async fn trace(&self, request: TraceRequest) -> AppResult<TraceResult> {
        self.trace_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a trace that stops when `cancel` fires or the trace timeout elapses.
    ///
    /// Returns `Err` only for invalid requests and missing source adapters;
    /// every later failure is reported inside the `TraceResult`.
    pub async fn trace_with_cancel(
        &self,
        request: TraceRequest,
        cancel: CancellationToken,
    ) -> AppResult<TraceResult> {
        request.validate()?;
        if !self.adapters.contains(request.source_chain) {
            return Err(AppError::new(
                ErrorCode::ConfigUnsupportedChain,
                format!("No adapter registered for {}", request.source_chain),
            ));
        }

        let trace_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let token = cancel.child_token();
        let source_address = address::normalize(request.source_chain, &request.source_address);

        info!(
            "🔍 Trace {} started: {}:{} direction={} depth={} nodes={} threshold={}",
            trace_id,
            request.source_chain,
            source_address,
            request.direction.as_str(),
            request.max_depth,
            request.max_nodes,
            request.min_taint_threshold
        );

        let mut state = TraceState {
            graph: TraceGraph::with_source(request.source_chain, &source_address),
            failures: Vec::new(),
            unavailable: HashSet::new(),
            limit_hit: false,
        };

        let deadline = tokio::time::Instant::now() + self.config.trace_timeout;
        let mut outcome = self.traverse(&request, &mut state, &token, deadline).await;

        // Post-processing shares the trace deadline and cancel token
        if !matches!(outcome, Err(Abort::Cancelled)) {
            let annotated = self
                .guarded(self.annotate(&mut state.graph), &token, deadline)
                .await;
            if let (Err(abort), true) = (annotated, outcome.is_ok()) {
                outcome = Err(abort);
            }
        }

        let (status, failure) = match &outcome {
            Ok(()) if state.limit_hit => (TraceStatus::Truncated, None),
            Ok(()) => (TraceStatus::Completed, None),
            Err(Abort::Cancelled) => (TraceStatus::Failed, Some("cancelled".to_string())),
            Err(Abort::Internal(e)) => (TraceStatus::Failed, Some(e.to_string())),
        };

        let result = self.finish(
            trace_id,
            &request,
            source_address,
            state,
            status,
            failure,
            started_at,
            clock,
        );
        info!("{}", result.summary());
        Ok(result)
    }

    // ============================================
    // TRAVERSAL
    // ============================================

    async fn traverse(
        &self,
        request: &TraceRequest,
        state: &mut TraceState,
        token: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<(), Abort> {
        let semaphore = Semaphore::new(self.config.max_concurrency.max(1));

        let mut frontier: Vec<FrontierItem> = request
            .direction
            .passes()
            .iter()
            .map(|direction| {
                state.graph.schedule(*direction, SOURCE);
                FrontierItem {
                    id: SOURCE,
                    direction: *direction,
                    hop: 0,
                }
            })
            .collect();

        while !frontier.is_empty() {
            if token.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            let mut level = Vec::with_capacity(frontier.len());
            for item in frontier.drain(..) {
                if item.hop >= request.max_depth || state.graph.discovered() >= request.max_nodes {
                    state.limit_hit = true;
                    continue;
                }
                level.push(item);
            }
            if level.is_empty() {
                break;
            }

            // Taint available to each node, fixed before any of this level's edges land
            let taints: Vec<Decimal> = level
                .iter()
                .map(|item| state.graph.ledger(item.id, item.direction))
                .collect();

            let mut tasks: Vec<(usize, FetchScope, Arc<dyn ChainAdapter>, String)> = Vec::new();
            for (idx, item) in level.iter().enumerate() {
                let node = state.graph.node(item.id);
                let Some(adapter) = self.adapters.get(node.chain) else {
                    continue;
                };
                for scope in self.scopes(request, node.chain) {
                    tasks.push((idx, scope, adapter.clone(), node.address.clone()));
                }
            }

            debug!(
                "📡 Level {}: expanding {} nodes with {} adapter calls",
                level[0].hop,
                level.len(),
                tasks.len()
            );

            let fetches = join_all(tasks.iter().map(|(idx, scope, adapter, addr)| {
                self.fetch_pages(
                    adapter.as_ref(),
                    addr,
                    *scope,
                    level[*idx].direction,
                    request.block_range,
                    &semaphore,
                    token,
                )
            }));

            let results = self.guarded(fetches, token, deadline).await?;

            let mut fetched: Vec<Vec<(FetchScope, Vec<CanonicalEvent>)>> =
                (0..level.len()).map(|_| Vec::new()).collect();
            for ((idx, scope, adapter, addr), (events, error)) in tasks.iter().zip(results) {
                if let Some(e) = error {
                    warn!(
                        "⚠️ {} {} {:?} failed: {}",
                        adapter.chain(),
                        addr,
                        scope,
                        e
                    );
                    state.failures.push(AdapterFailure {
                        chain: adapter.chain(),
                        address: addr.clone(),
                        category: scope.category(),
                        code: e.code_str().to_string(),
                        message: e.message.clone(),
                    });
                }
                fetched[*idx].push((*scope, events));
            }

            let mut next = Vec::new();
            for ((item, taint), events) in level.iter().zip(taints).zip(fetched) {
                self.expand(request, state, *item, taint, &events, &mut next)
                    .map_err(Abort::Internal)?;
            }
            frontier = next;
        }

        Ok(())
    }

    /// Drive `work` until it finishes, `token` fires or `deadline` passes
    async fn guarded<F: Future>(
        &self,
        work: F,
        token: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<F::Output, Abort> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Abort::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                warn!("⏱️ Trace timeout after {:?}, cancelling", self.config.trace_timeout);
                token.cancel();
                Err(Abort::Cancelled)
            }
            output = work => Ok(output),
        }
    }

    /// Scopes fetched for a node; bridge legs ride on native and token data
    fn scopes(&self, request: &TraceRequest, chain: Chain) -> Vec<FetchScope> {
        FetchScope::for_family(chain.family())
            .iter()
            .copied()
            .filter(|scope| match scope {
                FetchScope::Native => request.enable_native || request.enable_bridge,
                FetchScope::Token => request.enable_token || request.enable_bridge,
                FetchScope::Utxo => request.enable_utxo,
            })
            .collect()
    }

    /// All pages of one category; events fetched before a failure are kept
    #[allow(clippy::too_many_arguments)]
    async fn fetch_pages(
        &self,
        adapter: &dyn ChainAdapter,
        address: &str,
        scope: FetchScope,
        direction: Direction,
        range: BlockRange,
        semaphore: &Semaphore,
        token: &CancellationToken,
    ) -> (Vec<CanonicalEvent>, Option<AppError>) {
        let mut page = PageRequest::first(range, self.config.page_size);
        let mut events = Vec::new();

        for _ in 0..self.config.max_pages.max(1) {
            if token.is_cancelled() {
                return (events, Some(AppError::cancelled()));
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return (events, Some(AppError::cancelled()));
            };

            let call = async {
                match (scope, direction) {
                    (FetchScope::Utxo, Direction::Backward) => {
                        adapter.get_utxo_incoming(address, &page).await
                    }
                    (FetchScope::Utxo, _) => adapter.get_utxo_outgoing(address, &page).await,
                    (_, Direction::Backward) => adapter.get_incoming(address, scope, &page).await,
                    _ => adapter.get_outgoing(address, scope, &page).await,
                }
            };

            let result = match tokio::time::timeout(self.config.adapter_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(AppError::adapter_timeout(format!(
                    "{} {} {:?} exceeded {:?}",
                    adapter.chain(),
                    address,
                    scope,
                    self.config.adapter_timeout
                ))),
            };

            match result {
                Ok(fetched) => {
                    events.extend(fetched.events);
                    match fetched.next_page {
                        Some(cursor) => page = page.next(cursor),
                        None => break,
                    }
                }
                Err(e) => return (events, Some(e)),
            }
        }

        (events, None)
    }

    // ============================================
    // PROPAGATION
    // ============================================

    /// Apply one node's fetched events
    fn expand(
        &self,
        request: &TraceRequest,
        state: &mut TraceState,
        item: FrontierItem,
        taint: Decimal,
        fetched: &[(FetchScope, Vec<CanonicalEvent>)],
        next: &mut Vec<FrontierItem>,
    ) -> AppResult<()> {
        let node = state.graph.node(item.id);
        let chain = node.chain;
        let node_address = node.address.clone();

        let mut buckets: BTreeMap<Category, Vec<Leg<'_>>> = BTreeMap::new();
        for (scope, events) in fetched {
            for event in events {
                let bridge = if request.enable_bridge {
                    self.detector.classify(event, item.direction)
                } else {
                    None
                };
                let category = if bridge.is_some() {
                    Category::Bridge
                } else {
                    scope.category()
                };
                if !request.is_enabled(category) {
                    continue;
                }

                for transfer in event.legs() {
                    let own_side = match item.direction {
                        Direction::Backward => &transfer.to_address,
                        _ => &transfer.from_address,
                    };
                    if address::normalize(chain, own_side) != node_address {
                        continue;
                    }
                    buckets.entry(category).or_default().push(Leg {
                        event,
                        transfer,
                        bridge: bridge.clone(),
                    });
                }
            }
        }

        for (category, legs) in &buckets {
            let budget = taint::budget(taint, request.decay_for(*category))?;
            let values: Vec<Decimal> = legs.iter().map(|l| l.transfer.value).collect();
            let shares = taint::split(budget, &values)?;

            for (leg, share) in legs.iter().zip(shares) {
                self.propagate(request, state, item, chain, &node_address, *category, leg, share, next);
            }
        }

        Ok(())
    }

    /// Turn one leg's share into an edge (and maybe a node)
    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        request: &TraceRequest,
        state: &mut TraceState,
        item: FrontierItem,
        chain: Chain,
        node_address: &str,
        category: Category,
        leg: &Leg<'_>,
        share: Decimal,
        next: &mut Vec<FrontierItem>,
    ) {
        let far_side = match item.direction {
            Direction::Backward => &leg.transfer.from_address,
            _ => &leg.transfer.to_address,
        };

        // Where the leg lands: the counterpart chain for a resolved crossing
        let crossing = leg.bridge.as_ref().and_then(|m| {
            let other = m.counterpart_chain?;
            let landing = m
                .recipient
                .as_deref()
                .filter(|r| address::validate(other, r).is_ok())
                .or_else(|| address::validate(other, node_address).ok().map(|_| node_address))?;
            Some((other, address::normalize(other, landing)))
        });
        let (far_chain, far_address) = match &crossing {
            Some((other, landing)) => (*other, landing.clone()),
            None => (chain, address::normalize(chain, far_side)),
        };

        // Change and other self-legs only count toward the category total
        if far_chain == chain && far_address == node_address {
            return;
        }
        if share.is_zero() || share < request.min_taint_threshold {
            debug!(
                "✂️ Pruned {} → {} ({} < {})",
                node_address, far_address, share, request.min_taint_threshold
            );
            return;
        }
        if let Err(e) = address::validate(far_chain, &far_address) {
            debug!("Skipping leg in {}: {}", leg.event.tx_hash, e);
            return;
        }

        let hop = item.hop + 1;
        let (target, created) = match state.graph.get(far_chain, &far_address) {
            Some(id) => (id, false),
            None => {
                if state.graph.discovered() >= request.max_nodes {
                    state.limit_hit = true;
                    debug!("🧱 Node budget reached, dropping {}:{}", far_chain, far_address);
                    return;
                }
                (state.graph.insert(far_chain, &far_address, hop), true)
            }
        };

        let (from_address, to_address) = match item.direction {
            Direction::Backward => (far_address.clone(), node_address.to_string()),
            _ => (node_address.to_string(), far_address.clone()),
        };
        let counterpart = crossing.as_ref().map(|(c, _)| *c);
        let (chain_from, chain_to) = match (&leg.bridge, item.direction) {
            (None, _) => (None, None),
            (Some(_), Direction::Backward) => (counterpart, Some(chain)),
            (Some(_), _) => (Some(chain), counterpart),
        };

        let edge = TraceEdge {
            chain,
            from_address,
            to_address,
            tx_hash: leg.event.tx_hash.clone(),
            value: leg.transfer.value,
            taint_value: share,
            timestamp: leg.event.timestamp,
            hop,
            event_type: if leg.bridge.is_some() {
                EventType::Bridge
            } else {
                leg.event.event_type
            },
            category,
            direction: item.direction,
            asset: leg.transfer.asset.clone(),
            value_usd: None,
            bridge: leg.bridge.as_ref().map(|m| m.name.clone()),
            chain_from,
            chain_to,
            bridge_confidence: leg
                .bridge
                .as_ref()
                .and_then(|m| m.confidence)
                .map(|c| c.as_str().to_string()),
            matched_by: leg.bridge.as_ref().map(|m| m.matched_by.as_str().to_string()),
        };
        state.graph.add_edge(edge, item.id, target);

        if created {
            debug!("➕ {}:{} at hop {}", far_chain, far_address, hop);
        }

        // An unresolved crossing ends at the bridge contract
        if leg.bridge.is_some() && crossing.is_none() {
            return;
        }

        if !self.adapters.contains(far_chain) {
            if state.unavailable.insert(target) {
                warn!("⚠️ No adapter for {}, not expanding {}", far_chain, far_address);
                let error = AppError::adapter_unavailable(far_chain);
                state.failures.push(AdapterFailure {
                    chain: far_chain,
                    address: far_address,
                    category,
                    code: error.code_str().to_string(),
                    message: error.message,
                });
            }
            return;
        }

        if state.graph.schedule(item.direction, target) {
            next.push(FrontierItem {
                id: target,
                direction: item.direction,
                hop,
            });
        }
    }

    // ============================================
    // POST-PROCESSING
    // ============================================

    /// Labels, sanctions, USD values and bridge-link persistence
    async fn annotate(&self, graph: &mut TraceGraph) {
        let width = self.config.max_concurrency.max(1);
        let keys: Vec<(Chain, String)> = graph
            .nodes()
            .map(|n| (n.chain, n.address.clone()))
            .collect();

        let labels: Vec<_> = stream::iter(keys.iter())
            .map(|(chain, addr)| self.labels.get_labels(*chain, addr))
            .buffered(width)
            .collect()
            .await;

        let sanctioned: Vec<Option<bool>> = match &self.sanctions {
            Some(sanctions) => {
                stream::iter(keys.iter())
                    .map(|(chain, addr)| sanctions.is_sanctioned(*chain, addr))
                    .buffered(width)
                    .collect()
                    .await
            }
            None => vec![None; keys.len()],
        };

        for (id, ((chain, addr), (mut node_labels, hit))) in keys
            .iter()
            .zip(labels.into_iter().zip(sanctioned))
            .enumerate()
        {
            if hit == Some(true) {
                node_labels.insert("sanctioned".to_string());
            }
            if self.detector.registry().is_bridge(*chain, addr) {
                node_labels.insert("bridge".to_string());
            }
            graph.node_mut(id).labels.extend(node_labels);
        }

        if let Some(prices) = &self.prices {
            let mut cache: HashMap<(Chain, Option<String>), Option<Decimal>> = HashMap::new();
            for edge in graph.edges_mut() {
                let key = (edge.chain, edge.asset.clone());
                let price = match cache.get(&key) {
                    Some(price) => *price,
                    None => {
                        let price = prices.usd_price(edge.chain, edge.asset.as_deref()).await;
                        cache.insert(key, price);
                        price
                    }
                };
                edge.value_usd = price
                    .and_then(|p| p.checked_mul(edge.value))
                    .map(|usd| usd.round_dp(2));
            }
        }

        for edge in graph.edges() {
            if edge.event_type != EventType::Bridge {
                continue;
            }
            let (Some(chain_from), Some(chain_to)) = (edge.chain_from, edge.chain_to) else {
                continue;
            };
            let link = BridgeLink {
                from_address: edge.from_address.clone(),
                to_address: edge.to_address.clone(),
                bridge: edge.bridge.clone().unwrap_or_default(),
                chain_from,
                chain_to,
                tx_hash: edge.tx_hash.clone(),
                timestamp: edge.timestamp,
            };
            if !self.bridge_sink.persist_bridge_link(&link).await {
                warn!(
                    "⚠️ Bridge link {} {}→{} was not persisted",
                    link.tx_hash, chain_from, chain_to
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        trace_id: String,
        request: &TraceRequest,
        source_address: String,
        state: TraceState,
        status: TraceStatus,
        failure: Option<String>,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> TraceResult {
        let max_hop_reached = state.graph.max_hop();
        let total_taint_traced = state.graph.total_taint();
        let (nodes, edges) = state.graph.into_parts();

        let high_risk_addresses = nodes
            .iter()
            .filter(|(_, n)| n.labels.iter().any(|l| is_high_risk_label(l)))
            .map(|(key, _)| key.clone())
            .collect();
        let sanctioned_addresses = nodes
            .iter()
            .filter(|(_, n)| n.labels.contains("sanctioned"))
            .map(|(key, _)| key.clone())
            .collect();

        let completed = match status {
            TraceStatus::Completed => state.failures.is_empty(),
            TraceStatus::Truncated => true,
            _ => false,
        };

        TraceResult {
            trace_id,
            source_chain: request.source_chain,
            source_address,
            direction: request.direction,
            taint_model: request.taint_model,
            status,
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            nodes,
            edges,
            max_hop_reached,
            total_taint_traced,
            high_risk_addresses,
            sanctioned_addresses,
            adapter_failures: state.failures,
            started_at,
            execution_time_seconds: clock.elapsed().as_secs_f64(),
            completed,
            failure,
        }
    }
}
