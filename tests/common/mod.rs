//! Scripted adapters and recording collaborators shared by the tracer tests

#![allow(dead_code)]

use async_trait::async_trait;
use crosschain_tracer::models::{AppError, AppResult, CanonicalEvent, Chain, Direction, SubTransfer};
use crosschain_tracer::providers::{
    BridgeLink, BridgeLinkSink, ChainAdapter, FetchScope, LabelProvider, PageRequest, TransferPage,
};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Deterministic EVM-shaped address
pub fn evm(n: u64) -> String {
    format!("0x{:040x}", n)
}

/// Segwit-shaped Bitcoin address; `tag` picks distinct data characters
pub fn btc(tag: char) -> String {
    format!("bc1q{}", tag.to_string().repeat(38))
}

pub const SOL_RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

pub fn transfer(chain: Chain, tx: &str, from: &str, to: &str, value: Decimal) -> CanonicalEvent {
    CanonicalEvent::transfer(chain, tx, from, to, value, 1_700_000_000)
}

pub fn token_transfer(
    chain: Chain,
    tx: &str,
    from: &str,
    to: &str,
    value: Decimal,
    token: &str,
) -> CanonicalEvent {
    let mut event = transfer(chain, tx, from, to, value);
    event.asset = Some(token.to_string());
    event.event_type = crosschain_tracer::models::EventType::TokenTransfer;
    event
}

/// UTXO spend with one leg per output
pub fn utxo_spend(chain: Chain, tx: &str, from: &str, outputs: &[(&str, Decimal)]) -> CanonicalEvent {
    let total = outputs.iter().map(|(_, v)| *v).sum();
    let mut event = transfer(chain, tx, from, outputs[0].0, total);
    event.event_type = crosschain_tracer::models::EventType::UtxoSpend;
    event.sub_transfers = outputs
        .iter()
        .map(|(to, value)| SubTransfer {
            from_address: from.to_string(),
            to_address: to.to_string(),
            value: *value,
            asset: None,
        })
        .collect();
    event
}

type Key = (String, Direction, FetchScope);

/// Adapter answering from a fixed script of events per (address, direction, scope)
pub struct ScriptedAdapter {
    chain: Chain,
    events: HashMap<Key, Vec<CanonicalEvent>>,
    failing: HashMap<Key, AppError>,
    delay: Option<Duration>,
    /// Events per page; `None` returns everything at once
    page_len: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            events: HashMap::new(),
            failing: HashMap::new(),
            delay: None,
            page_len: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Register `event` as outgoing for its sender and incoming for its receivers
    pub fn with_event(mut self, scope: FetchScope, event: CanonicalEvent) -> Self {
        let mut senders: Vec<String> = vec![event.from_address.to_lowercase()];
        let mut receivers: Vec<String> = vec![event.to_address.to_lowercase()];
        for leg in &event.sub_transfers {
            senders.push(leg.from_address.to_lowercase());
            receivers.push(leg.to_address.to_lowercase());
        }
        senders.sort();
        senders.dedup();
        receivers.sort();
        receivers.dedup();

        for sender in senders {
            self.push((sender, Direction::Forward, scope), event.clone());
        }
        for receiver in receivers {
            self.push((receiver, Direction::Backward, scope), event.clone());
        }
        self
    }

    /// Event only visible when tracing `direction` from `address`
    pub fn with_event_for(
        mut self,
        address: &str,
        direction: Direction,
        scope: FetchScope,
        event: CanonicalEvent,
    ) -> Self {
        self.push((address.to_lowercase(), direction, scope), event);
        self
    }

    pub fn failing(mut self, address: &str, direction: Direction, scope: FetchScope, error: AppError) -> Self {
        self.failing.insert((address.to_lowercase(), direction, scope), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_page_len(mut self, page_len: usize) -> Self {
        self.page_len = Some(page_len);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(&mut self, key: Key, event: CanonicalEvent) {
        let list = self.events.entry(key).or_default();
        if !list.iter().any(|e| e.tx_hash == event.tx_hash && e.to_address == event.to_address) {
            list.push(event);
        }
    }

    async fn answer(&self, address: &str, direction: Direction, scope: FetchScope, page: &PageRequest) -> AppResult<TransferPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (address.to_lowercase(), direction, scope);
        if let Some(error) = self.failing.get(&key) {
            return Err(AppError::new(error.code, error.message.clone()));
        }

        let all = self.events.get(&key).cloned().unwrap_or_default();
        let Some(page_len) = self.page_len else {
            return Ok(TransferPage::last(all));
        };

        let start: usize = page.cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + page_len).min(all.len());
        let events = all[start.min(end)..end].to_vec();
        Ok(TransferPage {
            events,
            next_page: (end < all.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_outgoing(&self, address: &str, scope: FetchScope, page: &PageRequest) -> AppResult<TransferPage> {
        self.answer(address, Direction::Forward, scope, page).await
    }

    async fn get_incoming(&self, address: &str, scope: FetchScope, page: &PageRequest) -> AppResult<TransferPage> {
        self.answer(address, Direction::Backward, scope, page).await
    }

    async fn get_utxo_outgoing(&self, address: &str, page: &PageRequest) -> AppResult<TransferPage> {
        self.answer(address, Direction::Forward, FetchScope::Utxo, page).await
    }

    async fn get_utxo_incoming(&self, address: &str, page: &PageRequest) -> AppResult<TransferPage> {
        self.answer(address, Direction::Backward, FetchScope::Utxo, page).await
    }

    fn to_canonical(&self, raw: &serde_json::Value, _perspective: &str) -> AppResult<Vec<CanonicalEvent>> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}

/// Sink that keeps every link it is handed
#[derive(Default)]
pub struct RecordingSink {
    pub links: Mutex<Vec<BridgeLink>>,
}

impl RecordingSink {
    pub fn links(&self) -> Vec<BridgeLink> {
        self.links.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BridgeLinkSink for RecordingSink {
    async fn persist_bridge_link(&self, link: &BridgeLink) -> bool {
        match self.links.lock() {
            Ok(mut links) => {
                links.push(link.clone());
                true
            }
            Err(_) => false,
        }
    }
}

/// Label source that answers after `delay`
pub struct SlowLabels {
    pub delay: Duration,
}

#[async_trait]
impl LabelProvider for SlowLabels {
    async fn get_labels(&self, _chain: Chain, _address: &str) -> BTreeSet<String> {
        tokio::time::sleep(self.delay).await;
        BTreeSet::from(["exchange".to_string()])
    }
}
