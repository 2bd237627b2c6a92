//! External collaborators consumed by the tracer
//!
//! Every lookup here is best-effort: unknown addresses yield empty sets,
//! unavailable services yield `None`, and nothing in this module can fail
//! a trace.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::{Chain, ChainFamily};
use crate::models::errors::{AppError, AppResult};
use crate::utils::address::normalize;
use crate::utils::cache::LabelCache;
use crate::utils::constants::{build_alchemy_prices_url, get_alchemy_subdomain};

// ============================================
// INTERFACES
// ============================================

/// Address tags (exchange, mixer, bridge, ...)
#[async_trait]
pub trait LabelProvider: Send + Sync {
    async fn get_labels(&self, chain: Chain, address: &str) -> BTreeSet<String>;
}

/// `None` when the list could not be consulted
#[async_trait]
pub trait SanctionsProvider: Send + Sync {
    async fn is_sanctioned(&self, chain: Chain, address: &str) -> Option<bool>;
}

/// USD price of one unit of `asset` (`None` asset = native coin)
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn usd_price(&self, chain: Chain, asset: Option<&str>) -> Option<Decimal>;
}

/// Resolved cross-chain hop handed to graph persistence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeLink {
    pub from_address: String,
    pub to_address: String,
    pub bridge: String,
    pub chain_from: Chain,
    pub chain_to: Chain,
    pub tx_hash: String,
    pub timestamp: i64,
}

/// Receives every resolved bridge edge; returns whether it was stored
#[async_trait]
pub trait BridgeLinkSink: Send + Sync {
    async fn persist_bridge_link(&self, link: &BridgeLink) -> bool;
}

// ============================================
// LABELS
// ============================================

/// Labels loaded from a JSON object.
///
/// Keys are either `"<chain>:<address>"` or a bare address (applies on every
/// chain). Values are label arrays:
/// `{ "ethereum:0xabc…": ["exchange"], "0xdef…": ["mixer"] }`
#[derive(Debug, Default, Clone)]
pub struct StaticLabels {
    scoped: HashMap<(Chain, String), BTreeSet<String>>,
    global: HashMap<String, BTreeSet<String>>,
}

impl StaticLabels {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, Vec<String>> = serde_json::from_str(&raw)?;
        let labels = Self::from_map(map);
        info!(
            "🏷️ Loaded {} labelled addresses from {}",
            labels.len(),
            path.display()
        );
        Ok(labels)
    }

    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let mut labels = Self::default();
        for (key, tags) in map {
            let tags: BTreeSet<String> = tags.into_iter().map(|t| t.to_lowercase()).collect();
            labels.insert_key(&key, tags);
        }
        labels
    }

    pub fn insert(&mut self, chain: Chain, address: &str, labels: BTreeSet<String>) {
        self.scoped
            .entry((chain, normalize(chain, address)))
            .or_default()
            .extend(labels);
    }

    fn insert_key(&mut self, key: &str, tags: BTreeSet<String>) {
        if let Some((prefix, address)) = key.split_once(':') {
            if let Ok(chain) = Chain::from_str(prefix) {
                self.insert(chain, address, tags);
                return;
            }
        }
        self.global
            .entry(global_key(key))
            .or_default()
            .extend(tags);
    }

    pub fn len(&self) -> usize {
        self.scoped.len() + self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chain-less keys compare case-insensitively when they look like hex
fn global_key(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("0x") {
        address.to_lowercase()
    } else {
        address.to_string()
    }
}

#[async_trait]
impl LabelProvider for StaticLabels {
    async fn get_labels(&self, chain: Chain, address: &str) -> BTreeSet<String> {
        let mut labels = self
            .scoped
            .get(&(chain, normalize(chain, address)))
            .cloned()
            .unwrap_or_default();
        if let Some(global) = self.global.get(&global_key(address)) {
            labels.extend(global.iter().cloned());
        }
        labels
    }
}

/// Any label provider behind a TTL cache
pub struct CachedLabelProvider {
    inner: Arc<dyn LabelProvider>,
    cache: LabelCache,
}

impl CachedLabelProvider {
    pub fn new(inner: Arc<dyn LabelProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: LabelCache::with_ttl(ttl.as_secs()),
        }
    }

    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }
}

#[async_trait]
impl LabelProvider for CachedLabelProvider {
    async fn get_labels(&self, chain: Chain, address: &str) -> BTreeSet<String> {
        if let Some(labels) = self.cache.get(chain, address) {
            return labels;
        }
        let labels = self.inner.get_labels(chain, address).await;
        self.cache.set(chain, address, labels.clone());
        labels
    }
}

// ============================================
// SANCTIONS
// ============================================

/// Sanctioned addresses from a JSON array (`["0xabc…", "T…"]`) or an
/// object with an `addresses` array
#[derive(Debug, Default, Clone)]
pub struct StaticSanctions {
    addresses: HashSet<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SanctionsFile {
    List(Vec<String>),
    Object { addresses: Vec<String> },
}

impl StaticSanctions {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let addresses = match serde_json::from_str::<SanctionsFile>(&raw)? {
            SanctionsFile::List(list) => list,
            SanctionsFile::Object { addresses } => addresses,
        };
        let sanctions = Self::from_addresses(addresses);
        info!(
            "🚫 Loaded {} sanctioned addresses from {}",
            sanctions.addresses.len(),
            path.display()
        );
        Ok(sanctions)
    }

    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| global_key(a.as_ref()))
                .collect(),
        }
    }
}

#[async_trait]
impl SanctionsProvider for StaticSanctions {
    async fn is_sanctioned(&self, chain: Chain, address: &str) -> Option<bool> {
        let key = match chain.family() {
            ChainFamily::Evm => address.to_lowercase(),
            _ => global_key(address),
        };
        Some(self.addresses.contains(&key))
    }
}

// ============================================
// PRICES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceEntry {
    currency: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenPrice {
    #[serde(default)]
    prices: Vec<PriceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    data: Vec<TokenPrice>,
}

impl PricesResponse {
    fn usd(&self) -> Option<Decimal> {
        self.data
            .first()?
            .prices
            .iter()
            .find(|p| p.currency.eq_ignore_ascii_case("usd"))
            .and_then(|p| Decimal::from_str(&p.value).ok())
    }
}

/// Alchemy Prices API
///
/// - Native coins: `GET /tokens/by-symbol?symbols=ETH`
/// - Tokens: `POST /tokens/by-address` with `{network, address}`
///
/// Results (including misses) are cached for the lifetime of the provider.
pub struct AlchemyPriceProvider {
    client: reqwest::Client,
    base_url: String,
    cache: DashMap<(Chain, Option<String>), Option<Decimal>>,
}

impl AlchemyPriceProvider {
    pub fn new(api_key: &str) -> AppResult<Self> {
        if api_key.is_empty() || api_key == "YOUR_API_KEY" {
            return Err(AppError::missing_api_key("ALCHEMY_API_KEY"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: build_alchemy_prices_url(api_key),
            cache: DashMap::new(),
        })
    }

    pub fn from_env() -> AppResult<Self> {
        let api_key = std::env::var("ALCHEMY_API_KEY")
            .map_err(|_| AppError::missing_api_key("ALCHEMY_API_KEY"))?;
        Self::new(&api_key)
    }

    async fn fetch(&self, chain: Chain, asset: Option<&str>) -> eyre::Result<Option<Decimal>> {
        let response = match asset {
            None => {
                self.client
                    .get(format!("{}/tokens/by-symbol", self.base_url))
                    .query(&[("symbols", chain.native_symbol())])
                    .send()
                    .await?
            }
            Some(address) => {
                let Some(network) = get_alchemy_subdomain(chain) else {
                    return Ok(None);
                };
                let body = serde_json::json!({
                    "addresses": [{ "network": network, "address": address }]
                });
                self.client
                    .post(format!("{}/tokens/by-address", self.base_url))
                    .json(&body)
                    .send()
                    .await?
            }
        };

        if !response.status().is_success() {
            return Err(eyre::eyre!("Prices API error: {}", response.status()));
        }
        let prices: PricesResponse = response.json().await?;
        Ok(prices.usd())
    }
}

#[async_trait]
impl PriceProvider for AlchemyPriceProvider {
    async fn usd_price(&self, chain: Chain, asset: Option<&str>) -> Option<Decimal> {
        let key = (chain, asset.map(|a| a.to_string()));
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let price = match self.fetch(chain, asset).await {
            Ok(price) => price,
            Err(e) => {
                debug!("Price lookup failed for {} {:?}: {}", chain, asset, e);
                None
            }
        };
        self.cache.insert(key, price);
        price
    }
}

/// Fixed price table, keyed like the Alchemy provider
#[derive(Debug, Default, Clone)]
pub struct StaticPrices {
    prices: HashMap<(Chain, Option<String>), Decimal>,
}

impl StaticPrices {
    pub fn with_price(mut self, chain: Chain, asset: Option<&str>, usd: Decimal) -> Self {
        self.prices.insert((chain, asset.map(|a| a.to_string())), usd);
        self
    }
}

#[async_trait]
impl PriceProvider for StaticPrices {
    async fn usd_price(&self, chain: Chain, asset: Option<&str>) -> Option<Decimal> {
        self.prices
            .get(&(chain, asset.map(|a| a.to_string())))
            .copied()
    }
}

// ============================================
// BRIDGE LINK SINKS
// ============================================

/// Discards links
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl BridgeLinkSink for NoopSink {
    async fn persist_bridge_link(&self, _link: &BridgeLink) -> bool {
        true
    }
}

/// Appends one JSON line per link; duplicates within a process are skipped
pub struct JsonlBridgeSink {
    path: PathBuf,
    seen: Mutex<HashSet<BridgeLink>>,
}

impl JsonlBridgeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn append(&self, link: &BridgeLink) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(link)?)?;
        Ok(())
    }
}

#[async_trait]
impl BridgeLinkSink for JsonlBridgeSink {
    async fn persist_bridge_link(&self, link: &BridgeLink) -> bool {
        {
            let Ok(mut seen) = self.seen.lock() else {
                return false;
            };
            if !seen.insert(link.clone()) {
                return true;
            }
        }

        match self.append(link) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Failed to persist bridge link {}: {}", link.tx_hash, e);
                false
            }
        }
    }
}
