//! Chain adapter abstraction
//!
//! One implementation per ledger family. Adapters fetch raw upstream data
//! and normalize it into `CanonicalEvent`s; the tracer only ever sees
//! canonical events.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::config::{Chain, ChainEndpoint, ChainFamily, TracerConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{BlockRange, CanonicalEvent, Category};
use crate::providers::evm::EvmAdapter;
use crate::providers::rpc::RpcProvider;
use crate::providers::solana::SolanaAdapter;
use crate::providers::tron::TronAdapter;
use crate::providers::utxo::UtxoAdapter;

/// Which upstream query to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchScope {
    /// Native-asset account transfers
    Native,
    /// Fungible / non-fungible token transfers
    Token,
    /// UTXO spends
    Utxo,
}

impl FetchScope {
    /// Category events from this scope fall into unless they are bridges
    pub fn category(&self) -> Category {
        match self {
            Self::Native => Category::Native,
            Self::Token => Category::Token,
            Self::Utxo => Category::Utxo,
        }
    }

    /// Scopes a chain family can serve
    pub fn for_family(family: ChainFamily) -> &'static [FetchScope] {
        match family {
            ChainFamily::Utxo => &[FetchScope::Utxo],
            _ => &[FetchScope::Native, FetchScope::Token],
        }
    }
}

/// Paging parameters for one adapter call
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub range: BlockRange,
    /// Opaque cursor from the previous page
    pub cursor: Option<String>,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(range: BlockRange, limit: usize) -> Self {
        Self {
            range,
            cursor: None,
            limit,
        }
    }

    pub fn next(&self, cursor: String) -> Self {
        Self {
            range: self.range,
            cursor: Some(cursor),
            limit: self.limit,
        }
    }
}

/// One page of normalized events
#[derive(Debug, Clone, Default)]
pub struct TransferPage {
    pub events: Vec<CanonicalEvent>,
    pub next_page: Option<String>,
}

impl TransferPage {
    pub fn last(events: Vec<CanonicalEvent>) -> Self {
        Self {
            events,
            next_page: None,
        }
    }
}

/// Capability set every chain adapter exposes
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// Account-model transfers sent by `address`
    async fn get_outgoing(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
    ) -> AppResult<TransferPage>;

    /// Account-model transfers received by `address`
    async fn get_incoming(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
    ) -> AppResult<TransferPage>;

    /// Transactions spending outputs owned by `address`, one leg per output
    async fn get_utxo_outgoing(&self, address: &str, _page: &PageRequest) -> AppResult<TransferPage> {
        Err(not_utxo(self.chain(), address))
    }

    /// Transactions paying `address`, one leg per funding input
    async fn get_utxo_incoming(&self, address: &str, _page: &PageRequest) -> AppResult<TransferPage> {
        Err(not_utxo(self.chain(), address))
    }

    /// Normalize one raw upstream transaction as seen from `perspective`
    fn to_canonical(
        &self,
        raw: &serde_json::Value,
        perspective: &str,
    ) -> AppResult<Vec<CanonicalEvent>>;
}

fn not_utxo(chain: Chain, address: &str) -> AppError {
    AppError::new(
        ErrorCode::AdapterUnavailable,
        format!("{} is not a UTXO chain (address {})", chain, address),
    )
}

/// Chain → adapter lookup shared by traces
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for its chain
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> &mut Self {
        self.adapters.insert(adapter.chain(), adapter);
        self
    }

    pub fn get(&self, chain: Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    pub fn contains(&self, chain: Chain) -> bool {
        self.adapters.contains_key(&chain)
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }

    /// Build live adapters for every chain with a usable endpoint
    pub fn from_endpoints(
        endpoints: &HashMap<Chain, ChainEndpoint>,
        config: &TracerConfig,
    ) -> Self {
        let mut registry = Self::new();

        for chain in Chain::ALL {
            let Some(endpoint) = endpoints.get(&chain) else {
                continue;
            };
            let provider = match RpcProvider::from_endpoint(endpoint) {
                Ok(p) => p,
                Err(e) => {
                    warn!("⚠️ No adapter for {}: {}", chain, e);
                    continue;
                }
            };

            let adapter: Arc<dyn ChainAdapter> = match chain.family() {
                ChainFamily::Evm => Arc::new(EvmAdapter::new(
                    chain,
                    provider,
                    endpoint.is_alchemy(),
                    config.page_size,
                )),
                ChainFamily::Utxo => Arc::new(UtxoAdapter::new(chain, provider)),
                ChainFamily::Svm => Arc::new(SolanaAdapter::new(provider, config.page_size)),
                ChainFamily::Tron => Arc::new(TronAdapter::new(provider, config.page_size)),
            };
            registry.register(adapter);
        }

        info!("🔌 Adapters registered for {} chains", registry.adapters.len());
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter(Chain);

    #[async_trait]
    impl ChainAdapter for NullAdapter {
        fn chain(&self) -> Chain {
            self.0
        }

        async fn get_outgoing(&self, _: &str, _: FetchScope, _: &PageRequest) -> AppResult<TransferPage> {
            Ok(TransferPage::default())
        }

        async fn get_incoming(&self, _: &str, _: FetchScope, _: &PageRequest) -> AppResult<TransferPage> {
            Ok(TransferPage::default())
        }

        fn to_canonical(&self, _: &serde_json::Value, _: &str) -> AppResult<Vec<CanonicalEvent>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_scopes_per_family() {
        assert_eq!(FetchScope::for_family(ChainFamily::Utxo), &[FetchScope::Utxo]);
        assert_eq!(
            FetchScope::for_family(ChainFamily::Evm),
            &[FetchScope::Native, FetchScope::Token]
        );
        assert_eq!(FetchScope::Token.category(), Category::Token);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(NullAdapter(Chain::Solana)))
            .register(Arc::new(NullAdapter(Chain::Ethereum)));

        assert!(registry.contains(Chain::Solana));
        assert!(registry.get(Chain::Tron).is_none());
        assert_eq!(registry.chains(), vec![Chain::Ethereum, Chain::Solana]);
    }

    #[tokio::test]
    async fn test_utxo_methods_default_to_unavailable() {
        let adapter = NullAdapter(Chain::Ethereum);
        let err = adapter
            .get_utxo_outgoing("0x00", &PageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AdapterUnavailable);
    }
}
