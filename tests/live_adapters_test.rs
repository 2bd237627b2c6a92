//! Live adapter tests against real upstreams
//!
//! Ignored by default. Run with:
//! cargo test --test live_adapters_test -- --ignored --nocapture
//!
//! Environment Variables:
//! - ALCHEMY_API_KEY: required for the EVM tests
//! - TRONGRID_API_KEY: optional, raises TronGrid rate limits

use crosschain_tracer::models::{BlockRange, Chain, ChainEndpoint};
use crosschain_tracer::providers::{
    ChainAdapter, EvmAdapter, FetchScope, PageRequest, RpcProvider, SolanaAdapter, TronAdapter,
    UtxoAdapter,
};
use std::time::Duration;
use tokio::time::timeout;

// Test configuration
const TEST_TIMEOUT_SECS: u64 = 60;
const VITALIK: &str = "0xd8da6bf26964af9d7eed9e10049c1226fa7d6045";
const SATOSHI_GENESIS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
const SOLANA_FOUNDATION: &str = "GK2zqSsXLA2rwVZk347RYhh6jJpRsCA69FjLW93ZGi3B";
const TRON_USDT: &str = "TR7NHqjeKQxGTCi8q8ZYZPMWUkTZ9Sr7Li";

fn provider(chain: Chain) -> RpcProvider {
    RpcProvider::from_endpoint(&ChainEndpoint::for_chain(chain)).unwrap()
}

fn first_page() -> PageRequest {
    PageRequest::first(BlockRange::default(), 10)
}

#[tokio::test]
#[ignore]
async fn test_evm_outgoing_native() {
    let endpoint = ChainEndpoint::for_chain(Chain::Ethereum);
    if !endpoint.is_alchemy() {
        println!("❌ ALCHEMY_API_KEY not configured, skipping");
        return;
    }
    let adapter = EvmAdapter::new(Chain::Ethereum, provider(Chain::Ethereum), true, 10);

    let page = timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        adapter.get_outgoing(VITALIK, FetchScope::Native, &first_page()),
    )
    .await
    .expect("timed out")
    .unwrap();

    println!("✅ {} native events, next page: {:?}", page.events.len(), page.next_page);
    assert!(!page.events.is_empty());
    assert!(page.events.iter().all(|e| e.chain == Chain::Ethereum));
    assert!(page
        .events
        .iter()
        .flat_map(|e| e.legs())
        .all(|leg| leg.from_address == VITALIK));
}

#[tokio::test]
#[ignore]
async fn test_utxo_incoming() {
    let adapter = UtxoAdapter::new(Chain::Bitcoin, provider(Chain::Bitcoin));

    let page = timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        adapter.get_utxo_incoming(SATOSHI_GENESIS, &first_page()),
    )
    .await
    .expect("timed out")
    .unwrap();

    println!("✅ {} funding txs, cursor: {:?}", page.events.len(), page.next_page);
    assert!(!page.events.is_empty());
    assert!(page
        .events
        .iter()
        .flat_map(|e| e.legs())
        .all(|leg| leg.to_address == SATOSHI_GENESIS));
}

#[tokio::test]
#[ignore]
async fn test_solana_outgoing() {
    let adapter = SolanaAdapter::new(provider(Chain::Solana), 10);

    let page = timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        adapter.get_outgoing(SOLANA_FOUNDATION, FetchScope::Native, &first_page()),
    )
    .await
    .expect("timed out")
    .unwrap();

    println!("✅ {} Solana events", page.events.len());
    assert!(page.events.iter().all(|e| e.chain == Chain::Solana));
}

#[tokio::test]
#[ignore]
async fn test_tron_incoming_trc20() {
    let adapter = TronAdapter::new(provider(Chain::Tron), 10);

    let page = timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        adapter.get_incoming(TRON_USDT, FetchScope::Token, &first_page()),
    )
    .await
    .expect("timed out")
    .unwrap();

    println!("✅ {} TRC20 events", page.events.len());
    assert!(page.events.iter().all(|e| e.chain == Chain::Tron));
}
