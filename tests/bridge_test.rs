//! Bridge detection end to end: EVM calldata → metadata → detector → tracer

mod common;

use alloy_primitives::{FixedBytes, U256};
use alloy_sol_types::{sol, SolCall};
use common::{evm, transfer, ScriptedAdapter, SOL_RECIPIENT};
use crosschain_tracer::core::bridge::{BridgeDetector, BridgeRegistry, Confidence, MatchKind};
use crosschain_tracer::models::{Chain, Direction, EventType, TraceRequest, TracerConfig};
use crosschain_tracer::providers::evm::{bridge_metadata, RpcTransaction};
use crosschain_tracer::providers::{AdapterRegistry, FetchScope};
use crosschain_tracer::TransactionTracer;
use rust_decimal_macros::dec;
use std::sync::Arc;

sol! {
    function wrapAndTransferETH(
        uint16 recipientChain,
        bytes32 recipient,
        uint256 arbiterFee,
        uint32 nonce
    ) external payable returns (uint64 sequence);
}

const PORTAL: &str = "0x3ee18b2214aff97000d974cf647e7c347e8fa585";

fn wormhole_to_solana(from: &str) -> crosschain_tracer::models::CanonicalEvent {
    let recipient: [u8; 32] = bs58::decode(SOL_RECIPIENT)
        .into_vec()
        .unwrap()
        .try_into()
        .unwrap();
    let calldata = wrapAndTransferETHCall {
        recipientChain: 1,
        recipient: FixedBytes(recipient),
        arbiterFee: U256::ZERO,
        nonce: 7,
    }
    .abi_encode();

    let tx = RpcTransaction {
        hash: "0xportal".into(),
        from: from.into(),
        to: Some(PORTAL.into()),
        input: format!("0x{}", hex::encode(calldata)),
        value: "0xde0b6b3a7640000".into(),
    };

    let mut event = transfer(Chain::Ethereum, "0xportal", from, PORTAL, dec!(1));
    event.bridge = Some(bridge_metadata(&tx, None));
    event
}

#[test]
fn test_wormhole_payload_resolves_with_high_confidence() {
    let detector = BridgeDetector::new(Arc::new(BridgeRegistry::with_static()));
    let event = wormhole_to_solana(&evm(1));

    let matched = detector.classify(&event, Direction::Forward).unwrap();
    assert_eq!(matched.name, "Wormhole Portal");
    assert_eq!(matched.matched_by, MatchKind::Address);
    assert_eq!(matched.counterpart_chain, Some(Chain::Solana));
    assert_eq!(matched.confidence, Some(Confidence::High));
    assert_eq!(matched.recipient.as_deref(), Some(SOL_RECIPIENT));
}

#[tokio::test]
async fn test_trace_crosses_from_ethereum_to_solana() {
    let sol_hop = "So11111111111111111111111111111111111111112";
    let eth = ScriptedAdapter::new(Chain::Ethereum).with_event(FetchScope::Native, wormhole_to_solana(&evm(1)));
    let solana = ScriptedAdapter::new(Chain::Solana).with_event(
        FetchScope::Native,
        transfer(Chain::Solana, "5sig", SOL_RECIPIENT, sol_hop, dec!(2)),
    );

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(eth));
    adapters.register(Arc::new(solana));

    let config = TracerConfig {
        max_concurrency: 2,
        ..TracerConfig::default()
    };
    let tracer = TransactionTracer::new(adapters, Arc::new(BridgeRegistry::with_static()), config);
    let result = tracer
        .trace(TraceRequest::new(Chain::Ethereum, evm(1)))
        .await
        .unwrap();

    let crossing = &result.edges[0];
    assert_eq!(crossing.event_type, EventType::Bridge);
    assert_eq!(crossing.chain_from, Some(Chain::Ethereum));
    assert_eq!(crossing.chain_to, Some(Chain::Solana));
    assert_eq!(crossing.bridge_confidence.as_deref(), Some("high"));
    assert_eq!(crossing.taint_value, dec!(0.95));

    let landed = &result.nodes[&format!("solana:{}", SOL_RECIPIENT)];
    assert_eq!(landed.hop_distance, 1);
    let onward = &result.nodes[&format!("solana:{}", sol_hop)];
    assert_eq!(onward.taint_received, dec!(0.95));
    assert_eq!(onward.hop_distance, 2);
    assert!(result.completed);
}
