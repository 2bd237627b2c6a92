//! EVM Chain Adapter
//!
//! Uses Alchemy's Transfers API (`alchemy_getAssetTransfers`, 120 CU) to find
//! the transactions touching an address, then batch-fetches transactions and
//! receipts to:
//! 1. decode ERC20 / ERC721 Transfer logs emitted by the called token contract
//! 2. collect selector, log topics and Wormhole payloads for bridge detection
//!
//! Reference: https://alchemy.com/docs/reference/transfers-api-quickstart.mdx

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{BridgeMetadata, CanonicalEvent, EventType, SubTransfer};
use crate::providers::adapter::{ChainAdapter, FetchScope, PageRequest, TransferPage};
use crate::providers::rpc::RpcProvider;
use crate::utils::address::{normalize, recipient_from_bytes32};
use crate::utils::constants::{
    wormhole_chain, SELECTOR_WORMHOLE_TRANSFER_TOKENS, SELECTOR_WORMHOLE_WRAP_AND_TRANSFER_ETH,
};
use crate::utils::decoder::{
    decode_calldata, decode_transfer_log, parse_hex_u256, parse_hex_u64, selector_hex,
    units_to_decimal, WormholeDecoder,
};

/// Alchemy caps maxCount at 1000
const MAX_TRANSFERS_PER_PAGE: usize = 1000;

/// Decimals assumed when neither the transfer nor the log says otherwise
const DEFAULT_TOKEN_DECIMALS: u32 = 18;

// ============================================
// TRANSFERS API TYPES
// ============================================

/// Transfer category filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCategory {
    External,
    Internal,
    Erc20,
    Erc721,
}

impl TransferCategory {
    /// Categories queried for a scope
    pub fn for_scope(scope: FetchScope) -> &'static [TransferCategory] {
        match scope {
            FetchScope::Token => &[TransferCategory::Erc20, TransferCategory::Erc721],
            _ => &[TransferCategory::External, TransferCategory::Internal],
        }
    }
}

/// Asset transfer entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub block_num: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub asset: Option<String>,
    pub category: String,
    pub raw_contract: Option<RawContract>,
    pub metadata: Option<TransferMetadata>,
}

impl AssetTransfer {
    fn is_native(&self) -> bool {
        matches!(self.category.as_str(), "external" | "internal")
    }

    fn timestamp(&self) -> i64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.block_timestamp.as_deref())
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0)
    }

    fn decimals(&self) -> u32 {
        if self.category == "erc721" {
            return 0;
        }
        self.raw_contract
            .as_ref()
            .and_then(|rc| rc.decimal.as_deref())
            .and_then(parse_hex_u64)
            .map(|d| d as u32)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    fn amount(&self) -> U256 {
        if self.category == "erc721" {
            return U256::from(1u8);
        }
        self.raw_contract
            .as_ref()
            .and_then(|rc| rc.value.as_deref())
            .and_then(parse_hex_u256)
            .unwrap_or(U256::ZERO)
    }

    fn token_address(&self) -> Option<String> {
        if self.is_native() {
            return None;
        }
        self.raw_contract
            .as_ref()
            .and_then(|rc| rc.address.as_deref())
            .map(|a| a.to_lowercase())
    }
}

/// Raw contract info in transfer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub value: Option<String>,
    pub address: Option<String>,
    pub decimal: Option<String>,
}

/// Block metadata (requested with `withMetadata`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub block_timestamp: Option<String>,
}

/// Response from alchemy_getAssetTransfers
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfersResponse {
    pub transfers: Vec<AssetTransfer>,
    pub page_key: Option<String>,
}

// ============================================
// TRANSACTION / RECEIPT TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcReceipt {
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

/// Transaction plus receipt, either of which may be missing
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    pub tx: Option<RpcTransaction>,
    pub receipt: Option<RpcReceipt>,
}

// ============================================
// ADAPTER
// ============================================

/// Account-model adapter for EVM chains
pub struct EvmAdapter {
    chain: Chain,
    provider: RpcProvider,
    page_size: usize,
}

impl EvmAdapter {
    pub fn new(chain: Chain, provider: RpcProvider, is_alchemy: bool, page_size: usize) -> Self {
        if !is_alchemy {
            warn!(
                "⚠️ {} endpoint is not Alchemy; alchemy_getAssetTransfers may be unsupported",
                chain
            );
        }
        Self {
            chain,
            provider,
            page_size: page_size.clamp(1, MAX_TRANSFERS_PER_PAGE),
        }
    }

    async fn fetch(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
        outgoing: bool,
    ) -> AppResult<TransferPage> {
        if scope == FetchScope::Utxo {
            return Ok(TransferPage::default());
        }

        let focus = normalize(self.chain, address);
        let response = self.get_asset_transfers(&focus, scope, page, outgoing).await?;

        // Group by transaction, first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<AssetTransfer>> = HashMap::new();
        for transfer in response.transfers {
            let hash = transfer.hash.to_lowercase();
            if !groups.contains_key(&hash) {
                order.push(hash.clone());
            }
            groups.entry(hash).or_default().push(transfer);
        }

        let contexts = self.fetch_tx_context(&order).await;

        let events = order
            .iter()
            .filter_map(|hash| {
                let transfers = groups.get(hash)?;
                normalize_group(
                    self.chain,
                    scope,
                    &focus,
                    outgoing,
                    transfers,
                    contexts.get(hash),
                )
            })
            .collect::<Vec<_>>();

        debug!(
            "📦 {} {} {:?}: {} events from {} transactions",
            self.chain,
            if outgoing { "outgoing" } else { "incoming" },
            scope,
            events.len(),
            order.len()
        );

        Ok(TransferPage {
            events,
            next_page: response.page_key,
        })
    }

    /// alchemy_getAssetTransfers for one direction and scope
    async fn get_asset_transfers(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
        outgoing: bool,
    ) -> AppResult<AssetTransfersResponse> {
        let limit = page.limit.clamp(1, self.page_size);

        let mut params = serde_json::json!({
            "category": TransferCategory::for_scope(scope),
            "withMetadata": true,
            "excludeZeroValue": true,
            "order": "asc",
            "maxCount": format!("0x{:x}", limit),
            "fromBlock": page.range.from_block.map(|b| format!("0x{:x}", b)).unwrap_or_else(|| "0x0".to_string()),
            "toBlock": page.range.to_block.map(|b| format!("0x{:x}", b)).unwrap_or_else(|| "latest".to_string()),
        });

        let key = if outgoing { "fromAddress" } else { "toAddress" };
        params[key] = serde_json::Value::String(address.to_string());

        if let Some(cursor) = &page.cursor {
            params["pageKey"] = serde_json::Value::String(cursor.clone());
        }

        let response = self
            .provider
            .call::<AssetTransfersResponse>("alchemy_getAssetTransfers", serde_json::json!([params]))
            .await?;
        Ok(response)
    }

    /// Batch eth_getTransactionByHash + eth_getTransactionReceipt.
    /// Missing items degrade to an empty context.
    async fn fetch_tx_context(&self, hashes: &[String]) -> HashMap<String, TxContext> {
        let mut contexts = HashMap::with_capacity(hashes.len());
        if hashes.is_empty() {
            return contexts;
        }

        let mut requests = Vec::with_capacity(hashes.len() * 2);
        for hash in hashes {
            requests.push(("eth_getTransactionByHash", serde_json::json!([hash])));
            requests.push(("eth_getTransactionReceipt", serde_json::json!([hash])));
        }

        let results = match self.provider.batch_call::<serde_json::Value>(requests).await {
            Ok(results) => results,
            Err(e) => {
                warn!("⚠️ {} tx/receipt batch failed, using transfer records only: {}", self.chain, e);
                return contexts;
            }
        };

        let mut results = results.into_iter();
        for hash in hashes {
            let tx = results
                .next()
                .and_then(|r| r.ok())
                .and_then(|v| serde_json::from_value::<RpcTransaction>(v).ok());
            let receipt = results
                .next()
                .and_then(|r| r.ok())
                .and_then(|v| serde_json::from_value::<RpcReceipt>(v).ok());
            contexts.insert(hash.clone(), TxContext { tx, receipt });
        }

        contexts
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_outgoing(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
    ) -> AppResult<TransferPage> {
        self.fetch(address, scope, page, true).await
    }

    async fn get_incoming(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
    ) -> AppResult<TransferPage> {
        self.fetch(address, scope, page, false).await
    }

    /// `raw` is one Transfers API record
    fn to_canonical(
        &self,
        raw: &serde_json::Value,
        perspective: &str,
    ) -> AppResult<Vec<CanonicalEvent>> {
        let transfer: AssetTransfer = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::malformed(format!("{} transfer record: {}", self.chain, e)))?;

        let focus = normalize(self.chain, perspective);
        let outgoing = transfer.from.eq_ignore_ascii_case(&focus);
        let scope = if transfer.is_native() {
            FetchScope::Native
        } else {
            FetchScope::Token
        };

        Ok(normalize_group(self.chain, scope, &focus, outgoing, &[transfer], None)
            .into_iter()
            .collect())
    }
}

// ============================================
// NORMALIZATION
// ============================================

/// Build one canonical event from the transfers of a single transaction
pub fn normalize_group(
    chain: Chain,
    scope: FetchScope,
    focus: &str,
    outgoing: bool,
    transfers: &[AssetTransfer],
    context: Option<&TxContext>,
) -> Option<CanonicalEvent> {
    let first = transfers.first()?;
    let tx_hash = first.hash.to_lowercase();
    let timestamp = first.timestamp();
    let tx = context.and_then(|c| c.tx.as_ref());
    let receipt = context.and_then(|c| c.receipt.as_ref());

    let involves_focus = |from: &str, to: &str| {
        if outgoing {
            from.eq_ignore_ascii_case(focus)
        } else {
            to.eq_ignore_ascii_case(focus)
        }
    };

    let mut legs: Vec<SubTransfer> = Vec::new();

    if scope == FetchScope::Token {
        if let (Some(tx), Some(receipt)) = (tx, receipt) {
            legs = token_legs_from_logs(tx, receipt, transfers, &involves_focus);
        }
    }

    if legs.is_empty() {
        legs = transfers
            .iter()
            .filter_map(|t| {
                let to = t.to.as_deref()?;
                if !involves_focus(&t.from, to) {
                    return None;
                }
                Some(SubTransfer {
                    from_address: t.from.to_lowercase(),
                    to_address: to.to_lowercase(),
                    value: units_to_decimal(t.amount(), t.decimals()),
                    asset: t.token_address(),
                })
            })
            .collect();
    }

    if legs.is_empty() {
        return None;
    }

    let value = legs.iter().map(|l| l.value).sum();
    let asset = legs.first().and_then(|l| l.asset.clone());
    let event_type = if scope == FetchScope::Token {
        EventType::TokenTransfer
    } else {
        EventType::Transfer
    };

    let (from_address, to_address) = if legs.len() == 1 {
        (legs[0].from_address.clone(), legs[0].to_address.clone())
    } else if outgoing {
        (focus.to_string(), tx.and_then(|t| t.to.clone()).unwrap_or_default().to_lowercase())
    } else {
        (tx.map(|t| t.from.to_lowercase()).unwrap_or_default(), focus.to_string())
    };

    Some(CanonicalEvent {
        chain,
        tx_hash,
        from_address,
        to_address,
        value,
        asset,
        event_type,
        timestamp,
        hop: 0,
        sub_transfers: if legs.len() > 1 { legs } else { Vec::new() },
        bridge: tx.map(|t| bridge_metadata(t, receipt)),
    })
}

/// Transfer logs emitted by the token contract the transaction called
fn token_legs_from_logs(
    tx: &RpcTransaction,
    receipt: &RpcReceipt,
    transfers: &[AssetTransfer],
    involves_focus: &dyn Fn(&str, &str) -> bool,
) -> Vec<SubTransfer> {
    let Some(called) = tx.to.as_deref() else {
        return Vec::new();
    };

    receipt
        .logs
        .iter()
        .filter(|log| log.address.eq_ignore_ascii_case(called))
        .filter_map(|log| {
            let decoded = decode_transfer_log(&log.topics, &log.data)?;
            if !involves_focus(&decoded.from, &decoded.to) {
                return None;
            }
            let token = log.address.to_lowercase();
            let decimals = if decoded.is_nft {
                0
            } else {
                transfers
                    .iter()
                    .find(|t| t.token_address().as_deref() == Some(token.as_str()))
                    .map(|t| t.decimals())
                    .unwrap_or(DEFAULT_TOKEN_DECIMALS)
            };
            Some(SubTransfer {
                from_address: decoded.from,
                to_address: decoded.to,
                value: units_to_decimal(decoded.amount, decimals),
                asset: Some(token),
            })
        })
        .collect()
}

/// Selector, topics and decoded Wormhole payload of a transaction
pub fn bridge_metadata(tx: &RpcTransaction, receipt: Option<&RpcReceipt>) -> BridgeMetadata {
    let calldata = decode_calldata(&tx.input).unwrap_or_default();
    let selector = selector_hex(&calldata);

    let topics = receipt
        .map(|r| {
            r.logs
                .iter()
                .filter_map(|log| log.topics.first().map(|t| t.to_lowercase()))
                .collect()
        })
        .unwrap_or_default();

    let mut metadata = BridgeMetadata {
        contract: tx.to.as_ref().map(|t| t.to_lowercase()),
        selector: selector.clone(),
        topics,
        destination_chain_hint: None,
        recipient: None,
    };

    let is_wormhole_call = matches!(
        selector.as_deref(),
        Some(SELECTOR_WORMHOLE_TRANSFER_TOKENS) | Some(SELECTOR_WORMHOLE_WRAP_AND_TRANSFER_ETH)
    );
    if is_wormhole_call {
        if let Some(transfer) = WormholeDecoder::decode(&calldata) {
            metadata.destination_chain_hint = wormhole_chain(transfer.recipient_chain);
            metadata.recipient = metadata
                .destination_chain_hint
                .and_then(|c| recipient_from_bytes32(&transfer.recipient, c.family()));
            debug!(
                "🌉 Wormhole payload in {}: chain {} → {:?}",
                tx.hash, transfer.recipient_chain, metadata.destination_chain_hint
            );
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::TRANSFER_EVENT_TOPIC;
    use rust_decimal_macros::dec;

    const FOCUS: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn transfer(json: serde_json::Value) -> AssetTransfer {
        serde_json::from_value(json).unwrap()
    }

    fn topic(addr: &str) -> String {
        format!("0x000000000000000000000000{}", addr.trim_start_matches("0x"))
    }

    #[test]
    fn test_transfer_category_serialization() {
        let json = serde_json::to_string(TransferCategory::for_scope(FetchScope::Token)).unwrap();
        assert_eq!(json, "[\"erc20\",\"erc721\"]");
    }

    #[test]
    fn test_native_transfer_normalization() {
        let t = transfer(serde_json::json!({
            "blockNum": "0x10",
            "hash": "0xABC",
            "from": FOCUS,
            "to": "0x2222222222222222222222222222222222222222",
            "asset": "ETH",
            "category": "external",
            "rawContract": { "value": "0xde0b6b3a7640000", "address": null, "decimal": "0x12" },
            "metadata": { "blockTimestamp": "2024-01-01T00:00:00.000Z" }
        }));

        let event =
            normalize_group(Chain::Ethereum, FetchScope::Native, FOCUS, true, &[t], None).unwrap();
        assert_eq!(event.tx_hash, "0xabc");
        assert_eq!(event.value, dec!(1));
        assert_eq!(event.event_type, EventType::Transfer);
        assert_eq!(event.timestamp, 1704067200);
        assert!(event.asset.is_none());
        assert!(event.bridge.is_none());
    }

    #[test]
    fn test_token_logs_split_into_sub_transfers() {
        let t = transfer(serde_json::json!({
            "blockNum": "0x10",
            "hash": "0xdef",
            "from": FOCUS,
            "to": "0x2222222222222222222222222222222222222222",
            "asset": "USDC",
            "category": "erc20",
            "rawContract": { "value": "0x5b8d80", "address": TOKEN, "decimal": "0x6" }
        }));
        let tx = RpcTransaction {
            hash: "0xdef".into(),
            from: FOCUS.into(),
            to: Some(TOKEN.into()),
            input: "0xa9059cbb".into(),
            value: "0x0".into(),
        };
        let receipt = RpcReceipt {
            logs: vec![
                RpcLog {
                    address: TOKEN.into(),
                    topics: vec![
                        TRANSFER_EVENT_TOPIC.into(),
                        topic(FOCUS),
                        topic("0x2222222222222222222222222222222222222222"),
                    ],
                    data: format!("0x{:064x}", 6_000_000u64),
                },
                RpcLog {
                    address: TOKEN.into(),
                    topics: vec![
                        TRANSFER_EVENT_TOPIC.into(),
                        topic(FOCUS),
                        topic("0x3333333333333333333333333333333333333333"),
                    ],
                    data: format!("0x{:064x}", 4_000_000u64),
                },
                // Emitted by another contract; ignored
                RpcLog {
                    address: "0x9999999999999999999999999999999999999999".into(),
                    topics: vec![
                        TRANSFER_EVENT_TOPIC.into(),
                        topic(FOCUS),
                        topic("0x4444444444444444444444444444444444444444"),
                    ],
                    data: format!("0x{:064x}", 1u64),
                },
            ],
        };
        let ctx = TxContext {
            tx: Some(tx),
            receipt: Some(receipt),
        };

        let event =
            normalize_group(Chain::Ethereum, FetchScope::Token, FOCUS, true, &[t], Some(&ctx))
                .unwrap();
        assert_eq!(event.event_type, EventType::TokenTransfer);
        assert_eq!(event.sub_transfers.len(), 2);
        assert_eq!(event.sub_transfers[0].value, dec!(6));
        assert_eq!(event.sub_transfers[1].value, dec!(4));
        assert_eq!(event.value, dec!(10));
        assert_eq!(event.asset.as_deref(), Some(TOKEN));
        assert_eq!(event.bridge.unwrap().selector.as_deref(), Some("0xa9059cbb"));
    }

    #[test]
    fn test_incoming_filter_drops_unrelated_legs() {
        let t = transfer(serde_json::json!({
            "blockNum": "0x10",
            "hash": "0x01",
            "from": "0x2222222222222222222222222222222222222222",
            "to": "0x3333333333333333333333333333333333333333",
            "category": "external",
            "rawContract": { "value": "0x1", "decimal": "0x12" }
        }));
        assert!(normalize_group(Chain::Base, FetchScope::Native, FOCUS, false, &[t], None).is_none());
    }

    #[test]
    fn test_wormhole_metadata_extraction() {
        use crate::utils::decoder::transferTokensCall;
        use alloy_primitives::{Address, FixedBytes};
        use alloy_sol_types::SolCall;

        let sol_recipient: [u8; 32] = bs58::decode("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
            .into_vec()
            .unwrap()
            .try_into()
            .unwrap();
        let call = transferTokensCall {
            token: Address::repeat_byte(0xaa),
            amount: U256::from(1u8),
            recipientChain: 1,
            recipient: FixedBytes(sol_recipient),
            arbiterFee: U256::ZERO,
            nonce: 0,
        };
        let tx = RpcTransaction {
            hash: "0x77".into(),
            from: FOCUS.into(),
            to: Some("0x3ee18B2214AFF97000D974cf647E7C347E8fa585".into()),
            input: format!("0x{}", hex::encode(call.abi_encode())),
            value: "0x0".into(),
        };

        let meta = bridge_metadata(&tx, None);
        assert_eq!(meta.selector.as_deref(), Some("0x0f5287b0"));
        assert_eq!(meta.destination_chain_hint, Some(Chain::Solana));
        assert_eq!(
            meta.recipient.as_deref(),
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        );
        assert_eq!(
            meta.contract.as_deref(),
            Some("0x3ee18b2214aff97000d974cf647e7c347e8fa585")
        );
    }

    #[test]
    fn test_erc721_transfer_counts_as_one_unit() {
        
        let raw = serde_json::json!({
            "blockNum": "0x10",
            "hash": "0x02",
            "from": "0x2222222222222222222222222222222222222222",
            "to": FOCUS,
            "category": "erc721",
            "rawContract": { "value": null, "address": TOKEN, "decimal": null }
        });
        let t: AssetTransfer = serde_json::from_value(raw).unwrap();
        let event =
            normalize_group(Chain::Polygon, FetchScope::Token, FOCUS, false, &[t], None).unwrap();
        assert_eq!(event.value, dec!(1));
        assert_eq!(event.to_address, FOCUS);
    }
}
