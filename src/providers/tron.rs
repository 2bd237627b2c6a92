//! Tron Chain Adapter (TronGrid v1 REST)
//!
//! - `GET /v1/accounts/{addr}/transactions` - TRX transfers and contract calls
//! - `GET /v1/accounts/{addr}/transactions/trc20` - TRC20 transfers
//!
//! Both endpoints page with an opaque `fingerprint`.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{BridgeMetadata, CanonicalEvent, EventType};
use crate::providers::adapter::{ChainAdapter, FetchScope, PageRequest, TransferPage};
use crate::providers::rpc::RpcProvider;
use crate::utils::address::tron_hex_to_base58;
use crate::utils::decoder::units_to_decimal;

/// TronGrid maximum `limit`
const MAX_TRONGRID_LIMIT: usize = 200;

const TRX_DECIMALS: u32 = 6;

// ============================================
// TRONGRID TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct TronGridResponse<T> {
    #[serde(default)]
    pub data: Vec<T>,
    pub meta: Option<TronGridMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronGridMeta {
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<u64>,
    /// Milliseconds
    pub block_timestamp: Option<i64>,
    #[serde(default)]
    pub ret: Vec<TronRet>,
    pub raw_data: TronRawData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronRet {
    #[serde(rename = "contractRet")]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronRawData {
    #[serde(default)]
    pub contract: Vec<TronContract>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronContract {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameter: TronParameter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronParameter {
    pub value: serde_json::Value,
}

/// TRC20 transfer entry
#[derive(Debug, Clone, Deserialize)]
pub struct Trc20Transfer {
    pub transaction_id: String,
    pub token_info: Trc20TokenInfo,
    pub block_timestamp: Option<i64>,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Trc20TokenInfo {
    pub address: String,
    pub decimals: u32,
    pub symbol: Option<String>,
}

// ============================================
// ADAPTER
// ============================================

pub struct TronAdapter {
    provider: RpcProvider,
    page_size: usize,
}

impl TronAdapter {
    pub fn new(provider: RpcProvider, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.clamp(1, MAX_TRONGRID_LIMIT),
        }
    }

    fn query(&self, page: &PageRequest, outgoing: bool) -> Vec<(&'static str, String)> {
        let mut query = vec![
            (if outgoing { "only_from" } else { "only_to" }, "true".to_string()),
            ("only_confirmed", "true".to_string()),
            ("limit", page.limit.clamp(1, self.page_size).to_string()),
            ("order_by", "block_timestamp,asc".to_string()),
        ];
        if let Some(fingerprint) = &page.cursor {
            query.push(("fingerprint", fingerprint.clone()));
        }
        query
    }

    async fn fetch(
        &self,
        address: &str,
        scope: FetchScope,
        page: &PageRequest,
        outgoing: bool,
    ) -> AppResult<TransferPage> {
        let query = self.query(page, outgoing);

        let (events, fingerprint) = match scope {
            FetchScope::Native => {
                let mut query = query;
                query.push(("visible", "true".to_string()));
                let response: TronGridResponse<TronTransaction> = self
                    .provider
                    .get(&format!("v1/accounts/{}/transactions", address), &query)
                    .await?;
                let events: Vec<CanonicalEvent> = response
                    .data
                    .iter()
                    .filter(|tx| in_range(tx.block_number, page))
                    .filter_map(|tx| normalize_transaction(tx, address, outgoing))
                    .collect();
                (events, response.meta.and_then(|m| m.fingerprint))
            }
            FetchScope::Token => {
                let response: TronGridResponse<Trc20Transfer> = self
                    .provider
                    .get(&format!("v1/accounts/{}/transactions/trc20", address), &query)
                    .await?;
                let events: Vec<CanonicalEvent> = response
                    .data
                    .iter()
                    .filter_map(|t| normalize_trc20(t, address, outgoing))
                    .collect();
                (events, response.meta.and_then(|m| m.fingerprint))
            }
            FetchScope::Utxo => return Ok(TransferPage::default()),
        };

        debug!(
            "📦 tron {} {:?}: {} events",
            if outgoing { "outgoing" } else { "incoming" },
            scope,
            events.len()
        );

        Ok(TransferPage {
            events,
            next_page: fingerprint,
        })
    }
}

fn in_range(block: Option<u64>, page: &PageRequest) -> bool {
    let Some(block) = block else {
        return page.range.is_open();
    };
    page.range.from_block.map_or(true, |from| block >= from)
        && page.range.to_block.map_or(true, |to| block <= to)
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn chain(&self) -> Chain {
        Chain::Tron
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

    /// `raw` is a TronGrid transaction or a TRC20 transfer entry
    fn to_canonical(
        &self,
        raw: &serde_json::Value,
        perspective: &str,
    ) -> AppResult<Vec<CanonicalEvent>> {
        let events = if raw.get("token_info").is_some() {
            let transfer: Trc20Transfer = serde_json::from_value(raw.clone())
                .map_err(|e| AppError::malformed(format!("trc20 transfer: {}", e)))?;
            [true, false]
                .into_iter()
                .filter_map(|outgoing| normalize_trc20(&transfer, perspective, outgoing))
                .collect()
        } else {
            let tx: TronTransaction = serde_json::from_value(raw.clone())
                .map_err(|e| AppError::malformed(format!("tron transaction: {}", e)))?;
            [true, false]
                .into_iter()
                .filter_map(|outgoing| normalize_transaction(&tx, perspective, outgoing))
                .collect()
        };
        Ok(events)
    }
}

// ============================================
// NORMALIZATION
// ============================================

/// Hex (`41…`) or base58 address → base58
fn base58(address: &str) -> Option<String> {
    if address.starts_with('T') {
        Some(address.to_string())
    } else {
        tron_hex_to_base58(address)
    }
}

/// TransferContract, or TriggerSmartContract carrying TRX
pub fn normalize_transaction(tx: &TronTransaction, focus: &str, outgoing: bool) -> Option<CanonicalEvent> {
    let succeeded = tx
        .ret
        .first()
        .and_then(|r| r.contract_ret.as_deref())
        .map_or(true, |r| r == "SUCCESS");
    if !succeeded {
        return None;
    }

    let contract = tx.raw_data.contract.first()?;
    let value = &contract.parameter.value;
    let owner = base58(value.get("owner_address")?.as_str()?)?;

    let (to, sun, bridge) = match contract.kind.as_str() {
        "TransferContract" => {
            let to = base58(value.get("to_address")?.as_str()?)?;
            (to, value.get("amount")?.as_u64()?, None)
        }
        "TriggerSmartContract" => {
            let target = base58(value.get("contract_address")?.as_str()?)?;
            let call_value = value.get("call_value").and_then(|v| v.as_u64()).unwrap_or(0);
            if call_value == 0 {
                return None;
            }
            let selector = value
                .get("data")
                .and_then(|d| d.as_str())
                .filter(|d| d.len() >= 8)
                .map(|d| format!("0x{}", d[..8].to_lowercase()));
            let bridge = BridgeMetadata {
                contract: Some(target.clone()),
                selector,
                ..Default::default()
            };
            (target, call_value, Some(bridge))
        }
        _ => return None,
    };

    let involved = if outgoing { owner == focus } else { to == focus };
    if !involved {
        return None;
    }

    Some(CanonicalEvent {
        chain: Chain::Tron,
        tx_hash: tx.tx_id.clone(),
        from_address: owner,
        to_address: to,
        value: units_to_decimal(U256::from(sun), TRX_DECIMALS),
        asset: None,
        event_type: EventType::Transfer,
        timestamp: tx.block_timestamp.unwrap_or(0) / 1000,
        hop: 0,
        sub_transfers: Vec::new(),
        bridge,
    })
}

pub fn normalize_trc20(transfer: &Trc20Transfer, focus: &str, outgoing: bool) -> Option<CanonicalEvent> {
    if transfer.kind.as_deref().is_some_and(|k| k != "Transfer") {
        return None;
    }
    let from = base58(&transfer.from)?;
    let to = base58(&transfer.to)?;
    let involved = if outgoing { from == focus } else { to == focus };
    if !involved {
        return None;
    }

    let raw = U256::from_str_radix(&transfer.value, 10).ok()?;
    Some(CanonicalEvent {
        chain: Chain::Tron,
        tx_hash: transfer.transaction_id.clone(),
        from_address: from,
        to_address: to,
        value: units_to_decimal(raw, transfer.token_info.decimals),
        asset: Some(transfer.token_info.address.clone()),
        event_type: EventType::TokenTransfer,
        timestamp: transfer.block_timestamp.unwrap_or(0) / 1000,
        hop: 0,
        sub_transfers: Vec::new(),
        bridge: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    #[test]
    fn test_trx_transfer_with_hex_addresses() {
        let owner_hex = "411111111111111111111111111111111111111111";
        let owner = tron_hex_to_base58(owner_hex).unwrap();
        let tx: TronTransaction = serde_json::from_value(serde_json::json!({
            "txID": "abc",
            "blockNumber": 60000000u64,
            "block_timestamp": 1700000000000i64,
            "ret": [{ "contractRet": "SUCCESS" }],
            "raw_data": { "contract": [{
                "type": "TransferContract",
                "parameter": { "value": {
                    "amount": 2_500_000u64,
                    "owner_address": owner_hex,
                    "to_address": USDT
                }}
            }]}
        }))
        .unwrap();

        let event = normalize_transaction(&tx, &owner, true).unwrap();
        assert_eq!(event.value, dec!(2.5));
        assert_eq!(event.to_address, USDT);
        assert_eq!(event.timestamp, 1700000000);
        assert_eq!(event.from_address, owner);
        assert_ne!(owner, USDT);

        assert!(normalize_transaction(&tx, &owner, false).is_none());
        let incoming = normalize_transaction(&tx, USDT, false).unwrap();
        assert_eq!(incoming.from_address, owner);
    }

    #[test]
    fn test_page_response_without_data_field() {
        let page: TronGridResponse<TronTransaction> = serde_json::from_value(serde_json::json!({
            "meta": { "fingerprint": "next" }
        }))
        .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.meta.and_then(|m| m.fingerprint).as_deref(), Some("next"));

        let page: TronGridResponse<Trc20Transfer> = serde_json::from_value(serde_json::json!({
            "data": [{
                "transaction_id": "def",
                "token_info": { "address": USDT, "decimals": 6 },
                "from": "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL",
                "to": "TKHuVq1oKVruCGLvqVexFs6dawKv6fQgFs",
                "value": "5"
            }]
        }))
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(page.meta.is_none());
    }

    #[test]
    fn test_failed_transaction_skipped() {
        let tx: TronTransaction = serde_json::from_value(serde_json::json!({
            "txID": "abc",
            "ret": [{ "contractRet": "REVERT" }],
            "raw_data": { "contract": [] }
        }))
        .unwrap();
        assert!(normalize_transaction(&tx, USDT, true).is_none());
    }

    #[test]
    fn test_trc20_transfer() {
        let transfer: Trc20Transfer = serde_json::from_value(serde_json::json!({
            "transaction_id": "def",
            "token_info": { "address": USDT, "decimals": 6, "symbol": "USDT" },
            "block_timestamp": 1700000000000i64,
            "from": "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL",
            "to": "TKHuVq1oKVruCGLvqVexFs6dawKv6fQgFs",
            "type": "Transfer",
            "value": "1000000"
        }))
        .unwrap();

        let event = normalize_trc20(&transfer, "TKHuVq1oKVruCGLvqVexFs6dawKv6fQgFs", false).unwrap();
        assert_eq!(event.value, dec!(1));
        assert_eq!(event.asset.as_deref(), Some(USDT));
        assert_eq!(event.event_type, EventType::TokenTransfer);
    }
}
