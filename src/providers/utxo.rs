//! UTXO Chain Adapter (Esplora REST)
//!
//! Works against any Esplora-compatible API (blockstream.info,
//! litecoinspace.org, self-hosted electrs):
//! - `GET /address/{addr}/txs` - newest transactions (first page)
//! - `GET /address/{addr}/txs/chain/{last_txid}` - older confirmed transactions
//!
//! A spend becomes one leg per output; change back to the spender is kept
//! as a self-leg so it counts toward the split without creating an edge.
//! The fee (and anything paid to scripts without an address) joins that
//! self-leg, so shares are taken over the total spent input value. When
//! other owners co-funded the inputs, every leg is scaled by the spender's
//! fraction of the inputs.

use alloy_primitives::U256;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use tracing::debug;

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{CanonicalEvent, EventType, SubTransfer};
use crate::providers::adapter::{ChainAdapter, FetchScope, PageRequest, TransferPage};
use crate::providers::rpc::RpcProvider;
use crate::utils::decoder::units_to_decimal;

/// Esplora returns at most 25 confirmed transactions per chain page
const ESPLORA_CHAIN_PAGE: usize = 25;

const COIN_DECIMALS: u32 = 8;

// ============================================
// ESPLORA TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<EsploraVin>,
    #[serde(default)]
    pub vout: Vec<EsploraVout>,
    pub status: Option<EsploraStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraVin {
    pub prevout: Option<EsploraVout>,
    #[serde(default)]
    pub is_coinbase: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraVout {
    pub scriptpubkey_address: Option<String>,
    /// Satoshis
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

impl EsploraTx {
    fn block_height(&self) -> Option<u64> {
        self.status.as_ref().and_then(|s| s.block_height)
    }

    fn timestamp(&self) -> i64 {
        self.status.as_ref().and_then(|s| s.block_time).unwrap_or(0)
    }

    fn spends_from(&self, address: &str) -> bool {
        self.vin.iter().any(|vin| {
            vin.prevout
                .as_ref()
                .and_then(|p| p.scriptpubkey_address.as_deref())
                == Some(address)
        })
    }

    /// Satoshis across all inputs, and those funded by `address`
    fn input_value(&self, address: &str) -> (u64, u64) {
        self.vin
            .iter()
            .filter_map(|vin| vin.prevout.as_ref())
            .fold((0u64, 0u64), |(spent, funded), prev| {
                let own = prev.scriptpubkey_address.as_deref() == Some(address);
                (
                    spent.saturating_add(prev.value),
                    if own { funded.saturating_add(prev.value) } else { funded },
                )
            })
    }

    fn pays_to(&self, address: &str) -> bool {
        self.vout
            .iter()
            .any(|v| v.scriptpubkey_address.as_deref() == Some(address))
    }
}

// ============================================
// ADAPTER
// ============================================

pub struct UtxoAdapter {
    chain: Chain,
    provider: RpcProvider,
}

impl UtxoAdapter {
    pub fn new(chain: Chain, provider: RpcProvider) -> Self {
        Self { chain, provider }
    }

    async fn fetch(&self, address: &str, page: &PageRequest, outgoing: bool) -> AppResult<TransferPage> {
        let path = match &page.cursor {
            Some(last_txid) => format!("address/{}/txs/chain/{}", address, last_txid),
            None => format!("address/{}/txs", address),
        };
        let txs: Vec<EsploraTx> = self.provider.get(&path, &[]).await?;

        // Cursor is the last confirmed txid of a full chain page
        let confirmed: Vec<&EsploraTx> = txs
            .iter()
            .filter(|tx| tx.status.as_ref().is_some_and(|s| s.confirmed))
            .collect();
        let next_page = if confirmed.len() >= ESPLORA_CHAIN_PAGE {
            confirmed.last().map(|tx| tx.txid.clone())
        } else {
            None
        };

        let events: Vec<CanonicalEvent> = txs
            .iter()
            .filter(|tx| in_range(tx, page))
            .filter_map(|tx| normalize_tx(self.chain, tx, address, outgoing))
            .collect();

        debug!(
            "📦 {} {} utxo: {} events from {} txs",
            self.chain,
            if outgoing { "outgoing" } else { "incoming" },
            events.len(),
            txs.len()
        );

        Ok(TransferPage { events, next_page })
    }
}

fn in_range(tx: &EsploraTx, page: &PageRequest) -> bool {
    match tx.block_height() {
        Some(height) => {
            page.range.from_block.map_or(true, |from| height >= from)
                && page.range.to_block.map_or(true, |to| height <= to)
        }
        // Mempool transactions only belong to open-ended ranges
        None => page.range.to_block.is_none(),
    }
}

#[async_trait]
impl ChainAdapter for UtxoAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    /// UTXO chains have no account-model transfers
    async fn get_outgoing(&self, _: &str, _: FetchScope, _: &PageRequest) -> AppResult<TransferPage> {
        Ok(TransferPage::default())
    }

    async fn get_incoming(&self, _: &str, _: FetchScope, _: &PageRequest) -> AppResult<TransferPage> {
        Ok(TransferPage::default())
    }

    async fn get_utxo_outgoing(&self, address: &str, page: &PageRequest) -> AppResult<TransferPage> {
        self.fetch(address, page, true).await
    }

    async fn get_utxo_incoming(&self, address: &str, page: &PageRequest) -> AppResult<TransferPage> {
        self.fetch(address, page, false).await
    }

    /// `raw` is one Esplora transaction
    fn to_canonical(
        &self,
        raw: &serde_json::Value,
        perspective: &str,
    ) -> AppResult<Vec<CanonicalEvent>> {
        let tx: EsploraTx = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::malformed(format!("{} transaction: {}", self.chain, e)))?;

        Ok([true, false]
            .into_iter()
            .filter_map(|outgoing| normalize_tx(self.chain, &tx, perspective, outgoing))
            .collect())
    }
}

// ============================================
// NORMALIZATION
// ============================================

/// Spend of `focus` (outgoing) or payment to it (incoming) as one event
pub fn normalize_tx(chain: Chain, tx: &EsploraTx, focus: &str, outgoing: bool) -> Option<CanonicalEvent> {
    let legs = if outgoing {
        if !tx.spends_from(focus) {
            return None;
        }
        let (spent, funded) = tx.input_value(focus);
        let outputs: Vec<(String, String, u64)> = tx
            .vout
            .iter()
            .filter_map(|out| {
                let to = out.scriptpubkey_address.as_deref()?;
                Some((focus.to_string(), to.to_string(), out.value))
            })
            .collect();
        let paid: u64 = outputs.iter().fold(0u64, |acc, o| acc.saturating_add(o.2));
        let retained = spent.saturating_sub(paid);

        let mut legs = merge_legs(
            outputs
                .into_iter()
                .chain((retained > 0).then(|| (focus.to_string(), focus.to_string(), retained))),
        );
        if funded > 0 && funded < spent {
            scale_legs(&mut legs, Decimal::from(funded) / Decimal::from(spent));
        }
        legs
    } else {
        if !tx.pays_to(focus) {
            return None;
        }
        merge_legs(tx.vin.iter().filter(|vin| !vin.is_coinbase).filter_map(|vin| {
            let prev = vin.prevout.as_ref()?;
            let from = prev.scriptpubkey_address.as_deref()?;
            Some((from.to_string(), focus.to_string(), prev.value))
        }))
    };

    if legs.is_empty() {
        return None;
    }

    let value: Decimal = legs.iter().map(|l| l.value).sum();
    let (from_address, to_address) = if outgoing {
        let first_external = legs
            .iter()
            .find(|l| l.to_address != focus)
            .unwrap_or(&legs[0]);
        (focus.to_string(), first_external.to_address.clone())
    } else {
        let first_external = legs
            .iter()
            .find(|l| l.from_address != focus)
            .unwrap_or(&legs[0]);
        (first_external.from_address.clone(), focus.to_string())
    };

    Some(CanonicalEvent {
        chain,
        tx_hash: tx.txid.clone(),
        from_address,
        to_address,
        value,
        asset: None,
        event_type: EventType::UtxoSpend,
        timestamp: tx.timestamp(),
        hop: 0,
        sub_transfers: legs,
        bridge: None,
    })
}

/// Sum satoshis per (from, to), first-seen order
fn merge_legs(raw: impl Iterator<Item = (String, String, u64)>) -> Vec<SubTransfer> {
    let mut merged: Vec<(String, String, u64)> = Vec::new();
    for (from, to, sats) in raw {
        match merged.iter_mut().find(|(f, t, _)| *f == from && *t == to) {
            Some(entry) => entry.2 = entry.2.saturating_add(sats),
            None => merged.push((from, to, sats)),
        }
    }
    merged
        .into_iter()
        .map(|(from_address, to_address, sats)| SubTransfer {
            from_address,
            to_address,
            value: units_to_decimal(U256::from(sats), COIN_DECIMALS),
            asset: None,
        })
        .collect()
}

/// Attribute only the spender's fraction of a co-funded spend
fn scale_legs(legs: &mut [SubTransfer], fraction: Decimal) {
    for leg in legs {
        leg.value = leg
            .value
            .checked_mul(fraction)
            .map(|v| v.round_dp_with_strategy(18, RoundingStrategy::ToZero))
            .unwrap_or(Decimal::ZERO);
    }
}
