//! Solana Chain Adapter
//!
//! Standard JSON-RPC only:
//! 1. `getSignaturesForAddress` - paged signature list (cursor = last signature)
//! 2. `getTransaction` (jsonParsed, batched) - parsed system / spl-token instructions
//!
//! Legs come from `transfer` / `transferChecked` instructions (inner ones
//! included). Token accounts are resolved to their owners through the
//! pre/post token balances. Transactions without parsable transfers fall
//! back to balance deltas.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::config::Chain;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{BridgeMetadata, CanonicalEvent, EventType, SubTransfer};
use crate::providers::adapter::{ChainAdapter, FetchScope, PageRequest, TransferPage};
use crate::providers::rpc::RpcProvider;
use crate::utils::constants::{SYSTEM_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::utils::decoder::units_to_decimal;

/// RPC maximum for getSignaturesForAddress
const MAX_SIGNATURES_PER_PAGE: usize = 1000;

const SOL_DECIMALS: u32 = 9;

/// Programs that never identify a bridge on their own
const INFRA_PROGRAMS: &[&str] = &[
    SYSTEM_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
    TOKEN_2022_PROGRAM_ID,
    "ComputeBudget111111111111111111111111111111",
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
    "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo",
];

// ============================================
// SOLANA RPC TYPES
// ============================================

/// getSignaturesForAddress entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub err: Option<serde_json::Value>,
    pub block_time: Option<i64>,
}

/// getTransaction (jsonParsed)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransaction {
    pub slot: u64,
    pub transaction: TransactionData,
    pub meta: Option<TransactionMeta>,
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    pub signatures: Vec<String>,
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub account_keys: Vec<AccountKey>,
    #[serde(default)]
    pub instructions: Vec<ParsedInstruction>,
}

/// `{pubkey, signer, writable}` in jsonParsed, a bare string otherwise
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Parsed { pubkey: String },
    Plain(String),
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            Self::Parsed { pubkey } => pubkey,
            Self::Plain(key) => key,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    pub program_id: String,
    pub parsed: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerInstructions {
    pub index: u32,
    pub instructions: Vec<ParsedInstruction>,
}

/// Transaction metadata
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub err: Option<serde_json::Value>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Option<Vec<SolanaTokenBalance>>,
    pub post_token_balances: Option<Vec<SolanaTokenBalance>>,
    pub inner_instructions: Option<Vec<InnerInstructions>>,
}

/// Token balance in transaction (Solana-specific)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub ui_token_amount: TokenAmount,
}

/// Token amount
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    pub amount: String,
    pub decimals: u8,
}

/// Owner and mint of an SPL token account
#[derive(Debug, Clone)]
struct TokenAccount {
    owner: Option<String>,
    mint: String,
    decimals: u32,
}

// ============================================
// ADAPTER
// ============================================

pub struct SolanaAdapter {
    provider: RpcProvider,
    page_size: usize,
}

impl SolanaAdapter {
    pub fn new(provider: RpcProvider, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.clamp(1, MAX_SIGNATURES_PER_PAGE),
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

        let limit = page.limit.clamp(1, self.page_size);
        let mut options = serde_json::json!({ "limit": limit });
        if let Some(before) = &page.cursor {
            options["before"] = serde_json::Value::String(before.clone());
        }

        let signatures: Vec<SignatureInfo> = self
            .provider
            .call("getSignaturesForAddress", serde_json::json!([address, options]))
            .await?;

        let next_page = if signatures.len() >= limit {
            signatures.last().map(|s| s.signature.clone())
        } else {
            None
        };

        let wanted: Vec<&SignatureInfo> = signatures
            .iter()
            .filter(|s| s.err.is_none())
            .filter(|s| page.range.from_block.map_or(true, |from| s.slot >= from))
            .filter(|s| page.range.to_block.map_or(true, |to| s.slot <= to))
            .collect();

        let transactions = self.fetch_transactions(&wanted).await;

        let events: Vec<CanonicalEvent> = transactions
            .iter()
            .filter_map(|tx| normalize_transaction(tx, address, scope, outgoing))
            .collect();

        debug!(
            "📦 solana {} {:?}: {} events from {} signatures",
            if outgoing { "outgoing" } else { "incoming" },
            scope,
            events.len(),
            signatures.len()
        );

        Ok(TransferPage { events, next_page })
    }

    /// Batched getTransaction; unparsable or missing entries are skipped
    async fn fetch_transactions(&self, signatures: &[&SignatureInfo]) -> Vec<SolanaTransaction> {
        if signatures.is_empty() {
            return Vec::new();
        }

        let requests = signatures
            .iter()
            .map(|s| {
                (
                    "getTransaction",
                    serde_json::json!([
                        s.signature,
                        { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
                    ]),
                )
            })
            .collect();

        match self.provider.batch_call::<SolanaTransaction>(requests).await {
            Ok(results) => results
                .into_iter()
                .zip(signatures)
                .filter_map(|(result, sig)| match result {
                    Ok(tx) => Some(tx),
                    Err(e) => {
                        debug!("Skipping solana tx {}: {}", sig.signature, e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ solana getTransaction batch failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> Chain {
        Chain::Solana
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

    /// `raw` is one getTransaction (jsonParsed) result
    fn to_canonical(
        &self,
        raw: &serde_json::Value,
        perspective: &str,
    ) -> AppResult<Vec<CanonicalEvent>> {
        let tx: SolanaTransaction = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::malformed(format!("solana transaction: {}", e)))?;

        let mut events = Vec::new();
        for scope in [FetchScope::Native, FetchScope::Token] {
            for outgoing in [true, false] {
                events.extend(normalize_transaction(&tx, perspective, scope, outgoing));
            }
        }
        Ok(events)
    }
}

// ============================================
// NORMALIZATION
// ============================================

/// One event per transaction, scope and direction
pub fn normalize_transaction(
    tx: &SolanaTransaction,
    focus: &str,
    scope: FetchScope,
    outgoing: bool,
) -> Option<CanonicalEvent> {
    let meta = tx.meta.as_ref()?;
    if meta.err.is_some() {
        return None;
    }
    let signature = tx.transaction.signatures.first()?.clone();
    let keys: Vec<&str> = tx
        .transaction
        .message
        .account_keys
        .iter()
        .map(|k| k.pubkey())
        .collect();
    let token_accounts = token_accounts(&keys, meta);

    let instructions = all_instructions(tx);
    let mut legs: Vec<SubTransfer> = instructions
        .iter()
        .filter_map(|ix| parse_transfer(ix, scope, &token_accounts))
        .filter(|leg| {
            if outgoing {
                leg.from_address == focus
            } else {
                leg.to_address == focus
            }
        })
        .collect();

    if legs.is_empty() {
        // Lamports moving alongside a token transfer are account rent
        let has_token_transfer = || {
            instructions
                .iter()
                .any(|ix| parse_transfer(ix, FetchScope::Token, &token_accounts).is_some())
        };
        legs = match scope {
            FetchScope::Token => token_delta_legs(&keys, meta, focus, outgoing),
            _ if has_token_transfer() => Vec::new(),
            _ => lamport_delta_legs(&keys, meta, focus, outgoing),
        };
    }

    if legs.is_empty() {
        return None;
    }

    let value = legs.iter().map(|l| l.value).sum();
    let (from_address, to_address) = if legs.len() == 1 {
        (legs[0].from_address.clone(), legs[0].to_address.clone())
    } else if outgoing {
        (focus.to_string(), legs[0].to_address.clone())
    } else {
        (legs[0].from_address.clone(), focus.to_string())
    };

    Some(CanonicalEvent {
        chain: Chain::Solana,
        tx_hash: signature,
        from_address,
        to_address,
        value,
        asset: legs[0].asset.clone(),
        event_type: if scope == FetchScope::Token {
            EventType::TokenTransfer
        } else {
            EventType::Transfer
        },
        timestamp: tx.block_time.unwrap_or(0),
        hop: 0,
        sub_transfers: if legs.len() > 1 { legs } else { Vec::new() },
        bridge: bridge_metadata(tx),
    })
}

/// Top-level instructions followed by inner instructions, in execution order
fn all_instructions(tx: &SolanaTransaction) -> Vec<&ParsedInstruction> {
    let inner: HashMap<u32, &Vec<ParsedInstruction>> = tx
        .meta
        .as_ref()
        .and_then(|m| m.inner_instructions.as_ref())
        .map(|list| list.iter().map(|i| (i.index, &i.instructions)).collect())
        .unwrap_or_default();

    let mut out = Vec::new();
    for (idx, ix) in tx.transaction.message.instructions.iter().enumerate() {
        out.push(ix);
        if let Some(children) = inner.get(&(idx as u32)) {
            out.extend(children.iter());
        }
    }
    out
}

/// Token account → owner / mint / decimals from the token balance tables
fn token_accounts(keys: &[&str], meta: &TransactionMeta) -> HashMap<String, TokenAccount> {
    let mut accounts = HashMap::new();
    let balances = meta
        .pre_token_balances
        .iter()
        .flatten()
        .chain(meta.post_token_balances.iter().flatten());

    for balance in balances {
        let Some(key) = keys.get(balance.account_index) else {
            continue;
        };
        accounts
            .entry(key.to_string())
            .or_insert_with(|| TokenAccount {
                owner: balance.owner.clone(),
                mint: balance.mint.clone(),
                decimals: balance.ui_token_amount.decimals as u32,
            });
    }
    accounts
}

fn parse_transfer(
    ix: &ParsedInstruction,
    scope: FetchScope,
    token_accounts: &HashMap<String, TokenAccount>,
) -> Option<SubTransfer> {
    let parsed = ix.parsed.as_ref()?;
    let kind = parsed.get("type")?.as_str()?;
    let info = parsed.get("info")?;

    match (scope, ix.program_id.as_str()) {
        (FetchScope::Native, SYSTEM_PROGRAM_ID) => {
            if !matches!(kind, "transfer" | "transferWithSeed") {
                return None;
            }
            let lamports = info.get("lamports")?.as_u64()?;
            Some(SubTransfer {
                from_address: info.get("source")?.as_str()?.to_string(),
                to_address: info.get("destination")?.as_str()?.to_string(),
                value: units_to_decimal(U256::from(lamports), SOL_DECIMALS),
                asset: None,
            })
        }
        (FetchScope::Token, TOKEN_PROGRAM_ID | TOKEN_2022_PROGRAM_ID) => {
            let source = info.get("source")?.as_str()?;
            let destination = info.get("destination")?.as_str()?;
            let src_account = token_accounts.get(source);
            let dst_account = token_accounts.get(destination);

            let (amount, decimals, mint) = match kind {
                "transfer" => {
                    let account = src_account.or(dst_account)?;
                    (
                        info.get("amount")?.as_str()?.to_string(),
                        account.decimals,
                        account.mint.clone(),
                    )
                }
                "transferChecked" => {
                    let token_amount = info.get("tokenAmount")?;
                    (
                        token_amount.get("amount")?.as_str()?.to_string(),
                        token_amount.get("decimals")?.as_u64()? as u32,
                        info.get("mint")?.as_str()?.to_string(),
                    )
                }
                _ => return None,
            };

            let raw = U256::from_str_radix(&amount, 10).ok()?;
            let from_address = src_account
                .and_then(|a| a.owner.clone())
                .or_else(|| info.get("authority").and_then(|a| a.as_str()).map(String::from))
                .unwrap_or_else(|| source.to_string());
            let to_address = dst_account
                .and_then(|a| a.owner.clone())
                .unwrap_or_else(|| destination.to_string());

            Some(SubTransfer {
                from_address,
                to_address,
                value: units_to_decimal(raw, decimals),
                asset: Some(mint),
            })
        }
        _ => None,
    }
}

/// Lamport deltas: the focus paired with every account moving the other way.
/// The fee payer's delta excludes the fee.
fn lamport_delta_legs(
    keys: &[&str],
    meta: &TransactionMeta,
    focus: &str,
    outgoing: bool,
) -> Vec<SubTransfer> {
    let deltas: Vec<i128> = meta
        .pre_balances
        .iter()
        .zip(&meta.post_balances)
        .enumerate()
        .map(|(idx, (pre, post))| {
            let fee = if idx == 0 { meta.fee as i128 } else { 0 };
            *post as i128 - *pre as i128 + fee
        })
        .collect();

    let Some(focus_idx) = keys.iter().position(|k| *k == focus) else {
        return Vec::new();
    };
    let focus_delta = deltas.get(focus_idx).copied().unwrap_or(0);
    if (outgoing && focus_delta >= 0) || (!outgoing && focus_delta <= 0) {
        return Vec::new();
    }

    deltas
        .iter()
        .enumerate()
        .filter(|(idx, d)| *idx != focus_idx && if outgoing { **d > 0 } else { **d < 0 })
        .filter_map(|(idx, d)| {
            let other = keys.get(idx)?.to_string();
            let value = units_to_decimal(U256::from(d.unsigned_abs()), SOL_DECIMALS);
            Some(if outgoing {
                SubTransfer { from_address: focus.to_string(), to_address: other, value, asset: None }
            } else {
                SubTransfer { from_address: other, to_address: focus.to_string(), value, asset: None }
            })
        })
        .collect()
}

/// Token deltas per (owner, mint), paired the same way as lamport deltas
fn token_delta_legs(
    keys: &[&str],
    meta: &TransactionMeta,
    focus: &str,
    outgoing: bool,
) -> Vec<SubTransfer> {
    let mut deltas: HashMap<(String, String), (i128, u32)> = HashMap::new();
    let mut apply = |balances: &Option<Vec<SolanaTokenBalance>>, sign: i128| {
        for b in balances.iter().flatten() {
            let owner = b
                .owner
                .clone()
                .or_else(|| keys.get(b.account_index).map(|k| k.to_string()));
            let (Some(owner), Ok(amount)) = (owner, b.ui_token_amount.amount.parse::<i128>()) else {
                continue;
            };
            let entry = deltas
                .entry((owner, b.mint.clone()))
                .or_insert((0, b.ui_token_amount.decimals as u32));
            entry.0 += sign * amount;
        }
    };
    apply(&meta.pre_token_balances, -1);
    apply(&meta.post_token_balances, 1);

    let mut mints: Vec<String> = deltas
        .iter()
        .filter(|((owner, _), (d, _))| owner == focus && if outgoing { *d < 0 } else { *d > 0 })
        .map(|((_, mint), _)| mint.clone())
        .collect();
    mints.sort();

    let mut legs = Vec::new();
    for mint in mints {
        let mut others: Vec<(&String, i128, u32)> = deltas
            .iter()
            .filter(|((owner, m), (d, _))| {
                m == &mint && owner != focus && if outgoing { *d > 0 } else { *d < 0 }
            })
            .map(|((owner, _), (d, dec))| (owner, *d, *dec))
            .collect();
        others.sort_by(|a, b| a.0.cmp(b.0));

        for (other, delta, decimals) in others {
            let value = units_to_decimal(U256::from(delta.unsigned_abs()), decimals);
            let (from_address, to_address) = if outgoing {
                (focus.to_string(), other.clone())
            } else {
                (other.clone(), focus.to_string())
            };
            legs.push(SubTransfer {
                from_address,
                to_address,
                value,
                asset: Some(mint.clone()),
            });
        }
    }
    legs
}

/// First non-infrastructure program invoked at top level
fn bridge_metadata(tx: &SolanaTransaction) -> Option<BridgeMetadata> {
    let program = tx
        .transaction
        .message
        .instructions
        .iter()
        .map(|ix| ix.program_id.as_str())
        .find(|p| !INFRA_PROGRAMS.contains(p))?;

    Some(BridgeMetadata {
        contract: Some(program.to_string()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FOCUS: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const OTHER: &str = "So11111111111111111111111111111111111111112";
    const MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

    fn tx(instructions: serde_json::Value, meta: serde_json::Value) -> SolanaTransaction {
        serde_json::from_value(serde_json::json!({
            "slot": 250000000u64,
            "blockTime": 1700000000i64,
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        { "pubkey": FOCUS, "signer": true, "writable": true },
                        { "pubkey": OTHER, "signer": false, "writable": true },
                        { "pubkey": "srcTokenAcct", "signer": false, "writable": true },
                        { "pubkey": "dstTokenAcct", "signer": false, "writable": true }
                    ],
                    "instructions": instructions
                }
            },
            "meta": meta
        }))
        .unwrap()
    }

    fn base_meta() -> serde_json::Value {
        serde_json::json!({
            "err": null,
            "fee": 5000,
            "preBalances": [2_000_005_000u64, 0, 0, 0],
            "postBalances": [1_000_000_000u64, 1_000_000_000u64, 0, 0],
            "preTokenBalances": [
                { "accountIndex": 2, "mint": MINT, "owner": FOCUS,
                  "uiTokenAmount": { "amount": "5000000", "decimals": 6 } },
                { "accountIndex": 3, "mint": MINT, "owner": OTHER,
                  "uiTokenAmount": { "amount": "0", "decimals": 6 } }
            ],
            "postTokenBalances": [
                { "accountIndex": 2, "mint": MINT, "owner": FOCUS,
                  "uiTokenAmount": { "amount": "3000000", "decimals": 6 } },
                { "accountIndex": 3, "mint": MINT, "owner": OTHER,
                  "uiTokenAmount": { "amount": "2000000", "decimals": 6 } }
            ]
        })
    }

    #[test]
    fn test_system_transfer_instruction() {
        let tx = tx(
            serde_json::json!([{
                "program": "system",
                "programId": SYSTEM_PROGRAM_ID,
                "parsed": { "type": "transfer",
                            "info": { "source": FOCUS, "destination": OTHER, "lamports": 1_000_000_000u64 } }
            }]),
            base_meta(),
        );

        let event = normalize_transaction(&tx, FOCUS, FetchScope::Native, true).unwrap();
        assert_eq!(event.to_address, OTHER);
        assert_eq!(event.value, dec!(1));
        assert_eq!(event.timestamp, 1700000000);
        assert!(event.bridge.is_none());
        assert!(normalize_transaction(&tx, FOCUS, FetchScope::Native, false).is_none());
    }

    #[test]
    fn test_spl_transfer_resolves_owners() {
        let tx = tx(
            serde_json::json!([{
                "program": "spl-token",
                "programId": TOKEN_PROGRAM_ID,
                "parsed": { "type": "transfer",
                            "info": { "source": "srcTokenAcct", "destination": "dstTokenAcct",
                                      "amount": "2000000", "authority": FOCUS } }
            }]),
            base_meta(),
        );

        let event = normalize_transaction(&tx, FOCUS, FetchScope::Token, true).unwrap();
        assert_eq!(event.from_address, FOCUS);
        assert_eq!(event.to_address, OTHER);
        assert_eq!(event.value, dec!(2));
        assert_eq!(event.asset.as_deref(), Some(MINT));
        assert_eq!(event.event_type, EventType::TokenTransfer);
    }

    #[test]
    fn test_token_transfer_rent_not_a_native_leg() {
        // FOCUS funds the new token account while sending tokens
        let tx = tx(
            serde_json::json!([{
                "program": "spl-token",
                "programId": TOKEN_PROGRAM_ID,
                "parsed": { "type": "transferChecked",
                            "info": { "source": "srcTokenAcct", "destination": "dstTokenAcct",
                                      "mint": MINT, "authority": FOCUS,
                                      "tokenAmount": { "amount": "2000000", "decimals": 6 } } }
            }]),
            base_meta(),
        );

        assert!(normalize_transaction(&tx, FOCUS, FetchScope::Native, true).is_none());
        assert!(normalize_transaction(&tx, OTHER, FetchScope::Native, false).is_none());

        let token = normalize_transaction(&tx, FOCUS, FetchScope::Token, true).unwrap();
        assert_eq!(token.to_address, OTHER);
        assert_eq!(token.value, dec!(2));
    }

    #[test]
    fn test_balance_delta_fallback() {
        let tx = tx(
            serde_json::json!([{ "programId": "worm2ZoG2kUd4vFXhvjh93UUH596ayRfgQ2MgjNMTth", "accounts": [], "data": "" }]),
            base_meta(),
        );

        let native = normalize_transaction(&tx, FOCUS, FetchScope::Native, true).unwrap();
        assert_eq!(native.value, dec!(1));
        assert_eq!(native.to_address, OTHER);
        assert_eq!(
            native.bridge.unwrap().contract.as_deref(),
            Some("worm2ZoG2kUd4vFXhvjh93UUH596ayRfgQ2MgjNMTth")
        );

        let token = normalize_transaction(&tx, OTHER, FetchScope::Token, false).unwrap();
        assert_eq!(token.from_address, FOCUS);
        assert_eq!(token.value, dec!(2));
    }

    #[test]
    fn test_failed_transaction_skipped() {
        let mut meta = base_meta();
        meta["err"] = serde_json::json!({ "InstructionError": [0, "Custom"] });
        let tx = tx(serde_json::json!([]), meta);
        assert!(normalize_transaction(&tx, FOCUS, FetchScope::Native, true).is_none());
    }
}
