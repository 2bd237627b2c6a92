//! EVM decoding helpers
//! Transfer logs, bridge calldata and raw-unit → decimal conversion

use alloy_primitives::U256;
use alloy_sol_types::{sol, SolCall};
use rust_decimal::Decimal;

use crate::utils::address::address_from_topic;
use crate::utils::constants::TRANSFER_EVENT_TOPIC;

// Wormhole Token Bridge entry points
sol! {
    function transferTokens(
        address token,
        uint256 amount,
        uint16 recipientChain,
        bytes32 recipient,
        uint256 arbiterFee,
        uint32 nonce
    ) external payable returns (uint64 sequence);

    function wrapAndTransferETH(
        uint16 recipientChain,
        bytes32 recipient,
        uint256 arbiterFee,
        uint32 nonce
    ) external payable returns (uint64 sequence);
}

/// Decoded ERC20 / ERC721 Transfer log
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransfer {
    pub from: String,
    pub to: String,
    /// Token amount (1 for ERC721)
    pub amount: U256,
    pub is_nft: bool,
}

/// Decoded Wormhole transfer call
#[derive(Debug, Clone, PartialEq)]
pub struct WormholeTransfer {
    /// Wormhole chain id of the destination
    pub recipient_chain: u16,
    pub recipient: [u8; 32],
    /// `None` for wrapAndTransferETH (amount is msg.value)
    pub token: Option<String>,
    pub amount: Option<U256>,
}

/// Parse `0x`-prefixed hex quantity
pub fn parse_hex_u256(value: &str) -> Option<U256> {
    let raw = value.trim().trim_start_matches("0x");
    if raw.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(raw, 16).ok()
}

/// Parse `0x`-prefixed hex as u64
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim().trim_start_matches("0x"), 16).ok()
}

/// Raw integer units → decimal amount.
///
/// Digits beyond 28 significant places are truncated; values too large for
/// `Decimal` saturate at `Decimal::MAX`.
pub fn units_to_decimal(raw: U256, decimals: u32) -> Decimal {
    let mut digits = raw.to_string();
    let mut scale = decimals as i64;

    while digits.len() > 28 || scale > 28 {
        digits.pop();
        scale -= 1;
    }
    if digits.is_empty() {
        return Decimal::ZERO;
    }

    let mantissa: i128 = match digits.parse() {
        Ok(m) => m,
        Err(_) => return Decimal::ZERO,
    };

    if scale >= 0 {
        Decimal::try_from_i128_with_scale(mantissa, scale as u32).unwrap_or(Decimal::MAX)
    } else {
        let mut value = Decimal::from_i128_with_scale(mantissa, 0);
        for _ in 0..(-scale) {
            match value.checked_mul(Decimal::TEN) {
                Some(v) => value = v,
                None => return Decimal::MAX,
            }
        }
        value
    }
}

/// 4-byte selector of calldata as lowercase `0x…`
pub fn selector_hex(calldata: &[u8]) -> Option<String> {
    if calldata.len() < 4 {
        return None;
    }
    Some(format!("0x{}", hex::encode(&calldata[..4])))
}

/// Decode `0x` hex calldata into bytes
pub fn decode_calldata(input: &str) -> Option<Vec<u8>> {
    hex::decode(input.trim().trim_start_matches("0x")).ok()
}

/// Decode an ERC20 (3 topics, amount in data) or ERC721 (4 topics) Transfer log
pub fn decode_transfer_log(topics: &[String], data: &str) -> Option<DecodedTransfer> {
    let topic0 = topics.first()?;
    if !topic0.eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC) {
        return None;
    }

    match topics.len() {
        3 => Some(DecodedTransfer {
            from: address_from_topic(&topics[1])?,
            to: address_from_topic(&topics[2])?,
            amount: parse_hex_u256(data)?,
            is_nft: false,
        }),
        4 => Some(DecodedTransfer {
            from: address_from_topic(&topics[1])?,
            to: address_from_topic(&topics[2])?,
            amount: U256::from(1u8),
            is_nft: true,
        }),
        _ => None,
    }
}

/// Decoder for bridge calldata
pub struct WormholeDecoder;

impl WormholeDecoder {
    /// Decode Token Bridge calldata; `None` when the call is not a Wormhole transfer
    pub fn decode(calldata: &[u8]) -> Option<WormholeTransfer> {
        if calldata.len() < 4 {
            return None;
        }

        Self::try_decode_transfer_tokens(calldata)
            .or_else(|| Self::try_decode_wrap_and_transfer_eth(calldata))
    }

    fn try_decode_transfer_tokens(data: &[u8]) -> Option<WormholeTransfer> {
        let call = transferTokensCall::abi_decode(data, false).ok()?;
        Some(WormholeTransfer {
            recipient_chain: call.recipientChain,
            recipient: call.recipient.0,
            token: Some(format!("0x{}", hex::encode(call.token))),
            amount: Some(call.amount),
        })
    }

    fn try_decode_wrap_and_transfer_eth(data: &[u8]) -> Option<WormholeTransfer> {
        let call = wrapAndTransferETHCall::abi_decode(data, false).ok()?;
        Some(WormholeTransfer {
            recipient_chain: call.recipientChain,
            recipient: call.recipient.0,
            token: None,
            amount: None,
        })
    }
}
