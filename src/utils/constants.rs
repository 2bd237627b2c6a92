//! Constants Module - Single Source of Truth
//!
//! Chain metadata, public endpoints, well-known event topics and the static
//! bridge dataset. Other modules look values up here instead of hardcoding
//! them.

use crate::models::config::Chain;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "CrossChainTracer";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = "CrossChainTracer/0.1.0";

// ============================================
// RPC CONSTANTS
// ============================================

/// Default timeout for a single HTTP request (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 20;

/// Default label cache TTL (seconds)
pub const DEFAULT_LABEL_CACHE_TTL_SECS: u64 = 3600;

/// Header name TronGrid expects for API keys
pub const TRONGRID_API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

// ============================================
// EVM CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Polygon
pub const CHAIN_ID_POLYGON: u64 = 137;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Optimism
pub const CHAIN_ID_OPTIMISM: u64 = 10;
/// Avalanche C-Chain
pub const CHAIN_ID_AVALANCHE: u64 = 43114;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

// ============================================
// PUBLIC RPC FALLBACKS
// ============================================

/// Public endpoint used when no dedicated URL or API key is configured.
/// UTXO chains and Tron are REST APIs, everything else is JSON-RPC.
pub fn get_public_rpc_fallback(chain: Chain) -> Option<&'static str> {
    match chain {
        Chain::Ethereum => Some("https://eth.llamarpc.com"),
        Chain::Bsc => Some("https://bsc-dataseed.binance.org"),
        Chain::Polygon => Some("https://polygon-rpc.com"),
        Chain::Arbitrum => Some("https://arb1.arbitrum.io/rpc"),
        Chain::Optimism => Some("https://mainnet.optimism.io"),
        Chain::Avalanche => Some("https://api.avax.network/ext/bc/C/rpc"),
        Chain::Base => Some("https://mainnet.base.org"),
        Chain::Solana => Some("https://api.mainnet-beta.solana.com"),
        Chain::Bitcoin => Some("https://blockstream.info/api"),
        Chain::Litecoin => Some("https://litecoinspace.org/api"),
        Chain::Tron => Some("https://api.trongrid.io"),
    }
}

// ============================================
// ALCHEMY NETWORK MAPPING
// ============================================

/// Get Alchemy subdomain for a chain
pub fn get_alchemy_subdomain(chain: Chain) -> Option<&'static str> {
    match chain {
        Chain::Ethereum => Some("eth-mainnet"),
        Chain::Bsc => Some("bnb-mainnet"),
        Chain::Polygon => Some("polygon-mainnet"),
        Chain::Arbitrum => Some("arb-mainnet"),
        Chain::Optimism => Some("opt-mainnet"),
        Chain::Avalanche => Some("avax-mainnet"),
        Chain::Base => Some("base-mainnet"),
        Chain::Solana => Some("solana-mainnet"),
        _ => None,
    }
}

/// Build Alchemy URL for a chain
pub fn build_alchemy_url(chain: Chain, api_key: &str) -> Option<String> {
    get_alchemy_subdomain(chain)
        .map(|subdomain| format!("https://{}.g.alchemy.com/v2/{}", subdomain, api_key))
}

/// Alchemy Prices API base (network-independent)
pub fn build_alchemy_prices_url(api_key: &str) -> String {
    format!("https://api.g.alchemy.com/prices/v1/{}", api_key)
}

// ============================================
// EVENT TOPICS / PROGRAM IDS
// ============================================

/// keccak256("Transfer(address,address,uint256)"), shared by ERC20 and ERC721
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Wormhole core LogMessagePublished
pub const WORMHOLE_LOG_MESSAGE_TOPIC: &str =
    "0x6eb224fb001ed210e379b335e35efe88672a8ce935d981a6896b27ffdf52a3b2";

/// Arbitrum Inbox InboxMessageDelivered
pub const ARBITRUM_INBOX_MESSAGE_TOPIC: &str =
    "0xff64905f73a67fb594e0f940a8075a860db489ad991e032f48c81123eb52d60b";

/// Polygon StateSender StateSynced
pub const POLYGON_STATE_SYNCED_TOPIC: &str =
    "0x103fed9db65eac19c4d870f49ab7520fe03b99f1838e5996caf47e9e43308392";

/// Solana System Program
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
/// SPL Token Program
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// SPL Token-2022 Program
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
/// Satoshis per BTC / LTC
pub const SATS_PER_COIN: u64 = 100_000_000;
/// Sun per TRX
pub const SUN_PER_TRX: u64 = 1_000_000;

// ============================================
// STATIC BRIDGE DATA
// ============================================

/// Bridge contract known at compile time
#[derive(Debug, Clone, Copy)]
pub struct StaticBridge {
    pub chain: Chain,
    pub address: &'static str,
    pub name: &'static str,
    pub bridge_type: &'static str,
    pub counterparts: &'static [Chain],
    pub selectors: &'static [&'static str],
}

const WORMHOLE_EVM_COUNTERPARTS: &[Chain] = &[
    Chain::Solana,
    Chain::Bsc,
    Chain::Polygon,
    Chain::Avalanche,
    Chain::Arbitrum,
    Chain::Optimism,
    Chain::Base,
];

const WORMHOLE_SOLANA_COUNTERPARTS: &[Chain] = &[
    Chain::Ethereum,
    Chain::Bsc,
    Chain::Polygon,
    Chain::Avalanche,
    Chain::Arbitrum,
    Chain::Optimism,
    Chain::Base,
];

const MULTICHAIN_EVM: &[Chain] = &[
    Chain::Bsc,
    Chain::Polygon,
    Chain::Avalanche,
    Chain::Arbitrum,
    Chain::Optimism,
    Chain::Base,
];

/// Wormhole Token Bridge transferTokens(address,uint256,uint16,bytes32,uint256,uint32)
pub const SELECTOR_WORMHOLE_TRANSFER_TOKENS: &str = "0x0f5287b0";
/// Wormhole Token Bridge wrapAndTransferETH(uint16,bytes32,uint256,uint32)
pub const SELECTOR_WORMHOLE_WRAP_AND_TRANSFER_ETH: &str = "0x9981509f";

pub const STATIC_BRIDGES: &[StaticBridge] = &[
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x3ee18B2214AFF97000D974cf647E7C347E8fa585",
        name: "Wormhole Portal",
        bridge_type: "lock_mint",
        counterparts: WORMHOLE_EVM_COUNTERPARTS,
        selectors: &[
            SELECTOR_WORMHOLE_TRANSFER_TOKENS,
            SELECTOR_WORMHOLE_WRAP_AND_TRANSFER_ETH,
        ],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x98f3c9e6E3fAce36bAAd05FE09d375Ef1464288B",
        name: "Wormhole Core",
        bridge_type: "message",
        counterparts: WORMHOLE_EVM_COUNTERPARTS,
        selectors: &[],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x72Ce9c846789fdB6fC1f34aC4AD25Dd9ef7031ef",
        name: "Arbitrum Gateway Router",
        bridge_type: "canonical_rollup",
        counterparts: &[Chain::Arbitrum],
        selectors: &["0xd2ce7d65"],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x4Dbd4fc535Ac27206064B68FfCf827b0A60BAB3f",
        name: "Arbitrum Inbox",
        bridge_type: "canonical_rollup",
        counterparts: &[Chain::Arbitrum],
        selectors: &["0x439370b1"],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x99C9fc46f92E8a1c0deC1b1747d010903E884bE1",
        name: "Optimism Standard Bridge",
        bridge_type: "canonical_rollup",
        counterparts: &[Chain::Optimism],
        selectors: &["0xb1a1a882", "0x9a2ac6d5", "0x58a997f6"],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x3154Cf16ccdb4C6d922629664174b904d80F2C35",
        name: "Base Standard Bridge",
        bridge_type: "canonical_rollup",
        counterparts: &[Chain::Base],
        selectors: &["0xb1a1a882", "0x9a2ac6d5", "0x58a997f6"],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0xA0c68C638235ee32657e8f720a23ceC1bFc77C77",
        name: "Polygon PoS Bridge",
        bridge_type: "canonical_sidechain",
        counterparts: &[Chain::Polygon],
        selectors: &["0xe3dec8fb", "0x4faa8a26"],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x8731d54E9D02c286767d56ac03e8037C07e01e98",
        name: "Stargate",
        bridge_type: "liquidity",
        counterparts: MULTICHAIN_EVM,
        selectors: &[],
    },
    StaticBridge {
        chain: Chain::Ethereum,
        address: "0x5c7BCd6E7De5423a257D81B442095A1a6ced35C5",
        name: "Across SpokePool",
        bridge_type: "liquidity",
        counterparts: MULTICHAIN_EVM,
        selectors: &[],
    },
    StaticBridge {
        chain: Chain::Solana,
        address: "wormDTUJ6AWPNvk59vGQbDvGJmqbDTdgWgAqcLBCgUb",
        name: "Wormhole Portal",
        bridge_type: "lock_mint",
        counterparts: WORMHOLE_SOLANA_COUNTERPARTS,
        selectors: &[],
    },
    StaticBridge {
        chain: Chain::Solana,
        address: "worm2ZoG2kUd4vFXhvjh93UUH596ayRfgQ2MgjNMTth",
        name: "Wormhole Core",
        bridge_type: "message",
        counterparts: WORMHOLE_SOLANA_COUNTERPARTS,
        selectors: &[],
    },
];

/// Bridge event signature with optional destination chain hint
#[derive(Debug, Clone, Copy)]
pub struct StaticBridgeTopic {
    pub topic: &'static str,
    pub name: &'static str,
    pub chain_hint: Option<Chain>,
}

pub const STATIC_BRIDGE_TOPICS: &[StaticBridgeTopic] = &[
    StaticBridgeTopic {
        topic: WORMHOLE_LOG_MESSAGE_TOPIC,
        name: "Wormhole",
        chain_hint: None,
    },
    StaticBridgeTopic {
        topic: ARBITRUM_INBOX_MESSAGE_TOPIC,
        name: "Arbitrum Inbox",
        chain_hint: Some(Chain::Arbitrum),
    },
    StaticBridgeTopic {
        topic: POLYGON_STATE_SYNCED_TOPIC,
        name: "Polygon PoS Bridge",
        chain_hint: Some(Chain::Polygon),
    },
];

/// Chain-specific selectors that signal a bridge call on contracts the
/// registry does not list by address
#[derive(Debug, Clone, Copy)]
pub struct StaticExtraSelector {
    pub chain: Chain,
    pub selector: &'static str,
    pub name: &'static str,
    pub chain_hint: Option<Chain>,
}

pub const STATIC_EXTRA_SELECTORS: &[StaticExtraSelector] = &[
    // Hop sendToL2(uint256,address,uint256,uint256,uint256,address,uint256)
    StaticExtraSelector {
        chain: Chain::Ethereum,
        selector: "0xdeace8f5",
        name: "Hop",
        chain_hint: None,
    },
    // ArbSys withdrawEth(address)
    StaticExtraSelector {
        chain: Chain::Arbitrum,
        selector: "0x25e16063",
        name: "Arbitrum Outbox",
        chain_hint: Some(Chain::Ethereum),
    },
];

/// Wormhole chain id → chain
pub fn wormhole_chain(id: u16) -> Option<Chain> {
    match id {
        1 => Some(Chain::Solana),
        2 => Some(Chain::Ethereum),
        4 => Some(Chain::Bsc),
        5 => Some(Chain::Polygon),
        6 => Some(Chain::Avalanche),
        23 => Some(Chain::Arbitrum),
        24 => Some(Chain::Optimism),
        30 => Some(Chain::Base),
        _ => None,
    }
}

// ============================================
// RISK LABELS
// ============================================

/// Labels that put an address on the result's high-risk list
pub const HIGH_RISK_LABELS: &[&str] = &[
    "sanctioned",
    "mixer",
    "darknet",
    "scam",
    "hack",
    "ransomware",
    "gambling",
    "high_risk",
];

/// Check whether a label marks its address as high risk
#[inline]
pub fn is_high_risk_label(label: &str) -> bool {
    HIGH_RISK_LABELS.contains(&label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alchemy_url() {
        assert_eq!(
            build_alchemy_url(Chain::Ethereum, "k").as_deref(),
            Some("https://eth-mainnet.g.alchemy.com/v2/k")
        );
        assert!(build_alchemy_url(Chain::Bitcoin, "k").is_none());
    }

    #[test]
    fn test_every_chain_has_fallback() {
        for chain in Chain::ALL {
            assert!(get_public_rpc_fallback(chain).is_some(), "{}", chain);
        }
    }

    #[test]
    fn test_wormhole_ids() {
        assert_eq!(wormhole_chain(1), Some(Chain::Solana));
        assert_eq!(wormhole_chain(30), Some(Chain::Base));
        assert_eq!(wormhole_chain(999), None);
    }

    #[test]
    fn test_static_bridges_are_well_formed() {
        for bridge in STATIC_BRIDGES {
            assert!(!bridge.counterparts.is_empty(), "{}", bridge.name);
            assert!(!bridge.counterparts.contains(&bridge.chain), "{}", bridge.name);
            for sel in bridge.selectors {
                assert_eq!(sel.len(), 10, "{} {}", bridge.name, sel);
            }
        }
    }

    #[test]
    fn test_high_risk_labels() {
        assert!(is_high_risk_label("mixer"));
        assert!(!is_high_risk_label("exchange"));
    }
}
