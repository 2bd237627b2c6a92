//! Configuration module for the cross-chain tracer
//!
//! Uses constants from utils/constants.rs; no hardcoded URLs in this file.
//! API keys are read from the environment and never logged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::AppError;
use crate::utils::constants::{
    build_alchemy_url, get_public_rpc_fallback, CHAIN_ID_ARBITRUM, CHAIN_ID_AVALANCHE,
    CHAIN_ID_BASE, CHAIN_ID_BSC, CHAIN_ID_ETHEREUM, CHAIN_ID_OPTIMISM, CHAIN_ID_POLYGON,
    DEFAULT_RPC_TIMEOUT_SECS, TRONGRID_API_KEY_HEADER,
};

// ============================================
// CHAINS
// ============================================

/// Ledger family; one adapter implementation per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account model with EVM logs
    Evm,
    /// Spend-based UTXO graph
    Utxo,
    /// Solana instruction model
    Svm,
    /// Tron account model (base58 addresses)
    Tron,
}

impl ChainFamily {
    /// Representative chain used when only the family can be inferred
    pub fn canonical_chain(&self) -> Chain {
        match self {
            Self::Evm => Chain::Ethereum,
            Self::Utxo => Chain::Bitcoin,
            Self::Svm => Chain::Solana,
            Self::Tron => Chain::Tron,
        }
    }
}

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Optimism,
    Avalanche,
    Base,
    Bitcoin,
    Litecoin,
    Solana,
    Tron,
}

impl Chain {
    pub const ALL: [Chain; 11] = [
        Chain::Ethereum,
        Chain::Bsc,
        Chain::Polygon,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Avalanche,
        Chain::Base,
        Chain::Bitcoin,
        Chain::Litecoin,
        Chain::Solana,
        Chain::Tron,
    ];

    /// Lowercase identifier used in node keys and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Bsc => "bsc",
            Self::Polygon => "polygon",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Avalanche => "avalanche",
            Self::Base => "base",
            Self::Bitcoin => "bitcoin",
            Self::Litecoin => "litecoin",
            Self::Solana => "solana",
            Self::Tron => "tron",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Ethereum
            | Self::Bsc
            | Self::Polygon
            | Self::Arbitrum
            | Self::Optimism
            | Self::Avalanche
            | Self::Base => ChainFamily::Evm,
            Self::Bitcoin | Self::Litecoin => ChainFamily::Utxo,
            Self::Solana => ChainFamily::Svm,
            Self::Tron => ChainFamily::Tron,
        }
    }

    /// EIP-155 chain id (EVM chains only)
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Self::Ethereum => Some(CHAIN_ID_ETHEREUM),
            Self::Bsc => Some(CHAIN_ID_BSC),
            Self::Polygon => Some(CHAIN_ID_POLYGON),
            Self::Arbitrum => Some(CHAIN_ID_ARBITRUM),
            Self::Optimism => Some(CHAIN_ID_OPTIMISM),
            Self::Avalanche => Some(CHAIN_ID_AVALANCHE),
            Self::Base => Some(CHAIN_ID_BASE),
            _ => None,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Ethereum | Self::Arbitrum | Self::Optimism | Self::Base => "ETH",
            Self::Bsc => "BNB",
            Self::Polygon => "POL",
            Self::Avalanche => "AVAX",
            Self::Bitcoin => "BTC",
            Self::Litecoin => "LTC",
            Self::Solana => "SOL",
            Self::Tron => "TRX",
        }
    }

    /// Decimals of the native asset
    pub fn native_decimals(&self) -> u32 {
        match self.family() {
            ChainFamily::Evm => 18,
            ChainFamily::Utxo => 8,
            ChainFamily::Svm => 9,
            ChainFamily::Tron => 6,
        }
    }

    /// Environment variable holding a dedicated endpoint, e.g. `ETHEREUM_RPC_URL`
    pub fn rpc_env_key(&self) -> String {
        format!("{}_RPC_URL", self.as_str().to_uppercase())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Self::Ethereum),
            "bsc" | "bnb" | "binance" => Ok(Self::Bsc),
            "polygon" | "matic" | "pol" => Ok(Self::Polygon),
            "arbitrum" | "arb" => Ok(Self::Arbitrum),
            "optimism" | "op" => Ok(Self::Optimism),
            "avalanche" | "avax" => Ok(Self::Avalanche),
            "base" => Ok(Self::Base),
            "bitcoin" | "btc" => Ok(Self::Bitcoin),
            "litecoin" | "ltc" => Ok(Self::Litecoin),
            "solana" | "sol" => Ok(Self::Solana),
            "tron" | "trx" => Ok(Self::Tron),
            other => Err(AppError::unsupported_chain(other)),
        }
    }
}

// ============================================
// ENDPOINTS
// ============================================

/// Resolved upstream endpoint(s) for one chain
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub chain: Chain,
    pub primary_url: String,
    pub fallback_url: Option<String>,
    /// Extra header sent with each request (TronGrid API key)
    pub api_key_header: Option<(String, String)>,
    pub timeout: Duration,
}

impl ChainEndpoint {
    /// Get Alchemy API key from environment (key is never logged)
    fn get_alchemy_key() -> Option<String> {
        std::env::var("ALCHEMY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty() && k != "YOUR_API_KEY")
    }

    /// Resolve one chain: `<CHAIN>_RPC_URL`, then Alchemy, then public fallback
    pub fn for_chain(chain: Chain) -> Self {
        let alchemy_key = Self::get_alchemy_key();
        Self::resolve(chain, alchemy_key.as_deref())
    }

    fn resolve(chain: Chain, alchemy_key: Option<&str>) -> Self {
        let public = get_public_rpc_fallback(chain).map(String::from);

        let primary_url = std::env::var(chain.rpc_env_key())
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| alchemy_key.and_then(|k| build_alchemy_url(chain, k)))
            .or_else(|| public.clone())
            .unwrap_or_default();

        let fallback_url = public.filter(|p| *p != primary_url);

        let api_key_header = if chain == Chain::Tron {
            std::env::var("TRONGRID_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(|k| (TRONGRID_API_KEY_HEADER.to_string(), k))
        } else {
            None
        };

        Self {
            chain,
            primary_url,
            fallback_url,
            api_key_header,
            timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
        }
    }

    /// Get all supported chain endpoints
    pub fn all() -> HashMap<Chain, ChainEndpoint> {
        let alchemy_key = Self::get_alchemy_key();
        if alchemy_key.is_some() {
            info!("🔑 ALCHEMY_API_KEY configured (key hidden for security)");
        }

        Chain::ALL
            .iter()
            .map(|&chain| (chain, Self::resolve(chain, alchemy_key.as_deref())))
            .collect()
    }

    /// True when the primary URL embeds an Alchemy key (enables alchemy_* methods)
    pub fn is_alchemy(&self) -> bool {
        self.primary_url.contains(".g.alchemy.com")
    }
}

// ============================================
// TRACER CONFIG
// ============================================

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Runtime settings shared by all traces
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Maximum concurrent outbound adapter calls per trace
    pub max_concurrency: usize,
    /// Deadline for one adapter call (one page)
    pub adapter_timeout: Duration,
    /// Items requested per page
    pub page_size: usize,
    /// Pages followed per node and category
    pub max_pages: usize,
    /// Whole-trace deadline; cancels the trace when exceeded
    pub trace_timeout: Duration,
    /// JSON overrides merged over the static bridge registry
    pub bridge_registry_path: Option<PathBuf>,
    /// Static label dataset
    pub labels_path: Option<PathBuf>,
    /// Static sanctions list
    pub sanctions_path: Option<PathBuf>,
    /// JSONL file receiving persisted bridge links
    pub bridge_links_path: Option<PathBuf>,
    /// Where the binary writes trace results and telemetry
    pub output_dir: PathBuf,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: env_or("TRACER_MAX_CONCURRENCY", 8usize).max(1),
            adapter_timeout: Duration::from_secs(env_or("TRACER_ADAPTER_TIMEOUT_SECS", 20u64)),
            page_size: env_or("TRACER_PAGE_SIZE", 100usize).max(1),
            max_pages: env_or("TRACER_MAX_PAGES", 3usize).max(1),
            trace_timeout: Duration::from_secs(env_or("TRACER_TRACE_TIMEOUT_SECS", 300u64)),
            bridge_registry_path: env_path("BRIDGE_REGISTRY_PATH"),
            labels_path: env_path("LABELS_PATH"),
            sanctions_path: env_path("SANCTIONS_PATH"),
            bridge_links_path: env_path("BRIDGE_LINKS_PATH"),
            output_dir: env_path("TRACE_OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("traces")),
        }
    }
}
