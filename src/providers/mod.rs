//! Providers Module - External Data Sources
//!
//! Chain adapters (EVM, Solana, UTXO, Tron), the JSON-RPC transport they
//! share, and the enrichment seams: labels, sanctions, prices and bridge-link
//! persistence.

pub mod adapter;
pub mod enrichment;
pub mod evm;
pub mod rpc;
pub mod solana;
pub mod tron;
pub mod utxo;

pub use adapter::{AdapterRegistry, ChainAdapter, FetchScope, PageRequest, TransferPage};
pub use enrichment::*;
pub use evm::EvmAdapter;
pub use rpc::RpcProvider;
pub use solana::SolanaAdapter;
pub use tron::TronAdapter;
pub use utxo::UtxoAdapter;
