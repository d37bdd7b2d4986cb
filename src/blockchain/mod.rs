//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key) + config (RPC URL, merchant address)
//!     → wallet.rs (merchant account, signer)
//!     → client.rs (Starknet JSON-RPC with timeouts, signing, reads)
//!     → transaction.rs (confirmation polling)
//!
//! calldata.rs builds every contract call the settlement core submits;
//! chain.rs is the trait the core depends on.
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod calldata;
pub mod chain;
pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use calldata::TokenId;
pub use chain::ChainClient;
pub use client::StarknetClient;
pub use types::{ChainConfig, ChainError, ChainResult, ContractCall, TxHash, TxStatus};
pub use wallet::MerchantAccount;
