//! Chain-specific types and error definitions.

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::fmt;
use thiserror::Error;


// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Opaque transaction handle returned by the chain client.
///
/// Kept as the hex string the node reported so it can be logged, persisted
/// and compared without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn from_felt(felt: &Felt) -> Self {
        Self(format!("{:#x}", felt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single contract invocation: target, entry point name, serialized calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract: Felt,
    pub entry_point: &'static str,
    pub calldata: Vec<Felt>,
}

impl ContractCall {
    pub fn new(contract: Felt, entry_point: &'static str, calldata: Vec<Felt>) -> Self {
        Self {
            contract,
            entry_point,
            calldata,
        }
    }
}

/// Execution status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet in a block (or not yet visible to the node).
    Pending,
    /// Accepted and executed successfully.
    Succeeded,
    /// Accepted but execution reverted.
    Reverted(String),
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node or account rejected the transaction (bad nonce, fee, calldata).
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Transaction was reverted on-chain.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Transaction was not accepted within the confirmation bound.
    #[error("Transaction {tx_hash} not confirmed after {secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, secs: u64 },

    /// Signing credentials are not configured.
    #[error("Blockchain not available: {0}")]
    NotConfigured(String),

    /// Invalid private key or address.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: String, actual: String },

    /// Return values could not be interpreted.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type for blockchain operations.
pub type ChainResult<T> = Result<T, ChainError>;
