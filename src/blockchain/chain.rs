//! The chain client seam consumed by the settlement core.

use async_trait::async_trait;
use starknet::core::types::Felt;

use crate::blockchain::types::{ChainResult, ContractCall, TxHash, TxStatus};

/// Submit / confirm / read primitives against a Starknet node.
///
/// Implementations sign with the merchant account they were built with.
/// Waiting is bounded by the implementation; callers add no timeout of their own.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Sign and submit an invoke transaction from the merchant account.
    async fn submit(&self, call: ContractCall) -> ChainResult<TxHash>;

    /// Block until the transaction is accepted and succeeded, or fail with
    /// `Reverted` / `ConfirmationTimeout`.
    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ChainResult<()>;

    /// Current execution status, without waiting.
    async fn transaction_status(&self, tx_hash: &TxHash) -> ChainResult<TxStatus>;

    /// Read-only call against the latest state.
    async fn call(&self, call: ContractCall) -> ChainResult<Vec<Felt>>;

    /// Address transactions are signed for, if credentials are configured.
    fn signer_address(&self) -> Option<Felt>;
}
