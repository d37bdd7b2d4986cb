//! Starknet JSON-RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to the JSON-RPC endpoint
//! - Sign and submit invoke transactions from the merchant account
//! - Query receipts and read contract state
//! - Provide health check for blockchain connectivity

use async_trait::async_trait;
use starknet::accounts::{Account, AccountError, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::{
    BlockId, BlockTag, Call, ExecutionResult, Felt, FunctionCall, StarknetError,
};
use starknet::core::utils::{cairo_short_string_to_felt, get_selector_from_name, parse_cairo_short_string};
use starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use starknet::providers::{Provider, ProviderError};
use starknet::signers::LocalWallet;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::chain::ChainClient;
use crate::blockchain::transaction::ConfirmationPoller;
use crate::blockchain::types::{ChainConfig, ChainError, ChainResult, ContractCall, TxHash, TxStatus};
use crate::blockchain::wallet::MerchantAccount;
use crate::observability::metrics;

type MerchantSigner = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

/// Starknet client bound to one RPC endpoint and, optionally, the merchant account.
pub struct StarknetClient {
    /// Read-side provider.
    provider: JsonRpcClient<HttpTransport>,
    /// Signing account. `None` when credentials are missing; writes then fail
    /// with `NotConfigured` at call time.
    account: Option<MerchantSigner>,
    merchant_address: Option<Felt>,
    config: ChainConfig,
    timeout_duration: Duration,
    poller: ConfirmationPoller,
}

impl StarknetClient {
    /// Create a new client.
    ///
    /// Does not contact the node; use [`StarknetClient::verify_chain_id`] for that.
    pub fn new(config: ChainConfig, merchant: Option<MerchantAccount>) -> ChainResult<Self> {
        let rpc_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let chain_id = cairo_short_string_to_felt(&config.chain_id)
            .map_err(|e| ChainError::Rpc(format!("Invalid chain ID '{}': {}", config.chain_id, e)))?;

        let provider = JsonRpcClient::new(HttpTransport::new(rpc_url.clone()));

        let merchant_address = merchant.as_ref().map(|m| m.address());
        let account = merchant.map(|merchant| {
            let mut account = SingleOwnerAccount::new(
                JsonRpcClient::new(HttpTransport::new(rpc_url.clone())),
                merchant.signer(),
                merchant.address(),
                chain_id,
                ExecutionEncoding::New,
            );
            // Nonces must account for our own not-yet-final transactions.
            account.set_block_id(BlockId::Tag(BlockTag::Pending));
            account
        });

        if account.is_none() {
            tracing::warn!("Starknet client created without merchant credentials; writes disabled");
        }

        tracing::info!(
            rpc_url = %config.rpc_url,
            chain_id = %config.chain_id,
            "Starknet client initialized"
        );

        Ok(Self {
            provider,
            account,
            merchant_address,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            poller: ConfirmationPoller::from_config(&config),
            config,
        })
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self.with_timeout(self.provider.chain_id()).await?;
        let expected = cairo_short_string_to_felt(&self.config.chain_id)
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        if actual != expected {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id.clone(),
                actual: parse_cairo_short_string(&actual).unwrap_or_else(|_| format!("{:#x}", actual)),
            });
        }
        Ok(())
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> ChainResult<u64> {
        self.with_timeout(self.provider.block_number()).await
    }

    /// Check if the node is reachable.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_block_number().await.is_ok();
        metrics::record_chain_health(healthy);
        healthy
    }

    async fn with_timeout<T, F>(&self, fut: F) -> ChainResult<T>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainError::Rpc(e.to_string())),
            Err(_) => Err(ChainError::Rpc(format!(
                "RPC timeout after {} seconds",
                self.timeout_duration.as_secs()
            ))),
        }
    }
}

fn selector(entry_point: &str) -> ChainResult<Felt> {
    get_selector_from_name(entry_point)
        .map_err(|e| ChainError::Rejected(format!("Invalid entry point '{}': {}", entry_point, e)))
}

fn parse_tx_hash(tx_hash: &TxHash) -> ChainResult<Felt> {
    Felt::from_hex(tx_hash.as_str())
        .map_err(|_| ChainError::Decode(format!("Invalid transaction hash '{}'", tx_hash)))
}

#[async_trait]
impl ChainClient for StarknetClient {
    async fn submit(&self, call: ContractCall) -> ChainResult<TxHash> {
        let account = self.account.as_ref().ok_or_else(|| {
            ChainError::NotConfigured("merchant account credentials missing".to_string())
        })?;

        let invoke = Call {
            to: call.contract,
            selector: selector(call.entry_point)?,
            calldata: call.calldata,
        };

        let execution = account.execute_v3(vec![invoke]);
        let sent = match timeout(self.timeout_duration, execution.send()).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ChainError::Rpc(format!(
                    "RPC timeout after {} seconds",
                    self.timeout_duration.as_secs()
                )))
            }
        };

        match sent {
            Ok(result) => Ok(TxHash::from_felt(&result.transaction_hash)),
            Err(AccountError::Provider(ProviderError::StarknetError(e))) => {
                Err(ChainError::Rejected(format!("{:?}", e)))
            }
            Err(AccountError::Provider(e)) => Err(ChainError::Rpc(e.to_string())),
            Err(e) => Err(ChainError::Rejected(e.to_string())),
        }
    }

    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ChainResult<()> {
        self.poller.wait(self, tx_hash).await
    }

    async fn transaction_status(&self, tx_hash: &TxHash) -> ChainResult<TxStatus> {
        let hash = parse_tx_hash(tx_hash)?;

        match timeout(self.timeout_duration, self.provider.get_transaction_receipt(hash)).await {
            Err(_) => Err(ChainError::Rpc(format!(
                "RPC timeout after {} seconds",
                self.timeout_duration.as_secs()
            ))),
            Ok(Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound))) => {
                Ok(TxStatus::Pending)
            }
            Ok(Err(e)) => Err(ChainError::Rpc(e.to_string())),
            Ok(Ok(receipt)) => match receipt.receipt.execution_result() {
                ExecutionResult::Succeeded => Ok(TxStatus::Succeeded),
                ExecutionResult::Reverted { reason } => Ok(TxStatus::Reverted(reason.clone())),
            },
        }
    }

    async fn call(&self, call: ContractCall) -> ChainResult<Vec<Felt>> {
        let request = FunctionCall {
            contract_address: call.contract,
            entry_point_selector: selector(call.entry_point)?,
            calldata: call.calldata,
        };
        self.with_timeout(self.provider.call(request, BlockId::Tag(BlockTag::Latest)))
            .await
    }

    fn signer_address(&self) -> Option<Felt> {
        self.merchant_address
    }
}

impl std::fmt::Debug for StarknetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarknetClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .field("signer", &self.merchant_address.as_ref().map(|address| format!("{:#x}", address)))
            .finish()
    }
}
