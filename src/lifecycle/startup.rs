//! Startup wiring shared by the daemon and the CLI.

use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::{ChainError, MerchantAccount, StarknetClient};
use crate::config::SettlementConfig;
use crate::settlement::{ContractAddresses, LedgerError, SettlementError, SettlementLedger, SettlementOrchestrator};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

/// Load the merchant account if both the address and the key are present.
///
/// Missing credentials are not an error here: writes fail at call time and
/// startup only warns. A malformed key or address is an error.
pub fn load_merchant(config: &SettlementConfig) -> Result<Option<MerchantAccount>, ChainError> {
    let Some(address) = config.merchant.address.as_deref() else {
        return Ok(None);
    };
    match MerchantAccount::from_env(address) {
        Ok(account) => Ok(Some(account)),
        Err(ChainError::NotConfigured(reason)) => {
            tracing::debug!(reason = %reason, "Merchant signing key unavailable");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Build the orchestrator against the configured Starknet node.
pub fn build_orchestrator(
    config: &SettlementConfig,
    ledger: Arc<SettlementLedger>,
) -> Result<SettlementOrchestrator<StarknetClient>, StartupError> {
    let merchant = load_merchant(config)?;
    let client = StarknetClient::new(config.chain.clone(), merchant)?;
    let contracts = ContractAddresses::from_config(&config.contracts)?;
    Ok(SettlementOrchestrator::new(Arc::new(client), contracts, ledger))
}
