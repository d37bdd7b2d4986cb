//! Transaction confirmation monitoring.
//!
//! # Responsibilities
//! - Poll a submitted transaction until it is accepted or reverted
//! - Bound the wait with the configured confirmation timeout
//! - Tolerate transient RPC errors while polling

use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::chain::ChainClient;
use crate::blockchain::types::{ChainConfig, ChainError, ChainResult, TxHash, TxStatus};

/// Polls transaction status until a terminal state or the deadline.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPoller {
    timeout: Duration,
    poll_interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            Duration::from_secs(config.confirmation_timeout_secs),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Wait for a transaction to be accepted.
    ///
    /// Returns `Reverted` as soon as the node reports a failed execution and
    /// `ConfirmationTimeout` once the deadline passes. RPC errors while
    /// polling are logged and retried on the next tick.
    pub async fn wait<C>(&self, client: &C, tx_hash: &TxHash) -> ChainResult<()>
    where
        C: ChainClient + ?Sized,
    {
        let result = timeout(self.timeout, async {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match client.transaction_status(tx_hash).await {
                    Ok(TxStatus::Succeeded) => return Ok(()),
                    Ok(TxStatus::Reverted(reason)) => return Err(ChainError::Reverted(reason)),
                    Ok(TxStatus::Pending) => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    }
                    Err(e) => {
                        tracing::warn!(tx_hash = %tx_hash, error = %e, "Status poll failed, retrying");
                    }
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ChainError::ConfirmationTimeout {
                tx_hash: tx_hash.clone(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
