//! Settlement operation types and errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::calldata::CalldataError;
use crate::blockchain::types::{ChainError, TxHash};
use crate::settlement::ledger::LedgerError;
use crate::settlement::redeem::RedeemPhase;

/// Settlement operations, used for ledger keys, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Mint,
    Transfer,
    Credit,
    Debit,
    Reward,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Mint => "mint",
            Operation::Transfer => "transfer",
            Operation::Credit => "credit",
            Operation::Debit => "debit",
            Operation::Reward => "reward",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation returns after submission or after acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Return as soon as the node accepted the submission.
    Submitted,
    /// Return once the transaction is accepted on-chain.
    #[default]
    Confirmed,
}

/// Owner and revocation status of a passport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportStatus {
    pub token_id: String,
    pub owner: String,
    pub is_revoked: bool,
    pub product_hash: String,
}

/// Inputs for a points-for-reward redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub user: String,
    pub points: u128,
    pub reward_token: String,
    pub reward_amount: u128,
    /// Applies to the reward payout only; the debit is always confirmed first.
    #[serde(default)]
    pub reward_wait: WaitPolicy,
}

/// Outcome of a redemption that got both transactions submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub intent_id: Uuid,
    pub debit_tx: TxHash,
    pub reward_tx: TxHash,
    pub phase: RedeemPhase,
}

/// Errors surfaced by the settlement orchestrator.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Required address or credential missing; nothing was submitted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input failed presence or format validation; nothing was submitted.
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The chain client refused the transaction.
    #[error("{operation} submission failed: {source}")]
    Submission {
        operation: Operation,
        #[source]
        source: ChainError,
    },

    /// Submitted, but not observed accepted. The transaction may still land.
    #[error("{operation} transaction {tx_hash} not confirmed: {source}")]
    Confirmation {
        operation: Operation,
        tx_hash: TxHash,
        #[source]
        source: ChainError,
    },

    /// Points were debited but the reward payout failed. Needs reconciliation.
    #[error("Redeem {intent_id} partially failed: points debited in {debit_tx}, reward failed: {source}")]
    PartialRedeem {
        intent_id: Uuid,
        debit_tx: TxHash,
        #[source]
        source: Box<SettlementError>,
    },

    /// The same external reference is being processed concurrently.
    #[error("{operation} for reference '{reference}' is already in flight")]
    DuplicateInFlight { operation: Operation, reference: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A read call failed or returned unexpected data.
    #[error("Read failed: {0}")]
    Read(#[source] ChainError),
}

impl SettlementError {
    pub(crate) fn invalid(field: &'static str, err: CalldataError) -> Self {
        SettlementError::InvalidInput {
            field,
            reason: err.to_string(),
        }
    }

    /// Stage label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            SettlementError::Config(_) => "config",
            SettlementError::InvalidInput { .. } => "input",
            SettlementError::Submission { .. } => "submission",
            SettlementError::Confirmation { .. } => "confirmation",
            SettlementError::PartialRedeem { .. } => "partial",
            SettlementError::DuplicateInFlight { .. } => "duplicate",
            SettlementError::Ledger(_) => "ledger",
            SettlementError::Read(_) => "read",
        }
    }
}

/// Result type for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_submission_error_keeps_source() {
        let err = SettlementError::Submission {
            operation: Operation::Mint,
            source: ChainError::Rejected("invalid nonce".to_string()),
        };
        assert_eq!(err.to_string(), "mint submission failed: Transaction rejected: invalid nonce");
        assert!(err.source().is_some());
        assert_eq!(err.stage(), "submission");
    }

    #[test]
    fn test_partial_redeem_display() {
        let err = SettlementError::PartialRedeem {
            intent_id: Uuid::nil(),
            debit_tx: TxHash::new("0xd"),
            source: Box::new(SettlementError::Submission {
                operation: Operation::Reward,
                source: ChainError::Rejected("vault empty".to_string()),
            }),
        };
        let message = err.to_string();
        assert!(message.contains("0xd"));
        assert!(message.contains("vault empty"));
    }

    #[test]
    fn test_wait_policy_default_is_confirmed() {
        assert_eq!(WaitPolicy::default(), WaitPolicy::Confirmed);
        let policy: WaitPolicy = serde_json::from_str("\"submitted\"").unwrap();
        assert_eq!(policy, WaitPolicy::Submitted);
    }
}
