//! Settlement core.
//!
//! # Data Flow
//! ```text
//! Caller (CLI, storefront backend)
//!     → orchestrator.rs (validate → submit → confirm, per WaitPolicy)
//!         → ledger.rs (credit dedup by order reference, redeem intents)
//!         → ChainClient (blockchain subsystem)
//!
//! reconcile.rs (interval / on demand)
//!     → open redeem intents → status lookups → retry, re-credit or report
//! ```
//!
//! rules.rs and metadata.rs hold the storefront-facing conversions that do
//! not touch the chain.

pub mod ledger;
pub mod metadata;
pub mod orchestrator;
pub mod reconcile;
pub mod redeem;
pub mod rules;
pub mod types;

pub use ledger::{LedgerEntry, LedgerError, LedgerSummary, Reservation, SettlementLedger};
pub use metadata::PassportMetadata;
pub use orchestrator::{ContractAddresses, SettlementOrchestrator};
pub use reconcile::{Reconciler, SweepReport};
pub use redeem::{FailureStage, RedeemIntent, RedeemPhase};
pub use rules::{LoyaltyRules, RulesError};
pub use types::{
    Operation, PassportStatus, RedeemReceipt, RedeemRequest, SettlementError, SettlementResult, WaitPolicy,
};
