//! Enlivora settlement library.
//!
//! Turns storefront events (passport claims, loyalty credits, redemptions)
//! into signed Starknet transactions against the Passport, Loyalty and
//! Rewards contracts.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod settlement;

pub use config::SettlementConfig;
pub use lifecycle::Shutdown;
pub use settlement::{SettlementError, SettlementOrchestrator, WaitPolicy};
