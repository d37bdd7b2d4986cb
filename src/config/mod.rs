//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks, startup warnings)
//!     → SettlementConfig (validated, immutable)
//!     → passed explicitly to the chain client, orchestrator and daemon
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Secrets come from the environment only

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    AdminConfig, ChainConfig, CompensationStrategy, ContractsConfig, LedgerConfig, LogFormat,
    MetadataConfig, ObservabilityConfig, ReconciliationConfig, RulesConfig, SettlementConfig,
};
