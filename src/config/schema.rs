//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the settlement
//! service. All types derive Serde traits for deserialization from config files.
//!
//! Secrets never live here: the merchant private key is read from the
//! environment by [`crate::blockchain::wallet::MerchantAccount`].

use serde::{Deserialize, Serialize};

/// Root configuration for the settlement service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SettlementConfig {
    /// Starknet RPC settings.
    pub chain: ChainConfig,

    /// Merchant account (public part only).
    pub merchant: MerchantConfig,

    /// Addresses of the Passport, Loyalty and Rewards contracts.
    pub contracts: ContractsConfig,

    /// Idempotency / intent ledger persistence.
    pub ledger: LedgerConfig,

    /// Background reconciliation of stuck redemptions.
    pub reconciliation: ReconciliationConfig,

    /// Points and reward conversion rules.
    pub rules: RulesConfig,

    /// Passport metadata document settings.
    pub metadata: MetadataConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Starknet JSON-RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Expected chain ID as a Cairo short string (e.g. "SN_SEPOLIA", "SN_MAIN").
    pub chain_id: String,

    /// Timeout for a single RPC request, in seconds.
    pub rpc_timeout_secs: u64,

    /// Upper bound on waiting for a transaction to be accepted, in seconds.
    pub confirmation_timeout_secs: u64,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://starknet-sepolia.public.blastapi.io".to_string(),
            chain_id: "SN_SEPOLIA".to_string(),
            rpc_timeout_secs: 10,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
        }
    }
}

/// Merchant account configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MerchantConfig {
    /// Merchant account contract address (hex). Overridden by
    /// `MERCHANT_ACCOUNT_ADDRESS`.
    pub address: Option<String>,
}

/// Contract addresses. All optional; absence is reported when an operation
/// needs the contract.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractsConfig {
    /// Passport (ERC-721) contract. Overridden by `PASSPORT_721_ADDRESS`.
    pub passport: Option<String>,

    /// Loyalty points contract. Overridden by `LOYALTY_POINTS_ADDRESS`.
    pub loyalty: Option<String>,

    /// Rewards vault contract. Overridden by `REWARDS_CONTRACT_ADDRESS`.
    pub rewards: Option<String>,
}

/// Ledger persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON snapshot path. `None` keeps the ledger in memory only.
    pub path: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: Some("settlement-ledger.json".to_string()),
        }
    }
}

/// What the reconciler does with a redemption whose points were debited but
/// whose reward never landed.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStrategy {
    /// Resubmit the reward payout.
    RetryReward,
    /// Credit the debited points back to the user.
    Recredit,
    /// Leave the intent for an operator.
    #[default]
    Manual,
}

/// Reconciliation sweeper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Enable the background sweeper in the daemon.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Intents updated more recently than this are left alone.
    pub stale_after_secs: u64,

    /// Strategy for stranded redemptions.
    pub compensation: CompensationStrategy,

    /// Reward submissions allowed per intent before falling back to manual.
    pub max_reward_attempts: u32,

    /// Base delay for backoff after failed sweeps, in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum backoff delay, in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            stale_after_secs: 300,
            compensation: CompensationStrategy::Manual,
            max_reward_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
        }
    }
}

/// Points and reward conversion rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Loyalty points per unit of order currency.
    pub points_per_currency_unit: u32,

    /// Reward token base units paid per redeemed point.
    pub reward_units_per_point: u64,

    /// Default reward token address (STRK on Sepolia).
    pub default_reward_token: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            points_per_currency_unit: 10,
            reward_units_per_point: 1_000_000_000_000_000, // 0.001 STRK
            default_reward_token:
                "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d".to_string(),
        }
    }
}

/// Passport metadata document settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Collection display name prefix.
    pub collection_name: String,

    /// Image shown for every passport.
    pub image_url: String,

    /// Base URL of the public verification page.
    pub verify_base_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            collection_name: "Enlivora Passport".to_string(),
            image_url: "https://pass.enlivora.com/genesis-card.jpg".to_string(),
            verify_base_url: "https://pass.enlivora.com/verify".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
