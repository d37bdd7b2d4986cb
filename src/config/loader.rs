//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::SettlementConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Env var overriding `chain.rpc_url`.
pub const RPC_URL_ENV_VAR: &str = "STARKNET_RPC_URL";
/// Env var overriding `merchant.address`.
pub const MERCHANT_ADDRESS_ENV_VAR: &str = "MERCHANT_ACCOUNT_ADDRESS";
/// Env var overriding `contracts.passport`.
pub const PASSPORT_ADDRESS_ENV_VAR: &str = "PASSPORT_721_ADDRESS";
/// Env var overriding `contracts.loyalty`.
pub const LOYALTY_ADDRESS_ENV_VAR: &str = "LOYALTY_POINTS_ADDRESS";
/// Env var overriding `contracts.rewards`.
pub const REWARDS_ADDRESS_ENV_VAR: &str = "REWARDS_CONTRACT_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SettlementConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: SettlementConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration from `path` if given, otherwise start from defaults.
/// Environment overrides and validation apply either way.
pub fn load_or_default(path: Option<&Path>) -> Result<SettlementConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = SettlementConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Overlay environment values on top of file values. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut SettlementConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(RPC_URL_ENV_VAR) {
        config.chain.rpc_url = url;
    }
    if let Some(address) = get(MERCHANT_ADDRESS_ENV_VAR) {
        config.merchant.address = Some(address);
    }
    if let Some(address) = get(PASSPORT_ADDRESS_ENV_VAR) {
        config.contracts.passport = Some(address);
    }
    if let Some(address) = get(LOYALTY_ADDRESS_ENV_VAR) {
        config.contracts.loyalty = Some(address);
    }
    if let Some(address) = get(REWARDS_ADDRESS_ENV_VAR) {
        config.contracts.rewards = Some(address);
    }
}
