//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, URLs and addresses parse)
//! - Produce startup warnings for settings that are only needed at call time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Missing contract addresses or merchant credentials are warnings, not
//!   errors: operations report them when they actually need them

use std::net::SocketAddr;
use thiserror::Error;

use crate::blockchain::calldata::parse_address;
use crate::blockchain::wallet::PRIVATE_KEY_ENV_VAR;
use crate::config::schema::SettlementConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &SettlementConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = url::Url::parse(&config.chain.rpc_url) {
        errors.push(ValidationError::new("chain.rpc_url", e.to_string()));
    }
    if config.chain.chain_id.is_empty() || config.chain.chain_id.len() > 31 {
        errors.push(ValidationError::new(
            "chain.chain_id",
            "must be a Cairo short string of 1 to 31 characters",
        ));
    }
    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be > 0"));
    }
    if config.chain.confirmation_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.confirmation_timeout_secs", "must be > 0"));
    }
    if config.chain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("chain.poll_interval_ms", "must be > 0"));
    }

    let addresses = [
        ("merchant.address", &config.merchant.address),
        ("contracts.passport", &config.contracts.passport),
        ("contracts.loyalty", &config.contracts.loyalty),
        ("contracts.rewards", &config.contracts.rewards),
    ];
    for (field, value) in addresses {
        if let Some(address) = value {
            if let Err(e) = parse_address(address) {
                errors.push(ValidationError::new(field, e.to_string()));
            }
        }
    }
    if let Err(e) = parse_address(&config.rules.default_reward_token) {
        errors.push(ValidationError::new("rules.default_reward_token", e.to_string()));
    }

    if config.rules.points_per_currency_unit == 0 {
        errors.push(ValidationError::new("rules.points_per_currency_unit", "must be > 0"));
    }
    if config.rules.reward_units_per_point == 0 {
        errors.push(ValidationError::new("rules.reward_units_per_point", "must be > 0"));
    }

    if config.reconciliation.interval_secs == 0 {
        errors.push(ValidationError::new("reconciliation.interval_secs", "must be > 0"));
    }
    if config.reconciliation.backoff_base_ms > config.reconciliation.backoff_max_ms {
        errors.push(ValidationError::new(
            "reconciliation.backoff_base_ms",
            "must not exceed backoff_max_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "admin.bind_address",
            format!("invalid socket address '{}'", config.admin.bind_address),
        ));
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty when the admin API is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Settings that are absent but will be required by some operation.
pub fn startup_warnings(config: &SettlementConfig, private_key_present: bool) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.merchant.address.is_none() {
        warnings.push("merchant address missing; mint, transfer and all writes will fail".to_string());
    }
    if !private_key_present {
        warnings.push(format!(
            "{} not set; transactions cannot be signed",
            PRIVATE_KEY_ENV_VAR
        ));
    }
    if config.contracts.passport.is_none() {
        warnings.push("passport contract address missing; mint/transfer/read will fail".to_string());
    }
    if config.contracts.loyalty.is_none() {
        warnings.push("loyalty contract address missing; credit/redeem will fail".to_string());
    }
    if config.contracts.rewards.is_none() {
        warnings.push("rewards contract address missing; redeem will fail".to_string());
    }
    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        warnings.push("admin API enabled with the placeholder api_key".to_string());
    }

    warnings
}

/// Log every startup warning at warn level.
pub fn log_startup_warnings(config: &SettlementConfig) {
    let key_present = std::env::var(PRIVATE_KEY_ENV_VAR).is_ok();
    for warning in startup_warnings(config, key_present) {
        tracing::warn!("Configuration: {}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SettlementConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SettlementConfig::default();
        config.chain.rpc_url = "::nope".to_string();
        config.chain.poll_interval_ms = 0;
        config.contracts.loyalty = Some("not-hex".to_string());
        config.reconciliation.interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"chain.rpc_url"));
        assert!(fields.contains(&"chain.poll_interval_ms"));
        assert!(fields.contains(&"contracts.loyalty"));
        assert!(fields.contains(&"reconciliation.interval_secs"));
    }

    #[test]
    fn test_missing_addresses_are_warnings_only() {
        let config = SettlementConfig::default();
        assert!(validate_config(&config).is_ok());

        let warnings = startup_warnings(&config, false);
        assert!(warnings.iter().any(|w| w.contains("passport")));
        assert!(warnings.iter().any(|w| w.contains(PRIVATE_KEY_ENV_VAR)));
    }

    #[test]
    fn test_fully_configured_has_no_warnings() {
        let mut config = SettlementConfig::default();
        config.merchant.address = Some("0x1".to_string());
        config.contracts.passport = Some("0x2".to_string());
        config.contracts.loyalty = Some("0x3".to_string());
        config.contracts.rewards = Some("0x4".to_string());

        assert!(startup_warnings(&config, true).is_empty());
    }

    #[test]
    fn test_empty_admin_key_rejected_when_enabled() {
        let mut config = SettlementConfig::default();
        config.admin.api_key = "  ".to_string();
        // ignored while the admin API is off
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "admin.api_key");
    }

    #[test]
    fn test_long_chain_id_rejected() {
        let mut config = SettlementConfig::default();
        config.chain.chain_id = "X".repeat(32);
        assert!(validate_config(&config).is_err());
    }
}
