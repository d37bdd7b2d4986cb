//! Points and reward conversion rules.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::config::RulesConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invalid order total '{0}'")]
    InvalidTotal(String),

    #[error("order total must not be negative")]
    NegativeTotal,

    #[error("amount overflows")]
    Overflow,
}

/// Conversion rates loaded from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoyaltyRules {
    points_per_currency_unit: u32,
    reward_units_per_point: u64,
}

impl LoyaltyRules {
    pub fn new(points_per_currency_unit: u32, reward_units_per_point: u64) -> Self {
        Self {
            points_per_currency_unit,
            reward_units_per_point,
        }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(config.points_per_currency_unit, config.reward_units_per_point)
    }

    /// Points earned for an order, rounded down.
    pub fn points_for_order_total(&self, total: Decimal) -> Result<u128, RulesError> {
        if total.is_sign_negative() && !total.is_zero() {
            return Err(RulesError::NegativeTotal);
        }
        total
            .checked_mul(Decimal::from(self.points_per_currency_unit))
            .ok_or(RulesError::Overflow)?
            .floor()
            .to_u128()
            .ok_or(RulesError::Overflow)
    }

    /// Same as [`points_for_order_total`](Self::points_for_order_total) for a
    /// decimal string such as `"12.99"`.
    pub fn points_for_order_str(&self, total: &str) -> Result<u128, RulesError> {
        let total = Decimal::from_str(total.trim()).map_err(|_| RulesError::InvalidTotal(total.to_string()))?;
        self.points_for_order_total(total)
    }

    /// Reward token base units owed for redeeming `points`.
    pub fn reward_amount_for_points(&self, points: u128) -> Result<u128, RulesError> {
        points
            .checked_mul(u128::from(self.reward_units_per_point))
            .ok_or(RulesError::Overflow)
    }
}

impl Default for LoyaltyRules {
    fn default() -> Self {
        Self::from_config(&RulesConfig::default())
    }
}
