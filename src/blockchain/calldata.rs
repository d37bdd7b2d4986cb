//! Calldata encoding for the Passport, Loyalty and Rewards contracts.
//!
//! Every entry point the settlement core touches is built here so the
//! argument layout lives in one place. Cairo `u256` values are serialized as
//! two felts, low 128 bits first.

use starknet::core::types::Felt;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::blockchain::types::ContractCall;

/// Entry point names.
pub mod entry_points {
    pub const MINT_PASSPORT: &str = "mint_passport";
    pub const TRANSFER_FROM: &str = "transfer_from";
    pub const OWNER_OF: &str = "owner_of";
    pub const GET_PASSPORT_DATA: &str = "get_passport_data";
    pub const CREDIT_POINTS: &str = "credit_points";
    pub const DEBIT_POINTS: &str = "debit_points";
    pub const BALANCE_OF: &str = "balance_of";
    pub const REDEEM_REWARDS: &str = "redeem_rewards";
}

/// `reason_hash` sent with every credit. The order reference is not hashed
/// into it; it is tracked in the ledger and logs instead.
pub const CREDIT_REASON_PLACEHOLDER: Felt = Felt::ONE;

/// `reward_id` sent with every debit.
pub const DEBIT_REWARD_ID_PLACEHOLDER: u64 = 0x99;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalldataError {
    #[error("value is empty")]
    Empty,

    #[error("expected 0x-prefixed hex, got '{0}'")]
    NotHex(String),

    #[error("'{0}' does not fit in a field element")]
    Overflow(String),

    #[error("token ID must be a decimal integer below 2^128, got '{0}'")]
    TokenId(String),
}

/// Parse a 0x-prefixed hex felt (contract address, product hash).
pub fn parse_felt_hex(value: &str) -> Result<Felt, CalldataError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CalldataError::Empty);
    }
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| CalldataError::NotHex(value.to_string()))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CalldataError::NotHex(value.to_string()));
    }
    if digits.trim_start_matches('0').len() > 63 {
        return Err(CalldataError::Overflow(value.to_string()));
    }
    Felt::from_hex(&format!("0x{}", digits)).map_err(|_| CalldataError::Overflow(value.to_string()))
}

/// Parse a contract or account address.
pub fn parse_address(value: &str) -> Result<Felt, CalldataError> {
    parse_felt_hex(value)
}

/// Serialize a `u256` whose value fits in 128 bits.
pub fn u256(value: u128) -> [Felt; 2] {
    [Felt::from(value), Felt::ZERO]
}

/// Decode a `u256` (low, high) pair. Values above 2^128 are rejected.
pub fn decode_u256(low: &Felt, high: &Felt) -> Option<u128> {
    if *high != Felt::ZERO {
        return None;
    }
    u128::try_from(*low).ok()
}

/// Passport token ID, a caller-chosen decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub u128);

impl TokenId {
    pub fn to_calldata(self) -> [Felt; 2] {
        u256(self.0)
    }
}

impl FromStr for TokenId {
    type Err = CalldataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CalldataError::Empty);
        }
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(CalldataError::TokenId(s.to_string()));
        }
        s.parse::<u128>()
            .map(TokenId)
            .map_err(|_| CalldataError::TokenId(s.to_string()))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `mint_passport(recipient, token_id: u256, product_hash)`
pub fn mint_passport(passport: Felt, recipient: Felt, token_id: TokenId, product_hash: Felt) -> ContractCall {
    let [low, high] = token_id.to_calldata();
    ContractCall::new(
        passport,
        entry_points::MINT_PASSPORT,
        vec![recipient, low, high, product_hash],
    )
}

/// `transfer_from(from, to, token_id: u256)`
pub fn transfer_from(passport: Felt, from: Felt, to: Felt, token_id: TokenId) -> ContractCall {
    let [low, high] = token_id.to_calldata();
    ContractCall::new(passport, entry_points::TRANSFER_FROM, vec![from, to, low, high])
}

/// `owner_of(token_id: u256) -> ContractAddress`
pub fn owner_of(passport: Felt, token_id: TokenId) -> ContractCall {
    ContractCall::new(passport, entry_points::OWNER_OF, token_id.to_calldata().to_vec())
}

/// `get_passport_data(token_id: u256) -> (felt252, bool)`
pub fn get_passport_data(passport: Felt, token_id: TokenId) -> ContractCall {
    ContractCall::new(
        passport,
        entry_points::GET_PASSPORT_DATA,
        token_id.to_calldata().to_vec(),
    )
}

/// `credit_points(recipient, amount: u256, reason_hash)`
pub fn credit_points(loyalty: Felt, recipient: Felt, amount: u128) -> ContractCall {
    let [low, high] = u256(amount);
    ContractCall::new(
        loyalty,
        entry_points::CREDIT_POINTS,
        vec![recipient, low, high, CREDIT_REASON_PLACEHOLDER],
    )
}

/// `debit_points(user, amount: u256, reward_id)`
pub fn debit_points(loyalty: Felt, user: Felt, amount: u128) -> ContractCall {
    let [low, high] = u256(amount);
    ContractCall::new(
        loyalty,
        entry_points::DEBIT_POINTS,
        vec![user, low, high, Felt::from(DEBIT_REWARD_ID_PLACEHOLDER)],
    )
}

/// `balance_of(account) -> u256`
pub fn balance_of(loyalty: Felt, account: Felt) -> ContractCall {
    ContractCall::new(loyalty, entry_points::BALANCE_OF, vec![account])
}

/// `redeem_rewards(token_address, recipient, amount: u256)`
pub fn redeem_rewards(rewards: Felt, token: Felt, recipient: Felt, amount: u128) -> ContractCall {
    let [low, high] = u256(amount);
    ContractCall::new(
        rewards,
        entry_points::REDEEM_REWARDS,
        vec![token, recipient, low, high],
    )
}
