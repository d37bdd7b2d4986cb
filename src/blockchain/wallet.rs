//! Merchant account credentials.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use starknet::core::types::Felt;
use starknet::signers::{LocalWallet, SigningKey};
use std::fmt;

use crate::blockchain::calldata::parse_address;
use crate::blockchain::types::{ChainError, ChainResult};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "MERCHANT_PRIVATE_KEY";

/// Merchant account: the address and key transactions are signed with.
#[derive(Clone)]
pub struct MerchantAccount {
    address: Felt,
    signing_key: SigningKey,
}

impl MerchantAccount {
    /// Build an account from a hex address and a hex private key.
    ///
    /// # Security
    /// The private key is parsed and kept in memory only. It is never logged.
    pub fn from_parts(address_hex: &str, private_key_hex: &str) -> ChainResult<Self> {
        let address = parse_address(address_hex)
            .map_err(|e| ChainError::Wallet(format!("Invalid merchant address: {}", e)))?;

        let key_hex = private_key_hex.trim();
        let key_hex = key_hex
            .strip_prefix("0x")
            .or_else(|| key_hex.strip_prefix("0X"))
            .unwrap_or(key_hex);
        if key_hex.is_empty() || !key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChainError::Wallet("Invalid private key format".to_string()));
        }
        let secret = Felt::from_hex(&format!("0x{}", key_hex))
            .map_err(|_| ChainError::Wallet("Invalid private key format".to_string()))?;
        if secret == Felt::ZERO {
            return Err(ChainError::Wallet("Invalid private key format".to_string()));
        }

        tracing::info!(address = %format!("{:#x}", address), "Merchant account loaded");

        Ok(Self {
            address,
            signing_key: SigningKey::from_secret_scalar(secret),
        })
    }

    /// Load the account with the address from config and the key from
    /// `MERCHANT_PRIVATE_KEY`.
    pub fn from_env(address_hex: &str) -> ChainResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            ChainError::NotConfigured(format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR))
        })?;

        Self::from_parts(address_hex, &private_key)
    }

    /// The merchant account address.
    pub fn address(&self) -> Felt {
        self.address
    }

    /// Signer for the account abstraction.
    pub fn signer(&self) -> LocalWallet {
        LocalWallet::from(self.signing_key.clone())
    }
}

impl fmt::Debug for MerchantAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantAccount")
            .field("address", &format!("{:#x}", self.address))
            .field("signing_key", &"<redacted>")
            .finish()
    }
}
