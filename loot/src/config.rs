//! Configuration management for the lottery client.
//!
//! Loads configuration from environment variables with defaults matching the
//! public Sepolia deployment.

use crate::gateway::GasLimits;
use crate::oracle::SpendingPolicy;
use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Sepolia
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Public Aether Loot deployment on Sepolia
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("3E28aB17f71487B4F59bD43D99f81b9d9840D413");

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An address variable is not a 20-byte hex address
    #[error("{key} is not a valid address: {value}")]
    InvalidAddress {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// The zero address cannot host the contract
    #[error("{key} must not be the zero address")]
    ZeroAddress {
        /// Variable name
        key: &'static str,
    },
}

/// Lottery client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootConfig {
    /// Chain the contract is deployed on
    pub chain_id: u64,
    /// Lottery contract address
    pub contract_address: Address,
    /// First block scanned when rebuilding the inventory
    pub genesis_block: u64,
    /// Gas limits for writes
    pub gas: GasLimits,
    /// Whether purchases may reuse a cached price
    pub price_policy: SpendingPolicy,
    /// Where pending tickets are kept between runs (`None` keeps them in memory)
    pub journal_path: Option<PathBuf>,
    /// Log filter (trace, debug, info, warn, error, or an `EnvFilter` directive)
    pub log_level: String,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            genesis_block: 0,
            gas: GasLimits::default(),
            price_policy: SpendingPolicy::SessionCache,
            journal_path: None,
            log_level: "aetherloot=info".to_string(),
        }
    }
}

impl LootConfig {
    /// Load configuration from environment variables
    ///
    /// Unparseable numbers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LOOT_CONTRACT_ADDRESS` is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the contract address is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let contract_address = match lookup("LOOT_CONTRACT_ADDRESS") {
            Some(value) => parse_address("LOOT_CONTRACT_ADDRESS", &value)?,
            None => defaults.contract_address,
        };

        let revalidate = lookup("LOOT_PRICE_REVALIDATE")
            .and_then(|s| s.trim().parse::<bool>().ok())
            .unwrap_or(false);

        Ok(Self {
            chain_id: number("LOOT_CHAIN_ID", defaults.chain_id),
            contract_address,
            genesis_block: number("LOOT_GENESIS_BLOCK", defaults.genesis_block),
            gas: GasLimits {
                buy: number("LOOT_GAS_BUY", defaults.gas.buy),
                redeem: number("LOOT_GAS_REDEEM", defaults.gas.redeem),
                admin: number("LOOT_GAS_ADMIN", defaults.gas.admin),
            },
            price_policy: if revalidate {
                SpendingPolicy::AlwaysRefresh
            } else {
                SpendingPolicy::SessionCache
            },
            journal_path: lookup("LOOT_JOURNAL_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        })
    }
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    let address = value
        .trim()
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress {
            key,
            value: value.to_string(),
        })?;
    if address.is_zero() {
        return Err(ConfigError::ZeroAddress { key });
    }
    Ok(address)
}
