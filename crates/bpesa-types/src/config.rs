//! Wallet core configuration with sensible defaults.
//!
//! All operational parameters are centralized here. Every value has a
//! documented default; [`CoreConfig::validate`] rejects values outside
//! their acceptable range before the core is constructed.

use std::path::Path;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::{BpesaError, Result, TOKEN_DECIMALS};

/// Lowest PBKDF2 iteration count accepted for a sealed record.
pub const MIN_KDF_ITERATIONS: u32 = 1_000;

/// Default PBKDF2-HMAC-SHA256 iteration count for newly sealed records.
pub const DEFAULT_KDF_ITERATIONS: u32 = 600_000;

/// Highest PBKDF2 iteration count accepted for a sealed record.
///
/// Bounds the time a single unlock can hold the in-flight slot.
pub const MAX_KDF_ITERATIONS: u32 = 2_000_000;

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// Ledger network and token contract the permits are bound to.
///
/// `token_name`, `token_version`, `chain_id` and `token_contract` form
/// the EIP-712 signing domain; `payments_contract` is the permit spender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-readable network name.
    pub name: String,
    /// EIP-155 chain identifier.
    pub chain_id: u64,
    /// JSON-RPC endpoint used by the ledger client.
    pub rpc_url: String,
    /// EIP-712 domain name of the value token.
    pub token_name: String,
    /// EIP-712 domain version of the value token.
    pub token_version: String,
    /// Token contract (the domain's verifying contract).
    pub token_contract: Address,
    /// Payments contract allowed to spend the permit.
    pub payments_contract: Address,
    /// Token decimals (fixed point).
    pub decimals: u8,
}

impl NetworkConfig {
    /// Celo Alfajores testnet with the cKES token.
    pub fn alfajores() -> Self {
        Self {
            name: "Celo Alfajores Testnet".into(),
            chain_id: 44_787,
            rpc_url: "https://alfajores-forno.celo-testnet.org".into(),
            token_name: "cKES".into(),
            token_version: "1".into(),
            token_contract: address!("1E0433C1769271ECcF4CFF9FDdD515eefE6CdF92"),
            payments_contract: address!("8F058b0A4Cbb1335D63682DF1cd453FB2347C081"),
            decimals: TOKEN_DECIMALS,
        }
    }

    /// Celo mainnet. Contract addresses are zero until deployment and
    /// therefore fail [`validate`](Self::validate).
    pub fn mainnet() -> Self {
        Self {
            name: "Celo Mainnet".into(),
            chain_id: 42_220,
            rpc_url: "https://forno.celo.org".into(),
            token_name: "cKES".into(),
            token_version: "1".into(),
            token_contract: Address::ZERO,
            payments_contract: Address::ZERO,
            decimals: TOKEN_DECIMALS,
        }
    }

    /// Validates the network values that end up in the signing domain.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(BpesaError::ConfigError {
                reason: "network.chain_id must be greater than 0".into(),
            });
        }

        if self.name.trim().is_empty() || self.token_name.trim().is_empty() {
            return Err(BpesaError::ConfigError {
                reason: "network.name and network.token_name must not be empty".into(),
            });
        }

        if self.token_version.trim().is_empty() {
            return Err(BpesaError::ConfigError {
                reason: "network.token_version must not be empty".into(),
            });
        }

        if self.rpc_url.trim().is_empty() {
            return Err(BpesaError::ConfigError {
                reason: "network.rpc_url must not be empty".into(),
            });
        }

        if self.token_contract == Address::ZERO || self.payments_contract == Address::ZERO {
            return Err(BpesaError::ConfigError {
                reason: format!("{}: token and payments contracts must be deployed", self.name),
            });
        }

        if self.decimals != TOKEN_DECIMALS {
            return Err(BpesaError::ConfigError {
                reason: format!("network.decimals must be {TOKEN_DECIMALS}, got {}", self.decimals),
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CoreConfig
// ---------------------------------------------------------------------------

/// Global wallet core configuration.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `network` | [`NetworkConfig::alfajores`] |
/// | `kdf_iterations` | 600 000 |
/// | `ledger_timeout_ms` | 10 000 |
/// | `idle_lock_secs` | `Some(300)` |
/// | `permit_ttl_secs` | 3 600 |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Network and token the permits are bound to.
    pub network: NetworkConfig,

    /// PBKDF2 iterations used when sealing a record (create, restore,
    /// change PIN). Existing records keep the count they were sealed
    /// with.
    pub kdf_iterations: u32,

    /// Timeout applied to every ledger collaborator call, in milliseconds.
    pub ledger_timeout_ms: u64,

    /// Length of the unlock window for idle locking, in seconds.
    /// `None` disables idle locking.
    pub idle_lock_secs: Option<u64>,

    /// Default permit lifetime used by `WalletCore::transfer_intent`.
    pub permit_ttl_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::alfajores(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            ledger_timeout_ms: 10_000,
            idle_lock_secs: Some(300),
            permit_ttl_secs: 3_600,
        }
    }
}

impl CoreConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| BpesaError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;

        let config: Self = serde_json::from_str(&json).map_err(|e| BpesaError::ConfigError {
            reason: format!("failed to parse config file: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;

        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.kdf_iterations) {
            return Err(BpesaError::ConfigError {
                reason: format!(
                    "kdf_iterations must be between {MIN_KDF_ITERATIONS} and {MAX_KDF_ITERATIONS}"
                ),
            });
        }

        if self.ledger_timeout_ms == 0 {
            return Err(BpesaError::ConfigError {
                reason: "ledger_timeout_ms must be greater than 0".into(),
            });
        }

        if self.idle_lock_secs == Some(0) {
            return Err(BpesaError::ConfigError {
                reason: "idle_lock_secs must be greater than 0 (use null to disable)".into(),
            });
        }

        if self.permit_ttl_secs == 0 {
            return Err(BpesaError::ConfigError {
                reason: "permit_ttl_secs must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
