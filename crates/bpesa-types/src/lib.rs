//! Core shared types for the bpesa wallet core.
//!
//! This crate defines the types every other crate in the workspace
//! agrees on: the account identifier, the lifecycle state, the backend
//! transaction kind and the closed error taxonomy. Configuration lives
//! in [`config`].

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alloy_primitives::{Address, B256, U256};

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Ledger account identifier: a 20-byte EVM address.
///
/// Rendered as a `0x`-prefixed, EIP-55 checksummed, 42-character string.
pub type AccountId = Address;

/// Number of decimals of the value token (18-decimal fixed point).
pub const TOKEN_DECIMALS: u8 = 18;

/// Parses a `0x`-prefixed 40-hex-char account identifier.
///
/// # Errors
///
/// Returns [`BpesaError::ConfigError`] if the string is not a well-formed
/// address. Checksum casing is not enforced.
pub fn parse_account_id(s: &str) -> Result<AccountId> {
    if !s.starts_with("0x") || s.len() != 42 {
        return Err(BpesaError::ConfigError {
            reason: format!("account id must be 0x + 40 hex chars, got {} chars", s.len()),
        });
    }
    Address::from_str(s).map_err(|e| BpesaError::ConfigError {
        reason: format!("invalid account id: {e}"),
    })
}

// ---------------------------------------------------------------------------
// WalletLifecycleState
// ---------------------------------------------------------------------------

/// Process-wide lifecycle of the single wallet on this device.
///
/// Only the wallet state machine mutates this value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum WalletLifecycleState {
    /// No encrypted record exists; create or restore is required.
    Uninitialized,
    /// A record exists but no unlock window is open.
    Locked,
    /// An unlock is in flight (exclusive).
    Unlocking,
    /// The PIN was verified; the unlock window is open.
    Unlocked,
}

impl fmt::Display for WalletLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Locked => "locked",
            Self::Unlocking => "unlocking",
            Self::Unlocked => "unlocked",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// TxType
// ---------------------------------------------------------------------------

/// Transaction kind understood by the backend submission API.
///
/// The backend expects the discriminant as a decimal string
/// (`"0"` for a send, `"3"` for an agent withdrawal).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TxType {
    Send = 0,
    Receive = 1,
    Load = 2,
    Withdraw = 3,
    Deposit = 4,
    Stake = 5,
    Unstake = 6,
    Claim = 7,
}

impl TxType {
    /// Returns the wire code used by the backend (`"0"`, `"3"`, ...).
    pub fn code(self) -> String {
        (self as u8).to_string()
    }
}

impl Serialize for TxType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for TxType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        match code.as_str() {
            "0" => Ok(Self::Send),
            "1" => Ok(Self::Receive),
            "2" => Ok(Self::Load),
            "3" => Ok(Self::Withdraw),
            "4" => Ok(Self::Deposit),
            "5" => Ok(Self::Stake),
            "6" => Ok(Self::Unstake),
            "7" => Ok(Self::Claim),
            other => Err(serde::de::Error::custom(format!("unknown txType {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// BpesaError
// ---------------------------------------------------------------------------

/// Central error type for the wallet core.
///
/// The enum is closed: callers match on it exhaustively instead of
/// inspecting messages. Credential failures carry no
/// detail about which field or check failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BpesaError {
    /// The PIN is not 4–8 ASCII digits.
    #[error("invalid PIN format")]
    InvalidPinFormat,

    /// The recovery phrase failed word-list or checksum validation.
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic {
        /// Which validation step rejected the phrase.
        reason: String,
    },

    /// Wrong PIN or corrupted record; the two are indistinguishable.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The operation needs an unlocked wallet and unlocking failed.
    #[error("wallet is locked")]
    WalletLocked,

    /// The permit deadline is not in the future.
    #[error("permit expired: deadline {deadline} is not after {now}")]
    PermitExpired {
        /// Requested deadline (unix seconds).
        deadline: u64,
        /// Clock reading at the check (unix seconds).
        now: u64,
    },

    /// Another exclusive wallet operation is already running.
    #[error("another wallet operation is already in progress")]
    AlreadyInProgress,

    /// The OS random number generator could not be read.
    #[error("entropy source unavailable: {reason}")]
    EntropySourceUnavailable {
        /// Underlying RNG error.
        reason: String,
    },

    /// The persistence gateway failed to read, write or clear.
    #[error("persistence unavailable: {reason}")]
    PersistenceUnavailable {
        /// Underlying storage error.
        reason: String,
    },

    /// Key derivation or the signature primitive failed.
    #[error("signing failed: {reason}")]
    SigningFailed {
        /// Underlying primitive error.
        reason: String,
    },

    /// A self-check that must always hold did not.
    #[error("internal invariant violated: {reason}")]
    InternalInvariantViolation {
        /// Which invariant.
        reason: String,
    },

    /// No wallet record exists on this device.
    #[error("wallet not initialized")]
    WalletNotInitialized,

    /// A wallet record already exists; reset before creating another.
    #[error("wallet already exists")]
    WalletAlreadyExists,

    /// The ledger collaborator failed, timed out, or returned garbage.
    #[error("ledger unavailable: {reason}")]
    LedgerUnavailable {
        /// Underlying transport or decoding error.
        reason: String,
    },

    /// A transfer amount is not a non-negative 18-decimal number.
    #[error("invalid amount: {reason}")]
    InvalidAmount {
        /// Why the amount was rejected.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

impl BpesaError {
    /// Returns `true` for failures the UI should present as a single
    /// generic "wrong PIN, try again" message.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidPinFormat | Self::DecryptionFailed | Self::WalletLocked
        )
    }

    /// Returns `true` for failures the caller may retry unchanged
    /// (storage or network hiccups). Cryptographic and format errors
    /// are never retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PersistenceUnavailable { .. }
                | Self::LedgerUnavailable { .. }
                | Self::AlreadyInProgress
        )
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`BpesaError`].
pub type Result<T> = std::result::Result<T, BpesaError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
