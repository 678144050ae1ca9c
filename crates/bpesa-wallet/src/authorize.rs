//! Transfer intents and the permits signed for them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::utils::{format_units, parse_units, ParseUnits};
use bpesa_crypto::permit::{PermitIntent, PermitSignature};
use bpesa_types::{Address, BpesaError, Result, TxType, B256, TOKEN_DECIMALS, U256};

use crate::submission::{PermitData, SubmissionRequest};

/// Current wall-clock time in unix seconds.
pub(crate) fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| BpesaError::InternalInvariantViolation {
            reason: format!("system clock before unix epoch: {e}"),
        })
}

/// Formats a smallest-unit amount as whole tokens without trailing zeros
/// (`12500000000000000000` → `"12.5"`).
pub fn format_token_amount(value: U256) -> Result<String> {
    let formatted = format_units(value, TOKEN_DECIMALS).map_err(|e| BpesaError::InvalidAmount {
        reason: e.to_string(),
    })?;
    let trimmed = match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    };
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// TransferIntent
// ---------------------------------------------------------------------------

/// What the user asked to move: amount, recipient and how long the
/// authorization stays valid.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferIntent {
    pub recipient: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// Unix seconds after which the permit is void.
    pub deadline: u64,
}

impl TransferIntent {
    pub fn new(recipient: Address, value: U256, deadline: u64) -> Self {
        Self {
            recipient,
            value,
            deadline,
        }
    }

    /// Intent whose deadline is `ttl` from now.
    pub fn expiring_in(recipient: Address, value: U256, ttl: Duration) -> Result<Self> {
        let deadline = unix_now()?.saturating_add(ttl.as_secs());
        Ok(Self::new(recipient, value, deadline))
    }

    /// Parses a whole-token decimal amount such as `"12.5"`.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::InvalidAmount`] for negative, malformed or
    /// over-precise amounts.
    pub fn from_decimal(recipient: Address, amount: &str, deadline: u64) -> Result<Self> {
        let amount = amount.trim();
        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
            return Err(BpesaError::InvalidAmount {
                reason: format!("{amount:?} is not a non-negative decimal number"),
            });
        }
        if fraction.len() > usize::from(TOKEN_DECIMALS) {
            return Err(BpesaError::InvalidAmount {
                reason: format!("more than {TOKEN_DECIMALS} decimal places"),
            });
        }

        let parsed = parse_units(amount, TOKEN_DECIMALS).map_err(|e| BpesaError::InvalidAmount {
            reason: e.to_string(),
        })?;
        match parsed {
            ParseUnits::U256(value) => Ok(Self::new(recipient, value, deadline)),
            ParseUnits::I256(_) => Err(BpesaError::InvalidAmount {
                reason: "amount must not be negative".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// SignedPermit
// ---------------------------------------------------------------------------

/// A permit signed for one transfer, ready for the backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedPermit {
    /// Final recipient of the transfer (not part of the signed struct).
    pub recipient: Address,
    pub permit: PermitIntent,
    pub signature: PermitSignature,
}

impl SignedPermit {
    /// EIP-712 digest that was signed.
    pub fn digest(&self) -> B256 {
        self.signature.digest
    }

    /// `0x` + 130 hex chars, `v` in {27, 28}.
    pub fn signature_hex(&self) -> String {
        self.signature.to_hex()
    }

    /// Address recovered from the signature.
    pub fn recover_signer(&self) -> Result<Address> {
        self.signature.recover_signer()
    }

    /// Backend payload forwarding this permit unmodified.
    pub fn submission_request(&self, tx_type: TxType) -> Result<SubmissionRequest> {
        Ok(SubmissionRequest {
            from: self.permit.owner.to_checksum(None),
            to: self.recipient.to_checksum(None),
            amount: format_token_amount(self.permit.value)?,
            signature: self.signature_hex(),
            permit_data: PermitData::from_intent(&self.permit),
            tx_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
