//! PBKDF2-HMAC-SHA256 stretching of the wallet PIN.
//!
//! Derives a 256-bit AES key from a PIN and a 32-byte random salt. The
//! iteration count is stored alongside each sealed record, so raising
//! [`bpesa_types::config::DEFAULT_KDF_ITERATIONS`] never breaks decryption
//! of records sealed under the old count.

use bpesa_types::config::{MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS};
use bpesa_types::{BpesaError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Byte length of a KDF salt (64 hex chars in the record).
pub const SALT_LEN: usize = 32;

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// 256-bit key derived from a PIN.
///
/// Automatically zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    /// Fixed byte length of the derived key.
    pub const LEN: usize = 32;

    /// Returns the raw 32-byte key material.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// Draws a fresh 32-byte salt from the OS RNG.
///
/// # Errors
///
/// Returns [`BpesaError::EntropySourceUnavailable`] if the RNG fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| BpesaError::EntropySourceUnavailable {
            reason: e.to_string(),
        })?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derives a 256-bit key from `pin` and `salt` with PBKDF2-HMAC-SHA256.
///
/// # Errors
///
/// Returns [`BpesaError::ConfigError`] if `iterations` is outside
/// [`MIN_KDF_ITERATIONS`]..=[`MAX_KDF_ITERATIONS`] or the salt is not
/// [`SALT_LEN`] bytes.
pub fn pbkdf2_derive_key(pin: &[u8], salt: &[u8], iterations: u32) -> Result<DerivedKey> {
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
        return Err(BpesaError::ConfigError {
            reason: format!(
                "PBKDF2 iterations must be between {MIN_KDF_ITERATIONS} and {MAX_KDF_ITERATIONS}, got {iterations}"
            ),
        });
    }

    if salt.len() != SALT_LEN {
        return Err(BpesaError::ConfigError {
            reason: format!("salt must be {SALT_LEN} bytes, got {}", salt.len()),
        });
    }

    let mut output = [0u8; DerivedKey::LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(pin, salt, iterations, &mut output);
    Ok(DerivedKey(output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
