//! AES-256-GCM authenticated encryption with 128-bit IVs.
//!
//! The wallet record stores a 16-byte IV per sealed field, so the cipher
//! is instantiated with a 16-byte nonce instead of the usual 12. GCM
//! derives its counter block from such nonces through GHASH. IVs come
//! from the OS RNG and **must never be reused** with the same key.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use bpesa_types::{BpesaError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// AES-256-GCM with a 16-byte nonce and the standard 16-byte tag.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Byte length of a GCM authentication tag.
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Iv
// ---------------------------------------------------------------------------

/// 128-bit (16-byte) initialization vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Iv([u8; 16]);

impl Iv {
    /// Fixed byte length of an IV (32 hex chars in the record).
    pub const LEN: usize = 16;

    /// Creates an [`Iv`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 16-byte array.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Generates a fresh random IV from OS entropy.
///
/// # Errors
///
/// Returns [`BpesaError::EntropySourceUnavailable`] if the RNG fails.
pub fn generate_iv() -> Result<Iv> {
    let mut bytes = [0u8; Iv::LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| BpesaError::EntropySourceUnavailable {
            reason: e.to_string(),
        })?;
    Ok(Iv(bytes))
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` with AES-256-GCM.
///
/// `aad` is authenticated but not encrypted. The returned ciphertext has
/// the 16-byte tag appended.
///
/// # Errors
///
/// Returns [`BpesaError::InternalInvariantViolation`] if the cipher
/// rejects the input, which only happens for plaintexts far beyond any
/// wallet secret.
pub fn encrypt_aes_gcm(key: &[u8; 32], iv: &Iv, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key).map_err(|_| BpesaError::InternalInvariantViolation {
        reason: "AES-256 key must be 32 bytes".into(),
    })?;
    let payload = Payload { msg: plaintext, aad };

    cipher
        .encrypt(Nonce::<U16>::from_slice(&iv.0), payload)
        .map_err(|_| BpesaError::InternalInvariantViolation {
            reason: "AES-256-GCM encryption failed".into(),
        })
}

/// Decrypts and authenticates `ciphertext` with AES-256-GCM.
///
/// # Errors
///
/// Returns [`BpesaError::DecryptionFailed`] for a wrong key, wrong IV,
/// tampered ciphertext or mismatched `aad`. The cases are not
/// distinguished.
pub fn decrypt_aes_gcm(key: &[u8; 32], iv: &Iv, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key).map_err(|_| BpesaError::DecryptionFailed)?;
    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(Nonce::<U16>::from_slice(&iv.0), payload)
        .map_err(|_| BpesaError::DecryptionFailed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
