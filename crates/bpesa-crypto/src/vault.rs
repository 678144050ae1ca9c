//! PIN-keyed sealing of wallet secrets.
//!
//! Each secret field is sealed on its own: a fresh 32-byte salt feeds
//! PBKDF2, a fresh 16-byte IV feeds AES-256-GCM, and the field name is
//! bound as associated data. The mnemonic and the private key therefore
//! never share a derived key, and one field's ciphertext cannot be
//! substituted for the other's.
//!
//! PIN format is validated before any cipher work. Every decryption
//! failure surfaces as the same [`BpesaError::DecryptionFailed`].

use bpesa_types::{BpesaError, Result};
use zeroize::Zeroizing;

use crate::aead::{decrypt_aes_gcm, encrypt_aes_gcm, generate_iv, Iv};
use crate::kdf::{generate_salt, pbkdf2_derive_key, SALT_LEN};

/// Shortest accepted PIN.
pub const PIN_MIN_LEN: usize = 4;

/// Longest accepted PIN.
pub const PIN_MAX_LEN: usize = 8;

// ---------------------------------------------------------------------------
// PIN
// ---------------------------------------------------------------------------

/// Checks that `pin` is 4 to 8 ASCII digits.
///
/// # Errors
///
/// Returns [`BpesaError::InvalidPinFormat`] otherwise. The PIN itself is
/// never echoed in the error.
pub fn validate_pin(pin: &str) -> Result<()> {
    let len_ok = (PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len());
    if len_ok && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(BpesaError::InvalidPinFormat)
    }
}

// ---------------------------------------------------------------------------
// SecretField
// ---------------------------------------------------------------------------

/// Which record field a secret is sealed into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecretField {
    Mnemonic,
    PrivateKey,
}

impl SecretField {
    /// Associated data binding a ciphertext to its field and format version.
    pub fn associated_data(self) -> &'static [u8] {
        match self {
            Self::Mnemonic => b"bpesa-wallet-v1:mnemonic",
            Self::PrivateKey => b"bpesa-wallet-v1:private-key",
        }
    }
}

// ---------------------------------------------------------------------------
// SealedSecret
// ---------------------------------------------------------------------------

/// Ciphertext plus the salt and IV needed to open it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedSecret {
    /// AES-256-GCM ciphertext with the tag appended.
    pub ciphertext: Vec<u8>,
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// AES-GCM IV.
    pub iv: Iv,
}

impl SealedSecret {
    /// Rebuilds a sealed secret from the record's hex strings.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::DecryptionFailed`] for malformed hex or wrong
    /// salt/IV lengths, so a corrupted record looks like a wrong PIN.
    pub fn from_hex(ciphertext: &str, salt: &str, iv: &str) -> Result<Self> {
        let ciphertext = hex::decode(ciphertext).map_err(|_| BpesaError::DecryptionFailed)?;
        let salt: [u8; SALT_LEN] = hex::decode(salt)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(BpesaError::DecryptionFailed)?;
        let iv: [u8; Iv::LEN] = hex::decode(iv)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(BpesaError::DecryptionFailed)?;

        Ok(Self {
            ciphertext,
            salt,
            iv: Iv::from_bytes(iv),
        })
    }

    /// Hex encoding of the ciphertext.
    pub fn ciphertext_hex(&self) -> String {
        hex::encode(&self.ciphertext)
    }

    /// Hex encoding of the salt (64 chars).
    pub fn salt_hex(&self) -> String {
        hex::encode(self.salt)
    }

    /// Hex encoding of the IV (32 chars).
    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Seal / Open
// ---------------------------------------------------------------------------

/// Seals `plaintext` under `pin` with a fresh salt and IV.
///
/// Sealing the same plaintext twice yields different ciphertexts.
///
/// # Errors
///
/// - [`BpesaError::InvalidPinFormat`] before any cipher work.
/// - [`BpesaError::EntropySourceUnavailable`] if salt or IV cannot be drawn.
/// - [`BpesaError::ConfigError`] for an iteration count below the minimum.
pub fn encrypt_secret(
    plaintext: &[u8],
    pin: &str,
    field: SecretField,
    iterations: u32,
) -> Result<SealedSecret> {
    validate_pin(pin)?;

    let salt = generate_salt()?;
    let iv = generate_iv()?;
    let key = pbkdf2_derive_key(pin.as_bytes(), &salt, iterations)?;
    let ciphertext = encrypt_aes_gcm(key.as_bytes(), &iv, plaintext, field.associated_data())?;

    Ok(SealedSecret {
        ciphertext,
        salt,
        iv,
    })
}

/// Opens a sealed secret with `pin`.
///
/// # Errors
///
/// - [`BpesaError::InvalidPinFormat`] before any cipher work.
/// - [`BpesaError::DecryptionFailed`] for every other failure: wrong PIN,
///   tampered ciphertext, wrong field, or an iteration count the record
///   should never carry.
pub fn decrypt_secret(
    sealed: &SealedSecret,
    pin: &str,
    field: SecretField,
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>> {
    validate_pin(pin)?;

    let key = pbkdf2_derive_key(pin.as_bytes(), &sealed.salt, iterations)
        .map_err(|_| BpesaError::DecryptionFailed)?;
    let plaintext = decrypt_aes_gcm(
        key.as_bytes(),
        &sealed.iv,
        &sealed.ciphertext,
        field.associated_data(),
    )?;

    Ok(Zeroizing::new(plaintext))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
