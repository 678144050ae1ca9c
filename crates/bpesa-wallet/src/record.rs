//! Encrypted wallet record: the one value the core persists.
//!
//! # Format (v1)
//!
//! ```json
//! {
//!   "version": 1,
//!   "kdfIterations": 600000,
//!   "address": "0x<40 hex, EIP-55>",
//!   "publicKey": "0x<66 hex, compressed SEC1>",
//!   "encryptedMnemonic": "<hex>",
//!   "saltMnemonic": "<64 hex>",
//!   "ivMnemonic": "<32 hex>",
//!   "encryptedPrivateKey": "<hex>",
//!   "saltPrivateKey": "<64 hex>",
//!   "ivPrivateKey": "<32 hex>"
//! }
//! ```
//!
//! The mnemonic and the raw 32-byte private key are sealed under
//! independent salts and IVs. No plaintext secret material is written.

use bpesa_crypto::hd_derive::{account_from_private_key, derive_keys, WalletKeys};
use bpesa_crypto::mnemonic::Mnemonic;
use bpesa_crypto::vault::{decrypt_secret, encrypt_secret, validate_pin, SealedSecret, SecretField};
use bpesa_types::config::{MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS};
use bpesa_types::{parse_account_id, AccountId, BpesaError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Persistence key of the record.
pub const WALLET_DATA_KEY: &str = "wallet_data";

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// EncryptedWalletRecord
// ---------------------------------------------------------------------------

/// Persisted, PIN-sealed form of a wallet.
///
/// # Invariants
///
/// - Every salt is 32 bytes (64 hex chars), every IV 16 bytes (32 hex chars).
/// - `address` is the account derived from the sealed mnemonic, and the
///   sealed private key belongs to that account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedWalletRecord {
    pub version: u32,
    pub kdf_iterations: u32,
    pub address: String,
    pub public_key: String,
    pub encrypted_mnemonic: String,
    pub salt_mnemonic: String,
    pub iv_mnemonic: String,
    pub encrypted_private_key: String,
    pub salt_private_key: String,
    pub iv_private_key: String,
}

impl EncryptedWalletRecord {
    /// Seals `keys` under `pin` with fresh salts and IVs per field.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`] before any cipher work.
    /// - [`BpesaError::EntropySourceUnavailable`] if salts or IVs cannot be drawn.
    pub fn seal(keys: &WalletKeys, pin: &str, kdf_iterations: u32) -> Result<Self> {
        validate_pin(pin)?;

        let mnemonic = encrypt_secret(
            keys.mnemonic.as_str().as_bytes(),
            pin,
            SecretField::Mnemonic,
            kdf_iterations,
        )?;
        let private_key = encrypt_secret(
            &keys.private_key[..],
            pin,
            SecretField::PrivateKey,
            kdf_iterations,
        )?;

        Ok(Self {
            version: RECORD_VERSION,
            kdf_iterations,
            address: keys.address.to_checksum(None),
            public_key: keys.public_key_hex(),
            encrypted_mnemonic: mnemonic.ciphertext_hex(),
            salt_mnemonic: mnemonic.salt_hex(),
            iv_mnemonic: mnemonic.iv_hex(),
            encrypted_private_key: private_key.ciphertext_hex(),
            salt_private_key: private_key.salt_hex(),
            iv_private_key: private_key.iv_hex(),
        })
    }

    /// Checks the structural invariants without touching any cipher.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::DecryptionFailed`] on any violation, so a
    /// damaged record cannot be told apart from a wrong PIN.
    pub fn audit(&self) -> Result<()> {
        let violation = if self.version != RECORD_VERSION {
            Some("unknown version")
        } else if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.kdf_iterations) {
            Some("iteration count out of range")
        } else if !is_hex_of_len(&self.salt_mnemonic, 64) || !is_hex_of_len(&self.salt_private_key, 64) {
            Some("salt length")
        } else if !is_hex_of_len(&self.iv_mnemonic, 32) || !is_hex_of_len(&self.iv_private_key, 32) {
            Some("iv length")
        } else if !is_account_string(&self.address) {
            Some("address")
        } else if self.encrypted_mnemonic.is_empty() || self.encrypted_private_key.is_empty() {
            Some("empty ciphertext")
        } else {
            None
        };

        match violation {
            Some(check) => {
                tracing::warn!(check, "wallet record failed structural audit");
                Err(BpesaError::DecryptionFailed)
            }
            None => Ok(()),
        }
    }

    /// Serializes the record as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BpesaError::InternalInvariantViolation {
            reason: format!("wallet record serialization failed: {e}"),
        })
    }

    /// Parses and audits a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::DecryptionFailed`] for anything that is not a
    /// well-formed v1 record, including records without a `version`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes).map_err(|e| {
            tracing::warn!(error = %e, "stored wallet record is not valid JSON");
            BpesaError::DecryptionFailed
        })?;
        record.audit()?;
        Ok(record)
    }

    /// Parsed account address.
    pub fn account(&self) -> Result<AccountId> {
        parse_account_id(&self.address).map_err(|_| BpesaError::DecryptionFailed)
    }

    fn sealed_mnemonic(&self) -> Result<SealedSecret> {
        SealedSecret::from_hex(&self.encrypted_mnemonic, &self.salt_mnemonic, &self.iv_mnemonic)
    }

    fn sealed_private_key(&self) -> Result<SealedSecret> {
        SealedSecret::from_hex(
            &self.encrypted_private_key,
            &self.salt_private_key,
            &self.iv_private_key,
        )
    }

    /// Opens both fields and re-derives the full key set.
    ///
    /// Both fields are always decrypted, so the failing field is not
    /// observable. The keys derived from the mnemonic must match the
    /// stored address and the sealed private key.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`] before any cipher work.
    /// - [`BpesaError::DecryptionFailed`] for every other credential or
    ///   integrity failure.
    pub fn open_keys(&self, pin: &str) -> Result<WalletKeys> {
        validate_pin(pin)?;

        let phrase = self
            .sealed_mnemonic()
            .and_then(|s| decrypt_secret(&s, pin, SecretField::Mnemonic, self.kdf_iterations));
        let private_key = self
            .sealed_private_key()
            .and_then(|s| decrypt_secret(&s, pin, SecretField::PrivateKey, self.kdf_iterations));

        let (phrase, private_key) = match (phrase, private_key) {
            (Ok(phrase), Ok(private_key)) => (phrase, private_key),
            _ => return Err(BpesaError::DecryptionFailed),
        };

        let phrase = std::str::from_utf8(&phrase).map_err(|_| BpesaError::DecryptionFailed)?;
        let mnemonic = Mnemonic::parse(phrase).map_err(|_| BpesaError::DecryptionFailed)?;
        let keys = derive_keys(&mnemonic).map_err(|_| BpesaError::DecryptionFailed)?;

        if keys.address != self.account()? || keys.private_key.as_slice() != private_key.as_slice() {
            tracing::warn!("sealed wallet fields do not derive the stored account");
            return Err(BpesaError::DecryptionFailed);
        }

        Ok(keys)
    }

    /// Opens only the private-key field for a single signing operation.
    ///
    /// # Errors
    ///
    /// Same as [`open_keys`](Self::open_keys).
    pub fn open_private_key(&self, pin: &str) -> Result<Zeroizing<[u8; 32]>> {
        validate_pin(pin)?;

        let sealed = self.sealed_private_key()?;
        let plaintext = decrypt_secret(&sealed, pin, SecretField::PrivateKey, self.kdf_iterations)?;
        if plaintext.len() != 32 {
            return Err(BpesaError::DecryptionFailed);
        }

        let mut private_key = Zeroizing::new([0u8; 32]);
        private_key.copy_from_slice(&plaintext);

        let (address, _) =
            account_from_private_key(&private_key).map_err(|_| BpesaError::DecryptionFailed)?;
        if address != self.account()? {
            return Err(BpesaError::DecryptionFailed);
        }

        Ok(private_key)
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_account_string(s: &str) -> bool {
    s.strip_prefix("0x").is_some_and(|hex| is_hex_of_len(hex, 40))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
