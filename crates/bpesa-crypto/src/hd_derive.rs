//! BIP-32 secp256k1 derivation of the wallet account.
//!
//! Exactly one account is derived per phrase, at a fixed path:
//!
//! ```text
//! m/44'/60'/0'/0/0
//! ```
//!
//! The path is part of the record format. Changing it would make every
//! existing phrase restore to a different address, so a new path needs a
//! new constant and a new record version.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use bip32::{DerivationPath, XPrv};
use bpesa_types::{BpesaError, Result};
use k256::ecdsa::SigningKey;
use zeroize::Zeroizing;

use crate::mnemonic::Mnemonic;

/// Derivation path of the single wallet account (record format v1).
pub const DERIVATION_PATH_V1: &str = "m/44'/60'/0'/0/0";

/// Length of a compressed SEC1 secp256k1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

// ---------------------------------------------------------------------------
// WalletKeys
// ---------------------------------------------------------------------------

/// Key material of an unlocked wallet.
///
/// Lives only inside an unlock window. The private key and the phrase are
/// zeroized on drop; `Debug` prints the address only.
pub struct WalletKeys {
    /// EIP-55 checksummed account address.
    pub address: Address,
    /// Raw 32-byte secp256k1 secret scalar.
    pub private_key: Zeroizing<[u8; 32]>,
    /// Compressed SEC1 public key.
    pub public_key: [u8; PUBLIC_KEY_LEN],
    /// Phrase the keys were derived from.
    pub mnemonic: Mnemonic,
}

impl fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeys")
            .field("address", &self.address)
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

impl WalletKeys {
    /// Returns the `0x`-prefixed hex encoding of the public key.
    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key))
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derives the wallet account from a validated phrase.
///
/// Deterministic: the same phrase always yields the same address and key
/// pair, which is what makes restore-from-phrase work.
///
/// # Errors
///
/// Returns [`BpesaError::SigningFailed`] if BIP-32 derivation fails
/// (a derived scalar out of range, with negligible probability).
pub fn derive_keys(mnemonic: &Mnemonic) -> Result<WalletKeys> {
    let seed = mnemonic.to_seed()?;
    let private_key = derive_private_key(&seed[..], DERIVATION_PATH_V1)?;
    let (address, public_key) = account_from_private_key(&private_key)?;

    Ok(WalletKeys {
        address,
        private_key,
        public_key,
        mnemonic: mnemonic.clone(),
    })
}

/// Derives the secp256k1 scalar at `path` from a BIP-39 seed.
pub fn derive_private_key(seed: &[u8], path: &str) -> Result<Zeroizing<[u8; 32]>> {
    let path = DerivationPath::from_str(path).map_err(|e| BpesaError::SigningFailed {
        reason: format!("invalid derivation path: {e}"),
    })?;

    let xprv = XPrv::derive_from_path(seed, &path).map_err(|e| BpesaError::SigningFailed {
        reason: format!("BIP-32 derivation failed: {e}"),
    })?;

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(xprv.private_key().to_bytes().as_slice());
    Ok(key)
}

/// Computes the address and compressed public key of a raw scalar.
pub fn account_from_private_key(private_key: &[u8; 32]) -> Result<(Address, [u8; PUBLIC_KEY_LEN])> {
    let signing_key = signing_key_from_bytes(private_key)?;

    let point = signing_key.verifying_key().to_encoded_point(true);
    let public_key: [u8; PUBLIC_KEY_LEN] =
        point
            .as_bytes()
            .try_into()
            .map_err(|_| BpesaError::InternalInvariantViolation {
                reason: "compressed public key is not 33 bytes".into(),
            })?;

    let address = PrivateKeySigner::from_signing_key(signing_key).address();
    Ok((address, public_key))
}

/// Parses a raw 32-byte scalar into a signing key.
pub fn signing_key_from_bytes(private_key: &[u8; 32]) -> Result<SigningKey> {
    SigningKey::from_slice(private_key).map_err(|e| BpesaError::SigningFailed {
        reason: format!("invalid secp256k1 private key: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT_PHRASE: &str = "test test test test test test test test test test test junk";

    #[test]
    fn hardhat_account_zero() -> std::result::Result<(), BpesaError> {
        let m = Mnemonic::parse(HARDHAT_PHRASE)?;
        let keys = derive_keys(&m)?;
        assert_eq!(
            keys.address.to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(
            hex::encode(*keys.private_key),
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        Ok(())
    }

    #[test]
    fn derivation_is_deterministic() -> std::result::Result<(), BpesaError> {
        let m = Mnemonic::parse(HARDHAT_PHRASE)?;
        let a = derive_keys(&m)?;
        let b = derive_keys(&m)?;
        assert_eq!(a.address, b.address);
        assert_eq!(*a.private_key, *b.private_key);
        assert_eq!(a.public_key, b.public_key);
        Ok(())
    }

    #[test]
    fn public_key_is_compressed() -> std::result::Result<(), BpesaError> {
        let keys = derive_keys(&Mnemonic::parse(HARDHAT_PHRASE)?)?;
        assert!(keys.public_key[0] == 0x02 || keys.public_key[0] == 0x03);
        assert_eq!(keys.public_key_hex().len(), 2 + 66);
        Ok(())
    }

    #[test]
    fn address_matches_scalar() -> std::result::Result<(), BpesaError> {
        let keys = derive_keys(&Mnemonic::parse(HARDHAT_PHRASE)?)?;
        let (address, public_key) = account_from_private_key(&keys.private_key)?;
        assert_eq!(address, keys.address);
        assert_eq!(public_key, keys.public_key);
        Ok(())
    }

    #[test]
    fn malformed_path_rejected() {
        let result = derive_private_key(&[7u8; 64], "m/44'/60'/x");
        assert!(matches!(result, Err(BpesaError::SigningFailed { .. })));
    }

    #[test]
    fn zero_scalar_rejected() {
        assert!(signing_key_from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn debug_does_not_print_private_key() -> std::result::Result<(), BpesaError> {
        let keys = derive_keys(&Mnemonic::parse(HARDHAT_PHRASE)?)?;
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains("ac0974bec39a17e3"));
        assert!(!rendered.contains("junk"));
        Ok(())
    }
}
