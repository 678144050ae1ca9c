//! Cryptographic primitives for the bpesa wallet core.
//!
//! This crate is the **sole** location for raw cryptographic operations.
//! The wallet crate composes these functions but never touches a cipher,
//! KDF or curve directly.
//!
//! # Modules
//!
//! - [`mnemonic`]: BIP-39 recovery phrase generation and validation
//! - [`hd_derive`]: BIP-32 secp256k1 derivation of the single wallet account
//! - [`kdf`]: PBKDF2-HMAC-SHA256 PIN stretching
//! - [`aead`]: AES-256-GCM with 128-bit IVs
//! - [`vault`]: PIN validation and per-field sealing of secrets
//! - [`permit`]: EIP-712 permit construction, signing and recovery

pub mod aead;
pub mod hd_derive;
pub mod kdf;
pub mod mnemonic;
pub mod permit;
pub mod vault;
