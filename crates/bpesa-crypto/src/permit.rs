//! EIP-712 permit construction, signing and signer recovery.
//!
//! A permit authorizes `spender` to move `value` of the token from
//! `owner`, once, before `deadline`. The typed-data domain binds it to
//! the token contract and chain, so a signature cannot be replayed on a
//! different contract or network. The token consumes `nonce` on use,
//! so a signed permit is single-use.
//!
//! Signing is RFC 6979 deterministic: the same intent, domain and key
//! always produce the same 65-byte signature.

use alloy_primitives::{b256, Address, Signature, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use bpesa_types::config::NetworkConfig;
use bpesa_types::{BpesaError, Result};

use crate::hd_derive::signing_key_from_bytes;

sol! {
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// Canonical type string of the permit struct.
pub const PERMIT_TYPE: &str =
    "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";

/// `keccak256(PERMIT_TYPE)`.
pub const PERMIT_TYPEHASH: B256 =
    b256!("6e71edae12b1b97f4d1f60370fef10105fa2faae0126114a169c64845d6126c9");

/// Byte length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

// ---------------------------------------------------------------------------
// PermitDomain
// ---------------------------------------------------------------------------

/// EIP-712 domain of the token contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PermitDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl PermitDomain {
    /// Builds the domain of the network's value token.
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self {
            name: network.token_name.clone(),
            version: network.token_version.clone(),
            chain_id: network.chain_id,
            verifying_contract: network.token_contract,
        }
    }

    fn to_eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(self.name.clone().into()),
            Some(self.version.clone().into()),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    /// Domain separator hash.
    pub fn separator(&self) -> B256 {
        self.to_eip712().separator()
    }
}

// ---------------------------------------------------------------------------
// PermitIntent
// ---------------------------------------------------------------------------

/// Fields of one permit. Built fresh per transfer and never reused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PermitIntent {
    pub owner: Address,
    pub spender: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// Owner's on-chain permit nonce at signing time.
    pub nonce: U256,
    /// Unix seconds after which the permit is void.
    pub deadline: u64,
}

impl PermitIntent {
    fn to_sol(&self) -> Permit {
        Permit {
            owner: self.owner,
            spender: self.spender,
            value: self.value,
            nonce: self.nonce,
            deadline: U256::from(self.deadline),
        }
    }

    /// EIP-712 signing hash of this intent under `domain`.
    pub fn digest(&self, domain: &PermitDomain) -> B256 {
        self.to_sol().eip712_signing_hash(&domain.to_eip712())
    }
}

/// Fails with [`BpesaError::PermitExpired`] unless `deadline` is after `now`.
pub fn check_deadline(deadline: u64, now: u64) -> Result<()> {
    if deadline <= now {
        return Err(BpesaError::PermitExpired { deadline, now });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Digest and signature of a signed permit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PermitSignature {
    /// EIP-712 signing hash.
    pub digest: B256,
    /// `r || s || v` with `v` in {27, 28}.
    pub bytes: [u8; SIGNATURE_LEN],
}

impl PermitSignature {
    /// `0x`-prefixed hex of the 65 signature bytes.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Recovers the address that produced this signature.
    pub fn recover_signer(&self) -> Result<Address> {
        recover_signer(&self.digest, &self.bytes)
    }
}

/// Signs `intent` under `domain` with a raw secp256k1 scalar.
///
/// The deadline is checked against `now` before any key material is
/// parsed.
///
/// # Errors
///
/// - [`BpesaError::PermitExpired`] if `intent.deadline <= now`.
/// - [`BpesaError::SigningFailed`] if the key is invalid, the key does
///   not belong to `intent.owner`, or the signature primitive fails.
pub fn sign_permit(
    intent: &PermitIntent,
    domain: &PermitDomain,
    private_key: &[u8; 32],
    now: u64,
) -> Result<PermitSignature> {
    check_deadline(intent.deadline, now)?;

    let signer = PrivateKeySigner::from_signing_key(signing_key_from_bytes(private_key)?);
    if signer.address() != intent.owner {
        return Err(BpesaError::SigningFailed {
            reason: "signing key does not belong to the permit owner".into(),
        });
    }

    let digest = intent.digest(domain);
    let signature = signer
        .sign_hash_sync(&digest)
        .map_err(|e| BpesaError::SigningFailed {
            reason: e.to_string(),
        })?;

    Ok(PermitSignature {
        digest,
        bytes: signature.as_bytes(),
    })
}

/// Recovers the signer of a 65-byte signature over `digest`.
///
/// # Errors
///
/// Returns [`BpesaError::SigningFailed`] if the bytes are not a valid
/// secp256k1 signature.
pub fn recover_signer(digest: &B256, signature: &[u8; SIGNATURE_LEN]) -> Result<Address> {
    let signature = Signature::from_raw(signature).map_err(|e| BpesaError::SigningFailed {
        reason: format!("malformed signature: {e}"),
    })?;

    signature
        .recover_address_from_prehash(digest)
        .map_err(|e| BpesaError::SigningFailed {
            reason: format!("signature recovery failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
