//! BIP-39 recovery phrase generation, validation and seed derivation.
//!
//! New wallets always get a 12-word phrase (128 bits of entropy). Restore
//! accepts any standard English phrase length so that phrases exported
//! from other wallets can be imported.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0039.mediawiki>

use std::fmt;

use bip39::Language;
use bpesa_types::{BpesaError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Entropy drawn for a new phrase (128 bits).
pub const ENTROPY_BYTES: usize = 16;

/// Word count of a newly generated phrase.
pub const GENERATED_WORD_COUNT: usize = 12;

/// Phrase lengths accepted on restore.
const ACCEPTED_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

// ---------------------------------------------------------------------------
// Mnemonic
// ---------------------------------------------------------------------------

/// A checksum-validated BIP-39 English phrase.
///
/// The phrase is stored normalized (lowercase, single spaces) and zeroized
/// on drop. `Debug` never prints the words.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct Mnemonic {
    phrase: String,
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mnemonic")
            .field("word_count", &self.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

impl Mnemonic {
    /// Parses and validates a user-supplied phrase.
    ///
    /// Surrounding whitespace, repeated spaces and upper-case letters are
    /// tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::InvalidMnemonic`] if the word count is not a
    /// BIP-39 length, a word is not in the English list, or the checksum
    /// does not match.
    pub fn parse(phrase: &str) -> Result<Self> {
        let mut normalized = Zeroizing::new(String::with_capacity(phrase.len() * 2));
        for word in phrase.split_whitespace() {
            if !normalized.is_empty() {
                normalized.push(' ');
            }
            normalized.extend(word.chars().flat_map(char::to_lowercase));
        }

        let word_count = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if !ACCEPTED_WORD_COUNTS.contains(&word_count) {
            return Err(BpesaError::InvalidMnemonic {
                reason: format!("expected 12, 15, 18, 21 or 24 words, got {word_count}"),
            });
        }

        let mut parsed = bip39::Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| BpesaError::InvalidMnemonic {
                reason: e.to_string(),
            })?;
        parsed.zeroize();

        Ok(Self {
            phrase: (*normalized).clone(),
        })
    }

    /// Returns the normalized phrase.
    ///
    /// The caller is responsible for not logging or persisting the result
    /// in plaintext.
    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    /// Returns the number of words.
    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').filter(|w| !w.is_empty()).count()
    }

    /// Derives the 64-byte BIP-39 seed with an empty passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::InternalInvariantViolation`] if the stored
    /// phrase no longer parses, which construction rules out.
    pub fn to_seed(&self) -> Result<Zeroizing<[u8; 64]>> {
        let mut parsed = bip39::Mnemonic::parse_in_normalized(Language::English, &self.phrase)
            .map_err(|e| BpesaError::InternalInvariantViolation {
                reason: format!("validated mnemonic failed to re-parse: {e}"),
            })?;
        let seed = Zeroizing::new(parsed.to_seed_normalized(""));
        parsed.zeroize();
        Ok(seed)
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a new 12-word phrase from 128 bits of OS randomness.
///
/// The output is re-parsed and compared against the entropy it was built
/// from before it is returned.
///
/// # Errors
///
/// - [`BpesaError::EntropySourceUnavailable`] if the OS RNG fails.
/// - [`BpesaError::InternalInvariantViolation`] if the self-check fails.
///   The generator never retries with different entropy.
pub fn generate_mnemonic() -> Result<Mnemonic> {
    let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
    OsRng
        .try_fill_bytes(&mut entropy[..])
        .map_err(|e| BpesaError::EntropySourceUnavailable {
            reason: e.to_string(),
        })?;

    entropy_to_mnemonic(&entropy)
}

/// Encodes 128 bits of entropy as a 12-word phrase and self-checks it.
///
/// Deterministic core of [`generate_mnemonic`], exposed for test vectors.
pub fn entropy_to_mnemonic(entropy: &[u8; ENTROPY_BYTES]) -> Result<Mnemonic> {
    let mut encoded = bip39::Mnemonic::from_entropy_in(Language::English, entropy).map_err(|e| {
        BpesaError::InternalInvariantViolation {
            reason: format!("BIP-39 encoding of 128-bit entropy failed: {e}"),
        }
    })?;
    let phrase = Zeroizing::new(encoded.to_string());
    encoded.zeroize();

    let mnemonic = Mnemonic::parse(&phrase).map_err(|_| BpesaError::InternalInvariantViolation {
        reason: "generated mnemonic failed validation".into(),
    })?;

    self_check(&mnemonic, entropy)?;
    Ok(mnemonic)
}

/// Verifies word count and entropy round-trip of a freshly generated phrase.
fn self_check(mnemonic: &Mnemonic, entropy: &[u8; ENTROPY_BYTES]) -> Result<()> {
    if mnemonic.word_count() != GENERATED_WORD_COUNT {
        return Err(BpesaError::InternalInvariantViolation {
            reason: format!(
                "generated mnemonic has {} words, expected {GENERATED_WORD_COUNT}",
                mnemonic.word_count()
            ),
        });
    }

    let mut reparsed = bip39::Mnemonic::parse_in_normalized(Language::English, mnemonic.as_str())
        .map_err(|_| BpesaError::InternalInvariantViolation {
            reason: "generated mnemonic failed to re-parse".into(),
        })?;
    let (mut recovered, len) = reparsed.to_entropy_array();
    reparsed.zeroize();

    let matches = len == ENTROPY_BYTES && recovered[..len] == entropy[..];
    recovered.zeroize();

    if !matches {
        return Err(BpesaError::InternalInvariantViolation {
            reason: "generated mnemonic does not round-trip its entropy".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
