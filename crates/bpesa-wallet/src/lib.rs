//! PIN-guarded wallet lifecycle for the bpesa mobile wallet.
//!
//! Handles the full lifecycle of the single wallet on a device:
//!
//! - **Create** a fresh 12-word wallet, or **restore** one from its phrase
//! - **Seal** mnemonic and private key independently under the PIN
//! - **Unlock / Lock**, with an optional idle timeout
//! - **Authorize** transfers by signing EIP-712 permits
//! - **Change PIN** and **reset**
//!
//! [`wallet::WalletCore`] is the entry point. Storage and the ledger are
//! reached through the [`persistence::PersistenceGateway`] and
//! [`ledger::LedgerClient`] traits.

pub mod authorize;
pub mod ledger;
pub mod lifecycle;
pub mod persistence;
pub mod record;
pub mod submission;
pub mod wallet;

pub use authorize::{SignedPermit, TransferIntent};
pub use wallet::{CreatedWallet, WalletCore, WalletMetadata};
