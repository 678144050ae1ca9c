//! The wallet core: one explicit context object per device wallet.
//!
//! [`WalletCore`] is created by the app's entry point and shared by
//! handle. It owns the lifecycle state and reaches storage and the
//! ledger only through its collaborators.
//!
//! # Secrets
//!
//! The unlock window holds no key material. Each operation decrypts what
//! it needs inside a single `spawn_blocking` closure and drops it there.
//! Private-key bytes never cross an `.await`, so cancelling an operation
//! cannot leave a decrypted key resident.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bpesa_crypto::hd_derive::derive_keys;
use bpesa_crypto::mnemonic::{generate_mnemonic, Mnemonic};
use bpesa_crypto::permit::{check_deadline, sign_permit, PermitDomain, PermitIntent};
use bpesa_crypto::vault::validate_pin;
use bpesa_types::config::CoreConfig;
use bpesa_types::{Address, BpesaError, Result, WalletLifecycleState, U256};
use zeroize::Zeroizing;

use crate::authorize::{unix_now, SignedPermit, TransferIntent};
use crate::ledger::LedgerClient;
use crate::lifecycle::{lock_ignoring_poison, OperationGuard, StateMachine};
use crate::persistence::PersistenceGateway;
use crate::record::{EncryptedWalletRecord, WALLET_DATA_KEY};

// ---------------------------------------------------------------------------
// WalletMetadata / CreatedWallet
// ---------------------------------------------------------------------------

/// Onboarding details supplied with a new wallet.
///
/// Passed back to the caller for backend registration; the core does not
/// persist it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WalletMetadata {
    pub country: String,
    pub user_id: String,
    pub notification_token: String,
}

impl fmt::Debug for WalletMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletMetadata")
            .field("country", &self.country)
            .field("user_id", &"[REDACTED]")
            .field("notification_token", &"[REDACTED]")
            .finish()
    }
}

/// Result of [`WalletCore::create_wallet`].
///
/// The mnemonic is shown to the user once for backup and then dropped.
#[derive(Debug)]
pub struct CreatedWallet {
    pub mnemonic: Mnemonic,
    pub address: Address,
    pub metadata: WalletMetadata,
}

// ---------------------------------------------------------------------------
// WalletCore
// ---------------------------------------------------------------------------

/// Key custody and permit authorization for the device's single wallet.
pub struct WalletCore {
    config: CoreConfig,
    store: Arc<dyn PersistenceGateway>,
    ledger: Arc<dyn LedgerClient>,
    machine: StateMachine,
    address: Mutex<Option<Address>>,
}

impl fmt::Debug for WalletCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCore")
            .field("network", &self.config.network.name)
            .field("state", &self.machine.state())
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Runs CPU-bound cipher work off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BpesaError::InternalInvariantViolation {
            reason: format!("blocking wallet task failed: {e}"),
        })?
}

impl WalletCore {
    /// Opens the core over `store`, reading the record once.
    ///
    /// A present record starts the core `Locked`, an absent one
    /// `Uninitialized`. A damaged record still counts as present; it
    /// fails at unlock like a wrong PIN.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::ConfigError`] if `config` does not validate.
    /// - [`BpesaError::PersistenceUnavailable`] if the store cannot be read.
    pub async fn open(
        config: CoreConfig,
        store: Arc<dyn PersistenceGateway>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Result<Self> {
        config.validate()?;

        let (state, address) = match store.get(WALLET_DATA_KEY).await? {
            Some(bytes) => {
                let address = EncryptedWalletRecord::from_bytes(&bytes)
                    .and_then(|record| record.account())
                    .ok();
                (WalletLifecycleState::Locked, address)
            }
            None => (WalletLifecycleState::Uninitialized, None),
        };

        tracing::info!(
            %state,
            network = %config.network.name,
            chain_id = config.network.chain_id,
            "wallet core opened"
        );

        Ok(Self {
            config,
            store,
            ledger,
            machine: StateMachine::new(state),
            address: Mutex::new(address),
        })
    }

    // -- Accessors --------------------------------------------------------

    pub fn state(&self) -> WalletLifecycleState {
        self.machine.state()
    }

    /// Account address, once a wallet exists on the device.
    pub fn address(&self) -> Option<Address> {
        *lock_ignoring_poison(&self.address)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Returns `true` while an exclusive operation is running.
    pub fn is_busy(&self) -> bool {
        self.machine.is_busy()
    }

    fn set_address(&self, address: Option<Address>) {
        *lock_ignoring_poison(&self.address) = address;
    }

    // -- Create / restore -------------------------------------------------

    /// Generates a new 12-word wallet, seals it under `pin` and unlocks it.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`]
    /// - [`BpesaError::AlreadyInProgress`]
    /// - [`BpesaError::WalletAlreadyExists`] unless `Uninitialized`
    /// - [`BpesaError::EntropySourceUnavailable`]
    /// - [`BpesaError::PersistenceUnavailable`]
    pub async fn create_wallet(&self, pin: &str, metadata: WalletMetadata) -> Result<CreatedWallet> {
        validate_pin(pin)?;
        let guard = self.machine.try_begin()?;
        self.require_uninitialized()?;

        let pin = Zeroizing::new(pin.to_string());
        let iterations = self.config.kdf_iterations;
        let (mnemonic, address, record) = run_blocking(move || {
            let mnemonic = generate_mnemonic()?;
            let keys = derive_keys(&mnemonic)?;
            let record = EncryptedWalletRecord::seal(&keys, &pin, iterations)?;
            Ok((mnemonic, keys.address, record))
        })
        .await?;

        self.persist(&record).await?;
        guard.transition(WalletLifecycleState::Unlocked);
        self.set_address(Some(address));

        tracing::info!(%address, country = %metadata.country, "wallet created");
        Ok(CreatedWallet {
            mnemonic,
            address,
            metadata,
        })
    }

    /// Restores a wallet from its recovery phrase; `false` on any failure.
    ///
    /// See [`try_restore`](Self::try_restore) for the failure kinds.
    pub async fn restore_wallet(&self, mnemonic: &str, pin: &str) -> bool {
        match self.try_restore(mnemonic, pin).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "wallet restore failed");
                false
            }
        }
    }

    /// Restores a wallet from its recovery phrase, seals it under `pin`
    /// and unlocks it. The same phrase always restores the same address.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`], [`BpesaError::InvalidMnemonic`]
    /// - [`BpesaError::AlreadyInProgress`]
    /// - [`BpesaError::WalletAlreadyExists`] unless `Uninitialized`
    /// - [`BpesaError::PersistenceUnavailable`]
    pub async fn try_restore(&self, mnemonic: &str, pin: &str) -> Result<Address> {
        validate_pin(pin)?;
        let mnemonic = Mnemonic::parse(mnemonic)?;
        let guard = self.machine.try_begin()?;
        self.require_uninitialized()?;

        let pin = Zeroizing::new(pin.to_string());
        let iterations = self.config.kdf_iterations;
        let (address, record) = run_blocking(move || {
            let keys = derive_keys(&mnemonic)?;
            let record = EncryptedWalletRecord::seal(&keys, &pin, iterations)?;
            Ok((keys.address, record))
        })
        .await?;

        self.persist(&record).await?;
        guard.transition(WalletLifecycleState::Unlocked);
        self.set_address(Some(address));

        tracing::info!(%address, "wallet restored");
        Ok(address)
    }

    // -- Unlock / lock ----------------------------------------------------

    /// Opens the unlock window; `false` on any failure.
    ///
    /// A failed unlock leaves the state where it was.
    pub async fn unlock_wallet(&self, pin: &str) -> bool {
        match self.try_unlock(pin).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "wallet unlock failed");
                false
            }
        }
    }

    /// Verifies `pin` against the stored record and opens the unlock window.
    ///
    /// When already unlocked the PIN is re-verified and the window
    /// refreshed.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`]
    /// - [`BpesaError::AlreadyInProgress`]
    /// - [`BpesaError::WalletNotInitialized`]
    /// - [`BpesaError::DecryptionFailed`] for a wrong PIN or damaged record
    /// - [`BpesaError::WalletLocked`] if `lock` won against this unlock
    pub async fn try_unlock(&self, pin: &str) -> Result<()> {
        validate_pin(pin)?;
        let guard = self.machine.try_begin()?;
        if self.machine.state() == WalletLifecycleState::Uninitialized {
            return Err(BpesaError::WalletNotInitialized);
        }

        let record = self.load_record().await?;
        self.unlock_record(&guard, record, pin).await.map(|_| ())
    }

    async fn unlock_record(
        &self,
        guard: &OperationGuard<'_>,
        record: EncryptedWalletRecord,
        pin: &str,
    ) -> Result<Address> {
        if self.machine.state() == WalletLifecycleState::Unlocked {
            let address = self.verify_pin(record, pin).await?;
            self.machine.touch();
            return Ok(address);
        }

        guard.begin_unlock()?;
        let verified = self.verify_pin(record, pin).await;
        let state = guard.finish_unlock(verified.is_ok());
        let address = verified?;

        if state != WalletLifecycleState::Unlocked {
            tracing::info!(%address, "unlock superseded by lock");
            return Err(BpesaError::WalletLocked);
        }

        self.set_address(Some(address));
        tracing::info!(%address, "wallet unlocked");
        Ok(address)
    }

    /// Decrypts both sealed fields and checks they derive the stored
    /// account. The keys are dropped inside the blocking task.
    async fn verify_pin(&self, record: EncryptedWalletRecord, pin: &str) -> Result<Address> {
        let pin = Zeroizing::new(pin.to_string());
        run_blocking(move || {
            let keys = record.open_keys(&pin)?;
            Ok(keys.address)
        })
        .await
    }

    /// Closes the unlock window. Idempotent and never blocked by an
    /// in-flight operation.
    pub fn lock(&self) {
        self.machine.lock();
    }

    /// Locks the wallet if the unlock window has been idle for at least
    /// `idle_lock_secs`. Returns `true` if it locked.
    pub fn lock_if_idle(&self) -> bool {
        let Some(limit) = self.config.idle_lock_secs.map(Duration::from_secs) else {
            return false;
        };

        match self.machine.idle_for() {
            Some(idle) if idle >= limit => {
                self.machine.lock();
                tracing::info!(idle_secs = idle.as_secs(), "wallet locked after inactivity");
                true
            }
            _ => false,
        }
    }

    // -- Authorize --------------------------------------------------------

    /// Transfer intent expiring after the configured `permit_ttl_secs`.
    pub fn transfer_intent(&self, recipient: Address, value: U256) -> Result<TransferIntent> {
        TransferIntent::expiring_in(
            recipient,
            value,
            Duration::from_secs(self.config.permit_ttl_secs),
        )
    }

    /// Signs a permit for `intent`, unlocking first if needed.
    ///
    /// # Order
    ///
    /// 1. Deadline check, before any I/O or cipher work.
    /// 2. In-flight guard, then PIN format.
    /// 3. Load the record; unlock with `pin` unless already unlocked.
    /// 4. Fetch the owner's nonce from the ledger (with timeout).
    /// 5. Re-check the deadline.
    /// 6. Decrypt the private key and sign in one blocking step.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::PermitExpired`] if the deadline is not in the future
    /// - [`BpesaError::AlreadyInProgress`], [`BpesaError::InvalidPinFormat`]
    /// - [`BpesaError::WalletNotInitialized`]
    /// - [`BpesaError::WalletLocked`] if the implicit unlock fails
    /// - [`BpesaError::DecryptionFailed`] for a wrong PIN while unlocked
    /// - [`BpesaError::LedgerUnavailable`] if the nonce cannot be fetched
    /// - [`BpesaError::SigningFailed`]
    pub async fn authorize(&self, intent: &TransferIntent, pin: &str) -> Result<SignedPermit> {
        check_deadline(intent.deadline, unix_now()?)?;

        let guard = self.machine.try_begin()?;
        validate_pin(pin)?;
        if self.machine.state() == WalletLifecycleState::Uninitialized {
            return Err(BpesaError::WalletNotInitialized);
        }

        let record = self.load_record().await?;
        if self.machine.state() != WalletLifecycleState::Unlocked {
            self.unlock_record(&guard, record.clone(), pin)
                .await
                .map_err(|e| match e {
                    BpesaError::DecryptionFailed => BpesaError::WalletLocked,
                    other => other,
                })?;
        }

        let owner = record.account()?;
        let nonce = self.fetch_nonce(owner).await?;

        let now = unix_now()?;
        check_deadline(intent.deadline, now)?;

        let permit = PermitIntent {
            owner,
            spender: self.config.network.payments_contract,
            value: intent.value,
            nonce,
            deadline: intent.deadline,
        };
        let domain = PermitDomain::from_network(&self.config.network);

        let pin = Zeroizing::new(pin.to_string());
        let to_sign = permit.clone();
        let signature = run_blocking(move || {
            let private_key = record.open_private_key(&pin)?;
            sign_permit(&to_sign, &domain, &private_key, now)
        })
        .await?;

        self.machine.touch();
        tracing::info!(
            %owner,
            %nonce,
            digest = %signature.digest,
            deadline = intent.deadline,
            "permit signed"
        );

        Ok(SignedPermit {
            recipient: intent.recipient,
            permit,
            signature,
        })
    }

    async fn fetch_nonce(&self, owner: Address) -> Result<U256> {
        let limit = Duration::from_millis(self.config.ledger_timeout_ms);
        match tokio::time::timeout(limit, self.ledger.nonce(owner)).await {
            Ok(Ok(nonce)) => {
                tracing::debug!(%owner, %nonce, "nonce observed for signing");
                Ok(nonce)
            }
            Ok(Err(e @ BpesaError::LedgerUnavailable { .. })) => Err(e),
            Ok(Err(e)) => Err(BpesaError::LedgerUnavailable {
                reason: e.to_string(),
            }),
            Err(_) => Err(BpesaError::LedgerUnavailable {
                reason: format!("nonce request timed out after {}ms", self.config.ledger_timeout_ms),
            }),
        }
    }

    /// Token balance of the wallet account as a whole-token decimal string.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::WalletNotInitialized`] if no wallet exists.
    /// - [`BpesaError::LedgerUnavailable`] on failure or timeout.
    pub async fn balance(&self) -> Result<String> {
        let owner = self.address().ok_or(BpesaError::WalletNotInitialized)?;
        let limit = Duration::from_millis(self.config.ledger_timeout_ms);
        tokio::time::timeout(limit, self.ledger.balance(owner))
            .await
            .map_err(|_| BpesaError::LedgerUnavailable {
                reason: format!("balance request timed out after {}ms", self.config.ledger_timeout_ms),
            })?
    }

    // -- PIN change / reset -----------------------------------------------

    /// Re-seals the wallet under a new PIN; `false` on any failure.
    pub async fn change_pin(&self, old_pin: &str, new_pin: &str) -> bool {
        match self.try_change_pin(old_pin, new_pin).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "PIN change failed");
                false
            }
        }
    }

    /// Verifies `old_pin`, then overwrites the record with one sealed
    /// under `new_pin` with fresh salts and IVs and the configured
    /// iteration count. The lifecycle state is unchanged.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::InvalidPinFormat`] for either PIN
    /// - [`BpesaError::AlreadyInProgress`]
    /// - [`BpesaError::WalletNotInitialized`]
    /// - [`BpesaError::DecryptionFailed`] if `old_pin` is wrong
    /// - [`BpesaError::PersistenceUnavailable`]
    pub async fn try_change_pin(&self, old_pin: &str, new_pin: &str) -> Result<()> {
        validate_pin(old_pin)?;
        validate_pin(new_pin)?;
        let _guard = self.machine.try_begin()?;
        if self.machine.state() == WalletLifecycleState::Uninitialized {
            return Err(BpesaError::WalletNotInitialized);
        }

        let record = self.load_record().await?;
        let old_pin = Zeroizing::new(old_pin.to_string());
        let new_pin = Zeroizing::new(new_pin.to_string());
        let iterations = self.config.kdf_iterations;
        let resealed = run_blocking(move || {
            let keys = record.open_keys(&old_pin)?;
            EncryptedWalletRecord::seal(&keys, &new_pin, iterations)
        })
        .await?;

        self.persist(&resealed).await?;
        if self.machine.state() == WalletLifecycleState::Unlocked {
            self.machine.touch();
        }

        tracing::info!(address = %resealed.address, "wallet PIN changed");
        Ok(())
    }

    /// Wipes the stored record and returns to `Uninitialized`.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::AlreadyInProgress`]
    /// - [`BpesaError::PersistenceUnavailable`] if the store cannot be
    ///   cleared. The wallet is locked in that case and the record may
    ///   still exist.
    pub async fn reset(&self) -> Result<()> {
        let guard = self.machine.try_begin()?;

        if let Err(e) = self.store.clear().await {
            self.machine.lock();
            tracing::error!(error = %e, "wallet reset could not clear storage");
            return Err(e);
        }

        guard.transition(WalletLifecycleState::Uninitialized);
        self.set_address(None);
        tracing::info!("wallet reset");
        Ok(())
    }

    // -- Storage ----------------------------------------------------------

    fn require_uninitialized(&self) -> Result<()> {
        match self.machine.state() {
            WalletLifecycleState::Uninitialized => Ok(()),
            _ => Err(BpesaError::WalletAlreadyExists),
        }
    }

    async fn load_record(&self) -> Result<EncryptedWalletRecord> {
        let bytes = self
            .store
            .get(WALLET_DATA_KEY)
            .await?
            .ok_or(BpesaError::WalletNotInitialized)?;
        EncryptedWalletRecord::from_bytes(&bytes)
    }

    async fn persist(&self, record: &EncryptedWalletRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.store.set(WALLET_DATA_KEY, &bytes).await?;
        tracing::debug!(address = %record.address, version = record.version, "wallet record persisted");
        Ok(())
    }
}
