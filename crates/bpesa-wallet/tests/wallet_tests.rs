//! Integration tests for the wallet core.
//!
//! The ledger is a scripted in-process mock and storage is an in-memory
//! store wrapped to count reads or inject delays and failures. Records
//! are sealed with the minimum iteration count to keep the suite fast.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bpesa_types::config::{CoreConfig, MIN_KDF_ITERATIONS};
use bpesa_types::{Address, BpesaError, Result, TxType, WalletLifecycleState, U256};
use bpesa_wallet::ledger::LedgerClient;
use bpesa_wallet::persistence::{MemoryStore, PersistenceGateway};
use bpesa_wallet::record::{EncryptedWalletRecord, WALLET_DATA_KEY};
use bpesa_wallet::{TransferIntent, WalletCore, WalletMetadata};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Hardhat's default development mnemonic.
const MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Account 0 of [`MNEMONIC`] at `m/44'/60'/0'/0/0`.
const MNEMONIC_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

const PIN: &str = "1234";
const OTHER_PIN: &str = "5678";
const WRONG_PIN: &str = "9999";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ledger with a fixed nonce that can be told to fail or stall.
struct MockLedger {
    nonce: U256,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl MockLedger {
    fn new(nonce: u64) -> Arc<Self> {
        Arc::new(Self {
            nonce: U256::from(nonce),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: None,
        })
    }

    fn stalled(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            nonce: U256::ZERO,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn nonce(&self, _owner: Address) -> Result<U256> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BpesaError::LedgerUnavailable {
                reason: "mock ledger offline".into(),
            });
        }
        Ok(self.nonce)
    }

    async fn balance(&self, _owner: Address) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("42.0".into())
    }
}

/// In-memory store that counts reads and can stall them or refuse to clear.
#[derive(Default)]
struct InstrumentedStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    stall_reads: AtomicBool,
    fail_clear: AtomicBool,
}

impl InstrumentedStore {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Stored record bytes, bypassing the stall switch.
    async fn stored(&self) -> Result<Option<Vec<u8>>> {
        self.inner.get(WALLET_DATA_KEY).await
    }
}

#[async_trait]
impl PersistenceGateway for InstrumentedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stall_reads.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(BpesaError::PersistenceUnavailable {
                reason: "keychain unavailable".into(),
            });
        }
        self.inner.clear().await
    }
}

fn test_config() -> CoreConfig {
    CoreConfig {
        kdf_iterations: MIN_KDF_ITERATIONS,
        ledger_timeout_ms: 200,
        idle_lock_secs: Some(60),
        ..CoreConfig::default()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn metadata() -> WalletMetadata {
    WalletMetadata {
        country: "KE".into(),
        user_id: "user-1".into(),
        notification_token: "token".into(),
    }
}

async fn open(
    store: &Arc<InstrumentedStore>,
    ledger: &Arc<MockLedger>,
) -> std::result::Result<WalletCore, BpesaError> {
    WalletCore::open(test_config(), store.clone(), ledger.clone()).await
}

async fn restored_core(
    store: &Arc<InstrumentedStore>,
    ledger: &Arc<MockLedger>,
) -> std::result::Result<WalletCore, BpesaError> {
    let core = open(store, ledger).await?;
    core.try_restore(MNEMONIC, PIN).await?;
    Ok(core)
}

// ---------------------------------------------------------------------------
// Create / restore / unlock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_unlock() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;
    assert_eq!(core.state(), WalletLifecycleState::Uninitialized);

    let created = core.create_wallet(PIN, metadata()).await?;
    assert_eq!(created.mnemonic.word_count(), 12);
    let address = created.address.to_checksum(None);
    assert_eq!(address.len(), 42);
    assert!(address.starts_with("0x"));
    assert_eq!(core.address(), Some(created.address));
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    assert_eq!(created.metadata.country, "KE");

    assert!(core.unlock_wallet(PIN).await);
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    Ok(())
}

#[tokio::test]
async fn wrong_pin_after_restart_stays_locked() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let created = open(&store, &ledger).await?.create_wallet(PIN, metadata()).await?;

    let restarted = open(&store, &ledger).await?;
    assert_eq!(restarted.state(), WalletLifecycleState::Locked);
    assert_eq!(restarted.address(), Some(created.address));

    assert!(!restarted.unlock_wallet(WRONG_PIN).await);
    assert_eq!(restarted.state(), WalletLifecycleState::Locked);
    assert!(matches!(
        restarted.try_unlock(WRONG_PIN).await,
        Err(BpesaError::DecryptionFailed)
    ));

    assert!(restarted.unlock_wallet(PIN).await);
    assert_eq!(restarted.state(), WalletLifecycleState::Unlocked);
    Ok(())
}

#[tokio::test]
async fn restore_reproduces_created_address() -> std::result::Result<(), BpesaError> {
    let ledger = MockLedger::new(0);
    let first = Arc::new(InstrumentedStore::default());
    let created = open(&first, &ledger).await?.create_wallet(PIN, metadata()).await?;

    let second = Arc::new(InstrumentedStore::default());
    let core = open(&second, &ledger).await?;
    assert!(core.restore_wallet(created.mnemonic.as_str(), OTHER_PIN).await);
    assert_eq!(core.address(), Some(created.address));

    core.lock();
    assert!(!core.unlock_wallet(PIN).await);
    assert!(core.unlock_wallet(OTHER_PIN).await);
    Ok(())
}

#[tokio::test]
async fn restore_known_phrase() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;

    let address = core.try_restore("  TEST test test test test test test test test test test   junk ", PIN).await?;
    assert_eq!(address.to_checksum(None), MNEMONIC_ADDRESS);

    let bytes = store.get(WALLET_DATA_KEY).await?.ok_or(BpesaError::WalletNotInitialized)?;
    let record = EncryptedWalletRecord::from_bytes(&bytes)?;
    assert_eq!(record.account()?, address);
    assert_eq!(record.kdf_iterations, MIN_KDF_ITERATIONS);
    Ok(())
}

#[tokio::test]
async fn restore_rejects_bad_input() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;

    assert!(matches!(
        core.try_restore("test test test", PIN).await,
        Err(BpesaError::InvalidMnemonic { .. })
    ));
    assert!(matches!(
        core.try_restore(MNEMONIC, "12a4").await,
        Err(BpesaError::InvalidPinFormat)
    ));
    assert!(!core.restore_wallet(MNEMONIC, "123").await);
    assert_eq!(core.state(), WalletLifecycleState::Uninitialized);
    assert_eq!(store.get(WALLET_DATA_KEY).await?, None);
    Ok(())
}

#[tokio::test]
async fn second_wallet_is_refused() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;

    assert!(matches!(
        core.create_wallet(PIN, metadata()).await,
        Err(BpesaError::WalletAlreadyExists)
    ));
    assert!(matches!(
        core.try_restore(MNEMONIC, PIN).await,
        Err(BpesaError::WalletAlreadyExists)
    ));

    core.lock();
    assert!(matches!(
        core.try_restore(MNEMONIC, PIN).await,
        Err(BpesaError::WalletAlreadyExists)
    ));
    Ok(())
}

#[tokio::test]
async fn unlock_without_wallet_fails() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;
    assert!(matches!(core.try_unlock(PIN).await, Err(BpesaError::WalletNotInitialized)));
    assert!(!core.unlock_wallet(PIN).await);
    assert_eq!(core.state(), WalletLifecycleState::Uninitialized);
    Ok(())
}

#[tokio::test]
async fn corrupt_record_opens_locked_and_refuses_unlock() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    store.set(WALLET_DATA_KEY, b"{\"version\":1,\"garbage\":true}").await?;
    let ledger = MockLedger::new(0);

    let core = open(&store, &ledger).await?;
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    assert_eq!(core.address(), None);
    assert!(matches!(core.try_unlock(PIN).await, Err(BpesaError::DecryptionFailed)));
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    Ok(())
}

#[tokio::test]
async fn runaway_iteration_count_fails_closed() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    restored_core(&store, &ledger).await?;

    let bytes = store.stored().await?.ok_or(BpesaError::WalletNotInitialized)?;
    let mut record = EncryptedWalletRecord::from_bytes(&bytes)?;
    record.kdf_iterations = u32::MAX;
    store.set(WALLET_DATA_KEY, &record.to_bytes()?).await?;

    let core = open(&store, &ledger).await?;
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    let unlock = tokio::time::timeout(Duration::from_secs(5), core.try_unlock(WRONG_PIN)).await;
    assert!(matches!(unlock, Ok(Err(BpesaError::DecryptionFailed))));
    assert!(!core.is_busy());

    core.reset().await?;
    assert_eq!(core.state(), WalletLifecycleState::Uninitialized);
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let config = CoreConfig {
        kdf_iterations: MIN_KDF_ITERATIONS - 1,
        ..test_config()
    };
    let result = WalletCore::open(config, store, ledger).await;
    assert!(matches!(result, Err(BpesaError::ConfigError { .. })));
}

// ---------------------------------------------------------------------------
// Exclusivity and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_unlocks_fail_fast() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    let (first, second) = tokio::join!(core.try_unlock(PIN), core.try_unlock(PIN));
    assert!(first.is_ok());
    assert!(matches!(second, Err(BpesaError::AlreadyInProgress)));
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    assert!(!core.is_busy());
    Ok(())
}

/// Every guarded operation must be refused while another one is in flight,
/// and the stored record must be left as it was.
async fn assert_all_refused(
    core: &WalletCore,
    store: &InstrumentedStore,
) -> std::result::Result<(), BpesaError> {
    let before = store.stored().await?;
    let intent = core.transfer_intent(Address::repeat_byte(0x44), U256::from(1u64))?;

    assert!(matches!(core.try_unlock(PIN).await, Err(BpesaError::AlreadyInProgress)));
    assert!(matches!(
        core.authorize(&intent, PIN).await,
        Err(BpesaError::AlreadyInProgress)
    ));
    assert!(matches!(
        core.try_change_pin(PIN, OTHER_PIN).await,
        Err(BpesaError::AlreadyInProgress)
    ));
    assert!(matches!(core.reset().await, Err(BpesaError::AlreadyInProgress)));
    assert!(matches!(
        core.create_wallet(PIN, metadata()).await,
        Err(BpesaError::AlreadyInProgress)
    ));
    assert!(matches!(
        core.try_restore(MNEMONIC, PIN).await,
        Err(BpesaError::AlreadyInProgress)
    ));

    assert!(core.is_busy());
    assert_eq!(store.stored().await?, before);
    Ok(())
}

#[tokio::test]
async fn pending_unlock_excludes_other_operations() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    store.stall_reads.store(true, Ordering::SeqCst);
    let unlock = core.try_unlock(PIN);
    tokio::pin!(unlock);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut unlock).await.is_err());

    assert_all_refused(&core, &store).await?;
    assert_eq!(ledger.calls(), 0);
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    Ok(())
}

#[tokio::test]
async fn pending_authorize_excludes_other_operations() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::stalled(Duration::from_secs(30));
    let config = CoreConfig {
        ledger_timeout_ms: 30_000,
        ..test_config()
    };
    let core = WalletCore::open(config, store.clone(), ledger.clone()).await?;
    core.try_restore(MNEMONIC, PIN).await?;

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    let authorize = core.authorize(&intent, PIN);
    tokio::pin!(authorize);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut authorize).await.is_err());
    assert_eq!(ledger.calls(), 1);

    assert_all_refused(&core, &store).await?;
    assert_eq!(ledger.calls(), 1);
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    Ok(())
}

#[tokio::test]
async fn pending_pin_change_excludes_other_operations() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;

    store.stall_reads.store(true, Ordering::SeqCst);
    let change = core.try_change_pin(PIN, OTHER_PIN);
    tokio::pin!(change);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut change).await.is_err());

    assert_all_refused(&core, &store).await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_unlock_releases_guard() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    store.stall_reads.store(true, Ordering::SeqCst);
    let cancelled = tokio::time::timeout(Duration::from_millis(50), core.try_unlock(PIN)).await;
    assert!(cancelled.is_err());
    assert!(!core.is_busy());
    assert_eq!(core.state(), WalletLifecycleState::Locked);

    store.stall_reads.store(false, Ordering::SeqCst);
    assert!(core.unlock_wallet(PIN).await);
    Ok(())
}

#[tokio::test]
async fn lock_is_idempotent_and_never_blocked() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;

    core.lock();
    core.lock();
    assert_eq!(core.state(), WalletLifecycleState::Locked);

    store.stall_reads.store(true, Ordering::SeqCst);
    let unlock = core.try_unlock(PIN);
    tokio::pin!(unlock);
    let pending = tokio::time::timeout(Duration::from_millis(20), &mut unlock).await;
    assert!(pending.is_err());
    assert!(core.is_busy());

    core.lock();
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    Ok(())
}

// ---------------------------------------------------------------------------
// Authorize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_intent_touches_nothing() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    let reads_before = store.reads();
    let intent = TransferIntent::new(Address::repeat_byte(0x22), U256::from(1000u64), unix_now() - 1);
    assert!(matches!(
        core.authorize(&intent, PIN).await,
        Err(BpesaError::PermitExpired { .. })
    ));
    assert_eq!(store.reads(), reads_before);
    assert_eq!(ledger.calls(), 0);
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    Ok(())
}

#[tokio::test]
async fn authorize_signs_recoverable_permit() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(5);
    let core = restored_core(&store, &ledger).await?;

    let recipient = Address::repeat_byte(0x22);
    let intent = TransferIntent::from_decimal(recipient, "12.5", unix_now() + 600)?;
    let signed = core.authorize(&intent, PIN).await?;

    assert_eq!(signed.permit.owner.to_checksum(None), MNEMONIC_ADDRESS);
    assert_eq!(signed.permit.spender, core.config().network.payments_contract);
    assert_eq!(signed.permit.nonce, U256::from(5u64));
    assert_eq!(signed.permit.value, intent.value);
    assert_eq!(signed.recover_signer()?, signed.permit.owner);
    assert_eq!(signed.signature_hex().len(), 2 + 130);
    assert_eq!(ledger.calls(), 1);

    let request = signed.submission_request(TxType::Send)?;
    assert_eq!(request.amount, "12.5");
    assert_eq!(request.from, MNEMONIC_ADDRESS);
    assert_eq!(request.to, recipient.to_checksum(None));
    assert_eq!(request.permit_data.nonce, "5");
    assert_eq!(request.tx_type, TxType::Send);
    Ok(())
}

#[tokio::test]
async fn authorize_from_locked_unlocks() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    let signed = core.authorize(&intent, PIN).await?;
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    assert_eq!(signed.recover_signer()?.to_checksum(None), MNEMONIC_ADDRESS);
    Ok(())
}

#[tokio::test]
async fn authorize_with_wrong_pin_while_locked() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    core.lock();

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    assert!(matches!(
        core.authorize(&intent, WRONG_PIN).await,
        Err(BpesaError::WalletLocked)
    ));
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    assert_eq!(ledger.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn authorize_without_wallet() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    assert!(matches!(
        core.authorize(&intent, PIN).await,
        Err(BpesaError::WalletNotInitialized)
    ));
    Ok(())
}

#[tokio::test]
async fn ledger_failure_fails_authorize() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    ledger.fail.store(true, Ordering::SeqCst);

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    assert!(matches!(
        core.authorize(&intent, PIN).await,
        Err(BpesaError::LedgerUnavailable { .. })
    ));
    assert!(!core.is_busy());
    Ok(())
}

#[tokio::test]
async fn stalled_ledger_times_out() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::stalled(Duration::from_secs(30));
    let core = restored_core(&store, &ledger).await?;

    let intent = core.transfer_intent(Address::repeat_byte(0x33), U256::from(1u64))?;
    assert!(matches!(
        core.authorize(&intent, PIN).await,
        Err(BpesaError::LedgerUnavailable { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn balance_requires_wallet() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = open(&store, &ledger).await?;
    assert!(matches!(core.balance().await, Err(BpesaError::WalletNotInitialized)));

    core.try_restore(MNEMONIC, PIN).await?;
    assert_eq!(core.balance().await?, "42.0");
    Ok(())
}

// ---------------------------------------------------------------------------
// PIN change / reset / idle lock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_pin_reseals_record() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    let before = store.get(WALLET_DATA_KEY).await?.ok_or(BpesaError::WalletNotInitialized)?;

    assert!(!core.change_pin(WRONG_PIN, OTHER_PIN).await);
    assert_eq!(store.get(WALLET_DATA_KEY).await?, Some(before.clone()));

    core.try_change_pin(PIN, OTHER_PIN).await?;
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);

    let after = store.get(WALLET_DATA_KEY).await?.ok_or(BpesaError::WalletNotInitialized)?;
    let old = EncryptedWalletRecord::from_bytes(&before)?;
    let new = EncryptedWalletRecord::from_bytes(&after)?;
    assert_eq!(old.address, new.address);
    assert_ne!(old.salt_private_key, new.salt_private_key);

    core.lock();
    assert!(!core.unlock_wallet(PIN).await);
    assert!(core.unlock_wallet(OTHER_PIN).await);
    Ok(())
}

#[tokio::test]
async fn reset_returns_to_uninitialized() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;

    core.reset().await?;
    assert_eq!(core.state(), WalletLifecycleState::Uninitialized);
    assert_eq!(core.address(), None);
    assert_eq!(store.get(WALLET_DATA_KEY).await?, None);

    core.try_restore(MNEMONIC, OTHER_PIN).await?;
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);
    Ok(())
}

#[tokio::test]
async fn failed_reset_locks_wallet() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;
    store.fail_clear.store(true, Ordering::SeqCst);

    assert!(matches!(
        core.reset().await,
        Err(BpesaError::PersistenceUnavailable { .. })
    ));
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    assert!(store.get(WALLET_DATA_KEY).await?.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn idle_wallet_locks_itself() -> std::result::Result<(), BpesaError> {
    let store = Arc::new(InstrumentedStore::default());
    let ledger = MockLedger::new(0);
    let core = restored_core(&store, &ledger).await?;

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(!core.lock_if_idle());
    assert_eq!(core.state(), WalletLifecycleState::Unlocked);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(core.lock_if_idle());
    assert_eq!(core.state(), WalletLifecycleState::Locked);
    assert!(!core.lock_if_idle());
    Ok(())
}
