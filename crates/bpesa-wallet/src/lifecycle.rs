//! Lifecycle state and the single in-flight operation guard.
//!
//! ```text
//! Uninitialized --create/restore--> Unlocked
//! Locked --unlock ok--> Unlocked          (via Unlocking)
//! Locked --unlock fail--> Locked          (via Unlocking)
//! Unlocked --lock / idle--> Locked
//! any --reset--> Uninitialized
//! ```
//!
//! Create, restore, unlock, authorize, change PIN and reset each hold an
//! [`OperationGuard`] for their whole duration. A second caller fails
//! fast with [`BpesaError::AlreadyInProgress`] instead of queueing.
//! `lock` takes no guard and always wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bpesa_types::{BpesaError, Result, WalletLifecycleState};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

/// Owner of the lifecycle state, the in-flight flag and the unlock
/// window's activity clock.
///
/// The mutexes are never held across an `.await`.
#[derive(Debug)]
pub struct StateMachine {
    state: Mutex<WalletLifecycleState>,
    in_flight: AtomicBool,
    last_activity: Mutex<Option<Instant>>,
}

pub(crate) fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateMachine {
    pub fn new(initial: WalletLifecycleState) -> Self {
        Self {
            state: Mutex::new(initial),
            in_flight: AtomicBool::new(false),
            last_activity: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> WalletLifecycleState {
        *lock_ignoring_poison(&self.state)
    }

    /// Returns `true` while an exclusive operation holds the guard.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the in-flight flag.
    ///
    /// # Errors
    ///
    /// Returns [`BpesaError::AlreadyInProgress`] if another operation holds it.
    pub fn try_begin(&self) -> Result<OperationGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BpesaError::AlreadyInProgress)?;
        Ok(OperationGuard { machine: self })
    }

    /// Closes the unlock window. Idempotent.
    ///
    /// Returns `true` if the state changed. An in-flight unlock that is
    /// interrupted this way completes into `Locked`.
    pub fn lock(&self) -> bool {
        let mut state = lock_ignoring_poison(&self.state);
        let changed = matches!(
            *state,
            WalletLifecycleState::Unlocked | WalletLifecycleState::Unlocking
        );
        if changed {
            tracing::info!(from = %*state, "wallet locked");
            *state = WalletLifecycleState::Locked;
        }
        *lock_ignoring_poison(&self.last_activity) = None;
        changed
    }

    /// Records activity inside the unlock window.
    pub fn touch(&self) {
        *lock_ignoring_poison(&self.last_activity) = Some(Instant::now());
    }

    /// Time since the last unlock or authorization, if unlocked.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.state() != WalletLifecycleState::Unlocked {
            return None;
        }
        let last = *lock_ignoring_poison(&self.last_activity);
        last.map(|at| at.elapsed())
    }

    fn set(&self, to: WalletLifecycleState) {
        let mut state = lock_ignoring_poison(&self.state);
        if *state != to {
            tracing::debug!(from = %*state, %to, "lifecycle transition");
            *state = to;
        }
    }
}

// ---------------------------------------------------------------------------
// OperationGuard
// ---------------------------------------------------------------------------

/// RAII claim on the in-flight flag.
///
/// Dropping the guard, including when the owning future is cancelled,
/// releases the flag and rolls an unfinished `Unlocking` back to `Locked`.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    machine: &'a StateMachine,
}

impl OperationGuard<'_> {
    /// Moves `Locked` to `Unlocking`.
    ///
    /// # Errors
    ///
    /// - [`BpesaError::WalletNotInitialized`] from `Uninitialized`.
    /// - [`BpesaError::InternalInvariantViolation`] from any state other
    ///   than `Locked`.
    pub fn begin_unlock(&self) -> Result<()> {
        let mut state = lock_ignoring_poison(&self.machine.state);
        match *state {
            WalletLifecycleState::Locked => {
                *state = WalletLifecycleState::Unlocking;
                Ok(())
            }
            WalletLifecycleState::Uninitialized => Err(BpesaError::WalletNotInitialized),
            other => Err(BpesaError::InternalInvariantViolation {
                reason: format!("unlock started from {other}"),
            }),
        }
    }

    /// Completes an unlock started with [`begin_unlock`](Self::begin_unlock).
    ///
    /// Returns the resulting state. If `lock` ran in the meantime the
    /// state stays `Locked` even on success.
    pub fn finish_unlock(&self, verified: bool) -> WalletLifecycleState {
        let outcome = {
            let mut state = lock_ignoring_poison(&self.machine.state);
            if *state == WalletLifecycleState::Unlocking {
                *state = if verified {
                    WalletLifecycleState::Unlocked
                } else {
                    WalletLifecycleState::Locked
                };
            }
            *state
        };
        if outcome == WalletLifecycleState::Unlocked {
            self.machine.touch();
        }
        outcome
    }

    /// Unconditional transition, for create, restore and reset.
    pub fn transition(&self, to: WalletLifecycleState) {
        self.machine.set(to);
        match to {
            WalletLifecycleState::Unlocked => self.machine.touch(),
            _ => *lock_ignoring_poison(&self.machine.last_activity) = None,
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = lock_ignoring_poison(&self.machine.state);
            if *state == WalletLifecycleState::Unlocking {
                tracing::debug!("unfinished unlock rolled back to locked");
                *state = WalletLifecycleState::Locked;
            }
        }
        self.machine.in_flight.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
