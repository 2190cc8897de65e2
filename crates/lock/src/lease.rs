// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease-based distributed lock over a state store
//!
//! The lock is a single versioned record under a well-known key. A holder
//! keeps it alive by refreshing the record well before it expires; the long
//! expiry relative to the refresh cadence leaves wide margin for transient
//! backend errors. A failed refresh close enough to the expiry that another
//! retry cannot be trusted poisons the guard instead of retrying.

use crate::record::{HolderInfo, LockRecord};
use rollout_core::cancel::CancelSignal;
use rollout_core::clock::{Clock, SystemClock};
use rollout_core::store::{Store, StoreError, VersionedValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Key the lock record is stored under
pub const LOCK_KEY: &str = "lock";

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lease timing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// How long before an unrefreshed record is considered abandoned
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
    /// How often the holder refreshes the record
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Faster cadence used while refresh attempts are failing
    #[serde(with = "humantime_serde")]
    pub err_refresh_interval: Duration,
}

impl LeaseConfig {
    pub fn new() -> Self {
        Self {
            expiry: Duration::from_secs(10 * 60),
            refresh_interval: Duration::from_secs(10),
            err_refresh_interval: Duration::from_millis(500),
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_err_refresh_interval(mut self, interval: Duration) -> Self {
        self.err_refresh_interval = interval;
        self
    }

    /// Margin inside which a failed refresh can no longer be retried safely
    fn fatal_margin(&self) -> Duration {
        self.err_refresh_interval + Duration::from_secs(1)
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Distributed mutual-exclusion lock
pub struct LeaseLock<C: Clock = SystemClock> {
    store: Store,
    config: LeaseConfig,
    holder: HolderInfo,
    clock: C,
}

impl LeaseLock<SystemClock> {
    pub fn new(store: Store) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<C: Clock> LeaseLock<C> {
    pub fn with_clock(store: Store, clock: C) -> Self {
        Self {
            store,
            config: LeaseConfig::new(),
            holder: HolderInfo::current(),
            clock,
        }
    }

    pub fn with_config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_holder(mut self, holder: HolderInfo) -> Self {
        self.holder = holder;
        self
    }

    /// The current lock holder, if a live one exists
    ///
    /// An expired record is treated as abandoned: it is deleted and no
    /// holder is reported.
    pub async fn current_holder(
        &self,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<CurrentHolder>, LockError> {
        let now = self.clock.now();
        let Some(current) = self.store.read(LOCK_KEY, cancel).await? else {
            return Ok(None);
        };
        let record: LockRecord = current.decode()?;
        if record.is_expired(now) {
            tracing::debug!(
                username = %record.username,
                expired_at = %record.expires_at,
                "reclaiming abandoned lock record"
            );
            current.delete(cancel).await?;
            return Ok(None);
        }
        Ok(Some(CurrentHolder {
            record,
            value: current,
        }))
    }

    /// Attempt to take the lock
    ///
    /// Returns `LockAttempt::Held` with the competing holder when a live
    /// record exists; otherwise creates a fresh record and starts the
    /// background refresh.
    pub async fn acquire(&self, cancel: Option<&CancelSignal>) -> Result<LockAttempt, LockError> {
        if let Some(holder) = self.current_holder(cancel).await? {
            return Ok(LockAttempt::Held(holder));
        }
        let now = self.clock.now();
        let record = LockRecord::new(&self.holder, now, self.config.expiry);
        let value = self
            .store
            .create(LOCK_KEY, serde_json::to_value(&record)?, cancel)
            .await?;
        tracing::debug!(
            username = %record.username,
            expires_at = %record.expires_at,
            "lock acquired"
        );
        Ok(LockAttempt::Acquired(LockGuard::start(
            self.store.clone(),
            self.config.clone(),
            self.clock.clone(),
            record,
            value.version(),
        )))
    }
}

/// Outcome of an acquire attempt
pub enum LockAttempt {
    /// The lock is now held by this process
    Acquired(LockGuard),
    /// A live holder exists; inspect it or force-remove it
    Held(CurrentHolder),
}

impl std::fmt::Debug for LockAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockAttempt::Acquired(_) => f.write_str("Acquired"),
            LockAttempt::Held(_) => f.write_str("Held"),
        }
    }
}

/// A live lock holder observed in the store
pub struct CurrentHolder {
    record: LockRecord,
    value: VersionedValue,
}

impl CurrentHolder {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Force-delete the holder's record (operator override)
    pub async fn remove_lock(self, cancel: Option<&CancelSignal>) -> Result<(), LockError> {
        Ok(self.value.delete(cancel).await?)
    }
}

struct GuardState {
    record: LockRecord,
    version: u64,
    fault: Option<String>,
}

struct GuardShared {
    state: Mutex<GuardState>,
    released: AtomicBool,
    /// Held for the duration of each refresh write
    refresh_gate: tokio::sync::Mutex<()>,
}

impl GuardShared {
    fn snapshot(&self) -> (LockRecord, u64) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.record.clone(), state.version)
    }
}

/// Handle to a held lock
///
/// A background task refreshes the record until `remove_lock` is called or a
/// fatal refresh failure poisons the guard.
pub struct LockGuard {
    store: Store,
    shared: Arc<GuardShared>,
    refresh_task: tokio::task::JoinHandle<()>,
}

impl LockGuard {
    fn start<C: Clock>(
        store: Store,
        config: LeaseConfig,
        clock: C,
        record: LockRecord,
        version: u64,
    ) -> Self {
        let shared = Arc::new(GuardShared {
            state: Mutex::new(GuardState {
                record,
                version,
                fault: None,
            }),
            released: AtomicBool::new(false),
            refresh_gate: tokio::sync::Mutex::new(()),
        });
        let refresh_task = tokio::spawn(refresh_loop(
            store.clone(),
            config,
            clock,
            Arc::clone(&shared),
        ));
        Self {
            store,
            shared,
            refresh_task,
        }
    }

    /// Snapshot of the latest record as maintained by the refresh task
    pub fn current_state(&self) -> LockRecord {
        self.shared.snapshot().0
    }

    /// The fatal refresh failure, if the lease can no longer be trusted
    pub fn fault(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fault
            .clone()
    }

    /// Stop all refresh activity and delete the lock record
    ///
    /// Waits for an in-flight refresh to settle first so the freshest
    /// version is the one deleted.
    pub async fn remove_lock(self, cancel: Option<&CancelSignal>) -> Result<(), LockError> {
        self.shared.released.store(true, Ordering::SeqCst);
        let _gate = self.shared.refresh_gate.lock().await;
        self.refresh_task.abort();
        let (_, version) = self.shared.snapshot();
        self.store.delete(LOCK_KEY, version, cancel).await?;
        tracing::debug!("lock released");
        Ok(())
    }
}

async fn refresh_loop<C: Clock>(
    store: Store,
    config: LeaseConfig,
    clock: C,
    shared: Arc<GuardShared>,
) {
    let mut delay = config.refresh_interval;
    loop {
        sleep(delay).await;
        if shared.released.load(Ordering::SeqCst) {
            return;
        }
        let _gate = shared.refresh_gate.lock().await;
        if shared.released.load(Ordering::SeqCst) {
            return;
        }
        let (record, version) = shared.snapshot();
        let now = clock.now();
        let refreshed = record.refreshed(now, config.expiry);
        let result = match serde_json::to_value(&refreshed) {
            Ok(value) => store
                .update(LOCK_KEY, value, version, None)
                .await
                .map_err(LockError::from),
            Err(e) => Err(LockError::Json(e)),
        };
        match result {
            Ok(updated) => {
                let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
                state.version = updated.version();
                state.record = refreshed;
                drop(state);
                delay = config.refresh_interval;
            }
            Err(e) => {
                // The pre-refresh record is what other processes see; once it
                // is about to lapse, retrying cannot restore trust in the lease.
                if record.expires_at < clock.now() + config.fatal_margin() {
                    let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.fault = Some(e.to_string());
                    drop(state);
                    tracing::error!(
                        error = %e,
                        expires_at = %record.expires_at,
                        "lock refresh failed with the lease about to expire; \
                         this process can no longer be trusted as the holder"
                    );
                    return;
                }
                tracing::warn!(error = %e, "lock refresh failed, retrying");
                delay = config.err_refresh_interval;
            }
        }
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
