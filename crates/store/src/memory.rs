// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store for tests and fakes
//!
//! Same optimistic-concurrency semantics as the file store, plus scripted
//! failure injection for exercising retry paths.

use async_trait::async_trait;
use rollout_core::cancel::{self, CancelSignal};
use rollout_core::store::{StateStore, StoreError, Versioned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// In-memory `StateStore` with CAS semantics
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Versioned>>,
    fail_reads: AtomicU32,
    fail_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` reads fail with a backend error
    pub fn fail_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` mutations fail with a backend error
    pub fn fail_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Snapshot of the stored keys, for assertions
    pub fn keys(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create(
        &self,
        key: &str,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        cancel::check(cancel)?;
        if Self::take_failure(&self.fail_writes) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let record = Versioned { value, version: 1 };
        records.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn read(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Versioned>, StoreError> {
        cancel::check(cancel)?;
        if Self::take_failure(&self.fail_reads) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        cancel::check(cancel)?;
        if Self::take_failure(&self.fail_writes) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let current = records.get(key).map(|record| record.version).unwrap_or(0);
        if current != expected_version {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let record = Versioned {
            value,
            version: expected_version + 1,
        };
        records.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(
        &self,
        key: &str,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), StoreError> {
        cancel::check(cancel)?;
        if Self::take_failure(&self.fail_writes) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let current = records.get(key).map(|record| record.version).unwrap_or(0);
        if current != expected_version {
            return Err(StoreError::Conflict(key.to_string()));
        }
        records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
