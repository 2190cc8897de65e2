// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed state store
//!
//! The entire key space is one pretty-printed JSON document on disk, loaded
//! lazily and cached in memory. Every mutation re-reads the file, checks the
//! expected version against the on-disk record, applies the change, and
//! writes the whole document back. Mutations hold a single write slot, so at
//! most one write is in flight per process; concurrent writers in other
//! processes are rejected by the version check.

use async_trait::async_trait;
use rollout_core::cancel::{self, CancelSignal};
use rollout_core::store::{StateStore, StoreError, Versioned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

type Document = BTreeMap<String, Versioned>;

#[derive(Default)]
struct CachedDocument {
    loaded: Option<Document>,
}

/// State store persisting all keys to a single JSON file
pub struct FileStore {
    path: PathBuf,
    /// Single-slot write queue; also guards the cached document
    state: Mutex<CachedDocument>,
}

impl FileStore {
    /// Open a store backed by the given file; a missing file reads as empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(CachedDocument::default()),
        }
    }

    /// Open a store backed by a fresh file in the system temp dir, for testing
    pub fn open_temp() -> Self {
        let path =
            std::env::temp_dir().join(format!("rollout-test-{}.json", uuid::Uuid::new_v4()));
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    async fn persist(&self, document: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Cached read, loading the file on first access
    async fn get_record(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let mut state = self.state.lock().await;
        if state.loaded.is_none() {
            let document = self.load().await?;
            tracing::debug!(
                path = %self.path.display(),
                keys = document.len(),
                "loaded state file"
            );
            state.loaded = Some(document);
        }
        Ok(state
            .loaded
            .as_ref()
            .and_then(|document| document.get(key).cloned()))
    }

    /// Version-checked write; `None` means the expected version did not match
    async fn write_record(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<Option<Versioned>, StoreError> {
        let mut state = self.state.lock().await;
        let mut document = self.load().await?;
        let current = document.get(key).map(|record| record.version).unwrap_or(0);
        if current != expected_version {
            state.loaded = Some(document);
            return Ok(None);
        }
        let record = Versioned {
            value,
            version: expected_version + 1,
        };
        document.insert(key.to_string(), record.clone());
        self.persist(&document).await?;
        state.loaded = Some(document);
        Ok(Some(record))
    }

    /// Version-checked removal; `false` means the expected version did not match
    async fn remove_record(&self, key: &str, expected_version: u64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let mut document = self.load().await?;
        let current = document.get(key).map(|record| record.version).unwrap_or(0);
        if current != expected_version {
            state.loaded = Some(document);
            return Ok(false);
        }
        document.remove(key);
        self.persist(&document).await?;
        state.loaded = Some(document);
        Ok(true)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn create(
        &self,
        key: &str,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        cancel::check(cancel)?;
        match self.write_record(key, value, 0).await? {
            Some(record) => Ok(record),
            None => Err(StoreError::AlreadyExists(key.to_string())),
        }
    }

    async fn read(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Versioned>, StoreError> {
        cancel::check(cancel)?;
        self.get_record(key).await
    }

    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        cancel::check(cancel)?;
        match self.write_record(key, value, expected_version).await? {
            Some(record) => Ok(record),
            None => Err(StoreError::Conflict(key.to_string())),
        }
    }

    async fn delete(
        &self,
        key: &str,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), StoreError> {
        cancel::check(cancel)?;
        if self.remove_record(key, expected_version).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(key.to_string()))
        }
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
