// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-store contract with optimistic concurrency
//!
//! A store maps string keys to versioned values. Writes carry the version
//! the writer last observed; a mismatch is rejected with `Conflict`, never
//! silently merged. Version 0 is the "does not exist yet" sentinel used as
//! the expected version for create.

use crate::cancel::{Aborted, CancelSignal};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors from state-store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("operation aborted")]
    Aborted(#[from] Aborted),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("version conflict on {0}")]
    Conflict(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error is a rejected optimistic write
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// A value together with its optimistic-concurrency version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: Value,
    pub version: u64,
}

/// Durable mapping from string keys to versioned values
///
/// Backends must round-trip values exactly and check the cancellation token
/// at entry. Absent keys read as `None` rather than an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Store a new value under `key`; fails with `AlreadyExists` if occupied
    async fn create(
        &self,
        key: &str,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError>;

    /// The latest committed value under `key`, or `None`
    async fn read(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Versioned>, StoreError>;

    /// Replace the value under `key` if its stored version still matches
    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError>;

    /// Remove `key` entirely if its stored version still matches
    async fn delete(
        &self,
        key: &str,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), StoreError>;
}

/// Cloneable front door over a `StateStore`
///
/// `create` and `read` hand back `VersionedValue` handles that remember the
/// version they observed.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn StateStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    pub async fn create(
        &self,
        key: &str,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<VersionedValue, StoreError> {
        let versioned = self.inner.create(key, value, cancel).await?;
        Ok(VersionedValue::new(self.clone(), key, versioned))
    }

    pub async fn read(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<VersionedValue>, StoreError> {
        Ok(self
            .inner
            .read(key, cancel)
            .await?
            .map(|versioned| VersionedValue::new(self.clone(), key, versioned)))
    }

    pub async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<VersionedValue, StoreError> {
        let versioned = self.inner.update(key, value, expected_version, cancel).await?;
        Ok(VersionedValue::new(self.clone(), key, versioned))
    }

    pub async fn delete(
        &self,
        key: &str,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), StoreError> {
        self.inner.delete(key, expected_version, cancel).await
    }
}

/// Handle to a stored value at the version it was observed
///
/// `update` and `delete` use the captured version, so of two handles to the
/// same original value the first writer wins and the second gets `Conflict`.
#[derive(Clone)]
pub struct VersionedValue {
    store: Store,
    key: String,
    versioned: Versioned,
}

impl VersionedValue {
    fn new(store: Store, key: &str, versioned: Versioned) -> Self {
        Self {
            store,
            key: key.to_string(),
            versioned,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.versioned.value
    }

    pub fn version(&self) -> u64 {
        self.versioned.version
    }

    /// Deserialize the value into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.versioned.value.clone())?)
    }

    /// Replace the value, failing with `Conflict` if this handle is stale
    pub async fn update(
        &self,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<VersionedValue, StoreError> {
        self.store
            .update(&self.key, value, self.versioned.version, cancel)
            .await
    }

    /// Remove the key, failing with `Conflict` if this handle is stale
    pub async fn delete(&self, cancel: Option<&CancelSignal>) -> Result<(), StoreError> {
        self.store
            .delete(&self.key, self.versioned.version, cancel)
            .await
    }
}

impl std::fmt::Debug for VersionedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedValue")
            .field("key", &self.key)
            .field("version", &self.versioned.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
