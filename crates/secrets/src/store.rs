// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encrypted secret store over a state store
//!
//! Each secret is one ciphertext record under `key/<name>`; the set of known
//! names lives under `keys` as a sorted, deduplicated array. Writes commit
//! the record before touching the index and deletes clear the record first,
//! so the only divergence either can leave behind is an index entry without
//! a record, which `list_keys` filters out.

use crate::cache::KeyCache;
use crate::encryption::SecretEncryption;
use futures::future::join_all;
use rollout_core::cancel::{self, Aborted, CancelSignal};
use rollout_core::store::{Store, StoreError, VersionedValue};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Key under which the name index is stored
const KEYS_INDEX: &str = "keys";

fn record_key(name: &str) -> String {
    format!("key/{}", name)
}

/// Errors from secret-store operations
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("operation aborted")]
    Aborted(#[from] Aborted),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("malformed record under {0}")]
    Malformed(String),
}

/// Names in the index, tolerating a malformed value
///
/// A damaged index is rebuilt by the next write rather than propagated as an
/// error; the records themselves stay authoritative.
fn index_names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
        .unwrap_or_default()
}

/// Key/value store for secrets, storing ciphertext plus a name index
pub struct EncryptedSecretStore {
    store: Store,
    encryption: Arc<dyn SecretEncryption>,
    cache: KeyCache,
}

impl EncryptedSecretStore {
    pub fn new(store: Store, encryption: Arc<dyn SecretEncryption>) -> Self {
        Self {
            store,
            encryption,
            cache: KeyCache::default(),
        }
    }

    /// Fresh backend read, retrying once on failure
    ///
    /// Failures are never cached; `Aborted` is not retried.
    async fn fetch(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<VersionedValue>, SecretError> {
        match self.store.read(key, cancel).await {
            Ok(state) => Ok(state),
            Err(StoreError::Aborted(e)) => Err(e.into()),
            Err(first) => {
                tracing::debug!(key = %key, error = %first, "read failed, retrying once");
                Ok(self.store.read(key, cancel).await?)
            }
        }
    }

    /// Current state of a key, serialized on its cache cell
    async fn state_of(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<VersionedValue>, SecretError> {
        let cell = self.cache.cell(key);
        let mut slot = cell.lock.lock().await;
        if let Some(cached) = &slot.cached {
            return Ok(cached.clone());
        }
        let state = self.fetch(key, cancel).await?;
        slot.cached = Some(state.clone());
        Ok(state)
    }

    /// Read-modify-write a key inside its serialized chain
    ///
    /// `apply` maps the current value to the desired one; `None` means delete
    /// (or stay absent), and returning a value equal to the current one skips
    /// the backend write. A failed write can only mean an external writer
    /// moved the key, so the cache entry is dropped before propagating.
    /// Returns whether a record existed before the change.
    async fn update_state<F>(
        &self,
        key: &str,
        apply: F,
        cancel: Option<&CancelSignal>,
    ) -> Result<bool, SecretError>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let cell = self.cache.cell(key);
        let mut slot = cell.lock.lock().await;
        let current = match &slot.cached {
            Some(cached) => cached.clone(),
            None => {
                let state = self.fetch(key, cancel).await?;
                slot.cached = Some(state.clone());
                state
            }
        };
        let existed = current.is_some();
        let outcome = match current {
            Some(state) => match apply(Some(state.value())) {
                Some(next) if next == *state.value() => Ok(Some(state)),
                Some(next) => state.update(next, cancel).await.map(Some),
                None => state.delete(cancel).await.map(|_| None),
            },
            None => match apply(None) {
                Some(next) => self.store.create(key, next, cancel).await.map(Some),
                None => Ok(None),
            },
        };
        match outcome {
            Ok(next) => {
                slot.cached = Some(next);
                Ok(existed)
            }
            Err(e) => {
                slot.cached = None;
                Err(e.into())
            }
        }
    }

    /// Encrypt and store a secret, indexing names not seen before
    pub async fn write(
        &self,
        name: &str,
        plaintext: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), SecretError> {
        cancel::check(cancel)?;
        let ciphertext = self.encryption.encrypt(plaintext, cancel).await?;
        cancel::check(cancel)?;
        let existed = self
            .update_state(
                &record_key(name),
                move |_| Some(Value::String(ciphertext)),
                cancel,
            )
            .await?;
        if !existed {
            self.update_state(
                KEYS_INDEX,
                |old| {
                    let mut names = index_names(old);
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                        names.sort();
                    }
                    Some(Value::from(names))
                },
                cancel,
            )
            .await?;
        }
        Ok(())
    }

    /// Decrypt and return a secret, or `None` if it does not exist
    pub async fn read(
        &self,
        name: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<String>, SecretError> {
        cancel::check(cancel)?;
        let Some(state) = self.state_of(&record_key(name), cancel).await? else {
            return Ok(None);
        };
        cancel::check(cancel)?;
        let ciphertext = state
            .value()
            .as_str()
            .ok_or_else(|| SecretError::Malformed(record_key(name)))?
            .to_string();
        Ok(Some(self.encryption.decrypt(&ciphertext, cancel).await?))
    }

    /// Remove a secret and drop its name from the index
    pub async fn delete(&self, name: &str, cancel: Option<&CancelSignal>) -> Result<(), SecretError> {
        cancel::check(cancel)?;
        self.update_state(&record_key(name), |_| None, cancel).await?;
        cancel::check(cancel)?;
        self.update_state(
            KEYS_INDEX,
            |old| {
                old.map(|value| {
                    let names = index_names(Some(value));
                    if names.iter().any(|n| n == name) {
                        Value::from(
                            names
                                .into_iter()
                                .filter(|n| n != name)
                                .collect::<Vec<_>>(),
                        )
                    } else {
                        value.clone()
                    }
                })
            },
            cancel,
        )
        .await?;
        Ok(())
    }

    /// Names of all secrets that verifiably exist
    ///
    /// The index may briefly diverge after a partial `write` or `delete`;
    /// every indexed name is checked against its record concurrently and
    /// phantom entries are dropped.
    pub async fn list_keys(&self, cancel: Option<&CancelSignal>) -> Result<Vec<String>, SecretError> {
        cancel::check(cancel)?;
        let names = match self.state_of(KEYS_INDEX, cancel).await? {
            Some(state) => index_names(Some(state.value())),
            None => Vec::new(),
        };
        cancel::check(cancel)?;
        let checks = join_all(names.iter().map(|name| {
            let key = record_key(name);
            async move { self.state_of(&key, cancel).await }
        }))
        .await;
        let mut live = Vec::new();
        for (name, state) in names.into_iter().zip(checks) {
            if state?.is_some() {
                live.push(name);
            }
        }
        Ok(live)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
