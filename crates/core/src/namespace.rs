// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-prefixing decorator
//!
//! Rewrites every key before delegating so independent logical stores can
//! share one physical backend without collisions. Stateless pass-through.

use crate::cancel::CancelSignal;
use crate::store::{StateStore, StoreError, Versioned};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// State store wrapper that prepends a fixed prefix to every key
pub struct NamespacedStore {
    prefix: String,
    inner: Arc<dyn StateStore>,
}

impl NamespacedStore {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn StateStore>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl StateStore for NamespacedStore {
    async fn create(
        &self,
        key: &str,
        value: Value,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        self.inner.create(&self.scoped(key), value, cancel).await
    }

    async fn read(
        &self,
        key: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Versioned>, StoreError> {
        self.inner.read(&self.scoped(key), cancel).await
    }

    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<Versioned, StoreError> {
        self.inner
            .update(&self.scoped(key), value, expected_version, cancel)
            .await
    }

    async fn delete(
        &self,
        key: &str,
        expected_version: u64,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), StoreError> {
        self.inner
            .delete(&self.scoped(key), expected_version, cancel)
            .await
    }
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;
