// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the spec modules

use rollout_core::namespace::NamespacedStore;
use rollout_core::store::{StateStore, Store};
use rollout_lock::{HolderInfo, Platform};
use rollout_store::FileStore;
use std::path::Path;
use std::sync::Arc;

/// Store over a file-backed backend at the given path
pub fn file_store(path: &Path) -> Store {
    Store::new(Arc::new(FileStore::open(path)))
}

/// Two logical stores sharing one physical file under distinct prefixes
pub fn namespaced_pair(path: &Path, first: &str, second: &str) -> (Store, Store) {
    let backend: Arc<dyn StateStore> = Arc::new(FileStore::open(path));
    (
        Store::new(Arc::new(NamespacedStore::new(
            first.to_string(),
            Arc::clone(&backend),
        ))),
        Store::new(Arc::new(NamespacedStore::new(
            second.to_string(),
            Arc::clone(&backend),
        ))),
    )
}

/// Deterministic holder identity for lock specs
pub fn holder(username: &str) -> HolderInfo {
    HolderInfo {
        username: username.to_string(),
        hostname: "ci-runner".to_string(),
        platform: Platform::Linux,
    }
}
