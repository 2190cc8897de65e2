// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key serialization cells
//!
//! Each physical key owns one cell. Holding the cell's mutex across a
//! read-modify-write gives every key a single FIFO chain of operations while
//! leaving unrelated keys fully concurrent.

use rollout_core::store::VersionedValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Last-known state of a key as observed through its chain
///
/// `None` means no cached read; `Some(None)` means the key is known absent.
#[derive(Default)]
pub(crate) struct Slot {
    pub cached: Option<Option<VersionedValue>>,
}

pub(crate) struct KeyCell {
    pub lock: tokio::sync::Mutex<Slot>,
}

/// Map of physical key to its serialization cell
#[derive(Clone, Default)]
pub(crate) struct KeyCache {
    cells: Arc<Mutex<HashMap<String, Arc<KeyCell>>>>,
}

impl KeyCache {
    pub fn cell(&self, key: &str) -> Arc<KeyCell> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cells.entry(key.to_string()).or_insert_with(|| {
            Arc::new(KeyCell {
                lock: tokio::sync::Mutex::new(Slot::default()),
            })
        }))
    }
}
