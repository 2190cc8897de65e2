// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rollout-lock: lease-based distributed lock
//!
//! One deployment at a time: the lock is a single record in a state store,
//! held by refreshing it before it expires and reclaimed by the next caller
//! once it has lapsed.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod lease;
pub mod record;

pub use lease::{
    CurrentHolder, LeaseConfig, LeaseLock, LockAttempt, LockError, LockGuard, LOCK_KEY,
};
pub use record::{HolderInfo, LockRecord, Platform};
