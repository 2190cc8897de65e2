// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease-lock specs over the file-backed store

use crate::prelude::*;
use rollout_core::clock::FakeClock;
use rollout_lock::{LeaseLock, LockAttempt};
use std::time::Duration;

#[tokio::test]
async fn one_deployment_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("locks.json"));

    let alice = LeaseLock::new(store.clone()).with_holder(holder("alice"));
    let bob = LeaseLock::new(store.clone()).with_holder(holder("bob"));

    let guard = match alice.acquire(None).await.unwrap() {
        LockAttempt::Acquired(guard) => guard,
        LockAttempt::Held(_) => panic!("store was empty"),
    };

    // Bob is told who holds the lock instead of getting an error
    match bob.acquire(None).await.unwrap() {
        LockAttempt::Held(current) => {
            assert_eq!(current.record().username, "alice");
            assert_eq!(current.record().hostname, "ci-runner");
        }
        LockAttempt::Acquired(_) => panic!("lock should be held by alice"),
    }

    guard.remove_lock(None).await.unwrap();

    match bob.acquire(None).await.unwrap() {
        LockAttempt::Acquired(guard) => {
            assert_eq!(guard.current_state().username, "bob");
            guard.remove_lock(None).await.unwrap();
        }
        LockAttempt::Held(current) => {
            panic!("lock still held by {}", current.record().username)
        }
    }
}

#[tokio::test]
async fn abandoned_lock_is_reclaimed_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("locks.json"));
    let clock = FakeClock::new();

    let crashed = LeaseLock::with_clock(store.clone(), clock.clone()).with_holder(holder("crashed"));
    let next = LeaseLock::with_clock(store.clone(), clock.clone()).with_holder(holder("next"));

    match crashed.acquire(None).await.unwrap() {
        LockAttempt::Acquired(_guard) => {
            // The guard is dropped without remove_lock, modeling a crash;
            // only the clock moves the record past its expiry.
        }
        LockAttempt::Held(_) => panic!("store was empty"),
    }

    clock.advance(Duration::from_secs(11 * 60));

    match next.acquire(None).await.unwrap() {
        LockAttempt::Acquired(guard) => assert_eq!(guard.current_state().username, "next"),
        LockAttempt::Held(current) => {
            panic!("expired lock not reclaimed, held by {}", current.record().username)
        }
    }
}

#[tokio::test]
async fn operator_can_force_clear_a_live_lock() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("locks.json"));

    let stuck = LeaseLock::new(store.clone()).with_holder(holder("stuck"));
    let operator = LeaseLock::new(store.clone()).with_holder(holder("operator"));

    let _abandoned = stuck.acquire(None).await.unwrap();

    let current = operator.current_holder(None).await.unwrap().unwrap();
    assert_eq!(current.record().username, "stuck");
    current.remove_lock(None).await.unwrap();

    assert!(operator.current_holder(None).await.unwrap().is_none());
}
