// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret-store specs over the file-backed store

use crate::prelude::*;
use rollout_core::cancel::{merged, CancelController};
use rollout_lock::LeaseLock;
use rollout_secrets::{EncryptedSecretStore, FakeEncryption, SecretError};
use std::sync::Arc;

#[tokio::test]
async fn secrets_survive_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");

    {
        let secrets =
            EncryptedSecretStore::new(file_store(&path), Arc::new(FakeEncryption));
        secrets.write("db-pass", "s3cr3t", None).await.unwrap();
        secrets.write("api-token", "tok", None).await.unwrap();
    }

    let secrets = EncryptedSecretStore::new(file_store(&path), Arc::new(FakeEncryption));
    assert_eq!(
        secrets.read("db-pass", None).await.unwrap(),
        Some("s3cr3t".to_string())
    );
    assert_eq!(
        secrets.list_keys(None).await.unwrap(),
        vec!["api-token", "db-pass"]
    );
}

#[tokio::test]
async fn persisted_layout_is_ciphertext_records_plus_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");

    let secrets = EncryptedSecretStore::new(file_store(&path), Arc::new(FakeEncryption));
    secrets.write("db-pass", "s3cr3t", None).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("key/db-pass").is_some());
    assert_eq!(raw["keys"]["value"], serde_json::json!(["db-pass"]));
    // Ciphertext on disk, not the plaintext
    assert_ne!(raw["key/db-pass"]["value"], serde_json::json!("s3cr3t"));
}

#[tokio::test]
async fn lock_and_secrets_share_one_physical_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deploy-state.json");
    let (lock_store, secret_store) = namespaced_pair(&path, "lock/", "secret/");

    let lock = LeaseLock::new(lock_store).with_holder(holder("deployer"));
    let secrets = EncryptedSecretStore::new(secret_store, Arc::new(FakeEncryption));

    // The flow a deployment tool follows: take the lock, then touch secrets
    let guard = match lock.acquire(None).await.unwrap() {
        rollout_lock::LockAttempt::Acquired(guard) => guard,
        rollout_lock::LockAttempt::Held(_) => panic!("store was empty"),
    };
    secrets.write("db-pass", "s3cr3t", None).await.unwrap();
    assert_eq!(
        secrets.read("db-pass", None).await.unwrap(),
        Some("s3cr3t".to_string())
    );
    guard.remove_lock(None).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("secret/key/db-pass").is_some());
    assert!(raw.get("secret/keys").is_some());
    // The lock record was deleted on release
    assert!(raw.get("lock/lock").is_none());
}

#[tokio::test]
async fn merged_signal_aborts_secret_operations() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = EncryptedSecretStore::new(
        file_store(&dir.path().join("secrets.json")),
        Arc::new(FakeEncryption),
    );

    let timeout = CancelController::new();
    let interrupt = CancelController::new();
    let either = merged([&timeout.signal(), &interrupt.signal()]);

    secrets.write("db-pass", "s3cr3t", Some(&either)).await.unwrap();

    interrupt.abort();
    tokio::time::timeout(std::time::Duration::from_secs(1), either.cancelled())
        .await
        .unwrap();

    let err = secrets.read("db-pass", Some(&either)).await.unwrap_err();
    assert!(matches!(err, SecretError::Aborted(_)));
}
