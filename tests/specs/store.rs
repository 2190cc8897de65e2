// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-store specs: durability, optimistic concurrency, namespacing

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn values_survive_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store = file_store(&path);
        store
            .create("release", json!({"tag": "v1.4.2"}), None)
            .await
            .unwrap();
    }

    // A fresh instance models the next process
    let store = file_store(&path);
    let release = store.read("release", None).await.unwrap().unwrap();
    assert_eq!(release.value(), &json!({"tag": "v1.4.2"}));
    assert_eq!(release.version(), 1);
}

#[tokio::test]
async fn competing_processes_settle_by_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let ours = file_store(&path);
    let theirs = file_store(&path);

    ours.create("release", json!("v1"), None).await.unwrap();
    let our_handle = ours.read("release", None).await.unwrap().unwrap();
    let their_handle = theirs.read("release", None).await.unwrap().unwrap();

    their_handle.update(json!("theirs"), None).await.unwrap();
    let err = our_handle.update(json!("ours"), None).await.unwrap_err();
    assert!(err.is_conflict());

    // Re-read and retry, as the contract prescribes
    let fresh = ours.read("release", None).await.unwrap().unwrap();
    let settled = fresh.update(json!("ours"), None).await.unwrap();
    assert_eq!(settled.version(), 3);
}

#[tokio::test]
async fn namespaces_isolate_logical_stores_on_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.json");
    let (locks, secrets) = namespaced_pair(&path, "locks/", "secrets/");

    locks.create("state", json!("lock side"), None).await.unwrap();
    secrets
        .create("state", json!("secret side"), None)
        .await
        .unwrap();

    assert_eq!(
        locks.read("state", None).await.unwrap().unwrap().value(),
        &json!("lock side")
    );
    assert_eq!(
        secrets.read("state", None).await.unwrap().unwrap().value(),
        &json!("secret side")
    );

    // The physical document carries the prefixed keys
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("locks/state").is_some());
    assert!(raw.get("secrets/state").is_some());
}
