// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-holder identity and the persisted lock record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operating system of a lock holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

impl Platform {
    /// Platform of the current process
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::Darwin,
            "windows" => Platform::Windows,
            _ => Platform::Unknown,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Windows => "windows",
            Platform::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Identity stamped onto lock records by this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderInfo {
    pub username: String,
    pub hostname: String,
    pub platform: Platform,
}

impl HolderInfo {
    /// Identity of the current process
    pub fn current() -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            username,
            hostname,
            platform: Platform::current(),
        }
    }
}

/// The record stored under the lock key while the lock is held
///
/// `expires_at` is recomputed from `updated_at` on every refresh; a record
/// whose expiry has passed is considered abandoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub username: String,
    pub hostname: String,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Fresh record for a holder acquiring the lock now
    pub fn new(holder: &HolderInfo, now: DateTime<Utc>, expiry: Duration) -> Self {
        Self {
            username: holder.username.clone(),
            hostname: holder.hostname.clone(),
            platform: holder.platform,
            created_at: now,
            updated_at: now,
            expires_at: now + expiry,
        }
    }

    /// Copy of this record with the lease extended from `now`
    pub fn refreshed(&self, now: DateTime<Utc>, expiry: Duration) -> Self {
        Self {
            updated_at: now,
            expires_at: now + expiry,
            ..self.clone()
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
