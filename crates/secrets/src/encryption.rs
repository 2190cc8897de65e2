// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret encryption contract and a reversible fake

use crate::store::SecretError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rollout_core::cancel::{self, CancelSignal};

/// Pluggable encryption for the secret store
///
/// `encrypt` and `decrypt` must be a true inverse pair.
#[async_trait]
pub trait SecretEncryption: Send + Sync {
    async fn encrypt(
        &self,
        plaintext: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<String, SecretError>;

    async fn decrypt(
        &self,
        ciphertext: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<String, SecretError>;
}

/// Reversible non-secret encoding for tests and local development
#[derive(Debug, Clone, Default)]
pub struct FakeEncryption;

#[async_trait]
impl SecretEncryption for FakeEncryption {
    async fn encrypt(
        &self,
        plaintext: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<String, SecretError> {
        cancel::check(cancel)?;
        Ok(STANDARD.encode(plaintext.as_bytes()))
    }

    async fn decrypt(
        &self,
        ciphertext: &str,
        cancel: Option<&CancelSignal>,
    ) -> Result<String, SecretError> {
        cancel::check(cancel)?;
        let bytes = STANDARD
            .decode(ciphertext)
            .map_err(|e| SecretError::Encryption(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| SecretError::Encryption(e.to_string()))
    }
}

#[cfg(test)]
#[path = "encryption_tests.rs"]
mod tests;
