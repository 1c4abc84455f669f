// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret-backing sources for the key store.
//!
//! The production source reads the environment, the way a secret manager
//! injects values into the container. Material is standard base64.
//!
//! A source that can store values also keeps the published key ring, so
//! secrets generated by rotation and their retirement times outlive the
//! process that created them. The environment source is read-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{KeyError, Secret};

/// Environment variable holding base64 signing secret material.
pub const TOKEN_SIGNING_SECRET_ENV: &str = "TOKEN_SIGNING_SECRET";

/// Environment variable holding the key id of [`TOKEN_SIGNING_SECRET_ENV`].
pub const TOKEN_SIGNING_KEY_ID_ENV: &str = "TOKEN_SIGNING_KEY_ID";

/// Key id used when a secret is configured without one.
const DEFAULT_KEY_ID: &str = "primary";

/// One entry of a published key ring. `retired_at` is `None` for the
/// current secret.
#[derive(Debug, Clone)]
pub struct PublishedSecret {
    pub secret: Secret,
    pub retired_at: Option<DateTime<Utc>>,
}

/// A key-value source of secret material.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch a raw value by name.
    async fn get(&self, name: &str) -> Result<Option<String>, KeyError>;

    /// Whether [`SecretSource::publish`] stores anything.
    fn can_publish(&self) -> bool {
        false
    }

    /// The last ring handed to [`SecretSource::publish`], current first.
    async fn published(&self) -> Result<Vec<PublishedSecret>, KeyError> {
        Ok(Vec::new())
    }

    /// Replace the stored ring. Read-only sources ignore it.
    async fn publish(&self, _ring: &[PublishedSecret]) -> Result<(), KeyError> {
        Ok(())
    }

    /// Load the configured signing secret, if any.
    async fn load_signing_secret(
        &self,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Secret>, KeyError> {
        let Some(encoded) = self.get(TOKEN_SIGNING_SECRET_ENV).await? else {
            return Ok(None);
        };

        let material = Base64::decode_vec(encoded.trim())
            .map_err(|e| KeyError::InvalidMaterial(format!("{TOKEN_SIGNING_SECRET_ENV}: {e}")))?;
        let id = self
            .get(TOKEN_SIGNING_KEY_ID_ENV)
            .await?
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_ID.to_string());

        Ok(Some(Secret::new(id, label, material, now)))
    }
}

/// Reads secrets from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretSource;

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn get(&self, name: &str) -> Result<Option<String>, KeyError> {
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(KeyError::Source(format!("{name}: {e}"))),
        }
    }
}

/// In-memory values. Clones share the published ring, standing in for a
/// secret manager every replica talks to.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource {
    values: HashMap<String, String>,
    ring: Arc<Mutex<Vec<PublishedSecret>>>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn get(&self, name: &str) -> Result<Option<String>, KeyError> {
        Ok(self.values.get(name).cloned())
    }

    fn can_publish(&self) -> bool {
        true
    }

    async fn published(&self) -> Result<Vec<PublishedSecret>, KeyError> {
        Ok(self.ring.lock().await.clone())
    }

    async fn publish(&self, ring: &[PublishedSecret]) -> Result<(), KeyError> {
        *self.ring.lock().await = ring.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::keys::{KeyStore, KeyStoreConfig};

    #[tokio::test]
    async fn loads_secret_with_key_id() {
        let material = [9u8; 32];
        let source = StaticSecretSource::new()
            .with(TOKEN_SIGNING_SECRET_ENV, Base64::encode_string(&material))
            .with(TOKEN_SIGNING_KEY_ID_ENV, "k-2026-01");

        let secret = source
            .load_signing_secret("token-signing", Utc::now())
            .await
            .unwrap()
            .expect("secret present");
        assert_eq!(secret.id, "k-2026-01");
        assert_eq!(secret.material(), &material);
    }

    #[tokio::test]
    async fn missing_key_id_falls_back_to_default() {
        let source = StaticSecretSource::new()
            .with(TOKEN_SIGNING_SECRET_ENV, Base64::encode_string(&[1u8; 32]));
        let secret = source
            .load_signing_secret("token-signing", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(secret.id, DEFAULT_KEY_ID);
    }

    #[tokio::test]
    async fn invalid_base64_is_rejected() {
        let source = StaticSecretSource::new().with(TOKEN_SIGNING_SECRET_ENV, "not base64!!");
        let result = source.load_signing_secret("token-signing", Utc::now()).await;
        assert!(matches!(result, Err(KeyError::InvalidMaterial(_))));
    }

    #[tokio::test]
    async fn bootstrap_generates_when_source_is_empty() {
        let source = Arc::new(StaticSecretSource::new());
        let clock = Arc::new(ManualClock::starting_now());
        let store = KeyStore::bootstrap(source.clone(), KeyStoreConfig::default(), clock.clone())
            .await
            .unwrap();
        let generated = store.current().await;
        assert_eq!(generated.material().len(), 32);

        let again = KeyStore::bootstrap(source, KeyStoreConfig::default(), clock)
            .await
            .unwrap();
        assert_eq!(again.current().await.id, generated.id);
        assert_eq!(again.current().await.material(), generated.material());
    }

    #[tokio::test]
    async fn read_only_source_publishes_nothing() {
        let source = Arc::new(EnvSecretSource);
        assert!(!source.can_publish());
        let store = KeyStore::bootstrap(
            source.clone(),
            KeyStoreConfig::default(),
            Arc::new(ManualClock::starting_now()),
        )
        .await
        .unwrap();
        store.rotate().await.unwrap();
        assert!(source.published().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rotated_secrets_survive_a_second_bootstrap() {
        let clock = Arc::new(ManualClock::starting_now());
        let source = Arc::new(
            StaticSecretSource::new()
                .with(TOKEN_SIGNING_SECRET_ENV, Base64::encode_string(&[3u8; 32])),
        );
        let config = KeyStoreConfig {
            retention: Duration::hours(1),
            ..Default::default()
        };

        let first = KeyStore::bootstrap(source.clone(), config.clone(), clock.clone())
            .await
            .unwrap();
        let original = first.current().await;
        assert_eq!(original.id, DEFAULT_KEY_ID);

        clock.advance(Duration::minutes(10));
        let rotated = first.rotate().await.unwrap();

        clock.advance(Duration::minutes(5));
        let second = KeyStore::bootstrap(source.clone(), config.clone(), clock.clone())
            .await
            .unwrap();
        let current = second.current().await;
        assert_eq!(current.id, rotated.id);
        assert_eq!(current.material(), rotated.material());
        assert_eq!(current.created_at, rotated.created_at);
        assert_eq!(
            second.by_id(&original.id).await.unwrap().material(),
            original.material()
        );
        assert_eq!(second.key_ids().await, first.key_ids().await);

        // The retirement time is restored, so a reload does not extend the window.
        clock.advance(Duration::minutes(45));
        assert!(second.by_id(&original.id).await.is_ok());
        clock.advance(Duration::minutes(10));
        assert!(matches!(second.by_id(&original.id).await, Err(KeyError::NotFound)));

        let third = KeyStore::bootstrap(source.clone(), config, clock).await.unwrap();
        assert_eq!(third.key_ids().await, vec![rotated.id.clone()]);
        assert_eq!(source.published().await.unwrap().len(), 1);
    }
}
