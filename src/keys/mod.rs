// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signing Key Store
//!
//! Holds the HMAC secrets used to sign every token, indexed by key id (`kid`).
//!
//! ## Rotation
//!
//! - There is always exactly one *current* secret; new tokens are signed with it.
//! - `rotate()` publishes a fresh current secret and moves the previous one to
//!   the retired list, stamped with the time it stopped being current.
//! - Retired secrets stay resolvable by id for the configured retention window,
//!   so tokens signed just before a rotation keep validating.
//! - Once a retired secret is older than the window it is pruned and tokens
//!   signed with it fail with an unknown-key error.
//!
//! ## Persistence
//!
//! A store bootstrapped from a [`SecretSource`] that can publish writes the
//! whole ring back after every rotation and prune. The next bootstrap restores
//! that ring, retirement times included, before looking at the configured
//! secret. With a read-only source, secrets generated by rotation live only in
//! this process.
//!
//! ## Concurrency
//!
//! The ring sits behind a `tokio::sync::RwLock`. Lookups hand out `Arc<Secret>`
//! clones, so a rotation never invalidates a validation already in progress.

pub mod rotation;
pub mod source;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::Algorithm;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;

pub use rotation::KeyRotator;
pub use source::{EnvSecretSource, PublishedSecret, SecretSource, StaticSecretSource};

/// Errors raised by the key store.
///
/// `NotFound` deliberately carries no key id: callers one layer up turn it
/// into a uniform invalid-token condition.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("signing key not found")]
    NotFound,

    #[error("key size of {bits} bits is below the {min} bits required by {algorithm}")]
    WeakKey {
        bits: usize,
        min: usize,
        algorithm: SigningAlgorithm,
    },

    #[error("key size must be a whole number of bytes, got {0} bits")]
    UnalignedKeySize(usize),

    #[error("secure random generator failed")]
    Generation,

    #[error("secret source failed: {0}")]
    Source(String),

    #[error("invalid secret material: {0}")]
    InvalidMaterial(String),

    #[error("invalid published key ring: {0}")]
    InvalidRing(&'static str),
}

/// HMAC algorithms a secret can be used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    /// Smallest acceptable secret for this algorithm (the digest size).
    pub fn min_bits(self) -> usize {
        match self {
            SigningAlgorithm::Hs256 => 256,
            SigningAlgorithm::Hs384 => 384,
            SigningAlgorithm::Hs512 => 512,
        }
    }

    pub fn jwt_algorithm(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "HS384" => Ok(SigningAlgorithm::Hs384),
            "HS512" => Ok(SigningAlgorithm::Hs512),
            other => Err(format!("unsupported signing algorithm '{other}'")),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAlgorithm::Hs256 => write!(f, "HS256"),
            SigningAlgorithm::Hs384 => write!(f, "HS384"),
            SigningAlgorithm::Hs512 => write!(f, "HS512"),
        }
    }
}

/// A signing secret. Immutable once created.
#[derive(Clone)]
pub struct Secret {
    pub id: String,
    pub label: String,
    material: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Secret {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        material: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            material,
            created_at,
        }
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

// Material never reaches logs.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("material", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Generate random key material of `bits` length for `algorithm`.
pub fn generate(bits: usize, algorithm: SigningAlgorithm) -> Result<Vec<u8>, KeyError> {
    if bits % 8 != 0 {
        return Err(KeyError::UnalignedKeySize(bits));
    }
    if bits < algorithm.min_bits() {
        return Err(KeyError::WeakKey {
            bits,
            min: algorithm.min_bits(),
            algorithm,
        });
    }

    let mut material = vec![0u8; bits / 8];
    SystemRandom::new()
        .fill(&mut material)
        .map_err(|_| KeyError::Generation)?;
    Ok(material)
}

/// Key store settings.
#[derive(Debug, Clone)]
pub struct KeyStoreConfig {
    pub algorithm: SigningAlgorithm,
    pub key_bits: usize,
    /// How long a retired secret keeps validating tokens.
    pub retention: Duration,
    /// Label stamped on generated secrets.
    pub label: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::Hs256,
            key_bits: 256,
            retention: Duration::days(30),
            label: "token-signing".to_string(),
        }
    }
}

#[derive(Clone)]
struct RetiredSecret {
    secret: Arc<Secret>,
    retired_at: DateTime<Utc>,
}

struct KeyRing {
    current: Arc<Secret>,
    retired: Vec<RetiredSecret>,
}

impl KeyRing {
    fn published(&self) -> Vec<PublishedSecret> {
        std::iter::once(PublishedSecret {
            secret: self.current.as_ref().clone(),
            retired_at: None,
        })
        .chain(self.retired.iter().map(|r| PublishedSecret {
            secret: r.secret.as_ref().clone(),
            retired_at: Some(r.retired_at),
        }))
        .collect()
    }
}

/// Registry of signing secrets, shared by reference across the process.
pub struct KeyStore {
    ring: RwLock<KeyRing>,
    config: KeyStoreConfig,
    clock: Arc<dyn Clock>,
    source: Option<Arc<dyn SecretSource>>,
}

impl KeyStore {
    /// Create a store whose current secret is `initial`.
    pub fn new(initial: Secret, config: KeyStoreConfig, clock: Arc<dyn Clock>) -> Result<Self, KeyError> {
        let bits = initial.material().len() * 8;
        if bits < config.algorithm.min_bits() {
            return Err(KeyError::WeakKey {
                bits,
                min: config.algorithm.min_bits(),
                algorithm: config.algorithm,
            });
        }

        Ok(Self {
            ring: RwLock::new(KeyRing {
                current: Arc::new(initial),
                retired: Vec::new(),
            }),
            config,
            clock,
            source: None,
        })
    }

    /// Create a store with a freshly generated current secret.
    pub fn generated(config: KeyStoreConfig, clock: Arc<dyn Clock>) -> Result<Self, KeyError> {
        let secret = Self::fresh_secret(&config, clock.now())?;
        Self::new(secret, config, clock)
    }

    /// Create a store from the secret-backing source.
    ///
    /// A previously published ring wins over the configured secret; with
    /// neither, a secret is generated. The resulting ring is published back.
    pub async fn bootstrap(
        source: Arc<dyn SecretSource>,
        config: KeyStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyError> {
        let published = source.published().await?;
        let mut store = if !published.is_empty() {
            Self::restore(published, config, clock)?
        } else {
            match source.load_signing_secret(&config.label, clock.now()).await? {
                Some(secret) => {
                    info!(kid = %secret.id, "Loaded signing secret from secret source");
                    Self::new(secret, config, clock)?
                }
                None => {
                    info!("No signing secret configured, generating one");
                    Self::generated(config, clock)?
                }
            }
        };

        if !source.can_publish() {
            warn!("Secret source is read-only, rotated signing secrets will not survive a restart");
        }
        source.publish(&store.ring.get_mut().published()).await?;
        store.source = Some(source);
        Ok(store)
    }

    fn restore(
        published: Vec<PublishedSecret>,
        config: KeyStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyError> {
        let mut current = None;
        let mut retired = Vec::new();
        for entry in published {
            match entry.retired_at {
                None if current.is_some() => {
                    return Err(KeyError::InvalidRing("more than one current secret"))
                }
                None => current = Some(entry.secret),
                Some(retired_at) => retired.push(RetiredSecret {
                    secret: Arc::new(entry.secret),
                    retired_at,
                }),
            }
        }
        let current = current.ok_or(KeyError::InvalidRing("no current secret"))?;
        retired.sort_by_key(|r| r.retired_at);

        let now = clock.now();
        let retention = config.retention;
        let mut store = Self::new(current, config, clock)?;
        let ring = store.ring.get_mut();
        ring.retired = retired;
        let pruned = Self::prune_ring(ring, now, retention);
        info!(
            kid = %ring.current.id,
            retired = ring.retired.len(),
            pruned,
            "Restored published signing secrets"
        );
        Ok(store)
    }

    async fn publish(&self, ring: &KeyRing) -> Result<(), KeyError> {
        match &self.source {
            Some(source) => source.publish(&ring.published()).await,
            None => Ok(()),
        }
    }

    fn fresh_secret(config: &KeyStoreConfig, now: DateTime<Utc>) -> Result<Secret, KeyError> {
        let material = generate(config.key_bits, config.algorithm)?;
        Ok(Secret::new(
            Uuid::new_v4().simple().to_string(),
            config.label.clone(),
            material,
            now,
        ))
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.config.algorithm
    }

    pub fn retention(&self) -> Duration {
        self.config.retention
    }

    /// The secret new tokens are signed with.
    pub async fn current(&self) -> Arc<Secret> {
        self.ring.read().await.current.clone()
    }

    /// Resolve a secret by key id, including retired secrets still inside
    /// their verification window.
    pub async fn by_id(&self, id: &str) -> Result<Arc<Secret>, KeyError> {
        let now = self.clock.now();
        let ring = self.ring.read().await;

        if ring.current.id == id {
            return Ok(ring.current.clone());
        }

        ring.retired
            .iter()
            .find(|r| r.secret.id == id && now - r.retired_at < self.config.retention)
            .map(|r| r.secret.clone())
            .ok_or(KeyError::NotFound)
    }

    /// Publish a new current secret. The previous one is retained for the
    /// verification window; pruning is left to [`KeyStore::prune`].
    ///
    /// The new ring is written to the secret source before it takes effect,
    /// so a failed write leaves the store unchanged.
    pub async fn rotate(&self) -> Result<Arc<Secret>, KeyError> {
        let now = self.clock.now();
        let fresh = Arc::new(Self::fresh_secret(&self.config, now)?);

        let mut ring = self.ring.write().await;
        let previous = ring.current.clone();
        let mut retired = ring.retired.clone();
        retired.push(RetiredSecret {
            secret: previous.clone(),
            retired_at: now,
        });
        let next = KeyRing {
            current: fresh.clone(),
            retired,
        };
        self.publish(&next).await?;
        *ring = next;
        drop(ring);

        info!(
            previous_kid = %previous.id,
            current_kid = %fresh.id,
            "Rotated signing secret"
        );
        Ok(fresh)
    }

    /// Drop retired secrets whose verification window has elapsed.
    ///
    /// A failed write to the secret source is logged; the stale entries are
    /// pruned again on the next bootstrap.
    pub async fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut ring = self.ring.write().await;
        let pruned = Self::prune_ring(&mut ring, now, self.config.retention);
        if pruned > 0 {
            if let Err(e) = self.publish(&ring).await {
                warn!(error = %e, "Failed to publish pruned key ring");
            }
        }
        pruned
    }

    fn prune_ring(ring: &mut KeyRing, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = ring.retired.len();
        ring.retired.retain(|r| {
            let keep = now - r.retired_at < retention;
            if !keep {
                debug!(kid = %r.secret.id, "Pruning retired signing secret");
            }
            keep
        });
        before - ring.retired.len()
    }

    /// Ids of every resolvable secret, current first.
    pub async fn key_ids(&self) -> Vec<String> {
        let ring = self.ring.read().await;
        std::iter::once(ring.current.id.clone())
            .chain(ring.retired.iter().rev().map(|r| r.secret.id.clone()))
            .collect()
    }
}
