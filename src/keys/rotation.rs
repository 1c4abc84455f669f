// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Rotation Task
//!
//! Background task that rotates the signing secret once it is older than the
//! rotation interval and prunes retired secrets past their retention window.
//!
//! ## Strategy
//!
//! Every `check_interval` (default 60 s) the rotator compares the age of the
//! current secret, as seen by the injected [`Clock`], against
//! `rotation_interval`. Age is measured with the clock rather than the timer,
//! so tests drive rotation by advancing a `ManualClock` and calling
//! [`KeyRotator::tick`].
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::KeyStore;
use crate::clock::Clock;

/// Default interval between rotation checks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Rotated { kid: String, pruned: usize },
    Pruned(usize),
}

/// Scheduled signing key rotation.
pub struct KeyRotator {
    keys: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    rotation_interval: chrono::Duration,
    check_interval: Duration,
}

impl KeyRotator {
    pub fn new(keys: Arc<KeyStore>, clock: Arc<dyn Clock>, rotation_interval: chrono::Duration) -> Self {
        Self {
            keys,
            clock,
            rotation_interval,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(rotator.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            check_secs = self.check_interval.as_secs(),
            rotation_secs = self.rotation_interval.num_seconds(),
            "Key rotator starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Key rotator shutting down");
                return;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Key rotator shutting down");
                    return;
                }
            }
        }
    }

    /// Rotate if the current secret is due, otherwise just prune.
    pub async fn tick(&self) -> TickOutcome {
        let current = self.keys.current().await;
        let age = self.clock.now() - current.created_at;

        if age >= self.rotation_interval {
            match self.keys.rotate().await {
                Ok(secret) => {
                    let pruned = self.keys.prune().await;
                    return TickOutcome::Rotated {
                        kid: secret.id.clone(),
                        pruned,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "Key rotator: rotation failed, keeping current secret");
                }
            }
        }

        TickOutcome::Pruned(self.keys.prune().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::keys::KeyStoreConfig;

    fn rotator() -> (KeyRotator, Arc<KeyStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let keys = Arc::new(
            KeyStore::generated(
                KeyStoreConfig {
                    retention: chrono::Duration::hours(2),
                    ..Default::default()
                },
                clock.clone(),
            )
            .unwrap(),
        );
        let rotator = KeyRotator::new(keys.clone(), clock.clone(), chrono::Duration::hours(1));
        (rotator, keys, clock)
    }

    #[tokio::test]
    async fn tick_does_nothing_before_interval() {
        let (rotator, keys, clock) = rotator();
        let kid = keys.current().await.id.clone();

        clock.advance(chrono::Duration::minutes(59));
        assert_eq!(rotator.tick().await, TickOutcome::Pruned(0));
        assert_eq!(keys.current().await.id, kid);
    }

    #[tokio::test]
    async fn tick_rotates_once_due_and_prunes_later() {
        let (rotator, keys, clock) = rotator();
        let first = keys.current().await.id.clone();

        clock.advance(chrono::Duration::hours(1));
        let outcome = rotator.tick().await;
        let TickOutcome::Rotated { kid, pruned } = outcome else {
            panic!("expected rotation, got {outcome:?}");
        };
        assert_ne!(kid, first);
        assert_eq!(pruned, 0);
        assert!(keys.by_id(&first).await.is_ok());

        // Second rotation at +2h; first secret's window closes at +3h.
        clock.advance(chrono::Duration::hours(1));
        assert!(matches!(rotator.tick().await, TickOutcome::Rotated { .. }));
        assert!(keys.by_id(&first).await.is_ok());

        clock.advance(chrono::Duration::hours(1));
        assert!(matches!(rotator.tick().await, TickOutcome::Rotated { pruned: 1, .. }));
        assert!(keys.by_id(&first).await.is_err());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (rotator, _keys, _clock) = rotator();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            rotator
                .with_check_interval(Duration::from_millis(10))
                .run(shutdown.clone()),
        );
        shutdown.cancel();
        handle.await.expect("rotator task exits cleanly");
    }
}
