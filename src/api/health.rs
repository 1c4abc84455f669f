// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: String,
    /// User store reachability ("ok" or "unavailable").
    pub user_store: String,
    /// Signing keys available for verification.
    pub signing_keys: usize,
    /// Configured identity providers.
    pub providers: Vec<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness probe handler.
///
/// Returns 503 when the user store is unreachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let ok = match state.users.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "User store readiness check failed");
            false
        }
    };

    let response = ReadyResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            user_store: if ok { "ok" } else { "unavailable" }.to_string(),
            signing_keys: state.keys.key_ids().await.len(),
            providers: state.providers.names(),
        },
    };
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Liveness probe handler.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AuthConfig;
    use crate::geo::NoopGeoLocator;
    use crate::keys::{KeyStore, KeyStoreConfig};
    use crate::oauth2::ProviderRegistry;
    use crate::users::{StoreError, StoreResult, User, UserStore};

    struct UnreachableStore;

    #[async_trait]
    impl UserStore for UnreachableStore {
        async fn find_by_id(&self, _id: &str) -> StoreResult<Option<User>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn find_by_identity(&self, _: &str, _: &str) -> StoreResult<Option<User>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn exists_by_email(&self, _email: &str) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn save(&self, _user: User) -> StoreResult<User> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn ready_when_user_store_answers() {
        let clock = Arc::new(ManualClock::starting_now());
        let state = AppState::in_memory(AuthConfig::default(), clock).unwrap();

        let (status, Json(body)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.user_store, "ok");
        assert_eq!(body.checks.signing_keys, 1);
    }

    #[tokio::test]
    async fn unreachable_user_store_is_not_ready() {
        let clock = Arc::new(ManualClock::starting_now());
        let keys = Arc::new(KeyStore::generated(KeyStoreConfig::default(), clock.clone()).unwrap());
        let state = AppState::new(
            AuthConfig::default(),
            clock,
            keys,
            Arc::new(UnreachableStore),
            ProviderRegistry::new(),
            Arc::new(NoopGeoLocator),
        );

        let (status, Json(body)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.user_store, "unavailable");
    }
}
