// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session lifecycle endpoints: pre-authentication session tokens, refresh,
//! logout and signing key rotation.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::SET_COOKIE, request::Parts, HeaderMap, StatusCode},
    response::AppendHeaders,
    Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use super::cookies::{logout_cookies, session_cookies, set_cookie, SetCookies};
use crate::auth::extractor::SESSION_TOKEN_COOKIE;
use crate::auth::{token_value, AdminOnly, Auth, AuthError};
use crate::error::ApiError;
use crate::geo::locate_best_effort;
use crate::state::AppState;
use crate::tokens::{IssuedTokens, TokenType};
use crate::users::DeviceInfo;

/// Address of the connected peer, when the server records it.
pub struct PeerIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for PeerIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
        ))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionTokenResponse {
    pub session_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KeyRotationResponse {
    /// Id of the new signing key.
    pub kid: String,
    /// Keys still accepted for verification, including the new one.
    pub key_ids: Vec<String>,
    /// Keys dropped because they left the retention window.
    pub pruned: usize,
}

/// Capture the device fingerprint before an OAuth2 login.
#[utoipa::path(
    post,
    path = "/v1/auth/session-token",
    tag = "Auth",
    responses(
        (status = 200, description = "Session token issued", body = SessionTokenResponse),
    )
)]
pub async fn create_session_token(
    State(state): State<AppState>,
    PeerIp(peer_ip): PeerIp,
    headers: HeaderMap,
) -> Result<(SetCookies, Json<SessionTokenResponse>), ApiError> {
    let device = DeviceInfo::from_headers(&headers, peer_ip);
    let location = locate_best_effort(state.geo.as_ref(), device.ip.as_deref()).await;
    let device = device.with_location(location);

    let session_token = state.issuer.issue_session(device).await?;
    let ttl = state.config.lifetimes.session;
    let cookie = set_cookie(SESSION_TOKEN_COOKIE, &session_token, ttl);

    Ok((
        AppendHeaders(vec![(SET_COOKIE, cookie)]),
        Json(SessionTokenResponse {
            session_token,
            expires_in: ttl.num_seconds(),
        }),
    ))
}

/// Exchange a Refresh token for a new Access/Refresh pair.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Tokens refreshed", body = IssuedTokens),
        (status = 401, description = "Refresh token missing, invalid, expired or revoked"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(SetCookies, Json<IssuedTokens>), ApiError> {
    let token = token_value(&headers, TokenType::Refresh, state.config.header_mode)
        .ok_or(AuthError::AuthenticationRequired)?;
    let tokens = state.issuer.refresh(&token).await?;
    Ok((session_cookies(&tokens, &state.config.lifetimes), Json(tokens)))
}

/// Revoke the caller's current session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Auth(principal): Auth,
) -> Result<(StatusCode, SetCookies), ApiError> {
    if let Some(mut user) = state.users.find_by_id(&principal.principal_id).await? {
        if user.revoke_session(&principal.session_id) {
            state.users.save(user).await?;
            info!(user_id = %principal.principal_id, "Session revoked");
        }
    }
    Ok((StatusCode::NO_CONTENT, logout_cookies()))
}

/// Rotate the signing key and prune keys past retention.
#[utoipa::path(
    post,
    path = "/v1/admin/keys/rotate",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Key rotated", body = KeyRotationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Administrator role required"),
    )
)]
pub async fn rotate_keys(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
) -> Result<Json<KeyRotationResponse>, ApiError> {
    let secret = state.keys.rotate().await.map_err(ApiError::internal)?;
    let pruned = state.keys.prune().await;
    info!(kid = %secret.id, admin = %admin.principal_id, pruned, "Signing key rotated on request");
    Ok(Json(KeyRotationResponse {
        kid: secret.id.clone(),
        key_ids: state.keys.key_ids().await,
        pruned,
    }))
}
