// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth2 login and provider linking endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use super::cookies::session_cookies;
use crate::auth::{token_value, AuthenticationOutcome, StepUp};
use crate::error::ApiError;
use crate::oauth2::{
    authorization_redirect, AuthorizationRequest, CallbackQuery, CallbackResponse, OAuth2Error,
};
use crate::state::AppState;
use crate::tokens::{IssuedTokens, TokenType};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTokenResponse {
    pub connection_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Start a login or linking flow.
///
/// The session token may come from the query or, failing that, the
/// `session_token` cookie.
#[utoipa::path(
    get,
    path = "/v1/oauth2/{provider}/authorize",
    tag = "OAuth2",
    params(
        ("provider" = String, Path, description = "Identity provider name"),
        AuthorizationRequest
    ),
    responses(
        (status = 303, description = "Redirect to the identity provider"),
        (status = 404, description = "Unknown provider"),
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(mut request): Query<AuthorizationRequest>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    let provider = state
        .providers
        .get(&provider)
        .ok_or(OAuth2Error::UnknownProvider(provider))?;

    if request.session_token.is_none() {
        request.session_token =
            token_value(&headers, TokenType::Session, state.config.header_mode);
    }

    let location =
        authorization_redirect(provider.as_ref(), request, &state.issuer, &state.config.oauth2)
            .await?;
    Ok(Redirect::to(&location))
}

/// Provider callback.
///
/// Failures redirect to the configured error URI with an `error` code.
/// Success redirects to the requested redirect URI, or returns the tokens
/// when none was given.
#[utoipa::path(
    get,
    path = "/v1/oauth2/{provider}/callback",
    tag = "OAuth2",
    params(
        ("provider" = String, Path, description = "Identity provider name"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "Signed in", body = IssuedTokens),
        (status = 303, description = "Redirect to the client or the error URI"),
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    outcome: AuthenticationOutcome,
) -> Response {
    let response = state
        .callback_handler()
        .respond(&provider, query, &outcome, &state.config.oauth2.error_uri)
        .await;

    match response {
        CallbackResponse::Success(success) => {
            let cookies = session_cookies(&success.tokens, &state.config.lifetimes);
            match success.redirect_uri {
                Some(uri) => (cookies, Redirect::to(&uri)).into_response(),
                None => (cookies, Json(success.tokens)).into_response(),
            }
        }
        CallbackResponse::Failure { location, .. } => Redirect::to(&location).into_response(),
    }
}

/// Issue a connection token authorizing the caller's current session to link
/// `provider`. Requires step-up.
#[utoipa::path(
    post,
    path = "/v1/oauth2/{provider}/connection-token",
    tag = "OAuth2",
    security(("bearer" = [])),
    params(("provider" = String, Path, description = "Identity provider name")),
    responses(
        (status = 200, description = "Connection token issued", body = ConnectionTokenResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Step-up required"),
        (status = 404, description = "Unknown provider"),
    )
)]
pub async fn connection_token(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    StepUp(principal): StepUp,
) -> Result<Json<ConnectionTokenResponse>, ApiError> {
    let provider = state
        .providers
        .get(&provider)
        .ok_or(OAuth2Error::UnknownProvider(provider))?;

    let connection_token = state
        .issuer
        .issue_connection(&principal.principal_id, &principal.session_id, provider.name())
        .await?;
    Ok(Json(ConnectionTokenResponse {
        connection_token,
        expires_in: state.config.lifetimes.oauth2_connection.num_seconds(),
    }))
}

/// Unlink `provider` from the caller. Requires step-up.
#[utoipa::path(
    delete,
    path = "/v1/oauth2/{provider}",
    tag = "OAuth2",
    security(("bearer" = [])),
    params(("provider" = String, Path, description = "Identity provider name")),
    responses(
        (status = 204, description = "Provider disconnected"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Step-up required"),
        (status = 404, description = "Provider not connected"),
    )
)]
pub async fn disconnect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    StepUp(principal): StepUp,
) -> Result<StatusCode, ApiError> {
    let mut user = state
        .users
        .find_by_id(&principal.principal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    if !user.disconnect(&provider.to_ascii_lowercase()) {
        return Err(ApiError::not_found(format!("{provider} is not connected")));
    }
    state.users.save(user).await?;
    info!(user_id = %principal.principal_id, provider = %provider, "Provider disconnected");
    Ok(StatusCode::NO_CONTENT)
}
