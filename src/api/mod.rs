// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    access::{ContentRole, Visibility},
    auth::{Authenticated, Role},
    state::AppState,
    tokens::IssuedTokens,
    users::DeviceInfo,
};

pub mod auth;
pub mod cookies;
pub mod health;
pub mod oauth2;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/session-token", post(auth::create_session_token))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/admin/keys/rotate", post(auth::rotate_keys))
        .route("/oauth2/{provider}/authorize", get(oauth2::authorize))
        .route("/oauth2/{provider}/callback", get(oauth2::callback))
        .route(
            "/oauth2/{provider}/connection-token",
            post(oauth2::connection_token),
        )
        .route("/oauth2/{provider}", delete(oauth2::disconnect))
        .route("/users/me", get(users::get_current_user));

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        auth::create_session_token,
        auth::refresh,
        auth::logout,
        auth::rotate_keys,
        oauth2::authorize,
        oauth2::callback,
        oauth2::connection_token,
        oauth2::disconnect,
        users::get_current_user
    ),
    components(
        schemas(
            IssuedTokens,
            Authenticated,
            Role,
            DeviceInfo,
            ContentRole,
            Visibility,
            auth::SessionTokenResponse,
            auth::KeyRotationResponse,
            oauth2::ConnectionTokenResponse,
            users::UserMeResponse,
            health::HealthResponse,
            health::ReadyResponse
        )
    ),
    tags(
        (name = "Auth", description = "Session tokens, refresh and logout"),
        (name = "OAuth2", description = "Provider login and account linking"),
        (name = "Users", description = "Current user"),
        (name = "Admin", description = "Signing key management"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
