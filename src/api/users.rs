// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use std::collections::BTreeSet;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Authenticated, Role};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::User;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    /// Roles as of the Access token, which may lag the store until refresh.
    pub roles: BTreeSet<Role>,
    pub groups: BTreeSet<String>,
    pub session_id: String,
    /// Linked identity providers.
    pub providers: Vec<String>,
}

impl UserMeResponse {
    fn new(principal: Authenticated, user: User) -> Self {
        Self {
            user_id: principal.principal_id,
            email: user.email,
            email_verified: user.email_verified,
            roles: principal.roles,
            groups: principal.groups,
            session_id: principal.session_id,
            providers: user.identities.into_iter().map(|i| i.provider).collect(),
        }
    }
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "User no longer exists"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(principal): Auth,
) -> Result<Json<UserMeResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(&principal.principal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(UserMeResponse::new(principal, user)))
}
