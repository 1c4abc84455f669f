// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::Role;
use crate::tokens::{TokenError, TokenErrorCategory};

/// Authentication and capability-check failures.
///
/// Token decode failures are folded into the three token variants so that
/// callers never learn which key ids exist or which check tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Bad signature, malformed, unknown key, wrong type or revoked session
    InvalidToken,
    /// Token has expired
    TokenExpired,
    /// Token is not yet valid
    TokenNotYetValid,
    /// No authenticated principal on the request
    AuthenticationRequired,
    /// Principal lacks the role
    RoleRequired(Role),
    /// Principal is not in the group
    GroupMembershipRequired(String),
    /// No valid step-up token for the current session
    StepUpRequired,
    /// Internal error
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::AuthenticationRequired => "authentication_required",
            AuthError::RoleRequired(_) => "role_required",
            AuthError::GroupMembershipRequired(_) => "group_membership_required",
            AuthError::StepUpRequired => "step_up_required",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AuthError::RoleRequired(_)
            | AuthError::GroupMembershipRequired(_)
            | AuthError::StepUpRequired => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Token is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::AuthenticationRequired => write!(f, "Authentication is required"),
            AuthError::RoleRequired(role) => write!(f, "Role {role} is required"),
            AuthError::GroupMembershipRequired(group) => {
                write!(f, "Membership of group '{group}' is required")
            }
            AuthError::StepUpRequired => {
                write!(f, "Recent re-verification is required for this operation")
            }
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e.category() {
            TokenErrorCategory::InvalidToken => AuthError::InvalidToken,
            TokenErrorCategory::Expired => AuthError::TokenExpired,
            TokenErrorCategory::NotYetValid => AuthError::TokenNotYetValid,
            TokenErrorCategory::Internal => AuthError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
