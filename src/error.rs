// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;
use crate::oauth2::OAuth2Error;
use crate::tokens::{TokenError, TokenErrorCategory};
use crate::users::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    /// Log the cause and hide it from the client.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal server error",
        )
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if let AuthError::Internal(cause) = &e {
            return Self::internal(cause);
        }
        Self::new(e.status_code(), e.error_code(), e.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e.category() {
            TokenErrorCategory::Internal => Self::internal(e),
            _ => AuthError::from(e).into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(message) => Self::conflict(message),
            e => Self::internal(e),
        }
    }
}

impl From<OAuth2Error> for ApiError {
    fn from(e: OAuth2Error) -> Self {
        match e {
            OAuth2Error::UnknownProvider(_) => {
                Self::new(StatusCode::NOT_FOUND, e.error_code(), e.to_string())
            }
            OAuth2Error::Provider(_) | OAuth2Error::Token(_) | OAuth2Error::Store(_) => {
                Self::internal(e)
            }
            e => Self::new(StatusCode::BAD_REQUEST, e.error_code(), e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_code() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.error_code, "bad_request");

        let internal = ApiError::internal("disk on fire");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message, "internal server error");
    }

    #[test]
    fn token_errors_map_through_auth_errors() {
        let expired: ApiError = TokenError::Expired.into();
        assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired.error_code, "token_expired");

        let signing: ApiError = TokenError::Signing("no key".into()).into();
        assert_eq!(signing.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn oauth2_errors_keep_their_codes() {
        let unknown: ApiError = OAuth2Error::UnknownProvider("gitlab".into()).into();
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.error_code, "unknown_provider");

        let linked: ApiError = OAuth2Error::ProviderAlreadyConnected.into();
        assert_eq!(linked.status, StatusCode::BAD_REQUEST);
        assert_eq!(linked.error_code, "provider_already_connected");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
