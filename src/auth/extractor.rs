// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication.
//!
//! [`extract`] turns request headers into an [`AuthenticationOutcome`]. It
//! never fails: a missing, malformed, expired or otherwise invalid Access
//! token simply yields [`AuthenticationOutcome::None`]. Handlers that need a
//! principal ask for one explicitly:
//!
//! ```rust,ignore
//! async fn public(outcome: AuthenticationOutcome) -> impl IntoResponse { ... }
//!
//! async fn private(Auth(principal): Auth) -> impl IntoResponse { ... }
//! ```

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap,
    },
};
use tracing::debug;

use super::{AuthError, Authenticated, AuthenticationOutcome, Role};
use crate::config::HeaderAuthMode;
use crate::state::AppState;
use crate::tokens::{TokenIssuer, TokenType};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const STEP_UP_TOKEN_COOKIE: &str = "step_up_token";
pub const SESSION_TOKEN_COOKIE: &str = "session_token";

pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";
pub const STEP_UP_TOKEN_HEADER: &str = "x-step-up-token";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Cookie name for a token type carried between requests.
///
/// OAuth2 state, connection, verification, reset and invitation tokens travel
/// in query strings or bodies and have none.
pub fn cookie_name(token_type: TokenType) -> Option<&'static str> {
    match token_type {
        TokenType::Access => Some(ACCESS_TOKEN_COOKIE),
        TokenType::Refresh => Some(REFRESH_TOKEN_COOKIE),
        TokenType::StepUp => Some(STEP_UP_TOKEN_COOKIE),
        TokenType::Session => Some(SESSION_TOKEN_COOKIE),
        _ => None,
    }
}

fn header_value(headers: &HeaderMap, token_type: TokenType) -> Option<String> {
    let raw = match token_type {
        TokenType::Access => headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?,
        TokenType::Refresh => headers.get(REFRESH_TOKEN_HEADER)?.to_str().ok()?,
        TokenType::StepUp => headers.get(STEP_UP_TOKEN_HEADER)?.to_str().ok()?,
        TokenType::Session => headers.get(SESSION_TOKEN_HEADER)?.to_str().ok()?,
        _ => return None,
    };
    Some(raw.trim().to_string()).filter(|v| !v.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Locate the raw value of a token in cookies or headers.
pub fn token_value(headers: &HeaderMap, token_type: TokenType, mode: HeaderAuthMode) -> Option<String> {
    let cookie = || cookie_name(token_type).and_then(|name| cookie_value(headers, name));
    let header = || header_value(headers, token_type);

    match mode {
        HeaderAuthMode::Disabled => cookie(),
        HeaderAuthMode::Allowed => cookie().or_else(header),
        HeaderAuthMode::Preferred => header().or_else(cookie),
    }
}

/// Authenticate a request from its headers.
pub async fn extract(headers: &HeaderMap, issuer: &TokenIssuer, mode: HeaderAuthMode) -> AuthenticationOutcome {
    let Some(token) = token_value(headers, TokenType::Access, mode) else {
        return AuthenticationOutcome::None;
    };

    match issuer.verify_access(&token).await {
        Ok(claims) => Authenticated::from_claims(claims)
            .map(AuthenticationOutcome::Authenticated)
            .unwrap_or_default(),
        Err(e) => {
            debug!(code = e.error_code(), "Ignoring invalid access token");
            AuthenticationOutcome::None
        }
    }
}

impl FromRequestParts<AppState> for AuthenticationOutcome {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(outcome) = parts.extensions.get::<AuthenticationOutcome>().cloned() {
            return Ok(outcome);
        }

        let outcome = extract(&parts.headers, &state.issuer, state.config.header_mode).await;
        parts.extensions.insert(outcome.clone());
        Ok(outcome)
    }
}

/// Extractor that requires an authenticated principal.
pub struct Auth(pub Authenticated);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let outcome = AuthenticationOutcome::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        outcome.require_authentication().cloned().map(Auth)
    }
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub Authenticated);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;
        principal.require_role(Role::Admin)?;
        Ok(AdminOnly(principal))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderValue, Request};

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AuthConfig;
    use crate::tokens::issuer::tests::{fixture, user_with_session};
    use crate::users::{DeviceInfo, User};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn cookie_is_found_among_others() {
        let h = headers(&[("cookie", "theme=dark; access_token=abc ; other=1")]);
        assert_eq!(
            token_value(&h, TokenType::Access, HeaderAuthMode::Disabled).as_deref(),
            Some("abc")
        );
        assert_eq!(token_value(&h, TokenType::Refresh, HeaderAuthMode::Allowed), None);
    }

    #[test]
    fn header_mode_controls_precedence() {
        let h = headers(&[
            ("cookie", "access_token=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(
            token_value(&h, TokenType::Access, HeaderAuthMode::Allowed).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(
            token_value(&h, TokenType::Access, HeaderAuthMode::Preferred).as_deref(),
            Some("from-header")
        );

        let header_only = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(
            token_value(&header_only, TokenType::Access, HeaderAuthMode::Disabled),
            None
        );
        assert_eq!(
            token_value(&header_only, TokenType::Access, HeaderAuthMode::Allowed).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn step_up_and_session_have_their_own_headers() {
        let h = headers(&[("x-step-up-token", "su"), ("x-session-token", "st")]);
        assert_eq!(
            token_value(&h, TokenType::StepUp, HeaderAuthMode::Allowed).as_deref(),
            Some("su")
        );
        assert_eq!(
            token_value(&h, TokenType::Session, HeaderAuthMode::Allowed).as_deref(),
            Some("st")
        );
        assert_eq!(token_value(&h, TokenType::OAuth2State, HeaderAuthMode::Allowed), None);
    }

    #[tokio::test]
    async fn valid_access_token_authenticates() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let token = fx.issuer.issue_access(&user, &sid).await.unwrap();

        let h = headers(&[("authorization", &format!("Bearer {token}"))]);
        let outcome = extract(&h, &fx.issuer, HeaderAuthMode::Allowed).await;

        let principal = outcome.require_authentication().unwrap();
        assert_eq!(principal.principal_id, user.id);
        assert_eq!(principal.session_id, sid);
        // Scenario: USER principal is refused ADMIN, accepted as USER.
        assert_eq!(
            outcome.require_role(Role::Admin),
            Err(AuthError::RoleRequired(Role::Admin))
        );
        assert_eq!(outcome.require_role(Role::User), Ok(principal));
    }

    #[tokio::test]
    async fn bad_tokens_collapse_to_none() {
        let fx = fixture();
        let (user, _) = user_with_session(&fx, Some("ada@example.com")).await;
        let wrong_type = fx.issuer.issue_email_verification(&user).await.unwrap();

        for value in ["Bearer garbage", format!("Bearer {wrong_type}").as_str()] {
            let h = headers(&[("authorization", value)]);
            assert_eq!(
                extract(&h, &fx.issuer, HeaderAuthMode::Allowed).await,
                AuthenticationOutcome::None
            );
        }
        assert_eq!(
            extract(&HeaderMap::new(), &fx.issuer, HeaderAuthMode::Allowed).await,
            AuthenticationOutcome::None
        );
    }

    #[tokio::test]
    async fn expired_access_token_is_none() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let token = fx.issuer.issue_access(&user, &sid).await.unwrap();
        fx.clock.advance(fx.issuer.lifetimes().access + chrono::Duration::seconds(1));

        let h = headers(&[("cookie", &format!("access_token={token}"))]);
        assert!(!extract(&h, &fx.issuer, HeaderAuthMode::Disabled)
            .await
            .is_authenticated());
    }

    async fn state_with_admin() -> (AppState, String) {
        let clock = Arc::new(ManualClock::starting_now());
        let state = AppState::in_memory(AuthConfig::default(), clock.clone()).unwrap();
        let mut user = User::new(None, clock.now());
        user.roles.insert(Role::Admin);
        let session = user.open_session(DeviceInfo::default(), clock.now());
        let user = state.users.save(user).await.unwrap();
        let token = state.issuer.issue_access(&user, &session.id).await.unwrap();
        (state, token)
    }

    #[tokio::test]
    async fn auth_extractor_rejects_anonymous_requests() {
        let (state, _) = state_with_admin().await;
        let mut parts = Request::builder().uri("/test").body(()).unwrap().into_parts().0;

        let outcome = AuthenticationOutcome::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(outcome, AuthenticationOutcome::None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn admin_only_accepts_admin_and_caches_outcome() {
        let (state, token) = state_with_admin().await;
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let AdminOnly(principal) = AdminOnly::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(principal.is_admin());
        assert!(parts.extensions.get::<AuthenticationOutcome>().is_some());
    }

    #[tokio::test]
    async fn admin_only_rejects_non_admin() {
        let (state, _) = state_with_admin().await;
        let mut parts = Request::builder().uri("/test").body(()).unwrap().into_parts().0;
        let principal = Authenticated {
            principal_id: "user-2".to_string(),
            roles: [Role::User].into(),
            groups: Default::default(),
            session_id: "s".to_string(),
            token_id: "t".to_string(),
            expires_at: None,
        };
        parts
            .extensions
            .insert(AuthenticationOutcome::from(principal));

        let result = AdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::RoleRequired(Role::Admin))));
    }
}
