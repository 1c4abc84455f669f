// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider callback handling.
//!
//! ## Decision table
//!
//! | Connection token | Identity linked | Email registered | Result |
//! |---|---|---|---|
//! | valid, same session, same provider | no | any | link to token's user |
//! | valid, provider already on user or identity taken | any | any | `provider_already_connected` |
//! | expired / other session / other provider / invalid | any | any | distinct code per case |
//! | absent | yes | any | log in as the linked user |
//! | absent | no | no (or no email) | register a new user |
//! | absent | no | yes, caller signed in | `connection_token_missing` |
//! | absent | no | yes, anonymous | `email_already_registered` |
//!
//! Login and registration open a new session from the device fingerprint in
//! the Session token; linking keeps the caller's current session.
//!
//! A requested step-up is only granted when the provider re-authenticated the
//! account owner, i.e. on login and registration. Linking proves control of
//! the new identity, not of the account, so it never elevates the session.

use serde::Deserialize;
use tracing::{info, warn};
use utoipa::IntoParams;

use super::provider::{ExternalIdentity, ProviderRegistry};
use super::OAuth2Error;
use crate::auth::AuthenticationOutcome;
use crate::tokens::{IssuedTokens, TokenError, TokenErrorCategory, TokenIssuer};
use crate::users::{Identity, User};

/// Query parameters the provider sends back.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declined or the request was invalid.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Registered,
    LoggedIn,
    Linked,
}

/// The user an external identity resolved to.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub user: User,
    /// Existing session to issue tokens for; `None` means open a new one.
    pub session_id: Option<String>,
    pub kind: ResolutionKind,
}

#[derive(Debug, Clone)]
pub struct CallbackSuccess {
    pub user_id: String,
    pub kind: ResolutionKind,
    pub tokens: IssuedTokens,
    pub redirect_uri: Option<String>,
}

/// What the HTTP layer should do after a callback.
#[derive(Debug, Clone)]
pub enum CallbackResponse {
    /// Redirect to `redirect_uri` when present, otherwise respond 200.
    Success(CallbackSuccess),
    /// Redirect to the configured error URI.
    Failure {
        location: String,
        error_code: &'static str,
    },
}

pub struct CallbackHandler<'a> {
    issuer: &'a TokenIssuer,
    providers: &'a ProviderRegistry,
}

fn connection_error(e: TokenError) -> OAuth2Error {
    match e {
        TokenError::Expired => OAuth2Error::ConnectionTokenExpired,
        TokenError::SessionMismatch => OAuth2Error::ConnectionTokenSessionMismatch,
        e if e.category() == TokenErrorCategory::Internal => OAuth2Error::Token(e),
        _ => OAuth2Error::InvalidConnectionToken,
    }
}

fn session_token_error(e: TokenError) -> OAuth2Error {
    match e.category() {
        TokenErrorCategory::Expired => OAuth2Error::SessionTokenExpired,
        TokenErrorCategory::Internal => OAuth2Error::Token(e),
        _ => OAuth2Error::SessionTokenInvalid,
    }
}

impl<'a> CallbackHandler<'a> {
    pub fn new(issuer: &'a TokenIssuer, providers: &'a ProviderRegistry) -> Self {
        Self { issuer, providers }
    }

    /// Run the callback and turn every failure into an error redirect.
    pub async fn respond(
        &self,
        provider: &str,
        query: CallbackQuery,
        caller: &AuthenticationOutcome,
        error_uri: &str,
    ) -> CallbackResponse {
        match self.handle(provider, query, caller).await {
            Ok(success) => CallbackResponse::Success(success),
            Err(e) => {
                warn!(provider, code = e.error_code(), error = %e, "OAuth2 callback failed");
                CallbackResponse::Failure {
                    location: e.error_redirect(error_uri),
                    error_code: e.error_code(),
                }
            }
        }
    }

    pub async fn handle(
        &self,
        provider: &str,
        query: CallbackQuery,
        caller: &AuthenticationOutcome,
    ) -> Result<CallbackSuccess, OAuth2Error> {
        let provider = self
            .providers
            .get(provider)
            .ok_or_else(|| OAuth2Error::UnknownProvider(provider.to_string()))?;

        let state_token = query.state.ok_or(OAuth2Error::StateParameterMissing)?;
        let state = self
            .issuer
            .verify_oauth2_state(&state_token)
            .await
            .map_err(|e| match e.category() {
                TokenErrorCategory::Internal => OAuth2Error::Token(e),
                _ => OAuth2Error::StateParameterInvalid,
            })?
            .custom;
        if !state.provider.eq_ignore_ascii_case(provider.name()) {
            return Err(OAuth2Error::StateParameterInvalid);
        }

        if let Some(error) = query.error {
            return Err(OAuth2Error::AccessDenied(error));
        }
        let code = query
            .code
            .ok_or_else(|| OAuth2Error::AccessDenied("authorization code missing".to_string()))?;

        // Login and registration need the pre-redirect fingerprint; linking
        // reuses the caller's session.
        let device = match state.connection_token {
            Some(_) => None,
            None => {
                let token = state
                    .session_token
                    .as_deref()
                    .ok_or(OAuth2Error::SessionTokenMissing)?;
                let claims = self
                    .issuer
                    .verify_session(token)
                    .await
                    .map_err(session_token_error)?;
                Some(claims.custom.device)
            }
        };

        let identity = provider.authenticate(&code).await?;
        let Resolution {
            mut user,
            session_id,
            kind,
        } = self
            .connect(identity, state.connection_token.as_deref(), caller)
            .await?;

        let session_id = match session_id {
            Some(id) => id,
            None => {
                let now = self.issuer.codec().clock().now();
                let session = user.open_session(device.unwrap_or_default(), now);
                user = self.issuer.users().save(user).await?;
                session.id
            }
        };

        let step_up = state.step_up && kind != ResolutionKind::Linked;
        let tokens = self
            .issuer
            .issue_session_tokens(&user, &session_id, step_up)
            .await?;

        info!(user_id = %user.id, ?kind, "OAuth2 callback succeeded");
        Ok(CallbackSuccess {
            user_id: user.id,
            kind,
            tokens,
            redirect_uri: state.redirect_uri,
        })
    }

    /// Resolve an authenticated external identity to a user.
    pub async fn connect(
        &self,
        identity: ExternalIdentity,
        connection_token: Option<&str>,
        caller: &AuthenticationOutcome,
    ) -> Result<Resolution, OAuth2Error> {
        let users = self.issuer.users();
        let now = self.issuer.codec().clock().now();

        if let Some(token) = connection_token {
            let (claims, mut user) = self
                .issuer
                .verify_connection(token, caller.session_id())
                .await
                .map_err(connection_error)?;

            if claims.custom.provider != identity.provider {
                return Err(OAuth2Error::ConnectionTokenProviderMismatch);
            }
            if user.is_connected(&identity.provider)
                || users
                    .find_by_identity(&identity.provider, &identity.subject)
                    .await?
                    .is_some()
            {
                return Err(OAuth2Error::ProviderAlreadyConnected);
            }

            user.connect(Identity {
                provider: identity.provider.clone(),
                subject: identity.subject,
                email: identity.email,
                connected_at: now,
            });
            let user = users.save(user).await?;
            info!(user_id = %user.id, provider = %identity.provider, "Linked external identity");
            return Ok(Resolution {
                user,
                session_id: Some(claims.custom.session_id),
                kind: ResolutionKind::Linked,
            });
        }

        if let Some(user) = users
            .find_by_identity(&identity.provider, &identity.subject)
            .await?
        {
            return Ok(Resolution {
                user,
                session_id: None,
                kind: ResolutionKind::LoggedIn,
            });
        }

        if let Some(email) = identity.email.as_deref() {
            if users.exists_by_email(email).await? {
                return Err(if caller.is_authenticated() {
                    OAuth2Error::ConnectionTokenMissing
                } else {
                    OAuth2Error::EmailAlreadyRegistered
                });
            }
        }

        let mut user = User::new(identity.email.clone(), now);
        user.connect(Identity {
            provider: identity.provider.clone(),
            subject: identity.subject,
            email: identity.email,
            connected_at: now,
        });
        let user = users.save(user).await?;
        info!(user_id = %user.id, provider = %identity.provider, "Registered user from external identity");
        Ok(Resolution {
            user,
            session_id: None,
            kind: ResolutionKind::Registered,
        })
    }
}
