// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth2 flow failures.
//!
//! Every recognized failure has a stable snake_case code. The callback turns
//! them into `<error-uri>?error=<code>` redirects; anything unrecognized
//! becomes `server_error`.

use url::Url;

use super::provider::ProviderError;
use crate::tokens::TokenError;
use crate::users::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OAuth2Error {
    #[error("linking an existing account requires a provider connection token")]
    ConnectionTokenMissing,

    #[error("provider connection token has expired")]
    ConnectionTokenExpired,

    #[error("provider connection token belongs to another session")]
    ConnectionTokenSessionMismatch,

    #[error("provider connection token was issued for another provider")]
    ConnectionTokenProviderMismatch,

    #[error("provider connection token is invalid")]
    InvalidConnectionToken,

    #[error("provider is already connected")]
    ProviderAlreadyConnected,

    #[error("email is already registered")]
    EmailAlreadyRegistered,

    #[error("state parameter is missing")]
    StateParameterMissing,

    #[error("state parameter is invalid")]
    StateParameterInvalid,

    #[error("session token is missing")]
    SessionTokenMissing,

    #[error("session token has expired")]
    SessionTokenExpired,

    #[error("session token is invalid")]
    SessionTokenInvalid,

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("identity provider denied the request: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OAuth2Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuth2Error::ConnectionTokenMissing => "connection_token_missing",
            OAuth2Error::ConnectionTokenExpired => "connection_token_expired",
            OAuth2Error::ConnectionTokenSessionMismatch => "connection_token_session_mismatch",
            OAuth2Error::ConnectionTokenProviderMismatch => "connection_token_provider_mismatch",
            OAuth2Error::InvalidConnectionToken => "invalid_connection_token",
            OAuth2Error::ProviderAlreadyConnected => "provider_already_connected",
            OAuth2Error::EmailAlreadyRegistered => "email_already_registered",
            OAuth2Error::StateParameterMissing => "state_parameter_missing",
            OAuth2Error::StateParameterInvalid => "state_parameter_invalid",
            OAuth2Error::SessionTokenMissing => "session_token_missing",
            OAuth2Error::SessionTokenExpired => "session_token_expired",
            OAuth2Error::SessionTokenInvalid => "session_token_invalid",
            OAuth2Error::UnknownProvider(_) => "unknown_provider",
            OAuth2Error::AccessDenied(_) => "access_denied",
            OAuth2Error::Provider(_) | OAuth2Error::Token(_) | OAuth2Error::Store(_) => {
                "server_error"
            }
        }
    }

    /// `error_uri` with `error=<code>` appended to its query.
    pub fn error_redirect(&self, error_uri: &str) -> String {
        append_query(error_uri, "error", self.error_code())
    }
}

/// Append one query pair to an absolute or path-only URI.
pub(crate) fn append_query(uri: &str, key: &str, value: &str) -> String {
    if let Ok(mut url) = Url::parse(uri) {
        url.query_pairs_mut().append_pair(key, value);
        return url.to_string();
    }
    let encoded: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(
            OAuth2Error::ConnectionTokenSessionMismatch.error_code(),
            "connection_token_session_mismatch"
        );
        assert_eq!(
            OAuth2Error::Token(TokenError::Signing("x".into())).error_code(),
            "server_error"
        );
    }

    #[test]
    fn error_redirect_appends_code() {
        assert_eq!(
            OAuth2Error::ProviderAlreadyConnected.error_redirect("/login/error"),
            "/login/error?error=provider_already_connected"
        );
        assert_eq!(
            OAuth2Error::StateParameterMissing.error_redirect("/login/error?lang=en"),
            "/login/error?lang=en&error=state_parameter_missing"
        );
        assert_eq!(
            OAuth2Error::EmailAlreadyRegistered.error_redirect("https://app.example.com/err"),
            "https://app.example.com/err?error=email_already_registered"
        );
    }
}
