// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization request resolution.
//!
//! Before redirecting to the provider, everything the callback will need is
//! packed into a signed OAuth2-State token and sent as the `state` parameter.
//! The provider hands it back untouched, so no server-side flow state exists.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;
use utoipa::IntoParams;

use super::provider::IdentityProvider;
use super::OAuth2Error;
use crate::config::OAuth2Config;
use crate::tokens::{OAuth2StateClaims, TokenError, TokenIssuer};

/// Query parameters accepted when starting a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationRequest {
    /// Pre-authentication Session token carrying the device fingerprint.
    #[serde(rename = "session-token")]
    pub session_token: Option<String>,
    /// Where to send the user agent after success.
    #[serde(rename = "redirect-uri")]
    pub redirect_uri: Option<String>,
    /// Present when linking the provider to the signed-in user.
    #[serde(rename = "oauth2-provider-connection-token")]
    pub connection_token: Option<String>,
    /// Also issue a StepUp token on success.
    #[serde(rename = "step-up", default)]
    pub step_up: bool,
}

/// Whether a post-login redirect target is acceptable.
///
/// Relative paths are always allowed. Absolute URLs must be http(s) and, when
/// `allowed_hosts` is non-empty, point at one of them.
pub fn is_allowed_redirect(uri: &str, allowed_hosts: &[String]) -> bool {
    if uri.starts_with('/') && !uri.starts_with("//") {
        return true;
    }
    let Ok(url) = Url::parse(uri) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host_str() {
        Some(host) => {
            allowed_hosts.is_empty() || allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
        }
        None => false,
    }
}

fn random_state() -> Result<String, OAuth2Error> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| TokenError::Signing("secure random generator failed".to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Encode `request` into a state token and build the provider redirect.
pub async fn authorization_redirect(
    provider: &dyn IdentityProvider,
    request: AuthorizationRequest,
    issuer: &TokenIssuer,
    config: &OAuth2Config,
) -> Result<String, OAuth2Error> {
    let redirect_uri = request.redirect_uri.filter(|uri| {
        let allowed = is_allowed_redirect(uri, &config.allowed_redirect_hosts);
        if !allowed {
            warn!(provider = provider.name(), "Dropping disallowed redirect URI");
        }
        allowed
    });

    let state = OAuth2StateClaims {
        random_state: random_state()?,
        provider: provider.name().to_string(),
        session_token: request.session_token,
        redirect_uri,
        connection_token: request.connection_token,
        step_up: request.step_up,
    };
    let linking = state.connection_token.is_some();
    let token = issuer.issue_oauth2_state(state).await?;

    debug!(provider = provider.name(), linking, "Redirecting to identity provider");
    Ok(provider.authorization_url(&token)?)
}
