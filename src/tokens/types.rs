// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token type tags and the per-type claim payloads.
//!
//! Every payload is flattened next to the registered claims (`sub`, `iat`,
//! `exp`, `nbf`, `typ`). User-bound types carry the user id in `sub`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::auth::Role;
use crate::users::DeviceInfo;

/// The type tag stamped into every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "refresh")]
    Refresh,
    #[serde(rename = "step_up")]
    StepUp,
    #[serde(rename = "session")]
    Session,
    #[serde(rename = "oauth2_state")]
    OAuth2State,
    #[serde(rename = "oauth2_connection")]
    OAuth2ProviderConnection,
    #[serde(rename = "email_verification")]
    EmailVerification,
    #[serde(rename = "password_reset")]
    PasswordReset,
    #[serde(rename = "invitation")]
    Invitation,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::StepUp => "step_up",
            TokenType::Session => "session",
            TokenType::OAuth2State => "oauth2_state",
            TokenType::OAuth2ProviderConnection => "oauth2_connection",
            TokenType::EmailVerification => "email_verification",
            TokenType::PasswordReset => "password_reset",
            TokenType::Invitation => "invitation",
        }
    }

    pub fn from_tag(tag: &str) -> Option<TokenType> {
        [
            TokenType::Access,
            TokenType::Refresh,
            TokenType::StepUp,
            TokenType::Session,
            TokenType::OAuth2State,
            TokenType::OAuth2ProviderConnection,
            TokenType::EmailVerification,
            TokenType::PasswordReset,
            TokenType::Invitation,
        ]
        .into_iter()
        .find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim payload tied to exactly one token type.
pub trait TokenPayload: Serialize + DeserializeOwned + Send + Sync {
    const TYPE: TokenType;
    /// Whether `sub` (the user id) is mandatory.
    const USER_BOUND: bool;
}

/// Payloads whose validity depends on a live session.
pub trait SessionBound {
    fn session_id(&self) -> &str;
}

/// Request credential. Roles and groups are a snapshot taken at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub roles: BTreeSet<Role>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(rename = "sid")]
    pub session_id: String,
    #[serde(rename = "jti")]
    pub token_id: String,
}

impl TokenPayload for AccessClaims {
    const TYPE: TokenType = TokenType::Access;
    const USER_BOUND: bool = true;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(rename = "sid")]
    pub session_id: String,
    #[serde(rename = "device", default)]
    pub device_info: DeviceInfo,
}

impl TokenPayload for RefreshClaims {
    const TYPE: TokenType = TokenType::Refresh;
    const USER_BOUND: bool = true;
}

impl SessionBound for RefreshClaims {
    fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpClaims {
    #[serde(rename = "sid")]
    pub session_id: String,
}

impl TokenPayload for StepUpClaims {
    const TYPE: TokenType = TokenType::StepUp;
    const USER_BOUND: bool = true;
}

impl SessionBound for StepUpClaims {
    fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Pre-authentication device fingerprint. Not user-bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(flatten)]
    pub device: DeviceInfo,
}

impl TokenPayload for SessionClaims {
    const TYPE: TokenType = TokenType::Session;
    const USER_BOUND: bool = false;
}

/// Redirect-flow context carried through the provider as `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2StateClaims {
    #[serde(rename = "rnd")]
    pub random_state: String,
    /// Provider the flow was started for; the callback must match it.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub step_up: bool,
}

impl TokenPayload for OAuth2StateClaims {
    const TYPE: TokenType = TokenType::OAuth2State;
    const USER_BOUND: bool = false;
}

/// Authorizes linking a provider identity within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2ProviderConnectionClaims {
    #[serde(rename = "sid")]
    pub session_id: String,
    pub provider: String,
}

impl TokenPayload for OAuth2ProviderConnectionClaims {
    const TYPE: TokenType = TokenType::OAuth2ProviderConnection;
    const USER_BOUND: bool = true;
}

impl SessionBound for OAuth2ProviderConnectionClaims {
    fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// `secret` is a digest of the user's current verification secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerificationClaims {
    pub email: String,
    pub secret: String,
}

impl TokenPayload for EmailVerificationClaims {
    const TYPE: TokenType = TokenType::EmailVerification;
    const USER_BOUND: bool = true;
}

/// `secret` is a digest of the user's current password reset secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetClaims {
    pub secret: String,
}

impl TokenPayload for PasswordResetClaims {
    const TYPE: TokenType = TokenType::PasswordReset;
    const USER_BOUND: bool = true;
}

/// Stateless pointer to an externally stored invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationClaims {
    pub invitation_id: String,
}

impl TokenPayload for InvitationClaims {
    const TYPE: TokenType = TokenType::Invitation;
    const USER_BOUND: bool = false;
}
