// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-type issuance and semantic validation.
//!
//! [`TokenCodec`] only proves a token is authentic and current. The issuer
//! adds what each token type means:
//!
//! - user-bound types must carry a subject
//! - Refresh, StepUp and OAuth2-ProviderConnection must name a session
//!   still present in the user's session list
//! - OAuth2-ProviderConnection must name the caller's current session
//! - EmailVerification and PasswordReset must match the user's current
//!   per-purpose secret

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::codec::{Claims, TokenCodec};
use super::error::TokenError;
use super::types::{
    AccessClaims, EmailVerificationClaims, InvitationClaims, OAuth2ProviderConnectionClaims,
    OAuth2StateClaims, PasswordResetClaims, RefreshClaims, SessionBound, SessionClaims,
    StepUpClaims, TokenPayload,
};
use crate::config::TokenLifetimes;
use crate::users::{DeviceInfo, Session, User, UserStore};

type HmacSha256 = Hmac<Sha256>;

/// Tokens handed to a client after login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_up_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub struct TokenIssuer {
    codec: TokenCodec,
    users: Arc<dyn UserStore>,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(codec: TokenCodec, users: Arc<dyn UserStore>, lifetimes: TokenLifetimes) -> Self {
        Self {
            codec,
            users,
            lifetimes,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    // =========================================================================
    // Generic
    // =========================================================================

    /// Sign `payload` as a `P` token valid for `ttl` from now.
    pub async fn issue<P: TokenPayload>(
        &self,
        subject: Option<&str>,
        payload: P,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if P::USER_BOUND && subject.is_none() {
            return Err(TokenError::MissingSubject);
        }
        let mut claims = Claims::new(P::TYPE, self.codec.clock().now(), ttl, payload);
        if let Some(subject) = subject {
            claims = claims.with_subject(subject);
        }
        self.codec.encode(&claims).await
    }

    /// Decode `token` as a `P` token and apply the subject rule.
    pub async fn verify<P: TokenPayload>(
        &self,
        token: &str,
        verify_expiry: bool,
    ) -> Result<Claims<P>, TokenError> {
        let claims = self
            .codec
            .decode_as::<P>(token, P::TYPE, verify_expiry)
            .await
            .inspect_err(|e| debug!(code = e.error_code(), typ = %P::TYPE, "Token rejected"))?;
        if P::USER_BOUND && claims.sub.is_none() {
            return Err(TokenError::MissingSubject);
        }
        Ok(claims)
    }

    /// Load the subject of a user-bound token.
    async fn subject_of<P>(&self, claims: &Claims<P>) -> Result<User, TokenError> {
        let subject = claims.subject().ok_or(TokenError::MissingSubject)?;
        self.users
            .find_by_id(subject)
            .await?
            .ok_or(TokenError::UnknownSubject)
    }

    /// Decode a session-bound token and check its session is still live.
    pub async fn verify_session_bound<P: TokenPayload + SessionBound>(
        &self,
        token: &str,
    ) -> Result<(Claims<P>, User), TokenError> {
        let claims = self.verify::<P>(token, true).await?;
        let user = self.subject_of(&claims).await?;
        if !user.has_session(claims.custom.session_id()) {
            debug!(typ = %P::TYPE, "Token session no longer live");
            return Err(TokenError::SessionRevoked);
        }
        Ok((claims, user))
    }

    // =========================================================================
    // Access / Refresh / StepUp
    // =========================================================================

    /// Access token with a snapshot of the user's current roles and groups.
    pub async fn issue_access(&self, user: &User, session_id: &str) -> Result<String, TokenError> {
        let payload = AccessClaims {
            roles: user.roles.clone(),
            groups: user.groups.clone(),
            session_id: session_id.to_string(),
            token_id: Uuid::new_v4().to_string(),
        };
        self.issue(Some(&user.id), payload, self.lifetimes.access)
            .await
    }

    /// Stateless check: the session list is not consulted.
    pub async fn verify_access(&self, token: &str) -> Result<Claims<AccessClaims>, TokenError> {
        self.verify(token, true).await
    }

    pub async fn issue_refresh(&self, user: &User, session: &Session) -> Result<String, TokenError> {
        let payload = RefreshClaims {
            session_id: session.id.clone(),
            device_info: session.device.clone(),
        };
        self.issue(Some(&user.id), payload, self.lifetimes.refresh)
            .await
    }

    pub async fn verify_refresh(
        &self,
        token: &str,
    ) -> Result<(Claims<RefreshClaims>, User), TokenError> {
        self.verify_session_bound(token).await
    }

    pub async fn issue_step_up(&self, user_id: &str, session_id: &str) -> Result<String, TokenError> {
        let payload = StepUpClaims {
            session_id: session_id.to_string(),
        };
        self.issue(Some(user_id), payload, self.lifetimes.step_up)
            .await
    }

    pub async fn verify_step_up(
        &self,
        token: &str,
    ) -> Result<(Claims<StepUpClaims>, User), TokenError> {
        self.verify_session_bound(token).await
    }

    /// Access + Refresh (and optionally StepUp) for one session.
    pub async fn issue_session_tokens(
        &self,
        user: &User,
        session_id: &str,
        step_up: bool,
    ) -> Result<IssuedTokens, TokenError> {
        let session = user
            .session(session_id)
            .ok_or(TokenError::SessionRevoked)?;

        let access_token = self.issue_access(user, session_id).await?;
        let refresh_token = self.issue_refresh(user, session).await?;
        let step_up_token = if step_up {
            Some(self.issue_step_up(&user.id, session_id).await?)
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            step_up_token,
            expires_in: self.lifetimes.access.num_seconds(),
        })
    }

    /// Exchange a live Refresh token for a fresh Access token and a rotated
    /// Refresh token on the same session.
    ///
    /// Roles and groups are re-read from the store, so this is where an Access
    /// token snapshot catches up with the user's current state.
    pub async fn refresh(&self, token: &str) -> Result<IssuedTokens, TokenError> {
        let (claims, user) = self.verify_refresh(token).await?;
        let tokens = self
            .issue_session_tokens(&user, &claims.custom.session_id, false)
            .await?;
        info!(user_id = %user.id, "Refreshed session tokens");
        Ok(tokens)
    }

    // =========================================================================
    // Session / OAuth2
    // =========================================================================

    pub async fn issue_session(&self, device: DeviceInfo) -> Result<String, TokenError> {
        self.issue(None, SessionClaims { device }, self.lifetimes.session)
            .await
    }

    pub async fn verify_session(&self, token: &str) -> Result<Claims<SessionClaims>, TokenError> {
        self.verify(token, true).await
    }

    pub async fn issue_oauth2_state(&self, state: OAuth2StateClaims) -> Result<String, TokenError> {
        self.issue(None, state, self.lifetimes.oauth2_state).await
    }

    pub async fn verify_oauth2_state(
        &self,
        token: &str,
    ) -> Result<Claims<OAuth2StateClaims>, TokenError> {
        self.verify(token, true).await
    }

    pub async fn issue_connection(
        &self,
        user_id: &str,
        session_id: &str,
        provider: &str,
    ) -> Result<String, TokenError> {
        let payload = OAuth2ProviderConnectionClaims {
            session_id: session_id.to_string(),
            provider: provider.to_string(),
        };
        self.issue(Some(user_id), payload, self.lifetimes.oauth2_connection)
            .await
    }

    /// Verify a provider-connection token for the caller's session.
    ///
    /// Fails with [`TokenError::SessionMismatch`] when the token was issued to
    /// a different session than `current_session`, or the caller has none.
    pub async fn verify_connection(
        &self,
        token: &str,
        current_session: Option<&str>,
    ) -> Result<(Claims<OAuth2ProviderConnectionClaims>, User), TokenError> {
        let claims = self
            .verify::<OAuth2ProviderConnectionClaims>(token, true)
            .await?;
        if current_session != Some(claims.custom.session_id.as_str()) {
            return Err(TokenError::SessionMismatch);
        }
        let user = self.subject_of(&claims).await?;
        if !user.has_session(&claims.custom.session_id) {
            return Err(TokenError::SessionRevoked);
        }
        Ok((claims, user))
    }

    // =========================================================================
    // EmailVerification / PasswordReset / Invitation
    // =========================================================================

    pub async fn issue_email_verification(&self, user: &User) -> Result<String, TokenError> {
        let email = user
            .email
            .clone()
            .ok_or_else(|| TokenError::InvalidClaims("user has no email".to_string()))?;
        let secret = digest(
            &user.email_verification_secret,
            &verification_message(&user.id, &email),
        )?;
        let payload = EmailVerificationClaims { email, secret };
        self.issue(Some(&user.id), payload, self.lifetimes.email_verification)
            .await
    }

    /// Valid only while the user's verification secret and email are unchanged.
    pub async fn verify_email_verification(
        &self,
        token: &str,
    ) -> Result<(Claims<EmailVerificationClaims>, User), TokenError> {
        let claims = self.verify::<EmailVerificationClaims>(token, true).await?;
        let user = self.subject_of(&claims).await?;
        let email_matches = user
            .email
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(&claims.custom.email));
        if !email_matches {
            return Err(TokenError::SecretMismatch);
        }
        verify_digest(
            &user.email_verification_secret,
            &verification_message(&user.id, &claims.custom.email),
            &claims.custom.secret,
        )?;
        Ok((claims, user))
    }

    pub async fn issue_password_reset(&self, user: &User) -> Result<String, TokenError> {
        let secret = digest(&user.password_reset_secret, &reset_message(&user.id))?;
        self.issue(
            Some(&user.id),
            PasswordResetClaims { secret },
            self.lifetimes.password_reset,
        )
        .await
    }

    /// Valid only while the user's password reset secret is unchanged.
    pub async fn verify_password_reset(
        &self,
        token: &str,
    ) -> Result<(Claims<PasswordResetClaims>, User), TokenError> {
        let claims = self.verify::<PasswordResetClaims>(token, true).await?;
        let user = self.subject_of(&claims).await?;
        verify_digest(
            &user.password_reset_secret,
            &reset_message(&user.id),
            &claims.custom.secret,
        )?;
        Ok((claims, user))
    }

    pub async fn issue_invitation(&self, invitation_id: &str) -> Result<String, TokenError> {
        let payload = InvitationClaims {
            invitation_id: invitation_id.to_string(),
        };
        self.issue(None, payload, self.lifetimes.invitation).await
    }

    pub async fn verify_invitation(
        &self,
        token: &str,
    ) -> Result<Claims<InvitationClaims>, TokenError> {
        self.verify(token, true).await
    }
}

fn verification_message(user_id: &str, email: &str) -> String {
    format!("email_verification:{user_id}:{}", email.to_ascii_lowercase())
}

fn reset_message(user_id: &str) -> String {
    format!("password_reset:{user_id}")
}

fn mac_for(secret: &str, message: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TokenError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac)
}

fn digest(secret: &str, message: &str) -> Result<String, TokenError> {
    let tag = mac_for(secret, message)?.finalize().into_bytes();
    Ok(Base64UrlUnpadded::encode_string(&tag))
}

fn verify_digest(secret: &str, message: &str, presented: &str) -> Result<(), TokenError> {
    let presented =
        Base64UrlUnpadded::decode_vec(presented).map_err(|_| TokenError::SecretMismatch)?;
    mac_for(secret, message)?
        .verify_slice(&presented)
        .map_err(|_| TokenError::SecretMismatch)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::auth::Role;
    use crate::clock::{Clock, ManualClock};
    use crate::keys::{KeyStore, KeyStoreConfig};
    use crate::tokens::error::TokenErrorCategory;
    use crate::tokens::types::TokenType;
    use crate::users::InMemoryUserStore;

    pub(crate) struct Fixture {
        pub issuer: TokenIssuer,
        pub users: Arc<InMemoryUserStore>,
        pub clock: Arc<ManualClock>,
        pub keys: Arc<KeyStore>,
    }

    pub(crate) fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let keys = Arc::new(KeyStore::generated(KeyStoreConfig::default(), clock.clone()).unwrap());
        let users = Arc::new(InMemoryUserStore::new());
        let codec = TokenCodec::new(keys.clone(), clock.clone());
        let issuer = TokenIssuer::new(codec, users.clone(), TokenLifetimes::default());
        Fixture {
            issuer,
            users,
            clock,
            keys,
        }
    }

    /// A saved user with one open session.
    pub(crate) async fn user_with_session(fx: &Fixture, email: Option<&str>) -> (User, String) {
        let mut user = User::new(email.map(str::to_string), fx.clock.now());
        let session = user.open_session(DeviceInfo::default(), fx.clock.now());
        let user = fx.users.save(user).await.unwrap();
        (user, session.id)
    }

    async fn revoke(fx: &Fixture, user: &User, session_id: &str) {
        let mut user = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        user.revoke_session(session_id);
        fx.users.save(user).await.unwrap();
    }

    #[tokio::test]
    async fn every_type_round_trips() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, Some("ada@example.com")).await;

        let access = fx.issuer.issue_access(&user, &sid).await.unwrap();
        let claims = fx.issuer.verify_access(&access).await.unwrap();
        assert_eq!(claims.sub.as_deref(), Some(user.id.as_str()));
        assert_eq!(claims.custom.session_id, sid);
        assert_eq!(claims.custom.roles, BTreeSet::from([Role::User]));

        let refresh = fx
            .issuer
            .issue_refresh(&user, user.session(&sid).unwrap())
            .await
            .unwrap();
        assert_eq!(fx.issuer.verify_refresh(&refresh).await.unwrap().0.custom.session_id, sid);

        let step_up = fx.issuer.issue_step_up(&user.id, &sid).await.unwrap();
        assert_eq!(fx.issuer.verify_step_up(&step_up).await.unwrap().0.custom.session_id, sid);

        let device = DeviceInfo {
            browser: Some("Firefox".to_string()),
            ..Default::default()
        };
        let session = fx.issuer.issue_session(device.clone()).await.unwrap();
        let decoded = fx.issuer.verify_session(&session).await.unwrap();
        assert_eq!(decoded.custom.device, device);
        assert_eq!(decoded.sub, None);

        let state = OAuth2StateClaims {
            random_state: "rnd".to_string(),
            provider: "github".to_string(),
            session_token: Some(session.clone()),
            redirect_uri: Some("https://app.example.com/done".to_string()),
            connection_token: None,
            step_up: true,
        };
        let encoded = fx.issuer.issue_oauth2_state(state.clone()).await.unwrap();
        assert_eq!(fx.issuer.verify_oauth2_state(&encoded).await.unwrap().custom, state);

        let connection = fx.issuer.issue_connection(&user.id, &sid, "github").await.unwrap();
        let (claims, _) = fx
            .issuer
            .verify_connection(&connection, Some(&sid))
            .await
            .unwrap();
        assert_eq!(claims.custom.provider, "github");

        let verification = fx.issuer.issue_email_verification(&user).await.unwrap();
        assert!(fx.issuer.verify_email_verification(&verification).await.is_ok());

        let reset = fx.issuer.issue_password_reset(&user).await.unwrap();
        assert!(fx.issuer.verify_password_reset(&reset).await.is_ok());

        let invitation = fx.issuer.issue_invitation("inv-7").await.unwrap();
        assert_eq!(
            fx.issuer.verify_invitation(&invitation).await.unwrap().custom.invitation_id,
            "inv-7"
        );
    }

    #[tokio::test]
    async fn user_bound_types_require_a_subject() {
        let fx = fixture();
        let payload = StepUpClaims {
            session_id: "s".to_string(),
        };
        assert!(matches!(
            fx.issuer.issue(None, payload, Duration::minutes(5)).await,
            Err(TokenError::MissingSubject)
        ));

        // Forged without a subject through the raw codec.
        let claims = Claims::new(
            TokenType::StepUp,
            fx.clock.now(),
            Duration::minutes(5),
            StepUpClaims {
                session_id: "s".to_string(),
            },
        );
        let token = fx.issuer.codec().encode(&claims).await.unwrap();
        assert!(matches!(
            fx.issuer.verify_step_up(&token).await,
            Err(TokenError::MissingSubject)
        ));
    }

    #[tokio::test]
    async fn revoked_session_rejects_session_bound_tokens() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;

        let refresh = fx
            .issuer
            .issue_refresh(&user, user.session(&sid).unwrap())
            .await
            .unwrap();
        let step_up = fx.issuer.issue_step_up(&user.id, &sid).await.unwrap();
        let connection = fx.issuer.issue_connection(&user.id, &sid, "github").await.unwrap();
        let access = fx.issuer.issue_access(&user, &sid).await.unwrap();

        revoke(&fx, &user, &sid).await;

        let err = fx.issuer.verify_refresh(&refresh).await.unwrap_err();
        assert!(matches!(err, TokenError::SessionRevoked));
        assert_eq!(err.category(), TokenErrorCategory::InvalidToken);
        assert!(matches!(
            fx.issuer.verify_step_up(&step_up).await,
            Err(TokenError::SessionRevoked)
        ));
        assert!(matches!(
            fx.issuer.verify_connection(&connection, Some(&sid)).await,
            Err(TokenError::SessionRevoked)
        ));
        // Access tokens ride out their own TTL.
        assert!(fx.issuer.verify_access(&access).await.is_ok());
    }

    #[tokio::test]
    async fn connection_token_is_bound_to_the_requesting_session() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let token = fx.issuer.issue_connection(&user.id, &sid, "github").await.unwrap();

        assert!(matches!(
            fx.issuer.verify_connection(&token, Some("other-session")).await,
            Err(TokenError::SessionMismatch)
        ));
        assert!(matches!(
            fx.issuer.verify_connection(&token, None).await,
            Err(TokenError::SessionMismatch)
        ));
    }

    #[tokio::test]
    async fn refresh_picks_up_live_roles() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let tokens = fx.issuer.issue_session_tokens(&user, &sid, false).await.unwrap();
        assert!(tokens.step_up_token.is_none());

        let mut promoted = user.clone();
        promoted.roles.insert(Role::Admin);
        promoted.groups.insert("ops".to_string());
        fx.users.save(promoted).await.unwrap();

        let stale = fx.issuer.verify_access(&tokens.access_token).await.unwrap();
        assert!(!stale.custom.roles.contains(&Role::Admin));

        let refreshed = fx.issuer.refresh(&tokens.refresh_token).await.unwrap();
        let fresh = fx.issuer.verify_access(&refreshed.access_token).await.unwrap();
        assert!(fresh.custom.roles.contains(&Role::Admin));
        assert!(fresh.custom.groups.contains("ops"));
        assert_eq!(fresh.custom.session_id, sid);
        assert_eq!(refreshed.expires_in, TokenLifetimes::default().access.num_seconds());
    }

    #[tokio::test]
    async fn refresh_of_revoked_session_fails() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let tokens = fx.issuer.issue_session_tokens(&user, &sid, true).await.unwrap();
        assert!(tokens.step_up_token.is_some());

        revoke(&fx, &user, &sid).await;
        assert!(matches!(
            fx.issuer.refresh(&tokens.refresh_token).await,
            Err(TokenError::SessionRevoked)
        ));
    }

    #[tokio::test]
    async fn rotating_user_secret_invalidates_verification_and_reset() {
        let fx = fixture();
        let (user, _) = user_with_session(&fx, Some("ada@example.com")).await;
        let verification = fx.issuer.issue_email_verification(&user).await.unwrap();
        let reset = fx.issuer.issue_password_reset(&user).await.unwrap();

        let mut rotated = user.clone();
        rotated.rotate_email_verification_secret();
        rotated.rotate_password_reset_secret();
        fx.users.save(rotated).await.unwrap();

        assert!(matches!(
            fx.issuer.verify_email_verification(&verification).await,
            Err(TokenError::SecretMismatch)
        ));
        assert!(matches!(
            fx.issuer.verify_password_reset(&reset).await,
            Err(TokenError::SecretMismatch)
        ));
    }

    #[tokio::test]
    async fn changed_email_invalidates_verification() {
        let fx = fixture();
        let (user, _) = user_with_session(&fx, Some("ada@example.com")).await;
        let token = fx.issuer.issue_email_verification(&user).await.unwrap();

        let mut changed = user.clone();
        changed.email = Some("ada@elsewhere.org".to_string());
        fx.users.save(changed).await.unwrap();

        assert!(matches!(
            fx.issuer.verify_email_verification(&token).await,
            Err(TokenError::SecretMismatch)
        ));
    }

    #[tokio::test]
    async fn email_verification_needs_an_email() {
        let fx = fixture();
        let (user, _) = user_with_session(&fx, None).await;
        assert!(matches!(
            fx.issuer.issue_email_verification(&user).await,
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[tokio::test]
    async fn deleted_user_is_unknown_subject() {
        let fx = fixture();
        let user = User::new(None, fx.clock.now());
        let token = fx.issuer.issue_step_up(&user.id, "s").await.unwrap();
        assert!(matches!(
            fx.issuer.verify_step_up(&token).await,
            Err(TokenError::UnknownSubject)
        ));
    }

    #[tokio::test]
    async fn step_up_expires_after_its_short_ttl() {
        let fx = fixture();
        let (user, sid) = user_with_session(&fx, None).await;
        let token = fx.issuer.issue_step_up(&user.id, &sid).await.unwrap();

        fx.clock
            .advance(TokenLifetimes::default().step_up + Duration::seconds(1));
        let err = fx.issuer.verify_step_up(&token).await.unwrap_err();
        assert_eq!(err.category(), TokenErrorCategory::Expired);
    }
}
