// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Generic sign/verify layer shared by every token type.
//!
//! ## Encoding
//!
//! Tokens are compact JWS (HMAC) with the signing key id in `kid` and the
//! type tag in both the header `typ` and the `typ` claim.
//!
//! ## Decoding order
//!
//! 1. Header parses and names the store's algorithm (`none` never parses).
//! 2. `kid` resolves in the [`KeyStore`], including retired secrets.
//! 3. Signature verifies.
//! 4. Type tag matches what the caller expects.
//! 5. `nbf` is not in the future.
//! 6. `exp` has not passed, unless the caller opted out of expiry checks.
//!
//! Temporal checks use the injected [`Clock`], not the library's wall clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::TokenError;
use super::types::TokenType;
use crate::clock::Clock;
use crate::keys::KeyStore;

/// A claim set: registered claims plus a type-specific payload.
///
/// With the default parameter the payload is the raw key→value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims<T = Map<String, Value>> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub typ: TokenType,
    #[serde(flatten)]
    pub custom: T,
}

impl<T> Claims<T> {
    /// Claims issued at `now` that expire after `ttl`.
    pub fn new(typ: TokenType, now: DateTime<Utc>, ttl: Duration, custom: T) -> Self {
        let iat = now.timestamp();
        Self {
            sub: None,
            iat,
            exp: iat + ttl.num_seconds(),
            nbf: None,
            typ,
            custom,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.sub = Some(subject.into());
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.nbf = Some(at.timestamp());
        self
    }

    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }
}

impl Claims {
    /// Reinterpret the raw payload map as a typed payload.
    pub fn into_typed<P: DeserializeOwned>(self) -> Result<Claims<P>, TokenError> {
        let custom = serde_json::from_value(Value::Object(self.custom))
            .map_err(|_| TokenError::Malformed)?;
        Ok(Claims {
            sub: self.sub,
            iat: self.iat,
            exp: self.exp,
            nbf: self.nbf,
            typ: self.typ,
            custom,
        })
    }
}

/// Signs and verifies tokens against the key store.
pub struct TokenCodec {
    keys: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    leeway_secs: i64,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            clock,
            leeway_secs: 0,
        }
    }

    /// Tolerate this much clock skew on `exp` and `nbf`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = i64::try_from(leeway_secs).unwrap_or(i64::MAX);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Sign `claims` with the current secret.
    pub async fn encode<T: Serialize>(&self, claims: &Claims<T>) -> Result<String, TokenError> {
        if claims.exp <= claims.iat {
            return Err(TokenError::InvalidClaims(
                "expiry must be after issuance".to_string(),
            ));
        }

        let secret = self.keys.current().await;
        let mut header = Header::new(self.keys.algorithm().jwt_algorithm());
        header.kid = Some(secret.id.clone());
        header.typ = Some(claims.typ.as_str().to_string());

        encode(&header, claims, &EncodingKey::from_secret(secret.material()))
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify `token` and return its claims with the raw payload map.
    pub async fn decode(
        &self,
        token: &str,
        expected: TokenType,
        verify_expiry: bool,
    ) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;

        let algorithm = self.keys.algorithm().jwt_algorithm();
        if header.alg != algorithm {
            return Err(TokenError::AlgorithmNotAllowed);
        }

        let kid = header.kid.as_deref().ok_or(TokenError::Malformed)?;
        let secret = self
            .keys
            .by_id(kid)
            .await
            .map_err(|_| TokenError::UnknownKey)?;

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.material()), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::AlgorithmNotAllowed,
                _ => TokenError::Malformed,
            })?;
        let claims = data.claims;

        let header_type = header.typ.as_deref().and_then(TokenType::from_tag);
        if claims.typ != expected || header_type != Some(expected) {
            debug!(expected = %expected, found = %claims.typ, "Token type mismatch");
            return Err(TokenError::TypeMismatch {
                expected,
                found: claims.typ,
            });
        }

        let now = self.clock.now().timestamp();
        if let Some(nbf) = claims.nbf {
            if nbf > now.saturating_add(self.leeway_secs) {
                return Err(TokenError::NotYetValid);
            }
        }
        if verify_expiry && claims.exp.saturating_add(self.leeway_secs) < now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Verify `token` and deserialize its payload as `P`.
    pub async fn decode_as<P: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenType,
        verify_expiry: bool,
    ) -> Result<Claims<P>, TokenError> {
        self.decode(token, expected, verify_expiry)
            .await?
            .into_typed()
    }
}
