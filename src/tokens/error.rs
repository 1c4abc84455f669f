// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token encode/decode errors.

use super::types::TokenType;
use crate::users::StoreError;

/// Why a token could not be issued or accepted.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Not three segments, bad base64/JSON, missing `kid`, unknown or
    /// `none` algorithm.
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    /// Header names an algorithm other than the one the store signs with.
    #[error("token algorithm is not allowed")]
    AlgorithmNotAllowed,

    /// The `kid` does not resolve to a retained secret.
    #[error("token signing key is unknown")]
    UnknownKey,

    #[error("expected {expected} token, found {found}")]
    TypeMismatch {
        expected: TokenType,
        found: TokenType,
    },

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token has expired")]
    Expired,

    #[error("token has no subject")]
    MissingSubject,

    #[error("token subject does not exist")]
    UnknownSubject,

    /// The session the token is bound to is no longer in the user's list.
    #[error("token session has been revoked")]
    SessionRevoked,

    /// The token is bound to a session other than the caller's.
    #[error("token belongs to a different session")]
    SessionMismatch,

    /// The per-user secret the token was derived from has been rotated.
    #[error("token secret no longer matches")]
    SecretMismatch,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The coarse taxonomy callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorCategory {
    InvalidToken,
    Expired,
    NotYetValid,
    Internal,
}

impl TokenError {
    pub fn category(&self) -> TokenErrorCategory {
        match self {
            TokenError::Expired => TokenErrorCategory::Expired,
            TokenError::NotYetValid => TokenErrorCategory::NotYetValid,
            TokenError::InvalidClaims(_) | TokenError::Signing(_) | TokenError::Store(_) => {
                TokenErrorCategory::Internal
            }
            _ => TokenErrorCategory::InvalidToken,
        }
    }

    /// Stable machine-readable code, safe to log.
    pub fn error_code(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::AlgorithmNotAllowed => "algorithm_not_allowed",
            TokenError::UnknownKey => "unknown_key",
            TokenError::TypeMismatch { .. } => "type_mismatch",
            TokenError::NotYetValid => "not_yet_valid",
            TokenError::Expired => "expired",
            TokenError::MissingSubject => "missing_subject",
            TokenError::UnknownSubject => "unknown_subject",
            TokenError::SessionRevoked => "session_revoked",
            TokenError::SessionMismatch => "session_mismatch",
            TokenError::SecretMismatch => "secret_mismatch",
            TokenError::InvalidClaims(_) => "invalid_claims",
            TokenError::Signing(_) => "signing_failed",
            TokenError::Store(_) => "store_error",
        }
    }
}
