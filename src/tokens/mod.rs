// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Tokens
//!
//! One signing mechanism, nine claim schemas.
//!
//! - [`codec`]: sign/verify, key id resolution, type tag and temporal checks
//! - [`types`]: the type tags and per-type payloads
//! - [`issuer`]: per-type issuance and semantic validation (subject, session
//!   liveness, per-user secrets)

pub mod codec;
pub mod error;
pub mod issuer;
pub mod types;

pub use codec::{Claims, TokenCodec};
pub use error::{TokenError, TokenErrorCategory};
pub use issuer::{IssuedTokens, TokenIssuer};
pub use types::{
    AccessClaims, EmailVerificationClaims, InvitationClaims, OAuth2ProviderConnectionClaims,
    OAuth2StateClaims, PasswordResetClaims, RefreshClaims, SessionBound, SessionClaims,
    StepUpClaims, TokenPayload, TokenType,
};
