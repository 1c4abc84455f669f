// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Step-up trust tier.
//!
//! Being authenticated is not enough for sensitive mutations (removing an
//! identity, disconnecting a provider). Those also need a StepUp token issued
//! to the same user on the same session within the last few minutes.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::extractor::token_value;
use super::{AuthError, Auth, Authenticated};
use crate::state::AppState;
use crate::tokens::{TokenErrorCategory, TokenIssuer, TokenType};

impl Authenticated {
    /// Check `token` is a live StepUp token for this principal and session.
    pub async fn require_step_up(
        &self,
        token: Option<&str>,
        issuer: &TokenIssuer,
    ) -> Result<&Self, AuthError> {
        let token = token.ok_or(AuthError::StepUpRequired)?;

        let (claims, _) = issuer.verify_step_up(token).await.map_err(|e| {
            debug!(code = e.error_code(), "Step-up token rejected");
            match e.category() {
                TokenErrorCategory::Internal => AuthError::Internal(e.to_string()),
                _ => AuthError::StepUpRequired,
            }
        })?;

        let same_principal = claims.subject() == Some(self.principal_id.as_str());
        if !same_principal || claims.custom.session_id != self.session_id {
            debug!(principal_id = %self.principal_id, "Step-up token bound elsewhere");
            return Err(AuthError::StepUpRequired);
        }
        Ok(self)
    }
}

/// Extractor that requires authentication plus a valid step-up token.
pub struct StepUp(pub Authenticated);

impl FromRequestParts<AppState> for StepUp {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;
        let token = token_value(&parts.headers, TokenType::StepUp, state.config.header_mode);
        principal
            .require_step_up(token.as_deref(), &state.issuer)
            .await?;
        Ok(StepUp(principal))
    }
}
