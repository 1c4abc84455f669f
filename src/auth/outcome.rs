// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authentication outcome.
//!
//! Every request resolves to exactly one [`AuthenticationOutcome`]. It is
//! built fresh from the Access token, never persisted, and is the only
//! authorization primitive the rest of the system consumes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{AuthError, Role};
use crate::tokens::{AccessClaims, Claims};

/// The principal behind a valid Access token.
///
/// Roles and groups are the snapshot taken when the token was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Authenticated {
    /// User id (the token's `sub`)
    pub principal_id: String,
    pub roles: BTreeSet<Role>,
    pub groups: BTreeSet<String>,
    pub session_id: String,
    /// Unique id of the Access token (`jti`)
    pub token_id: String,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Authenticated {
    /// Build from verified Access token claims. `None` without a subject.
    pub fn from_claims(claims: Claims<AccessClaims>) -> Option<Self> {
        let principal_id = claims.sub?;
        Some(Self {
            principal_id,
            roles: claims.custom.roles,
            groups: claims.custom.groups,
            session_id: claims.custom.session_id,
            token_id: claims.custom.token_id,
            expires_at: DateTime::from_timestamp(claims.exp, 0),
        })
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.roles.iter().any(|r| r.has_privilege(required))
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn is_member_of(&self, group: &str) -> bool {
        self.is_admin() || self.groups.contains(group)
    }

    pub fn require_authentication(&self) -> Result<&Self, AuthError> {
        Ok(self)
    }

    pub fn require_role(&self, role: Role) -> Result<&Self, AuthError> {
        if self.has_role(role) {
            Ok(self)
        } else {
            Err(AuthError::RoleRequired(role))
        }
    }

    /// Administrators satisfy every group check.
    pub fn require_group_membership(&self, group: &str) -> Result<&Self, AuthError> {
        if self.is_member_of(group) {
            Ok(self)
        } else {
            Err(AuthError::GroupMembershipRequired(group.to_string()))
        }
    }
}

/// Result of authenticating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    Authenticated(Authenticated),
    #[default]
    None,
}

impl AuthenticationOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationOutcome::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Authenticated> {
        match self {
            AuthenticationOutcome::Authenticated(principal) => Some(principal),
            AuthenticationOutcome::None => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.principal().map(|p| p.session_id.as_str())
    }

    pub fn require_authentication(&self) -> Result<&Authenticated, AuthError> {
        self.principal().ok_or(AuthError::AuthenticationRequired)
    }

    pub fn require_role(&self, role: Role) -> Result<&Authenticated, AuthError> {
        self.require_authentication()?.require_role(role)
    }

    pub fn require_group_membership(&self, group: &str) -> Result<&Authenticated, AuthError> {
        self.require_authentication()?
            .require_group_membership(group)
    }
}

impl From<Authenticated> for AuthenticationOutcome {
    fn from(principal: Authenticated) -> Self {
        AuthenticationOutcome::Authenticated(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[Role], groups: &[&str]) -> Authenticated {
        Authenticated {
            principal_id: "user-1".to_string(),
            roles: roles.iter().copied().collect(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            session_id: "sess-1".to_string(),
            token_id: "tok-1".to_string(),
            expires_at: None,
        }
    }

    #[test]
    fn none_requires_authentication() {
        let outcome = AuthenticationOutcome::None;
        assert_eq!(
            outcome.require_authentication(),
            Err(AuthError::AuthenticationRequired)
        );
        assert_eq!(
            outcome.require_role(Role::User),
            Err(AuthError::AuthenticationRequired)
        );
        assert_eq!(outcome.session_id(), None);
    }

    #[test]
    fn role_checks_follow_privilege() {
        let user = principal(&[Role::User], &[]);
        assert_eq!(user.require_role(Role::Admin), Err(AuthError::RoleRequired(Role::Admin)));
        assert_eq!(user.require_role(Role::User), Ok(&user));

        let admin = principal(&[Role::Admin], &[]);
        assert!(admin.require_role(Role::Moderator).is_ok());
    }

    #[test]
    fn admin_satisfies_any_group() {
        let member = principal(&[Role::User], &["team-a"]);
        assert!(member.require_group_membership("team-a").is_ok());
        assert_eq!(
            member.require_group_membership("team-b"),
            Err(AuthError::GroupMembershipRequired("team-b".to_string()))
        );

        let admin = principal(&[Role::Admin], &[]);
        assert!(admin.require_group_membership("team-b").is_ok());
    }

    #[test]
    fn outcome_delegates_to_principal() {
        let outcome = AuthenticationOutcome::from(principal(&[Role::User], &["team-a"]));
        assert!(outcome.is_authenticated());
        assert_eq!(outcome.session_id(), Some("sess-1"));
        assert!(outcome.require_group_membership("team-a").is_ok());
        assert_eq!(
            outcome.require_role(Role::Moderator),
            Err(AuthError::RoleRequired(Role::Moderator))
        );
    }
}
