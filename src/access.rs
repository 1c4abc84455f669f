// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-level permission resolution.
//!
//! Every piece of content carries an [`AccessControl`] record. Combined with
//! the request's [`AuthenticationOutcome`] it resolves to the highest
//! [`ContentRole`] the caller holds, if any.
//!
//! ## Rules
//!
//! - The owner and administrators are always `Maintainer`
//! - `Private` content is visible to nobody else
//! - `Shared` content honours per-user and per-group grants
//! - `Public` content is additionally `Viewer` for everyone, anonymous
//!   callers included

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticationOutcome;

/// Permission tier on a piece of content, weakest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentRole {
    Viewer,
    Editor,
    Maintainer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
}

/// Access record stored alongside a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessControl {
    pub owner_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// User id → role.
    #[serde(default)]
    pub user_grants: BTreeMap<String, ContentRole>,
    /// Group key → role.
    #[serde(default)]
    pub group_grants: BTreeMap<String, ContentRole>,
}

impl AccessControl {
    pub fn private(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            visibility: Visibility::Private,
            user_grants: BTreeMap::new(),
            group_grants: BTreeMap::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn grant_user(mut self, user_id: impl Into<String>, role: ContentRole) -> Self {
        self.user_grants.insert(user_id.into(), role);
        self
    }

    pub fn grant_group(mut self, group: impl Into<String>, role: ContentRole) -> Self {
        self.group_grants.insert(group.into(), role);
        self
    }

    /// Highest role `outcome` holds on this content.
    pub fn resolve(&self, outcome: &AuthenticationOutcome) -> Option<ContentRole> {
        let public = (self.visibility == Visibility::Public).then_some(ContentRole::Viewer);

        let Some(principal) = outcome.principal() else {
            return public;
        };
        if principal.principal_id == self.owner_id || principal.is_admin() {
            return Some(ContentRole::Maintainer);
        }
        if self.visibility == Visibility::Private {
            return None;
        }

        let by_user = self.user_grants.get(&principal.principal_id).copied();
        let by_group = principal
            .groups
            .iter()
            .filter_map(|g| self.group_grants.get(g).copied())
            .max();

        [public, by_user, by_group].into_iter().flatten().max()
    }
}

/// Content that carries an access record.
pub trait AccessControlled {
    fn access_control(&self) -> &AccessControl;
}

impl AccessControlled for AccessControl {
    fn access_control(&self) -> &AccessControl {
        self
    }
}

/// Whether `outcome` holds at least `required` on `resource`.
pub fn has_access<R: AccessControlled + ?Sized>(
    outcome: &AuthenticationOutcome,
    resource: &R,
    required: ContentRole,
) -> bool {
    resource
        .access_control()
        .resolve(outcome)
        .is_some_and(|role| role >= required)
}
