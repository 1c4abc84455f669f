// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # User Store Collaborator
//!
//! The auth core never owns persistence. It talks to a [`UserStore`] to find
//! users, check whether an email is taken, and save changes. Each user record
//! carries its live session list, which is the revocation anchor for
//! Refresh, StepUp and OAuth2-ProviderConnection tokens: removing a session
//! from the list makes those tokens fail on their next use.

pub mod device;
pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

pub use device::DeviceInfo;
pub use memory::InMemoryUserStore;

/// Errors surfaced by a user store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A login session on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub device: DeviceInfo,
    pub issued_at: DateTime<Utc>,
}

/// An external identity linked to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub provider: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// A user record as seen by the auth core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub roles: BTreeSet<Role>,
    pub groups: BTreeSet<String>,
    pub identities: Vec<Identity>,
    pub sessions: Vec<Session>,
    /// Rotated to invalidate every outstanding email verification token.
    pub email_verification_secret: String,
    /// Rotated to invalidate every outstanding password reset token.
    pub password_reset_secret: String,
    pub created_at: DateTime<Utc>,
}

fn random_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

impl User {
    /// A fresh user with the default `USER` role.
    pub fn new(email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            email_verified: false,
            roles: BTreeSet::from([Role::User]),
            groups: BTreeSet::new(),
            identities: Vec::new(),
            sessions: Vec::new(),
            email_verification_secret: random_secret(),
            password_reset_secret: random_secret(),
            created_at: now,
        }
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.session(session_id).is_some()
    }

    /// Start a new session for `device` and return it.
    pub fn open_session(&mut self, device: DeviceInfo, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            device,
            issued_at: now,
        };
        self.sessions.push(session.clone());
        session
    }

    /// Remove a session. Returns whether it existed.
    pub fn revoke_session(&mut self, session_id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);
        before != self.sessions.len()
    }

    pub fn identity(&self, provider: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.provider == provider)
    }

    pub fn is_connected(&self, provider: &str) -> bool {
        self.identity(provider).is_some()
    }

    pub fn connect(&mut self, identity: Identity) {
        self.identities.push(identity);
    }

    /// Unlink a provider. Returns whether it was linked.
    pub fn disconnect(&mut self, provider: &str) -> bool {
        let before = self.identities.len();
        self.identities.retain(|i| i.provider != provider);
        before != self.identities.len()
    }

    pub fn rotate_email_verification_secret(&mut self) {
        self.email_verification_secret = random_secret();
    }

    pub fn rotate_password_reset_secret(&mut self) {
        self.password_reset_secret = random_secret();
    }
}

/// Persistence collaborator for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_by_identity(&self, provider: &str, subject: &str) -> StoreResult<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool>;

    /// Insert or replace a user.
    async fn save(&self, user: User) -> StoreResult<User>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> StoreResult<()>;
}
