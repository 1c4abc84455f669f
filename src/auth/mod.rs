// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Turns requests into an [`AuthenticationOutcome`] and exposes the
//! capability checks the rest of the system composes into policy.
//!
//! ## Auth Flow
//!
//! 1. The client sends its Access token as the `access_token` cookie, or as
//!    `Authorization: Bearer <token>` when header auth is enabled
//! 2. The server:
//!    - verifies signature, key id, type tag and temporal claims
//!    - reads the role/group snapshot embedded at issuance
//!    - produces `Authenticated { .. }` or `None` (never an error)
//! 3. Handlers call `require_authentication`, `require_role`,
//!    `require_group_membership` or `require_step_up` as needed
//!
//! ## Security
//!
//! - Any decode failure is indistinguishable from "no token"
//! - Access tokens are not re-checked against the session list; their TTL
//!   bounds how long a revoked session or a changed role stays visible
//! - Step-up is a separate tier bound to the current session

pub mod error;
pub mod extractor;
pub mod outcome;
pub mod roles;
pub mod step_up;

pub use error::AuthError;
pub use extractor::{extract, token_value, AdminOnly, Auth};
pub use outcome::{Authenticated, AuthenticationOutcome};
pub use roles::Role;
pub use step_up::StepUp;
