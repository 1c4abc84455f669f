// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tessera Auth - Token Issuance and Authorization Core
//!
//! Issues, signs, validates and rotates the short-lived signed tokens behind
//! login sessions, step-up elevation and federated identity linking, and
//! resolves per-request authentication and content permissions.
//!
//! ## Modules
//!
//! - `keys` - Signing secrets, rotation and retention
//! - `tokens` - Token codec, the nine token types and their issuance rules
//! - `auth` - Request authentication outcome, roles and step-up
//! - `oauth2` - Provider login and account linking
//! - `access` - Content-level permission resolution
//! - `api` - HTTP API handlers (Axum)

pub mod access;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod keys;
pub mod oauth2;
pub mod state;
pub mod tokens;
pub mod users;
