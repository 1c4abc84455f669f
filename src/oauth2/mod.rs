// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # OAuth2 login and account linking
//!
//! 1. [`request`]: pack the caller's context into a signed state token and
//!    redirect to the provider
//! 2. [`callback`]: verify the state, exchange the code and resolve the
//!    external identity to a user (register, log in or link)
//!
//! All flow context travels in tokens, so the server keeps no flow state.

pub mod callback;
pub mod error;
pub mod provider;
pub mod request;

pub use callback::{
    CallbackHandler, CallbackQuery, CallbackResponse, CallbackSuccess, Resolution, ResolutionKind,
};
pub use error::OAuth2Error;
pub use provider::{
    ExternalIdentity, HttpIdentityProvider, IdentityProvider, ProviderError, ProviderRegistry,
};
pub use request::{authorization_redirect, is_allowed_redirect, AuthorizationRequest};
