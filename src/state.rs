// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::geo::{GeoLocator, NoopGeoLocator};
use crate::keys::{KeyError, KeyStore};
use crate::oauth2::{CallbackHandler, ProviderRegistry};
use crate::tokens::{TokenCodec, TokenIssuer};
use crate::users::{InMemoryUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub clock: Arc<dyn Clock>,
    pub keys: Arc<KeyStore>,
    pub issuer: Arc<TokenIssuer>,
    pub users: Arc<dyn UserStore>,
    pub providers: Arc<ProviderRegistry>,
    pub geo: Arc<dyn GeoLocator>,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        clock: Arc<dyn Clock>,
        keys: Arc<KeyStore>,
        users: Arc<dyn UserStore>,
        providers: ProviderRegistry,
        geo: Arc<dyn GeoLocator>,
    ) -> Self {
        let codec = TokenCodec::new(keys.clone(), clock.clone()).with_leeway(config.leeway_secs);
        let issuer = TokenIssuer::new(codec, users.clone(), config.lifetimes.clone());
        Self {
            config: Arc::new(config),
            clock,
            keys,
            issuer: Arc::new(issuer),
            users,
            providers: Arc::new(providers),
            geo,
        }
    }

    /// Generated keys, an empty in-memory user store and no providers.
    pub fn in_memory(config: AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, KeyError> {
        let keys = Arc::new(KeyStore::generated(config.key_store_config(), clock.clone())?);
        Ok(Self::new(
            config,
            clock,
            keys,
            Arc::new(InMemoryUserStore::new()),
            ProviderRegistry::new(),
            Arc::new(NoopGeoLocator),
        ))
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Arc::new(providers);
        self
    }

    pub fn callback_handler(&self) -> CallbackHandler<'_> {
        CallbackHandler::new(&self.issuer, &self.providers)
    }
}
