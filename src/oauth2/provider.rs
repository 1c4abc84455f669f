// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity providers.
//!
//! A provider builds the authorization redirect and, on callback, exchanges
//! the authorization code for the caller's external identity.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::ProviderConfig;

/// An identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    /// Provider-scoped stable user id.
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider configuration invalid: {0}")]
    Config(String),

    #[error("identity provider request failed: {0}")]
    Request(String),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Where to send the user agent, carrying `state` opaquely.
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Exchange an authorization code for the caller's identity.
    async fn authenticate(&self, code: &str) -> Result<ExternalIdentity, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authorization-code flow against a standard OAuth2 provider.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    config: ProviderConfig,
    http: Client,
}

impl HttpIdentityProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        for (field, value) in [
            ("authorization_uri", &config.authorization_uri),
            ("token_uri", &config.token_uri),
            ("userinfo_uri", &config.userinfo_uri),
            ("redirect_uri", &config.redirect_uri),
        ] {
            Url::parse(value)
                .map_err(|e| ProviderError::Config(format!("{}.{field}: {e}", config.name)))?;
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.config.authorization_uri)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn authenticate(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
        let token: TokenResponse = self
            .http
            .post(&self.config.token_uri)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("token response: {e}")))?;

        let userinfo: Value = self
            .http
            .get(&self.config.userinfo_uri)
            .header(ACCEPT, "application/json")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("userinfo response: {e}")))?;

        let identity = identity_from_userinfo(&self.config.name, &userinfo)?;
        debug!(provider = %identity.provider, "Authenticated external identity");
        Ok(identity)
    }
}

/// Map a userinfo document to an identity.
///
/// OIDC providers use `sub`; several plain OAuth2 providers use a numeric `id`.
fn identity_from_userinfo(provider: &str, userinfo: &Value) -> Result<ExternalIdentity, ProviderError> {
    let subject = match userinfo.get("sub").or_else(|| userinfo.get("id")) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(ProviderError::InvalidResponse(
                "userinfo has no subject".to_string(),
            ))
        }
    };
    let email = userinfo
        .get("email")
        .and_then(Value::as_str)
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty());

    Ok(ExternalIdentity {
        provider: provider.to_string(),
        subject,
        email,
    })
}

/// Configured providers by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Arc::new(HttpIdentityProvider::new(config.clone())?));
            info!(provider = %config.name, "Registered identity provider");
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers
            .insert(provider.name().to_ascii_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn github() -> ProviderConfig {
        ProviderConfig {
            name: "github".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "shh".to_string(),
            authorization_uri: "https://github.com/login/oauth/authorize".to_string(),
            token_uri: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_uri: "https://api.github.com/user".to_string(),
            redirect_uri: "https://auth.example.com/oauth2/github/callback".to_string(),
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
        }
    }

    #[test]
    fn authorization_url_carries_state_and_client() {
        let provider = HttpIdentityProvider::new(github()).unwrap();
        let url = Url::parse(&provider.authorization_url("opaque.state.value").unwrap()).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["scope"], "read:user user:email");
        assert_eq!(query["state"], "opaque.state.value");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let mut config = github();
        config.token_uri = "not a url".to_string();
        assert!(matches!(
            HttpIdentityProvider::new(config),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn userinfo_subject_accepts_sub_or_numeric_id() {
        let oidc = identity_from_userinfo("google", &json!({"sub": "1101", "email": "Ada@Example.com"}))
            .unwrap();
        assert_eq!(oidc.subject, "1101");
        assert_eq!(oidc.email.as_deref(), Some("ada@example.com"));

        let plain = identity_from_userinfo("github", &json!({"id": 42, "email": null})).unwrap();
        assert_eq!(plain.subject, "42");
        assert_eq!(plain.email, None);

        assert!(identity_from_userinfo("github", &json!({"login": "ada"})).is_err());
    }

    #[test]
    fn registry_lookup_ignores_case() {
        let registry = ProviderRegistry::from_config(&[github()]).unwrap();
        assert!(registry.get("GitHub").is_some());
        assert!(registry.get("google").is_none());
        assert_eq!(registry.names(), vec!["github"]);
    }
}
