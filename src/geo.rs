// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort IP geolocation for session fingerprints.
//!
//! Lookups never block token issuance: [`locate_best_effort`] swallows every
//! failure and returns `None`.

use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Request(String),

    #[error("geolocation response was invalid: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Human-readable location of `ip`, if known.
    async fn locate(&self, ip: IpAddr) -> Result<Option<String>, GeoError>;
}

/// Locator used when no lookup service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeoLocator;

#[async_trait]
impl GeoLocator for NoopGeoLocator {
    async fn locate(&self, _ip: IpAddr) -> Result<Option<String>, GeoError> {
        Ok(None)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default, alias = "country_name")]
    country: Option<String>,
}

impl GeoResponse {
    fn label(self) -> Option<String> {
        let parts: Vec<String> = [self.city, self.region, self.country]
            .into_iter()
            .flatten()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// JSON lookup service addressed by a URL template containing `{ip}`.
#[derive(Debug, Clone)]
pub struct HttpGeoLocator {
    url_template: String,
    http: Client,
}

impl HttpGeoLocator {
    pub fn new(url_template: impl Into<String>) -> Result<Self, GeoError> {
        let url_template = url_template.into();
        if !url_template.contains("{ip}") {
            return Err(GeoError::Request(
                "URL template must contain {ip}".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| GeoError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { url_template, http })
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> Result<Option<String>, GeoError> {
        let url = self.url_template.replace("{ip}", &ip.to_string());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| GeoError::Request(e.to_string()))?;
        let body: GeoResponse = response
            .json()
            .await
            .map_err(|e| GeoError::InvalidResponse(e.to_string()))?;
        Ok(body.label())
    }
}

fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

/// Look up `ip`, returning `None` on any failure or for non-public addresses.
pub async fn locate_best_effort(geo: &dyn GeoLocator, ip: Option<&str>) -> Option<String> {
    let ip: IpAddr = ip?.parse().ok()?;
    if !is_public(&ip) {
        return None;
    }
    match geo.locate(ip).await {
        Ok(location) => location,
        Err(e) => {
            debug!(error = %e, "Geolocation lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Option<String>, ()>);

    #[async_trait]
    impl GeoLocator for Fixed {
        async fn locate(&self, _ip: IpAddr) -> Result<Option<String>, GeoError> {
            self.0
                .clone()
                .map_err(|_| GeoError::Request("connection refused".to_string()))
        }
    }

    #[test]
    fn label_joins_known_parts() {
        let response: GeoResponse =
            serde_json::from_str(r#"{"city":"Lyon","country_name":"France"}"#).unwrap();
        assert_eq!(response.label().as_deref(), Some("Lyon, France"));
        assert_eq!(GeoResponse::default().label(), None);
    }

    #[test]
    fn template_must_contain_ip() {
        assert!(HttpGeoLocator::new("https://geo.example.com/lookup").is_err());
        assert!(HttpGeoLocator::new("https://geo.example.com/{ip}/json").is_ok());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let failing = Fixed(Err(()));
        assert_eq!(locate_best_effort(&failing, Some("203.0.113.9")).await, None);
        assert_eq!(locate_best_effort(&failing, Some("not-an-ip")).await, None);
        assert_eq!(locate_best_effort(&failing, None).await, None);
    }

    #[tokio::test]
    async fn private_addresses_are_not_looked_up() {
        let known = Fixed(Ok(Some("Somewhere".to_string())));
        assert_eq!(locate_best_effort(&known, Some("10.1.2.3")).await, None);
        assert_eq!(locate_best_effort(&known, Some("127.0.0.1")).await, None);
        assert_eq!(
            locate_best_effort(&known, Some("203.0.113.9")).await.as_deref(),
            Some("Somewhere")
        );
        assert_eq!(locate_best_effort(&NoopGeoLocator, Some("203.0.113.9")).await, None);
    }
}
