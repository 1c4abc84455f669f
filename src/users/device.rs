// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device fingerprint captured when a session starts.

use axum::http::{header::USER_AGENT, HeaderMap};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse description of the device behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl DeviceInfo {
    /// Build from request headers and the peer address.
    ///
    /// `X-Forwarded-For` wins over `peer_ip` when present (first hop).
    pub fn from_headers(headers: &HeaderMap, peer_ip: Option<String>) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());

        Self {
            browser: browser_of(user_agent).map(str::to_string),
            os: os_of(user_agent).map(str::to_string),
            ip: forwarded.or(peer_ip),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

// Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
fn browser_of(user_agent: &str) -> Option<&'static str> {
    const BROWSERS: &[(&str, &str)] = &[
        ("Edg/", "Edge"),
        ("OPR/", "Opera"),
        ("Firefox/", "Firefox"),
        ("Chrome/", "Chrome"),
        ("Safari/", "Safari"),
    ];
    BROWSERS
        .iter()
        .find(|(marker, _)| user_agent.contains(marker))
        .map(|(_, name)| *name)
}

fn os_of(user_agent: &str) -> Option<&'static str> {
    const SYSTEMS: &[(&str, &str)] = &[
        ("Windows", "Windows"),
        ("Android", "Android"),
        ("iPhone", "iOS"),
        ("iPad", "iOS"),
        ("Mac OS X", "macOS"),
        ("Linux", "Linux"),
    ];
    SYSTEMS
        .iter()
        .find(|(marker, _)| user_agent.contains(marker))
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const FIREFOX_ANDROID: &str = "Mozilla/5.0 (Android 14; Mobile; rv:121.0) Gecko/121.0 Firefox/121.0";

    fn headers(ua: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers
    }

    #[test]
    fn classifies_common_user_agents() {
        let chrome = DeviceInfo::from_headers(&headers(CHROME_MAC), None);
        assert_eq!(chrome.browser.as_deref(), Some("Chrome"));
        assert_eq!(chrome.os.as_deref(), Some("macOS"));

        let edge = DeviceInfo::from_headers(&headers(EDGE_WINDOWS), None);
        assert_eq!(edge.browser.as_deref(), Some("Edge"));
        assert_eq!(edge.os.as_deref(), Some("Windows"));

        let firefox = DeviceInfo::from_headers(&headers(FIREFOX_ANDROID), None);
        assert_eq!(firefox.browser.as_deref(), Some("Firefox"));
        assert_eq!(firefox.os.as_deref(), Some("Android"));
    }

    #[test]
    fn forwarded_for_takes_precedence_over_peer() {
        let mut headers = headers(CHROME_MAC);
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let device = DeviceInfo::from_headers(&headers, Some("10.0.0.2".to_string()));
        assert_eq!(device.ip.as_deref(), Some("203.0.113.7"));

        let device = DeviceInfo::from_headers(&HeaderMap::new(), Some("10.0.0.2".to_string()));
        assert_eq!(device.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(device.browser, None);
    }
}
