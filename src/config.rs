// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup by
//! [`AuthConfig::from_env`]. Parsing goes through [`AuthConfig::from_lookup`]
//! so tests can feed a map instead of mutating the process environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token TTL, also the role staleness window (max 3600) | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token TTL | `2592000` |
//! | `STEP_UP_TOKEN_TTL_SECS` | Step-up token TTL | `300` |
//! | `SESSION_TOKEN_TTL_SECS` | Session token TTL | `600` |
//! | `OAUTH2_STATE_TTL_SECS` | OAuth2 state token TTL | `600` |
//! | `OAUTH2_CONNECTION_TTL_SECS` | Provider connection token TTL | `300` |
//! | `EMAIL_VERIFICATION_TTL_SECS` | Email verification token TTL | `86400` |
//! | `PASSWORD_RESET_TTL_SECS` | Password reset token TTL | `3600` |
//! | `INVITATION_TTL_SECS` | Invitation token TTL | `604800` |
//! | `TOKEN_LEEWAY_SECS` | Clock skew tolerated on `exp`/`nbf` | `0` |
//! | `KEY_ROTATION_INTERVAL_SECS` | Age at which the signing secret rotates | `86400` |
//! | `KEY_RETENTION_SECS` | How long retired secrets still verify (>= refresh TTL) | refresh TTL |
//! | `KEY_ROTATION_CHECK_SECS` | Rotation task tick | `60` |
//! | `TOKEN_SIGNING_ALGORITHM` | `HS256`, `HS384` or `HS512` | `HS256` |
//! | `AUTH_HEADER_MODE` | `disabled`, `allowed` or `preferred` | `allowed` |
//! | `OAUTH2_ERROR_URI` | Redirect target for failed OAuth2 flows | `/login/error` |
//! | `OAUTH2_ALLOWED_REDIRECT_HOSTS` | Comma list of hosts; empty allows any | empty |
//! | `OAUTH2_PROVIDERS` | Comma list of provider names | empty |
//! | `OAUTH2_<NAME>_*` | Per-provider client registration (see [`ProviderConfig`]) | required |
//! | `GEOLOCATION_URL` | IP lookup URL template containing `{ip}` | disabled |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! The signing secret itself (`TOKEN_SIGNING_SECRET`, `TOKEN_SIGNING_KEY_ID`)
//! is read through the key store's secret source, not here.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use tracing::warn;

use crate::keys::{KeyStoreConfig, SigningAlgorithm};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Upper bound on the Access token TTL.
///
/// Access tokens carry a role/group snapshot that is only refreshed on the
/// next refresh exchange, so this caps how stale authorization data can get.
pub const MAX_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ERROR_URI: &str = "/login/error";
const DEFAULT_SCOPES: &str = "openid email";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Whether the Access token may be read from the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderAuthMode {
    /// Cookies only.
    Disabled,
    /// Cookie first, header as fallback.
    #[default]
    Allowed,
    /// Header first, cookie as fallback.
    Preferred,
}

impl FromStr for HeaderAuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(HeaderAuthMode::Disabled),
            "allowed" => Ok(HeaderAuthMode::Allowed),
            "preferred" => Ok(HeaderAuthMode::Preferred),
            other => Err(format!("unknown header auth mode '{other}'")),
        }
    }
}

/// Lifetime of each token type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub step_up: Duration,
    pub session: Duration,
    pub oauth2_state: Duration,
    pub oauth2_connection: Duration,
    pub email_verification: Duration,
    pub password_reset: Duration,
    pub invitation: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::seconds(900),
            refresh: Duration::days(30),
            step_up: Duration::seconds(300),
            session: Duration::seconds(600),
            oauth2_state: Duration::seconds(600),
            oauth2_connection: Duration::seconds(300),
            email_verification: Duration::days(1),
            password_reset: Duration::hours(1),
            invitation: Duration::days(7),
        }
    }
}

/// Client registration for one external identity provider.
///
/// Read from `OAUTH2_<NAME>_CLIENT_ID`, `_CLIENT_SECRET`, `_AUTHORIZATION_URI`,
/// `_TOKEN_URI`, `_USERINFO_URI`, `_REDIRECT_URI` and `_SCOPES` (optional,
/// comma or space separated).
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_uri: String,
    pub token_uri: String,
    pub userinfo_uri: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authorization_uri", &self.authorization_uri)
            .field("token_uri", &self.token_uri)
            .field("userinfo_uri", &self.userinfo_uri)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Config {
    pub error_uri: String,
    /// Empty means any host is allowed.
    pub allowed_redirect_hosts: Vec<String>,
    pub providers: Vec<ProviderConfig>,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            error_uri: DEFAULT_ERROR_URI.to_string(),
            allowed_redirect_hosts: Vec::new(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
    pub lifetimes: TokenLifetimes,
    pub leeway_secs: u64,
    pub signing_algorithm: SigningAlgorithm,
    pub key_rotation_interval: Duration,
    pub key_retention: Duration,
    pub key_rotation_check: std::time::Duration,
    pub header_mode: HeaderAuthMode,
    pub oauth2: OAuth2Config,
    pub geolocation_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let lifetimes = TokenLifetimes::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            key_retention: lifetimes.refresh,
            lifetimes,
            leeway_secs: 0,
            signing_algorithm: SigningAlgorithm::default(),
            key_rotation_interval: Duration::days(1),
            key_rotation_check: std::time::Duration::from_secs(60),
            header_mode: HeaderAuthMode::default(),
            oauth2: OAuth2Config::default(),
            geolocation_url: None,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary name → value lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = Self::default();

        let mut access = env.seconds("ACCESS_TOKEN_TTL_SECS", defaults.lifetimes.access)?;
        if access.num_seconds() > MAX_ACCESS_TOKEN_TTL_SECS {
            warn!(
                requested = access.num_seconds(),
                max = MAX_ACCESS_TOKEN_TTL_SECS,
                "Access token TTL capped"
            );
            access = Duration::seconds(MAX_ACCESS_TOKEN_TTL_SECS);
        }

        let d = &defaults.lifetimes;
        let lifetimes = TokenLifetimes {
            access,
            refresh: env.seconds("REFRESH_TOKEN_TTL_SECS", d.refresh)?,
            step_up: env.seconds("STEP_UP_TOKEN_TTL_SECS", d.step_up)?,
            session: env.seconds("SESSION_TOKEN_TTL_SECS", d.session)?,
            oauth2_state: env.seconds("OAUTH2_STATE_TTL_SECS", d.oauth2_state)?,
            oauth2_connection: env.seconds("OAUTH2_CONNECTION_TTL_SECS", d.oauth2_connection)?,
            email_verification: env.seconds("EMAIL_VERIFICATION_TTL_SECS", d.email_verification)?,
            password_reset: env.seconds("PASSWORD_RESET_TTL_SECS", d.password_reset)?,
            invitation: env.seconds("INVITATION_TTL_SECS", d.invitation)?,
        };

        // Retired secrets must outlive every refresh token they signed.
        let key_retention = env.seconds("KEY_RETENTION_SECS", lifetimes.refresh)?;
        if key_retention < lifetimes.refresh {
            return Err(ConfigError::invalid(
                "KEY_RETENTION_SECS",
                "must be at least REFRESH_TOKEN_TTL_SECS",
            ));
        }

        let key_rotation_check = env.seconds("KEY_ROTATION_CHECK_SECS", Duration::seconds(60))?;

        Ok(Self {
            host: env.or_default(HOST_ENV, DEFAULT_HOST),
            port: env.parsed(PORT_ENV, DEFAULT_PORT)?,
            lifetimes,
            leeway_secs: env.parsed("TOKEN_LEEWAY_SECS", 0)?,
            signing_algorithm: env.parsed("TOKEN_SIGNING_ALGORITHM", SigningAlgorithm::default())?,
            key_rotation_interval: env
                .seconds("KEY_ROTATION_INTERVAL_SECS", defaults.key_rotation_interval)?,
            key_retention,
            key_rotation_check: std::time::Duration::from_secs(
                key_rotation_check.num_seconds().unsigned_abs(),
            ),
            header_mode: env.parsed("AUTH_HEADER_MODE", HeaderAuthMode::default())?,
            oauth2: OAuth2Config {
                error_uri: env.or_default("OAUTH2_ERROR_URI", DEFAULT_ERROR_URI),
                allowed_redirect_hosts: env.list("OAUTH2_ALLOWED_REDIRECT_HOSTS"),
                providers: env
                    .list("OAUTH2_PROVIDERS")
                    .iter()
                    .map(|name| env.provider(name))
                    .collect::<Result<_, _>>()?,
            },
            geolocation_url: env.optional("GEOLOCATION_URL"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn key_store_config(&self) -> KeyStoreConfig {
        KeyStoreConfig {
            algorithm: self.signing_algorithm,
            key_bits: self.signing_algorithm.min_bits(),
            retention: self.key_retention,
            ..KeyStoreConfig::default()
        }
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name)
            .unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
            None => Ok(default),
        }
    }

    /// A positive number of seconds.
    fn seconds(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: i64 = self.parsed(name, default.num_seconds())?;
        if secs <= 0 {
            return Err(ConfigError::invalid(name, "must be greater than zero"));
        }
        Ok(Duration::seconds(secs))
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.optional(name)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn provider(&self, name: &str) -> Result<ProviderConfig, ConfigError> {
        let prefix = format!("OAUTH2_{}", name.to_ascii_uppercase());
        let key = |suffix: &str| format!("{prefix}_{suffix}");

        let scopes = self
            .or_default(&key("SCOPES"), DEFAULT_SCOPES)
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(ProviderConfig {
            name: name.to_string(),
            client_id: self.required(&key("CLIENT_ID"))?,
            client_secret: self.required(&key("CLIENT_SECRET"))?,
            authorization_uri: self.required(&key("AUTHORIZATION_URI"))?,
            token_uri: self.required(&key("TOKEN_URI"))?,
            userinfo_uri: self.required(&key("USERINFO_URI"))?,
            redirect_uri: self.required(&key("REDIRECT_URI"))?,
            scopes,
        })
    }
}
