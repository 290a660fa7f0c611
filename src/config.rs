//! Session-layer configuration parsed from environment variables.

use std::time::Duration;

use crate::net::types::AuthError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_SESSION_STALE_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Origin of the auth service, without a trailing slash.
    pub base_url: String,
    /// How long a fetched session stays fresh.
    pub session_stale_secs: u64,
    pub timeouts: AuthTimeouts,
}

impl AuthConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `STOREFRONT_BASE_URL`: default `http://127.0.0.1:5000`
    /// - `STOREFRONT_SESSION_STALE_SECS`: default 300
    /// - `STOREFRONT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `STOREFRONT_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigParse`] if the base URL is not an http(s) URL.
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url = std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let mut config = Self::with_base_url(&base_url)?;
        config.session_stale_secs = env_parse_u64("STOREFRONT_SESSION_STALE_SECS", DEFAULT_SESSION_STALE_SECS);
        config.timeouts = AuthTimeouts {
            request_secs: env_parse_u64("STOREFRONT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("STOREFRONT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    /// Default settings pointed at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigParse`] if `base_url` is not an http(s) URL.
    pub fn with_base_url(base_url: &str) -> Result<Self, AuthError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            session_stale_secs: DEFAULT_SESSION_STALE_SECS,
            timeouts: AuthTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        })
    }

    #[must_use]
    pub fn session_stale_time(&self) -> Duration {
        Duration::from_secs(self.session_stale_secs)
    }
}

fn parse_base_url(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| AuthError::ConfigParse(format!("invalid STOREFRONT_BASE_URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_owned()),
        other => Err(AuthError::ConfigParse(format!(
            "unsupported STOREFRONT_BASE_URL scheme '{other}' (expected 'http' or 'https')"
        ))),
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
