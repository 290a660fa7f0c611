//! Auth service client.
//!
//! `AuthApi` is the seam the session state talks through; `HttpAuthApi` is
//! the real implementation over `reqwest`. Requests carry the service's
//! session cookie through a shared cookie jar, so the client never builds a
//! credential of its own.
//!
//! ERROR HANDLING
//! ==============
//! Every non-2xx status becomes an `AuthError` here, 401 included. Deciding
//! that a 401 from `me` means "anonymous" is session policy and lives in
//! `state::auth`, not in the transport.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;

use super::types::{AuthError, Credentials, NewUser, User};
use crate::config::AuthConfig;

pub const ME_PATH: &str = "/api/auth/me";
pub const SIGN_UP_PATH: &str = "/api/auth/signup";
pub const SIGN_IN_PATH: &str = "/api/auth/signin";
pub const SIGN_OUT_PATH: &str = "/api/auth/signout";

// =============================================================================
// TRAIT
// =============================================================================

/// Remote auth service operations.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `GET /api/auth/me`. A missing session is `Err(AuthError::Unauthorized)`.
    async fn me(&self) -> Result<User, AuthError>;

    /// `POST /api/auth/signup`.
    async fn sign_up(&self, new_user: &NewUser) -> Result<User, AuthError>;

    /// `POST /api/auth/signin`.
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError>;

    /// `POST /api/auth/signout`.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: Url,
    cookies: Arc<Jar>,
}

impl HttpAuthApi {
    /// Build a cookie-bearing client for the configured service.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| AuthError::ConfigParse(e.to_string()))?;
        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url, cookies })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Seed the jar with a `name=value` cookie, e.g. one saved by an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigParse`] if the cookie has no `name=value` pair.
    pub fn seed_session_cookie(&self, cookie: &str) -> Result<(), AuthError> {
        let pair = cookie.split(';').next().unwrap_or_default().trim();
        match pair.split_once('=') {
            Some((name, _)) if !name.trim().is_empty() => {
                self.cookies.add_cookie_str(pair, &self.base_url);
                Ok(())
            }
            _ => Err(AuthError::ConfigParse(format!("invalid session cookie '{cookie}' (expected name=value)"))),
        }
    }

    /// The `Cookie` header this client would send to the service, if any.
    #[must_use]
    pub fn session_cookie_header(&self) -> Option<String> {
        self.cookies
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().map(str::to_owned))
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(self.base_url(), path)
    }

    /// Send a request; return the body of a 2xx response.
    async fn execute(&self, request: reqwest::RequestBuilder, path: &'static str) -> Result<String, AuthError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(path, error = %e, "auth request failed");
            AuthError::Network { detail: e.to_string() }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network { detail: e.to_string() })?;

        if !(200..300).contains(&status) {
            tracing::debug!(path, status, "auth request rejected");
            return Err(AuthError::from_status(status, &text));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn me(&self) -> Result<User, AuthError> {
        let body = self
            .execute(self.http.get(self.endpoint(ME_PATH)), ME_PATH)
            .await?;
        parse_user(&body)
    }

    async fn sign_up(&self, new_user: &NewUser) -> Result<User, AuthError> {
        let request = self.http.post(self.endpoint(SIGN_UP_PATH)).json(new_user);
        let body = self.execute(request, SIGN_UP_PATH).await?;
        parse_user(&body)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let request = self.http.post(self.endpoint(SIGN_IN_PATH)).json(credentials);
        let body = self.execute(request, SIGN_IN_PATH).await?;
        parse_user(&body)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.execute(self.http.post(self.endpoint(SIGN_OUT_PATH)), SIGN_OUT_PATH)
            .await?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Decode a user body. Accepts the bare user object or `{ "user": { ... } }`.
fn parse_user(body: &str) -> Result<User, AuthError> {
    let value: Value = serde_json::from_str(body).map_err(|e| AuthError::Decode(e.to_string()))?;
    let user = match value {
        Value::Object(mut obj) if !obj.contains_key("id") && obj.get("user").is_some_and(Value::is_object) => {
            obj.remove("user").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(user).map_err(|e| AuthError::Decode(e.to_string()))
}
