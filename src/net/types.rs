//! Wire types and errors shared by the auth client and the session state.
//!
//! DESIGN
//! ======
//! `User` keeps the fields the storefront reads and carries everything else
//! through `extra`, so a richer server profile never fails to decode.
//! `AuthError` is `Clone` because one failed session fetch is handed to every
//! reader waiting on it; causes are therefore carried as strings.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth service calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The service answered 401. On the session read this means "anonymous".
    #[error("not signed in")]
    Unauthorized,

    /// The service rejected the request (4xx other than 401).
    #[error("request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    /// The service could not be reached at all.
    #[error("auth service unreachable")]
    Network { detail: String },

    /// Any other non-success status.
    #[error("unexpected response status {status}")]
    Unknown { status: u16, body: String },

    /// A success body did not have the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),
}

impl AuthError {
    /// Classify a non-success HTTP status and its body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            400..=499 => Self::Validation { status, message: error_detail(body, status) },
            _ => Self::Unknown { status, body: body.to_owned() },
        }
    }

    /// Whether a caller-driven retry could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Unknown { status: 429 | 500..=599, .. })
    }
}

/// Pull a human-readable message out of an error body.
///
/// Looks for `message`, then `error`, in a JSON object; falls back to the raw
/// text, then to the bare status.
pub(crate) fn error_detail(body: &str, status: u16) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error"] {
            if let Some(Value::String(text)) = obj.get(field) {
                return text.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { format!("status {status}") } else { trimmed.to_owned() }
}

// =============================================================================
// USER
// =============================================================================

/// Identity record returned by the auth service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier. Numeric ids are normalised to strings.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Account role (e.g. `"customer"`, `"student"`), if the service sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,
    /// Any other profile fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        _ => Err(D::Error::custom("expected non-empty string or integer id")),
    }
}

// =============================================================================
// REQUEST PAYLOADS
// =============================================================================

/// Registration payload for `POST /api/auth/signup`.
///
/// Field rules are enforced by the service; this type only forwards.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Additional fields forwarded untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sign-in payload for `POST /api/auth/signin`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("phone", &self.phone)
            .field("extra", &self.extra)
            .finish()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
