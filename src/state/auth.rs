//! Auth-session state for the current visitor.
//!
//! SYSTEM CONTEXT
//! ==============
//! Page sections, account menus and checkout guards all ask the same question,
//! so the answer is kept in exactly one place: the cache entry under
//! [`SESSION_KEY`]. [`SessionState`] is derived from that entry on demand and
//! never stored anywhere else.
//!
//! POLICY
//! ======
//! A 401 from the `me` endpoint is a successful read whose value is "nobody"
//! (`null` in the cache). Treating it as a failure would put every anonymous
//! visitor into the error state.
//!
//! Commands touch the cache only after the service accepted them: sign-up and
//! sign-in invalidate the session entry, sign-out drops every entry so no
//! per-user query outlives the identity it was fetched for.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;

use super::cache::{CacheEntry, CacheEvent, EntryStatus, SessionCache};
use crate::config::AuthConfig;
use crate::net::api::{AuthApi, HttpAuthApi, ME_PATH};
use crate::net::types::{AuthError, Credentials, NewUser, User};

/// Cache key of the current-session query.
pub const SESSION_KEY: &str = ME_PATH;

/// Query cache shared by the session and any per-user queries.
pub type ClientCache = SessionCache<Value, AuthError>;

// =============================================================================
// SESSION STATE
// =============================================================================

/// Who the current visitor is, as far as this client knows.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// No session read has completed (or the session was just cleared).
    Unknown,
    /// A session read is in flight.
    Loading,
    /// The service says nobody is signed in.
    Anonymous,
    Authenticated(User),
    /// The last session read failed for a reason other than 401.
    Errored(AuthError),
}

impl SessionState {
    /// Derive the state from the session cache entry.
    #[must_use]
    pub fn from_entry(entry: Option<&CacheEntry<Value, AuthError>>) -> Self {
        let Some(entry) = entry else {
            return Self::Unknown;
        };
        if entry.fetching {
            return Self::Loading;
        }
        match entry.status {
            EntryStatus::Idle => Self::Unknown,
            EntryStatus::Error => entry.error.clone().map_or(Self::Unknown, Self::Errored),
            EntryStatus::Success => match &entry.value {
                None | Some(Value::Null) => Self::Anonymous,
                Some(value) => match serde_json::from_value::<User>(value.clone()) {
                    Ok(user) => Self::Authenticated(user),
                    Err(e) => Self::Errored(AuthError::Decode(e.to_string())),
                },
            },
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// `false` while the answer is still unknown or being fetched.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Loading)
    }

    /// Whether a members-only page should send the visitor to sign in.
    ///
    /// Only a settled `Anonymous` qualifies; redirecting while loading would
    /// bounce signed-in visitors on every page load.
    #[must_use]
    pub fn needs_sign_in(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Single authority for the current visitor's session.
#[derive(Clone)]
pub struct AuthStateManager {
    api: Arc<dyn AuthApi>,
    cache: ClientCache,
    stale_time: Duration,
}

impl AuthStateManager {
    /// Manager with its own empty cache.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, stale_time: Duration) -> Self {
        Self::with_cache(api, SessionCache::new(stale_time), stale_time)
    }

    /// Manager writing into an existing cache shared with other queries.
    #[must_use]
    pub fn with_cache(api: Arc<dyn AuthApi>, cache: ClientCache, stale_time: Duration) -> Self {
        Self { api, cache, stale_time }
    }

    /// Manager over the HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let api = HttpAuthApi::new(config)?;
        Ok(Self::new(Arc::new(api), config.session_stale_time()))
    }

    /// The cache this manager writes into.
    #[must_use]
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Cache change notifications; re-read [`Self::session`] on session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    /// Current derived state, without fetching.
    #[must_use]
    pub fn session(&self) -> SessionState {
        SessionState::from_entry(self.cache.peek(SESSION_KEY).as_ref())
    }

    /// Read the session, fetching it if it is missing or stale.
    ///
    /// Concurrent callers share one request. Failures are recorded on the
    /// shared entry (every reader sees `Errored`) and are not retried.
    pub async fn current_session(&self) -> SessionState {
        let api = Arc::clone(&self.api);
        let result = self
            .cache
            .read(SESSION_KEY, self.stale_time, move || async move { fetch_session(api.as_ref()).await })
            .await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "session read failed");
        }
        self.session()
    }

    /// Invalidate the session entry and read it again.
    pub async fn refresh(&self) -> SessionState {
        self.cache.invalidate(SESSION_KEY);
        self.current_session().await
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns the service error unchanged; the cache is left untouched.
    pub async fn sign_up(&self, new_user: &NewUser) -> Result<User, AuthError> {
        match self.api.sign_up(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "signed up");
                self.cache.invalidate(SESSION_KEY);
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-up failed");
                Err(e)
            }
        }
    }

    /// Sign in with credentials.
    ///
    /// # Errors
    ///
    /// Returns the service error unchanged (401 for bad credentials); the
    /// cache is left untouched.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError> {
        match self.api.sign_in(credentials).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "signed in");
                self.cache.invalidate(SESSION_KEY);
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-in failed");
                Err(e)
            }
        }
    }

    /// Sign out and drop every cached query.
    ///
    /// # Errors
    ///
    /// Returns the service error unchanged; the cache is left untouched.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.api.sign_out().await {
            Ok(()) => {
                let dropped = self.cache.clear(None);
                tracing::info!(dropped, "signed out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-out failed");
                Err(e)
            }
        }
    }
}

/// Fetch the session value: the user as JSON, or `null` on 401.
async fn fetch_session(api: &dyn AuthApi) -> Result<Value, AuthError> {
    match api.me().await {
        Ok(user) => serde_json::to_value(user).map_err(|e| AuthError::Decode(e.to_string())),
        Err(AuthError::Unauthorized) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}
