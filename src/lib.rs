//! Client-side session layer for the storefront.
//!
//! SYSTEM CONTEXT
//! ==============
//! Page sections ask one question of this crate: who is the current visitor?
//! The answer lives in a single cache entry keyed by the `me` endpoint, and
//! [`AuthStateManager`] is the only writer of that entry. Sign-up and sign-in
//! invalidate it, sign-out drops every cached query so nothing fetched under
//! the previous identity survives.
//!
//! LAYOUT
//! ======
//! - `net`: wire types, errors, and the `AuthApi` seam with its HTTP client.
//! - `state`: the generic query cache and the auth state manager on top of it.
//! - `config`: environment-driven settings.

pub mod config;
pub mod net;
pub mod state;

pub use config::AuthConfig;
pub use net::api::{AuthApi, HttpAuthApi};
pub use net::types::{AuthError, Credentials, NewUser, User};
pub use state::auth::{AuthStateManager, SESSION_KEY, SessionState};
pub use state::cache::{CacheEntry, CacheEvent, EntryStatus, SessionCache};
