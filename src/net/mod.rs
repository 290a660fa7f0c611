//! Networking for the auth service.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls to the auth endpoints and `types` defines the wire
//! schema plus the shared error type.

pub mod api;
pub mod types;
