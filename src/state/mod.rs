//! Client-side session state.
//!
//! DESIGN
//! ======
//! `cache` is a generic keyed query cache; `auth` derives the visitor's
//! session from one of its entries and is the only code that writes it.

pub mod auth;
pub mod cache;
