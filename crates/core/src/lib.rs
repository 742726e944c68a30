//! GoLibre Core - Shared types library.
//!
//! This crate provides the types shared by every GoLibre component:
//! - `web` - The marketplace front end (customers, drivers, restaurants)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async runtime. The session state machine's *data* lives here;
//! the controller that drives it from the identity provider lives in the web
//! crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for subject ids, emails, roles, identities,
//!   session snapshots, dish categories and prices
//! - [`guard`] - The route guard decision function

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod guard;
pub mod types;

pub use guard::{AllowedRoles, GuardDecision, RESTAURANT_SERVICE_PREFIX, evaluate};
pub use types::*;
