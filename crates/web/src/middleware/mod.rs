//! HTTP middleware stack for the web front end.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with an in-memory store)
//!
//! # Extractors
//!
//! - [`Client`] - the session controller of the requesting browser
//! - [`Guarded`] - [`Client`] plus a role check against a [`Policy`]

pub mod client;
pub mod guard;
pub mod session;

pub use client::{Client, ClientRejection};
pub use guard::{AnyIdentity, CustomerOnly, DriverOnly, GuardRejection, Guarded, Policy};
pub use session::create_session_layer;
