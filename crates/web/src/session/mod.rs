//! Session and role state.
//!
//! - [`SessionController`] - the authority for one client's identity and role
//! - [`SessionRegistry`] - one controller per browser session
//! - [`RoleCache`] - process-wide fallback copy of durable roles

mod controller;
mod registry;
mod role_cache;

pub use controller::{SessionController, SignUpOutcome, USERS_COLLECTION};
pub use registry::SessionRegistry;
pub use role_cache::RoleCache;
