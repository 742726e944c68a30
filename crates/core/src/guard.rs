//! Route guard.
//!
//! Decides whether a protected view may render for the current [`Session`],
//! given the roles the view declares and the requested path. The decision
//! is a pure function; callers must re-evaluate it whenever the session or
//! the path changes because a role can be assigned after the first render.

use crate::types::{Role, Session};

/// Path prefix of the restaurant service pages.
///
/// Any `driver` may enter these pages regardless of the roles they declare:
/// the service-provider role covers every provider sub-vertical.
pub const RESTAURANT_SERVICE_PREFIX: &str = "/services/restaurant";

/// Path of the sign-in view.
pub const SIGN_IN_PATH: &str = "/auth";

/// Path of the anonymous landing view.
pub const LANDING_PATH: &str = "/";

const CUSTOMER_ONLY: &[Role] = &[Role::Customer];
const DRIVER_ONLY: &[Role] = &[Role::Driver];

/// The roles a view admits.
///
/// An empty set means "any authenticated identity, role irrelevant".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllowedRoles(&'static [Role]);

impl AllowedRoles {
    /// Any authenticated identity.
    pub const ANY: Self = Self(&[]);
    /// Customers only.
    pub const CUSTOMER: Self = Self(CUSTOMER_ONLY);
    /// Service providers only.
    pub const DRIVER: Self = Self(DRIVER_ONLY);

    /// Admit the given roles.
    #[must_use]
    pub const fn new(roles: &'static [Role]) -> Self {
        Self(roles)
    }

    /// True when the view declares no role requirement.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `role` is admitted (always true for an empty set).
    #[must_use]
    pub fn admits(&self, role: &Role) -> bool {
        self.is_empty() || self.0.contains(role)
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the protected content.
    Render,
    /// Render a loading placeholder; the session is still settling.
    Loading,
    /// Send the client elsewhere.
    Redirect(String),
}

/// Evaluate the guard for one request.
///
/// 1. Initializing or busy: loading placeholder, never a redirect.
/// 2. No identity: sign-in, carrying the requested path.
/// 3. No role while the view requires one: sign-in, carrying the path.
/// 4. Role outside the declared set: drivers pass into the restaurant
///    service pages; known roles go to their dashboard; anything else goes
///    to the landing view.
/// 5. Otherwise render.
#[must_use]
pub fn evaluate(session: &Session, allowed: AllowedRoles, path: &str) -> GuardDecision {
    if session.is_settling() {
        return GuardDecision::Loading;
    }

    if !session.is_authenticated() {
        return GuardDecision::Redirect(sign_in_redirect(path));
    }

    let Some(role) = &session.role else {
        return if allowed.is_empty() {
            GuardDecision::Render
        } else {
            GuardDecision::Redirect(sign_in_redirect(path))
        };
    };

    if allowed.admits(role) {
        return GuardDecision::Render;
    }

    if *role == Role::Driver && is_restaurant_service_path(path) {
        return GuardDecision::Render;
    }

    let target = role.dashboard_path().unwrap_or(LANDING_PATH);
    GuardDecision::Redirect(target.to_owned())
}

/// Build the sign-in URL carrying `path` as the return-to parameter.
#[must_use]
pub fn sign_in_redirect(path: &str) -> String {
    let mut url = String::from(SIGN_IN_PATH);
    url.push_str("?next=");
    url.extend(url::form_urlencoded::byte_serialize(path.as_bytes()));
    url
}

/// True for the restaurant service namespace itself and anything below it.
#[must_use]
pub fn is_restaurant_service_path(path: &str) -> bool {
    path.strip_prefix(RESTAURANT_SERVICE_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Validate a return-to parameter: only same-site absolute paths survive.
#[must_use]
pub fn safe_return_path(next: Option<&str>) -> Option<&str> {
    next.filter(|p| p.starts_with('/') && !p.starts_with("//") && !p.contains('\\'))
}
