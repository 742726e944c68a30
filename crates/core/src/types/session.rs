//! Session snapshot and its derived state.
//!
//! A [`Session`] is the value the session controller publishes: who is
//! logged in, in what capacity, and whether the controller is still
//! initializing or in the middle of a mutation. [`SessionState`] is the
//! state-machine view derived from it.
//!
//! ```text
//! Initializing ──► Unauthenticated
//!              ├─► AuthenticatedNoRole ◄──► AuthenticatedWithRole
//!              └─► AuthenticatedWithRole
//!
//! `busy` overlays any of the three steady states.
//! ```

use serde::{Deserialize, Serialize};

use super::{Identity, Role, SubjectId};

/// Snapshot of the authentication and role state of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated principal, if any.
    pub identity: Option<Identity>,
    /// The principal's role, if resolved.
    pub role: Option<Role>,
    /// True until the first identity notification (or the init timeout).
    pub initializing: bool,
    /// True while an identity or role mutation is in flight.
    pub busy: bool,
}

/// The state-machine view of a [`Session`], ignoring the `busy` overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first identity notification.
    Initializing,
    /// No principal.
    Unauthenticated,
    /// A principal whose role has not been chosen (or could not be read).
    AuthenticatedNoRole,
    /// A principal with a resolved role.
    AuthenticatedWithRole(Role),
}

impl Session {
    /// The session every client starts in.
    #[must_use]
    pub const fn initializing() -> Self {
        Self {
            identity: None,
            role: None,
            initializing: true,
            busy: false,
        }
    }

    /// A settled session with no principal.
    #[must_use]
    pub const fn unauthenticated() -> Self {
        Self {
            identity: None,
            role: None,
            initializing: false,
            busy: false,
        }
    }

    /// A settled session for `identity` with an optional role.
    #[must_use]
    pub const fn authenticated(identity: Identity, role: Option<Role>) -> Self {
        Self {
            identity: Some(identity),
            role,
            initializing: false,
            busy: false,
        }
    }

    /// Derive the state-machine state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.initializing {
            return SessionState::Initializing;
        }
        match (&self.identity, &self.role) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::AuthenticatedNoRole,
            (Some(_), Some(role)) => SessionState::AuthenticatedWithRole(role.clone()),
        }
    }

    /// The subject id of the current principal.
    #[must_use]
    pub fn subject_id(&self) -> Option<&SubjectId> {
        self.identity.as_ref().map(|i| &i.subject_id)
    }

    /// True when a principal is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// True when the guard should hold rendering (initializing or busy).
    #[must_use]
    pub const fn is_settling(&self) -> bool {
        self.initializing || self.busy
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initializing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_initializing() {
        let session = Session::default();
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(session.is_settling());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_state_derivation() {
        assert_eq!(
            Session::unauthenticated().state(),
            SessionState::Unauthenticated
        );
        assert_eq!(
            Session::authenticated(Identity::new("u1"), None).state(),
            SessionState::AuthenticatedNoRole
        );
        assert_eq!(
            Session::authenticated(Identity::new("u1"), Some(Role::Driver)).state(),
            SessionState::AuthenticatedWithRole(Role::Driver)
        );
    }

    #[test]
    fn test_busy_is_an_overlay() {
        let mut session = Session::authenticated(Identity::new("u1"), Some(Role::Customer));
        session.busy = true;
        assert!(session.is_settling());
        assert_eq!(
            session.state(),
            SessionState::AuthenticatedWithRole(Role::Customer)
        );
    }

    #[test]
    fn test_subject_id() {
        let session = Session::authenticated(Identity::new("abc"), None);
        assert_eq!(session.subject_id().map(SubjectId::as_str), Some("abc"));
        assert_eq!(Session::unauthenticated().subject_id(), None);
    }
}
