//! Authenticated identity.

use serde::{Deserialize, Serialize};
use url::Url;

use super::{Email, SubjectId};

/// The principal reported by the identity provider.
///
/// Replaced wholesale whenever the provider reports a new principal; never
/// patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable, opaque user id.
    pub subject_id: SubjectId,
    /// Display name set at sign-up.
    pub display_name: Option<String>,
    /// Sign-in email address.
    pub email: Option<Email>,
    /// Profile photo, if one was uploaded.
    pub avatar_url: Option<Url>,
}

impl Identity {
    /// Create an identity with only a subject id.
    #[must_use]
    pub fn new(subject_id: impl Into<SubjectId>) -> Self {
        Self {
            subject_id: subject_id.into(),
            display_name: None,
            email: None,
            avatar_url: None,
        }
    }

    /// Name to greet the user with: display name, then email local part.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        self.email
            .as_ref()
            .and_then(|e| e.as_str().split('@').next())
            .unwrap_or("")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_name_prefers_display_name() {
        let mut identity = Identity::new("u1");
        identity.email = Some(Email::parse("ana@golibre.do").unwrap());
        assert_eq!(identity.greeting_name(), "ana");

        identity.display_name = Some("Ana Pérez".to_string());
        assert_eq!(identity.greeting_name(), "Ana Pérez");
    }
}
