//! User roles.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The capacity in which an identity uses the marketplace.
///
/// "No role yet" is modelled as `Option<Role>::None`, never as a variant.
///
/// `Driver` is deliberately flat: it covers every non-customer service
/// provider (restaurant, delivery, stylist, taxi).
///
/// Durable documents may hold values this build does not know about; those
/// are kept verbatim in [`Role::Unrecognized`] rather than being dropped, so
/// the route guard can treat them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Rider / orderer.
    Customer,
    /// Any service provider.
    Driver,
    /// A stored value matching neither known role.
    Unrecognized(String),
}

impl Role {
    /// Parse a role from its stored string form.
    ///
    /// Empty strings are treated as "no role".
    #[must_use]
    pub fn from_stored(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "customer" => Some(Self::Customer),
            "driver" => Some(Self::Driver),
            other => Some(Self::Unrecognized(other.to_owned())),
        }
    }

    /// Parse a role chosen through a form. Only known roles are accepted.
    #[must_use]
    pub fn from_selection(value: &str) -> Option<Self> {
        match Self::from_stored(value)? {
            Self::Unrecognized(_) => None,
            known => Some(known),
        }
    }

    /// Returns the stored string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Customer => "customer",
            Self::Driver => "driver",
            Self::Unrecognized(value) => value,
        }
    }

    /// The dashboard a role lands on, or `None` for unrecognized roles.
    #[must_use]
    pub const fn dashboard_path(&self) -> Option<&'static str> {
        match self {
            Self::Customer => Some("/customer/dashboard"),
            Self::Driver => Some("/driver/dashboard"),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "customer" => Self::Customer,
            "driver" => Self::Driver,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Unrecognized(value) => value,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stored() {
        assert_eq!(Role::from_stored("customer"), Some(Role::Customer));
        assert_eq!(Role::from_stored(" driver "), Some(Role::Driver));
        assert_eq!(Role::from_stored(""), None);
        assert_eq!(
            Role::from_stored("stylist"),
            Some(Role::Unrecognized("stylist".to_string()))
        );
    }

    #[test]
    fn test_from_selection_rejects_unknown() {
        assert_eq!(Role::from_selection("driver"), Some(Role::Driver));
        assert_eq!(Role::from_selection("admin"), None);
        assert_eq!(Role::from_selection(""), None);
    }

    #[test]
    fn test_dashboard_path() {
        assert_eq!(Role::Customer.dashboard_path(), Some("/customer/dashboard"));
        assert_eq!(Role::Driver.dashboard_path(), Some("/driver/dashboard"));
        assert_eq!(Role::Unrecognized("x".into()).dashboard_path(), None);
    }

    #[test]
    fn test_serde_uses_plain_strings() {
        assert_eq!(serde_json::to_string(&Role::Driver).unwrap(), "\"driver\"");
        let role: Role = serde_json::from_str("\"taxi\"").unwrap();
        assert_eq!(role, Role::Unrecognized("taxi".to_string()));

        let none: Option<Role> = serde_json::from_str("null").unwrap();
        assert_eq!(none, None);
    }
}
