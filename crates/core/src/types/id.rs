//! Newtype IDs for opaque identifiers issued by the backend platform.
//!
//! Use the `define_string_id!` macro to create type-safe wrappers that
//! prevent accidentally mixing a user's subject id with a document id.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use golibre_core::define_string_id;
/// define_string_id!(TripId);
/// define_string_id!(DriverId);
///
/// let trip = TripId::new("t-1");
/// let driver = DriverId::new("t-1");
///
/// // These are different types, so this won't compile:
/// // let _: TripId = driver;
/// assert_eq!(trip.as_str(), driver.as_str());
/// ```
#[macro_export]
macro_rules! define_string_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// The identity provider's stable user id (Firebase `localId` / `uid`).
define_string_id!(SubjectId);
// A document id generated by the profile store.
define_string_id!(DocumentId);

impl DocumentId {
    /// Longest id accepted as a plain segment.
    pub const MAX_LEN: usize = 128;

    /// True when the id is one non-empty path segment of ASCII letters,
    /// digits, `_` and `-`.
    ///
    /// Ids that arrive from a request must pass this before they are used to
    /// address a document.
    #[must_use]
    pub fn is_plain_segment(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= Self::MAX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_display_and_serde() {
        let id = SubjectId::new("Xk29aQ");
        assert_eq!(id.to_string(), "Xk29aQ");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"Xk29aQ\"");

        let parsed: SubjectId = serde_json::from_str("\"Xk29aQ\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_document_id_from_str() {
        let id: DocumentId = "dish-7".into();
        assert_eq!(id.as_str(), "dish-7");
        assert_eq!(id.into_inner(), "dish-7".to_string());
    }

    #[test]
    fn test_document_id_plain_segment() {
        assert!(DocumentId::new("dish-7").is_plain_segment());
        assert!(DocumentId::new("aB3_xY9-zQ").is_plain_segment());

        for raw in ["", ".", "..", "../users/u1", "a/b", "a%2Fb", "d 1", "plato\u{f1}"] {
            assert!(!DocumentId::new(raw).is_plain_segment(), "{raw:?}");
        }
        assert!(!DocumentId::new("x".repeat(DocumentId::MAX_LEN + 1)).is_plain_segment());
    }
}
