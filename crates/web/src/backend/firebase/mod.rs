//! Firebase REST clients.
//!
//! # APIs
//!
//! ## Identity Toolkit
//! - `accounts:signInWithPassword`, `accounts:signUp`, `accounts:update`,
//!   `accounts:lookup`
//! - Secure Token API for ID token refresh
//!
//! ## Firestore
//! - Single-document reads and deletes
//! - `documents:commit` for every write, so server timestamps can be sent
//!   as `REQUEST_TIME` transforms
//! - `runQuery` for ordered collection listings
//!
//! ## Cloud Storage for Firebase
//! - `v0/b/{bucket}/o` uploads, metadata and deletes
//!
//! Every client of one browser session shares that session's
//! [`FirebaseAuth`], which supplies the ID token sent with store requests.

mod auth;
mod firestore;
mod storage;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

pub use auth::FirebaseAuth;
pub use firestore::FirestoreClient;
pub use storage::StorageClient;

use crate::backend::{Backend, Collaborators};
use crate::config::FirebaseConfig;

/// Request timeout for every Firebase call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Connects per-session Firebase clients over one shared HTTP pool.
#[derive(Clone)]
pub struct FirebaseBackend {
    inner: Arc<FirebaseBackendInner>,
}

struct FirebaseBackendInner {
    client: reqwest::Client,
    config: FirebaseConfig,
}

impl FirebaseBackend {
    /// Create the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: FirebaseConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(FirebaseBackendInner { client, config }),
        })
    }
}

impl Backend for FirebaseBackend {
    fn connect(&self) -> Collaborators {
        let client = &self.inner.client;
        let config = &self.inner.config;
        let auth = Arc::new(FirebaseAuth::new(client.clone(), config));

        Collaborators {
            profiles: Arc::new(FirestoreClient::new(client.clone(), config, auth.clone())),
            blobs: Arc::new(StorageClient::new(client.clone(), config, auth.clone())),
            identity: auth,
        }
    }
}

/// Error envelope shared by the Google REST APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Extract `(status, message)` from an error response body.
///
/// Falls back to a truncated raw body when it is not the standard envelope.
fn error_details(body: &str) -> (Option<String>, String) {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (None, body.chars().take(200).collect()),
        |envelope| (envelope.error.status, envelope.error.message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_details_envelope() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_details(body),
            (Some("INVALID_ARGUMENT".to_string()), "EMAIL_EXISTS".to_string())
        );
    }

    #[test]
    fn test_error_details_raw_body() {
        let (status, message) = error_details("<html>bad gateway</html>");
        assert_eq!(status, None);
        assert_eq!(message, "<html>bad gateway</html>");
    }
}
