//! Backend platform collaborators.
//!
//! # Architecture
//!
//! The marketplace talks to three managed services, each behind an
//! `async_trait` so the session controller and the business flows can be
//! driven by in-memory fakes in tests:
//!
//! - [`IdentityProvider`] - password sign-in/sign-up, profile attributes and
//!   a `watch` subscription to the current principal
//! - [`ProfileStore`] - schemaless documents with server-assigned timestamps
//! - [`BlobStore`] - binary objects addressed by path
//!
//! A [`Backend`] hands out one [`Collaborators`] bundle per browser session:
//! the identity provider is stateful (it holds that client's tokens) and the
//! stores act on behalf of whoever it has signed in.
//!
//! The production implementation lives in [`firebase`].

pub mod document;
pub mod firebase;
#[cfg(test)]
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

use golibre_core::{DocumentId, Email, Identity};

pub use document::{Document, FieldValue, Fields};

// =============================================================================
// Errors
// =============================================================================

/// Errors reported by the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password combination.
    #[error("invalid credentials")]
    InvalidCredential,

    /// No account for this email.
    #[error("user not found")]
    UserNotFound,

    /// An account with this email already exists.
    #[error("email already in use")]
    EmailInUse,

    /// Provider rejected the password.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Provider rejected the email address.
    #[error("invalid email address")]
    InvalidEmail,

    /// The account is disabled.
    #[error("user disabled")]
    UserDisabled,

    /// Too many attempts from this client.
    #[error("too many attempts, try again later")]
    TooManyAttempts,

    /// The operation requires a signed-in principal.
    #[error("not signed in")]
    NotSignedIn,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other provider failure.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Errors reported by the profile store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The target document does not exist (update of a missing document).
    #[error("document not found: {0}")]
    NotFound(String),

    /// The document already exists (create of an existing document).
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    /// Security rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A collection or document id is not a usable path segment.
    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Any other backend failure.
    #[error("store error ({status}): {message}")]
    Backend { status: u16, message: String },
}

/// Errors reported by the blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No object at this path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Security rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A collection or document id is not a usable path segment.
    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other backend failure.
    #[error("storage error ({status}): {message}")]
    Backend { status: u16, message: String },
}

// =============================================================================
// Values
// =============================================================================

/// Profile attributes settable on the current principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<Url>,
}

/// A binary upload as received from a form.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Client-side file name (already stripped of any directory part).
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Blob {
    /// True when the upload carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A stored object's address, plus the access token needed to build a
/// public download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub path: String,
    pub download_token: Option<String>,
}

impl ObjectRef {
    /// Reference an object by path only.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            download_token: None,
        }
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Password authentication with a subscription to the current principal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in an existing account.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    /// Create an account and sign it in.
    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    /// Set display attributes on the signed-in principal.
    async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, AuthError>;

    /// Forget the signed-in principal.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to principal changes.
    ///
    /// Once the provider knows its initial principal (possibly none), the
    /// returned receiver reports it as changed, so the first `changed()`
    /// resolves immediately; every later sign-in, sign-up or sign-out is
    /// reported the same way.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// Schemaless document storage.
///
/// `collection` is a slash-separated collection path such as `users` or
/// `restaurants/{uid}/dishes`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a document; `Ok(None)` when it does not exist.
    async fn get_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Write a document, replacing it unless `merge` is set.
    async fn set_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Update some fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document is missing.
    async fn update_fields(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError>;

    /// Create a document under a generated id.
    async fn add_document(&self, collection: &str, fields: Fields)
    -> Result<DocumentId, StoreError>;

    /// List a collection ordered by `order_by`, newest (largest) first.
    async fn list_documents(
        &self,
        collection: &str,
        order_by: &str,
    ) -> Result<Vec<Document>, StoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError>;
}

/// Binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `blob` at `path`.
    async fn upload(&self, path: &str, blob: &Blob) -> Result<ObjectRef, BlobError>;

    /// Resolve the public retrieval URL of an object.
    async fn download_url(&self, object: &ObjectRef) -> Result<Url, BlobError>;

    /// Delete an object.
    async fn delete(&self, object: &ObjectRef) -> Result<(), BlobError>;

    /// Map a retrieval URL back to the object it points at, when the URL
    /// belongs to this store.
    fn object_for_url(&self, url: &Url) -> Option<ObjectRef>;
}

/// The collaborators serving one browser session.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Source of per-session [`Collaborators`].
pub trait Backend: Send + Sync {
    /// Connect a fresh, signed-out set of collaborators.
    fn connect(&self) -> Collaborators;
}
