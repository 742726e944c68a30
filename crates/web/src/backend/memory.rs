//! In-memory collaborators for tests.
//!
//! Each fake keeps call counters and failure switches so tests can script
//! the backend: failing reads, failing the first N uploads, delaying the
//! role lookup of one subject, or an identity provider that never reports.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::DateTime;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use url::Url;

use golibre_core::{DocumentId, Email, Identity, SubjectId};

use super::{
    AuthError, Backend, Blob, BlobError, BlobStore, Collaborators, Document, FieldValue, Fields,
    IdentityProvider, ObjectRef, ProfileStore, ProfileUpdate, StoreError,
};

// =============================================================================
// Identity
// =============================================================================

struct Account {
    password: String,
    identity: Identity,
}

/// Accounts shared by every [`MemoryIdentity`] of one [`MemoryBackend`].
#[derive(Default)]
pub struct AccountBook {
    accounts: Mutex<HashMap<String, Account>>,
    next_id: AtomicU64,
}

impl AccountBook {
    /// Register an account directly.
    pub fn register(&self, email: &str, password: &str, identity: Identity) {
        self.accounts.lock().unwrap().insert(
            email.to_owned(),
            Account {
                password: password.to_owned(),
                identity,
            },
        );
    }
}

/// Identity provider over an [`AccountBook`].
pub struct MemoryIdentity {
    book: Arc<AccountBook>,
    current: watch::Sender<Option<Identity>>,
    silent: bool,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new(book: Arc<AccountBook>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            book,
            current,
            silent: false,
        }
    }

    /// A provider that does not report its initial principal.
    #[must_use]
    pub fn silent(book: Arc<AccountBook>) -> Self {
        Self {
            silent: true,
            ..Self::new(book)
        }
    }

    /// Push a principal change, as the provider would on its own.
    pub fn announce(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let identity = {
            let accounts = self.book.accounts.lock().unwrap();
            let account = accounts.get(email.as_str()).ok_or(AuthError::UserNotFound)?;
            if account.password != password.expose_secret() {
                return Err(AuthError::InvalidCredential);
            }
            account.identity.clone()
        };
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        if password.expose_secret().len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters".to_string(),
            ));
        }
        let identity = {
            let mut accounts = self.book.accounts.lock().unwrap();
            if accounts.contains_key(email.as_str()) {
                return Err(AuthError::EmailInUse);
            }
            let n = self.book.next_id.fetch_add(1, Ordering::SeqCst);
            let mut identity = Identity::new(format!("uid-{n}"));
            identity.email = Some(email.clone());
            accounts.insert(
                email.as_str().to_owned(),
                Account {
                    password: password.expose_secret().to_owned(),
                    identity: identity.clone(),
                },
            );
            identity
        };
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, AuthError> {
        let current = self.current.borrow().clone().ok_or(AuthError::NotSignedIn)?;
        let mut accounts = self.book.accounts.lock().unwrap();
        let account = accounts
            .values_mut()
            .find(|a| a.identity.subject_id == current.subject_id)
            .ok_or(AuthError::UserNotFound)?;
        account.identity.display_name = update.display_name;
        account.identity.avatar_url = update.photo_url;
        Ok(account.identity.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.announce(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        let mut receiver = self.current.subscribe();
        if !self.silent {
            receiver.mark_changed();
        }
        receiver
    }
}

// =============================================================================
// Profile store
// =============================================================================

/// Document store keyed by `(collection, id)`.
#[derive(Default)]
pub struct MemoryProfiles {
    docs: Mutex<BTreeMap<(String, String), Fields>>,
    clock: AtomicU64,
    next_id: AtomicU64,
    reads: AtomicU32,
    writes: AtomicU32,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delays: Mutex<HashMap<String, Duration>>,
}

impl MemoryProfiles {
    /// Insert or replace a document directly, resolving server timestamps.
    pub fn put(&self, collection: &str, id: &str, fields: Fields) {
        let fields = self.resolve(fields);
        self.docs
            .lock()
            .unwrap()
            .insert((collection.to_owned(), id.to_owned()), fields);
    }

    /// Read a document directly.
    #[must_use]
    pub fn peek(&self, collection: &str, id: &str) -> Option<Fields> {
        self.docs
            .lock()
            .unwrap()
            .get(&(collection.to_owned(), id.to_owned()))
            .cloned()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay reads of documents with this id.
    pub fn delay_reads_of(&self, id: &str, delay: Duration) {
        self.read_delays
            .lock()
            .unwrap()
            .insert(id.to_owned(), delay);
    }

    #[must_use]
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Replace server timestamp sentinels with a monotonic fake clock.
    fn resolve(&self, fields: Fields) -> Fields {
        fields
            .into_iter()
            .map(|(key, value)| {
                let value = if value == FieldValue::ServerTimestamp {
                    let tick = self.clock.fetch_add(1, Ordering::SeqCst);
                    let millis = 1_700_000_000_000_i64 + i64::try_from(tick).unwrap();
                    FieldValue::Timestamp(DateTime::from_timestamp_millis(millis).unwrap())
                } else {
                    value
                };
                (key, value)
            })
            .collect()
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                status: 503,
                message: "write unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn check_read(&self, id: Option<&str>) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = id.and_then(|id| self.read_delays.lock().unwrap().get(id).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                status: 503,
                message: "read unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn sort_key(value: Option<&FieldValue>) -> (u8, i64, String) {
    match value {
        Some(FieldValue::Timestamp(ts)) => (2, ts.timestamp_millis(), String::new()),
        #[allow(clippy::cast_possible_truncation)]
        Some(FieldValue::Double(d)) => (1, *d as i64, String::new()),
        Some(FieldValue::Integer(i)) => (1, *i, String::new()),
        Some(FieldValue::String(s)) => (1, 0, s.clone()),
        _ => (0, 0, String::new()),
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn get_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        self.check_read(Some(id.as_str())).await?;
        Ok(self.peek(collection, id.as_str()).map(|fields| Document {
            id: id.clone(),
            fields,
        }))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let fields = self.resolve(fields);
        let mut docs = self.docs.lock().unwrap();
        let key = (collection.to_owned(), id.as_str().to_owned());
        if merge {
            docs.entry(key).or_default().extend(fields);
        } else {
            docs.insert(key, fields);
        }
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let fields = self.resolve(fields);
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .get_mut(&(collection.to_owned(), id.as_str().to_owned()))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        doc.extend(fields);
        Ok(())
    }

    async fn add_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, StoreError> {
        self.check_write()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = DocumentId::new(format!("doc-{n}"));
        self.put(collection, id.as_str(), fields);
        Ok(id)
    }

    async fn list_documents(
        &self,
        collection: &str,
        order_by: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_read(None).await?;
        let mut documents: Vec<Document> = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), fields)| Document {
                id: DocumentId::new(id.clone()),
                fields: fields.clone(),
            })
            .collect();
        documents.sort_by_key(|doc| std::cmp::Reverse(sort_key(doc.fields.get(order_by))));
        Ok(documents)
    }

    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        self.check_write()?;
        self.docs
            .lock()
            .unwrap()
            .remove(&(collection.to_owned(), id.as_str().to_owned()));
        Ok(())
    }
}

// =============================================================================
// Blob store
// =============================================================================

const BLOB_HOST: &str = "blobs.test";

/// Object store with scripted upload failures.
#[derive(Default)]
pub struct MemoryBlobs {
    objects: Mutex<HashMap<String, Bytes>>,
    uploads: AtomicU32,
    failures_left: AtomicU32,
    fail_deletes: AtomicBool,
}

impl MemoryBlobs {
    /// Fail the next `n` uploads.
    pub fn fail_next_uploads(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Upload attempts so far, failed ones included.
    #[must_use]
    pub fn upload_calls(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn upload(&self, path: &str, blob: &Blob) -> Result<ObjectRef, BlobError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlobError::Backend {
                status: 503,
                message: "upload unavailable".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_owned(), blob.data.clone());
        Ok(ObjectRef {
            path: path.to_owned(),
            download_token: Some("tok".to_string()),
        })
    }

    async fn download_url(&self, object: &ObjectRef) -> Result<Url, BlobError> {
        Ok(Url::parse(&format!("https://{BLOB_HOST}/{}", object.path)).unwrap())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::PermissionDenied(object.path.clone()));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&object.path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(object.path.clone()))
    }

    fn object_for_url(&self, url: &Url) -> Option<ObjectRef> {
        (url.host_str() == Some(BLOB_HOST))
            .then(|| ObjectRef::at(url.path().trim_start_matches('/')))
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Shared fakes; every `connect` gets its own identity provider.
#[derive(Default)]
pub struct MemoryBackend {
    pub accounts: Arc<AccountBook>,
    pub profiles: Arc<MemoryProfiles>,
    pub blobs: Arc<MemoryBlobs>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an account with a user document carrying `role`.
    pub fn seed_user(&self, uid: &str, email: &str, password: &str, role: Option<&str>) -> Identity {
        let mut identity = Identity::new(SubjectId::new(uid));
        identity.email = Email::parse(email).ok();
        self.accounts.register(email, password, identity.clone());
        self.profiles.put(
            "users",
            uid,
            crate::backend::document::fields([
                ("uid", uid.into()),
                ("email", email.into()),
                ("role", role.into()),
            ]),
        );
        identity
    }

    /// Collaborators around a given identity provider.
    #[must_use]
    pub fn collaborators(&self, identity: Arc<dyn IdentityProvider>) -> Collaborators {
        Collaborators {
            identity,
            profiles: self.profiles.clone(),
            blobs: self.blobs.clone(),
        }
    }
}

impl Backend for MemoryBackend {
    fn connect(&self) -> Collaborators {
        self.collaborators(Arc::new(MemoryIdentity::new(self.accounts.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::document::fields;

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let profiles = MemoryProfiles::default();
        for title in ["a", "b", "c"] {
            profiles
                .add_document(
                    "dishes",
                    fields([
                        ("title", title.into()),
                        ("createdAt", FieldValue::ServerTimestamp),
                    ]),
                )
                .await
                .unwrap();
        }
        let titles: Vec<String> = profiles
            .list_documents("dishes", "createdAt")
            .await
            .unwrap()
            .iter()
            .filter_map(|d| d.str("title").map(str::to_owned))
            .collect();
        assert_eq!(titles, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_scripted_upload_failures() {
        let blobs = MemoryBlobs::default();
        blobs.fail_next_uploads(1);
        let blob = Blob {
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"png"),
        };
        assert!(blobs.upload("x/a.png", &blob).await.is_err());
        assert!(blobs.upload("x/a.png", &blob).await.is_ok());
        assert_eq!(blobs.upload_calls(), 2);
        assert!(blobs.contains("x/a.png"));
    }
}
