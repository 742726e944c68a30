//! The per-client session/role controller.
//!
//! # State
//!
//! The controller publishes a [`Session`] on a `watch` channel. Identity
//! changes only ever enter through the identity provider's subscription,
//! which a single listener task consumes:
//!
//! - a notification without a principal settles the session signed out
//! - a notification with a principal replaces the identity, clears the role
//!   and spawns a role lookup for that subject
//! - no notification within the init timeout settles the session signed out
//!
//! Every identity change (and every explicit role write) bumps a generation
//! counter. A role lookup only publishes if the generation it started under
//! is still current, so a slow lookup for a previous subject can never leak
//! its role onto a newer one.
//!
//! `busy` is on while an explicit mutation holds it or a role lookup is in
//! flight. It is advisory: nothing serializes concurrent mutations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use golibre_core::{DocumentId, Identity, Role, Session, SubjectId};

use super::RoleCache;
use crate::backend::document::fields;
use crate::backend::{
    Blob, BlobStore, Collaborators, FieldValue, ProfileStore, ProfileUpdate,
};
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::forms::{SignUpRequest, credentials};
use crate::upload::{RetryPolicy, RetryingUploader, user_avatar_path};

/// Collection holding one document per user, keyed by subject id.
pub const USERS_COLLECTION: &str = "users";

/// Result of a successful sign-up.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// The new principal, with display attributes applied.
    pub identity: Identity,
    /// True when a profile image was given but could not be uploaded.
    pub image_skipped: bool,
}

/// Bookkeeping behind the published session.
#[derive(Debug, Default)]
struct Ledger {
    generation: u64,
    busy_holds: u32,
    /// Generation of the role lookup in flight, if any.
    fetching: Option<u64>,
}

struct Inner {
    collaborators: Collaborators,
    uploader: RetryingUploader,
    roles: RoleCache,
    ledger: Mutex<Ledger>,
    session: watch::Sender<Session>,
}

impl Inner {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a change to the ledger and the session, re-derive `busy`, and
    /// notify subscribers if the session changed.
    fn update<R>(&self, change: impl FnOnce(&mut Ledger, &mut Session) -> R) -> R {
        let mut ledger = self.ledger();
        let mut next = self.session.borrow().clone();
        let result = change(&mut ledger, &mut next);
        next.busy = ledger.busy_holds > 0 || ledger.fetching.is_some();
        self.session.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        result
    }

    /// Forget the principal and its role.
    fn reset(&self) {
        self.update(|ledger, session| {
            ledger.generation += 1;
            ledger.fetching = None;
            session.identity = None;
            session.role = None;
            session.initializing = false;
        });
    }

    /// Handle one identity notification.
    fn on_identity(self: &Arc<Self>, identity: Option<Identity>) {
        let Some(identity) = identity else {
            debug!("identity provider reports no principal");
            self.reset();
            return;
        };

        let subject = identity.subject_id.clone();
        debug!(%subject, "identity provider reports principal");
        let generation = self.update(|ledger, session| {
            ledger.generation += 1;
            ledger.fetching = Some(ledger.generation);
            session.identity = Some(identity);
            session.role = None;
            session.initializing = false;
            ledger.generation
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let role = inner.resolve_role(&subject, generation).await;
            inner.update(|ledger, session| {
                if ledger.generation == generation && ledger.fetching == Some(generation) {
                    ledger.fetching = None;
                    session.role = role;
                } else {
                    debug!(%subject, "discarding role of superseded principal");
                }
            });
        });
    }

    /// Read the durable role, falling back to the cache when the read fails.
    ///
    /// The cache is only refreshed while `generation` is current, so a
    /// lookup overtaken by an explicit role write leaves that write's value
    /// in place.
    async fn resolve_role(&self, subject: &SubjectId, generation: u64) -> Option<Role> {
        let id = DocumentId::new(subject.as_str());
        match self
            .collaborators
            .profiles
            .get_document(USERS_COLLECTION, &id)
            .await
        {
            Ok(document) => {
                let role = document
                    .as_ref()
                    .and_then(|doc| doc.str("role"))
                    .and_then(Role::from_stored);
                if self.ledger().generation == generation {
                    self.roles.set(subject, role.as_ref()).await;
                }
                debug!(%subject, role = ?role, "role resolved");
                role
            }
            Err(error) => {
                let cached = self.roles.get(subject).await;
                warn!(%subject, %error, cached = ?cached, "role lookup failed, using cached role");
                cached
            }
        }
    }
}

/// Holds `busy` on until dropped.
struct BusyHold {
    inner: Arc<Inner>,
}

impl BusyHold {
    fn new(inner: &Arc<Inner>) -> Self {
        inner.update(|ledger, _| ledger.busy_holds += 1);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for BusyHold {
    fn drop(&mut self) {
        self.inner
            .update(|ledger, _| ledger.busy_holds = ledger.busy_holds.saturating_sub(1));
    }
}

/// Single authority for who is signed in on one client and in what role.
///
/// Constructed once per browser session by the registry, shared by the route
/// guard and every form handler, and torn down with [`shutdown`](Self::shutdown)
/// (or on drop).
pub struct SessionController {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

impl SessionController {
    /// Start a controller and its identity listener.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(
        collaborators: Collaborators,
        roles: RoleCache,
        retry: RetryPolicy,
        init_timeout: Duration,
    ) -> Self {
        let identities = collaborators.identity.subscribe();
        let uploader = RetryingUploader::new(Arc::clone(&collaborators.blobs), retry);
        let (session, _) = watch::channel(Session::initializing());
        let inner = Arc::new(Inner {
            collaborators,
            uploader,
            roles,
            ledger: Mutex::new(Ledger::default()),
            session,
        });
        let listener = tokio::spawn(listen(Arc::clone(&inner), identities, init_timeout));
        Self { inner, listener }
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// The current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    /// Wait until the session satisfies `ready`, at most `timeout`.
    ///
    /// Returns the first satisfying session, or the current one on timeout.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        ready: impl FnMut(&Session) -> bool,
    ) -> Session {
        let mut sessions = self.subscribe();
        match tokio::time::timeout(timeout, sessions.wait_for(ready)).await {
            Ok(Ok(session)) => session.clone(),
            _ => self.snapshot(),
        }
    }

    /// Sign in with email and password.
    ///
    /// The returned identity is informational: the session itself changes
    /// only when the identity provider's notification arrives.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] without calling the provider, or
    /// [`AppError::Auth`] when the provider rejects the credentials. The
    /// session is left unchanged on error.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let credentials = credentials(email, password)?;
        let _busy = BusyHold::new(&self.inner);

        let identity = self
            .inner
            .collaborators
            .identity
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await?;

        info!(subject = %identity.subject_id, "signed in");
        set_sentry_user(&identity.subject_id, Some(credentials.email.as_str()));
        Ok(identity)
    }

    /// Create an account, upload its avatar best-effort, set its display
    /// attributes and write its user document with no role.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when the account cannot be created, or
    /// [`AppError::StoreWrite`] when the user document cannot be written.
    /// A failed avatar upload is not an error.
    #[instrument(skip_all, fields(email = %request.email))]
    pub async fn sign_up(&self, request: SignUpRequest, image: Option<Blob>) -> Result<SignUpOutcome> {
        let _busy = BusyHold::new(&self.inner);
        let collaborators = &self.inner.collaborators;

        let identity = collaborators
            .identity
            .sign_up_with_password(&request.email, &request.password)
            .await?;
        let subject = identity.subject_id.clone();
        info!(%subject, "account created");

        let mut image_skipped = false;
        let mut photo_url: Option<Url> = None;
        if let Some(blob) = image {
            let path = user_avatar_path(&subject, &blob.file_name);
            match self.inner.uploader.upload(&path, &blob).await {
                Ok(url) => photo_url = Some(url),
                Err(error) => {
                    warn!(%subject, %error, "profile image skipped");
                    image_skipped = true;
                }
            }
        }

        let update = ProfileUpdate {
            display_name: Some(request.full_name.clone()),
            photo_url: photo_url.clone(),
        };
        let identity = match collaborators.identity.update_profile(update).await {
            Ok(updated) => {
                self.inner.update(|_, session| {
                    if session.subject_id() == Some(&subject) {
                        session.identity = Some(updated.clone());
                    }
                });
                updated
            }
            Err(error) => {
                warn!(%subject, %error, "display attributes not set");
                identity
            }
        };

        let document = fields([
            ("uid", subject.as_str().into()),
            ("email", request.email.as_str().into()),
            ("fullName", request.full_name.as_str().into()),
            ("phoneNumber", request.phone.as_str().into()),
            ("photoURL", photo_url.as_ref().map(Url::as_str).into()),
            ("role", FieldValue::Null),
            ("createdAt", FieldValue::ServerTimestamp),
            ("updatedAt", FieldValue::ServerTimestamp),
        ]);
        collaborators
            .profiles
            .set_document(
                USERS_COLLECTION,
                &DocumentId::new(subject.as_str()),
                document,
                false,
            )
            .await
            .map_err(AppError::StoreWrite)?;

        Ok(SignUpOutcome {
            identity,
            image_skipped,
        })
    }

    /// Assign (or clear) the current principal's role.
    ///
    /// The in-memory role changes immediately and stays changed even if the
    /// durable write fails. Without a principal only the in-memory role
    /// changes. A missing user document is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::StoreRead`] or [`AppError::StoreWrite`] when the
    /// durable document cannot be read or written.
    #[instrument(skip(self))]
    pub async fn set_role(&self, role: Option<Role>) -> Result<()> {
        let Some(subject) = self.snapshot().subject_id().cloned() else {
            debug!("no principal, role kept in memory only");
            self.inner.update(|_, session| session.role = role);
            return Ok(());
        };

        let _busy = BusyHold::new(&self.inner);
        self.inner.update(|ledger, session| {
            ledger.generation += 1;
            ledger.fetching = None;
            session.role.clone_from(&role);
        });
        self.inner.roles.set(&subject, role.as_ref()).await;

        let id = DocumentId::new(subject.as_str());
        let profiles = &self.inner.collaborators.profiles;
        let existing = profiles
            .get_document(USERS_COLLECTION, &id)
            .await
            .map_err(AppError::StoreRead)?;
        if existing.is_none() {
            warn!(%subject, "user document missing, role not persisted");
            return Ok(());
        }

        profiles
            .update_fields(
                USERS_COLLECTION,
                &id,
                fields([
                    ("role", role.as_ref().map(Role::as_str).into()),
                    ("updatedAt", FieldValue::ServerTimestamp),
                ]),
            )
            .await
            .map_err(AppError::StoreWrite)?;

        info!(%subject, role = ?role, "role updated");
        Ok(())
    }

    /// Sign out and clear identity and role right away.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when the provider fails; the session is
    /// left unchanged.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let _busy = BusyHold::new(&self.inner);
        self.inner.collaborators.identity.sign_out().await?;
        self.inner.reset();
        clear_sentry_user();
        info!("signed out");
        Ok(())
    }

    /// Profile store acting as the current principal.
    #[must_use]
    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.inner.collaborators.profiles
    }

    /// Blob store acting as the current principal.
    #[must_use]
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.inner.collaborators.blobs
    }

    /// Retrying uploader over [`blobs`](Self::blobs).
    #[must_use]
    pub fn uploader(&self) -> &RetryingUploader {
        &self.inner.uploader
    }

    /// Stop listening for identity changes.
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Consume identity notifications until the provider goes away.
async fn listen(
    inner: Arc<Inner>,
    mut identities: watch::Receiver<Option<Identity>>,
    init_timeout: Duration,
) {
    match tokio::time::timeout(init_timeout, identities.changed()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            warn!("identity provider closed before reporting a principal");
            inner.reset();
            return;
        }
        Err(_) => {
            warn!(?init_timeout, "no identity notification, settling signed out");
            inner.update(|ledger, session| {
                if session.initializing {
                    ledger.generation += 1;
                    session.initializing = false;
                }
            });
            if identities.changed().await.is_err() {
                return;
            }
        }
    }

    loop {
        let identity = identities.borrow_and_update().clone();
        inner.on_identity(identity);
        if identities.changed().await.is_err() {
            debug!("identity provider closed");
            return;
        }
    }
}
