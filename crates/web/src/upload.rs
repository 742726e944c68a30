//! Retrying blob uploads.
//!
//! Every image upload in the marketplace (sign-up avatar, restaurant
//! profile image, dish image) goes through one [`RetryingUploader`]: a
//! bounded number of attempts with exponential backoff, then a typed
//! failure the calling flow can fall back from.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use golibre_core::SubjectId;

use crate::backend::{Blob, BlobError, BlobStore};

/// Errors returned by [`RetryingUploader::upload`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// The blob carries no data. No attempt was made.
    #[error("empty upload")]
    EmptyBlob,

    /// The destination path is unusable. No attempt was made.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// Every attempt failed.
    #[error("upload failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: BlobError,
    },
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }
}

/// Uploads blobs with retries and resolves their retrieval URL.
#[derive(Clone)]
pub struct RetryingUploader {
    blobs: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl RetryingUploader {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self { blobs, policy }
    }

    /// Upload `blob` to `path` and return its retrieval URL.
    ///
    /// A successful upload is never deleted, even if the caller's flow fails
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::EmptyBlob`] or [`UploadError::InvalidPath`]
    /// without touching the network, or [`UploadError::Exhausted`] with the
    /// last failure once every attempt has failed.
    pub async fn upload(&self, path: &str, blob: &Blob) -> Result<Url, UploadError> {
        if blob.is_empty() {
            return Err(UploadError::EmptyBlob);
        }
        validate_path(path)?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(path, blob).await {
                Ok(url) => {
                    debug!(path, attempt, "upload succeeded");
                    return Ok(url);
                }
                Err(source) if attempt >= max_attempts => {
                    warn!(path, attempts = attempt, error = %source, "upload failed, giving up");
                    return Err(UploadError::Exhausted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(error) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(path, attempt, ?delay, error = %error, "upload failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, path: &str, blob: &Blob) -> Result<Url, BlobError> {
        let object = self.blobs.upload(path, blob).await?;
        self.blobs.download_url(&object).await
    }
}

fn validate_path(path: &str) -> Result<(), UploadError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(UploadError::InvalidPath(path.to_owned()));
    }
    Ok(())
}

// =============================================================================
// Object paths
// =============================================================================

/// `users/{uid}/profileImage/{millis}-{file}`
#[must_use]
pub fn user_avatar_path(uid: &SubjectId, file_name: &str) -> String {
    format!("users/{uid}/profileImage/{}", stamped(file_name))
}

/// `restaurants/{uid}/profileImage/{millis}-{file}`
#[must_use]
pub fn restaurant_image_path(uid: &SubjectId, file_name: &str) -> String {
    format!("restaurants/{uid}/profileImage/{}", stamped(file_name))
}

/// `restaurants/{uid}/dishes/{millis}-{file}`
#[must_use]
pub fn dish_image_path(uid: &SubjectId, file_name: &str) -> String {
    format!("restaurants/{uid}/dishes/{}", stamped(file_name))
}

/// Prefix a file name with the current time in milliseconds, keeping only
/// its last path component.
fn stamped(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|b| !b.is_empty() && *b != "." && *b != "..")
        .unwrap_or("upload");
    format!("{}-{base}", Utc::now().timestamp_millis())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::backend::ObjectRef;

    /// Blob store failing its first `failures` uploads, recording call times.
    struct Flaky {
        failures: u32,
        calls: Mutex<Vec<Instant>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlobStore for Flaky {
        async fn upload(&self, path: &str, _blob: &Blob) -> Result<ObjectRef, BlobError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if u32::try_from(calls.len()).unwrap() <= self.failures {
                return Err(BlobError::Backend {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(ObjectRef::at(path))
        }

        async fn download_url(&self, object: &ObjectRef) -> Result<Url, BlobError> {
            Ok(Url::parse(&format!("https://blobs.test/{}", object.path)).unwrap())
        }

        async fn delete(&self, _object: &ObjectRef) -> Result<(), BlobError> {
            Ok(())
        }

        fn object_for_url(&self, _url: &Url) -> Option<ObjectRef> {
            None
        }
    }

    fn blob() -> Blob {
        Blob {
            file_name: "me.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"jpeg"),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_growing_delays() {
        let store = Flaky::new(2);
        let uploader = RetryingUploader::new(store.clone(), RetryPolicy::default());

        let url = uploader.upload("users/u1/profileImage/1-me.jpg", &blob()).await.unwrap();
        assert_eq!(url.as_str(), "https://blobs.test/users/u1/profileImage/1-me.jpg");

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert_eq!(first_gap, Duration::from_secs(2));
        assert_eq!(second_gap, Duration::from_secs(4));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let store = Flaky::new(u32::MAX);
        let uploader = RetryingUploader::new(store.clone(), RetryPolicy::default());
        let started = Instant::now();

        let err = uploader.upload("users/u1/profileImage/1-me.jpg", &blob()).await.unwrap_err();
        assert!(matches!(err, UploadError::Exhausted { attempts: 3, .. }));
        assert_eq!(store.calls().len(), 3);
        // No sleep after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_call() {
        let store = Flaky::new(0);
        let uploader = RetryingUploader::new(store.clone(), RetryPolicy::default());

        let empty = Blob {
            data: Bytes::new(),
            ..blob()
        };
        assert!(matches!(
            uploader.upload("users/u1/a.png", &empty).await,
            Err(UploadError::EmptyBlob)
        ));
        for path in ["", "/abs.png", "users//a.png", "users/../secrets"] {
            assert!(matches!(
                uploader.upload(path, &blob()).await,
                Err(UploadError::InvalidPath(_))
            ));
        }
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_object_paths() {
        let uid = SubjectId::new("u1");
        let path = dish_image_path(&uid, "C:\\fotos\\mofongo.png");
        assert!(path.starts_with("restaurants/u1/dishes/"));
        assert!(path.ends_with("-mofongo.png"));
        assert!(user_avatar_path(&uid, "../").ends_with("-upload"));
        assert!(restaurant_image_path(&uid, "logo.png").starts_with("restaurants/u1/profileImage/"));
    }
}
