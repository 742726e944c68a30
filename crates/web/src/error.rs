//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. Form handlers usually turn an
//! `AppError` into a `?error=<code>` redirect via [`AppError::code`];
//! everything else returns `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::backend::{AuthError, StoreError};
use crate::forms::ValidationError;
use crate::upload::UploadError;

/// Application-level error type for the marketplace.
#[derive(Debug, Error)]
pub enum AppError {
    /// A form field failed local validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The identity provider rejected the operation.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Reading from the profile store failed.
    #[error("Store read error: {0}")]
    StoreRead(#[source] StoreError),

    /// Writing to the profile store failed.
    #[error("Store write error: {0}")]
    StoreWrite(#[source] StoreError),

    /// A mandatory image upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// The operation requires a signed-in principal.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The operation requires a completed restaurant profile.
    #[error("Incomplete profile: {0}")]
    IncompleteProfile(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short code carried in `?error=` redirects and mapped to a notice by
    /// the templates.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredential | AuthError::UserNotFound => "credentials",
                AuthError::EmailInUse => "email_in_use",
                AuthError::WeakPassword(_) => "weak_password",
                AuthError::InvalidEmail => "invalid_email",
                AuthError::UserDisabled => "user_disabled",
                AuthError::TooManyAttempts => "too_many_attempts",
                AuthError::NotSignedIn => "not_signed_in",
                AuthError::Http(_) | AuthError::Provider(_) => "auth",
            },
            Self::StoreRead(_) => "store_read",
            Self::StoreWrite(_) => "store_write",
            Self::Upload(_) => "upload",
            Self::Unauthorized(_) => "not_signed_in",
            Self::IncompleteProfile(_) => "incomplete_profile",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }

    /// True for failures worth reporting to Sentry.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StoreRead(_)
                | Self::StoreWrite(_)
                | Self::Upload(_)
                | Self::Internal(_)
                | Self::Auth(AuthError::Http(_) | AuthError::Provider(_))
        )
    }

    /// Log the error, capturing server-side failures to Sentry.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();

        let status = match &self {
            Self::Validation(_) | Self::BadRequest(_) | Self::IncompleteProfile(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredential
                | AuthError::UserNotFound
                | AuthError::NotSignedIn
                | AuthError::UserDisabled => StatusCode::UNAUTHORIZED,
                AuthError::EmailInUse => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail => StatusCode::BAD_REQUEST,
                AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
                AuthError::Http(_) | AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            },
            Self::StoreRead(_) | Self::StoreWrite(_) | Self::Upload(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::StoreRead(_) | Self::StoreWrite(_) | Self::Upload(_) => {
                "External service error".to_string()
            }
            Self::Auth(AuthError::InvalidCredential | AuthError::UserNotFound) => {
                "Invalid credentials".to_string()
            }
            Self::Auth(AuthError::Http(_) | AuthError::Provider(_)) => {
                "Authentication error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
