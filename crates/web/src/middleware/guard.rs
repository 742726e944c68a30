//! Route guard extractor.
//!
//! Adapts [`golibre_core::evaluate`] to axum: a handler that takes a
//! [`Guarded<P>`] only runs when the requesting browser's session admits the
//! roles declared by `P`.
//!
//! The guard is evaluated on every request against the controller's latest
//! snapshot, after waiting (at most the init timeout) for the session to
//! stop settling. A session that is still settling after that renders a
//! self-refreshing loading page instead of a redirect, so a role that is
//! about to arrive never bounces the user to sign-in.

use std::marker::PhantomData;
use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use golibre_core::{AllowedRoles, GuardDecision, Session, evaluate};

use super::client::{Client, ClientRejection};
use crate::session::SessionController;
use crate::state::AppState;

/// The roles a group of routes admits.
pub trait Policy: Send + Sync + 'static {
    const ALLOWED: AllowedRoles;
}

/// Any authenticated identity, with or without a role.
pub struct AnyIdentity;

/// Customers only.
pub struct CustomerOnly;

/// Service providers only (and, through the restaurant service prefix,
/// the restaurant pages).
pub struct DriverOnly;

impl Policy for AnyIdentity {
    const ALLOWED: AllowedRoles = AllowedRoles::ANY;
}

impl Policy for CustomerOnly {
    const ALLOWED: AllowedRoles = AllowedRoles::CUSTOMER;
}

impl Policy for DriverOnly {
    const ALLOWED: AllowedRoles = AllowedRoles::DRIVER;
}

/// Extractor that admits the request only when the guard renders.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(guard: Guarded<CustomerOnly>) -> impl IntoResponse {
///     format!("Hello, {:?}!", guard.subject())
/// }
/// ```
pub struct Guarded<P> {
    /// The requesting browser's controller.
    pub controller: Arc<SessionController>,
    /// The snapshot the guard admitted.
    pub session: Session,
    _policy: PhantomData<P>,
}

impl<P> Guarded<P> {
    /// The admitted principal.
    #[must_use]
    pub fn subject(&self) -> Option<&golibre_core::SubjectId> {
        self.session.subject_id()
    }
}

/// Loading placeholder shown while the session settles.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub error: Option<String>,
}

/// Why a guarded request did not render.
pub enum GuardRejection {
    /// Send the browser elsewhere.
    Redirect(String),
    /// The session is still settling.
    Loading,
    /// The browser session could not be resolved.
    Client(ClientRejection),
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(target) => Redirect::to(&target).into_response(),
            Self::Loading => LoadingTemplate { error: None }.into_response(),
            Self::Client(rejection) => rejection.into_response(),
        }
    }
}

impl<P: Policy> FromRequestParts<AppState> for Guarded<P> {
    type Rejection = GuardRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Client(controller) = Client::from_request_parts(parts, state)
            .await
            .map_err(GuardRejection::Client)?;

        let session = controller
            .wait_until(state.config().init_timeout, |s| !s.is_settling())
            .await;

        let path = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());

        match evaluate(&session, P::ALLOWED, path) {
            GuardDecision::Render => Ok(Self {
                controller,
                session,
                _policy: PhantomData,
            }),
            GuardDecision::Loading => {
                tracing::debug!(path, "session still settling");
                Err(GuardRejection::Loading)
            }
            GuardDecision::Redirect(target) => {
                tracing::debug!(path, target = %target, "guard redirect");
                Err(GuardRejection::Redirect(target))
            }
        }
    }
}
