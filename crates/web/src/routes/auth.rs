//! Authentication route handlers.
//!
//! Handles sign-in, the two sign-up flows (service provider from `/auth`,
//! customer from the landing page) and sign-out. Every handler works through
//! the requesting browser's session controller; identity changes reach the
//! session through the provider's notification, so handlers wait for it to
//! settle before choosing where to send the user.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use golibre_core::guard::{LANDING_PATH, SIGN_IN_PATH, safe_return_path};
use golibre_core::{Role, SubjectId};

use super::{destination_for, notice_for, redirect_with};
use crate::error::{AppError, Result};
use crate::forms::{MultipartForm, SignInForm, sign_up_request};
use crate::middleware::Client;
use crate::session::SessionController;
use crate::state::AppState;

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters of the auth page.
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    /// Path to return to after signing in.
    pub next: Option<String>,
    /// `signin` opens the sign-in tab; anything else the sign-up tab.
    pub tab: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Sign-in / provider sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth.html")]
pub struct AuthTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub next: Option<String>,
    pub sign_in_tab: bool,
    pub sign_in_href: String,
    pub sign_up_href: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// A tab (`signin` or `signup`) of the auth page, keeping the return path.
fn auth_tab(tab: &str, next: Option<&str>) -> String {
    let mut path = format!("{SIGN_IN_PATH}?tab={tab}");
    if let Some(next) = safe_return_path(next) {
        path.push_str("&next=");
        path.push_str(&urlencoding::encode(next));
    }
    path
}

/// Wait until the session shows `subject` and has stopped settling.
async fn settled_as(state: &AppState, controller: &SessionController, subject: &SubjectId) {
    controller
        .wait_until(state.config().init_timeout, |s| {
            s.subject_id() == Some(subject) && !s.is_settling()
        })
        .await;
}

// =============================================================================
// Sign-in
// =============================================================================

/// Display the auth page.
///
/// A signed-in visitor is sent on to the return path or their dashboard.
pub async fn auth_page(
    State(state): State<AppState>,
    Client(controller): Client,
    Query(query): Query<AuthQuery>,
) -> Response {
    let session = controller
        .wait_until(state.config().init_timeout, |s| !s.is_settling())
        .await;

    if session.is_authenticated() && !session.is_settling() {
        return Redirect::to(&destination_for(&session, query.next.as_deref())).into_response();
    }

    let next = safe_return_path(query.next.as_deref());
    AuthTemplate {
        error: notice_for(query.error.as_deref()),
        success: notice_for(query.success.as_deref()),
        next: next.map(str::to_owned),
        sign_in_tab: query.tab.as_deref() == Some("signin"),
        sign_in_href: auth_tab("signin", next),
        sign_up_href: auth_tab("signup", next),
    }
    .into_response()
}

/// Handle sign-in form submission.
pub async fn sign_in(
    State(state): State<AppState>,
    Client(controller): Client,
    Form(form): Form<SignInForm>,
) -> Response {
    match controller.sign_in(&form.email, &form.password).await {
        Ok(identity) => {
            settled_as(&state, &controller, &identity.subject_id).await;
            let session = controller.snapshot();
            Redirect::to(&destination_for(&session, form.next.as_deref())).into_response()
        }
        Err(e) => {
            e.report();
            redirect_with(&auth_tab("signin", form.next.as_deref()), "error", e.code()).into_response()
        }
    }
}

// =============================================================================
// Sign-up
// =============================================================================

/// Create the account, then assign `role`.
///
/// Returns the success notice code: `image_skipped` when the profile photo
/// could not be uploaded, `welcome` otherwise. A failed role write is
/// reported but does not undo the account; the in-memory role stands.
async fn register(
    state: &AppState,
    controller: &SessionController,
    mut form: MultipartForm,
    role: Role,
) -> Result<&'static str> {
    let image = form.take_file();
    let request = sign_up_request(&form)?;

    let outcome = controller.sign_up(request, image).await?;
    let subject = outcome.identity.subject_id;
    controller
        .wait_until(state.config().init_timeout, |s| s.subject_id() == Some(&subject))
        .await;

    if let Err(e) = controller.set_role(Some(role)).await {
        e.report();
    }

    Ok(if outcome.image_skipped {
        "image_skipped"
    } else {
        "welcome"
    })
}

/// Read a sign-up form and register it, then redirect.
///
/// The form's `next` field is honoured on success and kept on the failure
/// redirect built by `failure_path`.
async fn sign_up(
    state: &AppState,
    controller: &SessionController,
    multipart: Multipart,
    role: Role,
    failure_path: impl Fn(Option<&str>) -> String,
) -> Response {
    let form = match MultipartForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let e = AppError::BadRequest(e.to_string());
            e.report();
            return redirect_with(&failure_path(None), "error", e.code()).into_response();
        }
    };
    let next = safe_return_path(Some(form.text("next"))).map(str::to_owned);

    match register(state, controller, form, role).await {
        Ok(notice) => {
            let session = controller
                .wait_until(state.config().init_timeout, |s| !s.is_settling())
                .await;
            redirect_with(&destination_for(&session, next.as_deref()), "success", notice)
                .into_response()
        }
        Err(e) => {
            e.report();
            redirect_with(&failure_path(next.as_deref()), "error", e.code()).into_response()
        }
    }
}

/// Handle service provider sign-up (multipart, optional profile photo).
pub async fn sign_up_provider(
    State(state): State<AppState>,
    Client(controller): Client,
    multipart: Multipart,
) -> Response {
    sign_up(&state, &controller, multipart, Role::Driver, |next| {
        auth_tab("signup", next)
    })
    .await
}

/// Handle customer sign-up from the landing page.
pub async fn sign_up_customer(
    State(state): State<AppState>,
    Client(controller): Client,
    multipart: Multipart,
) -> Response {
    sign_up(&state, &controller, multipart, Role::Customer, |_| {
        LANDING_PATH.to_owned()
    })
    .await
}

// =============================================================================
// Sign-out
// =============================================================================

/// Handle sign-out.
pub async fn sign_out(Client(controller): Client) -> Response {
    match controller.sign_out().await {
        Ok(()) => Redirect::to(LANDING_PATH).into_response(),
        Err(e) => {
            e.report();
            redirect_with(LANDING_PATH, "error", e.code()).into_response()
        }
    }
}
