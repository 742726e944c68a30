//! Role selection handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use golibre_core::guard::{LANDING_PATH, safe_return_path};

use super::{ROLE_SELECTION_PATH, destination_for, notice_for, redirect_with};
use crate::forms::RoleForm;
use crate::middleware::{AnyIdentity, Guarded};

/// Query parameters of the role chooser.
#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub error: Option<String>,
    pub next: Option<String>,
}

/// Role chooser template.
#[derive(Template, WebTemplate)]
#[template(path = "role_selection.html")]
pub struct RoleSelectionTemplate {
    pub error: Option<String>,
    pub name: String,
    pub next: Option<String>,
}

/// Send a principal with a role to their dashboard; otherwise let them pick.
pub async fn role_selection_page(
    guard: Guarded<AnyIdentity>,
    Query(query): Query<RoleQuery>,
) -> Response {
    if let Some(role) = &guard.session.role {
        return Redirect::to(role.dashboard_path().unwrap_or(LANDING_PATH)).into_response();
    }

    RoleSelectionTemplate {
        error: notice_for(query.error.as_deref()),
        name: guard
            .session
            .identity
            .as_ref()
            .map(|identity| identity.greeting_name().to_owned())
            .unwrap_or_default(),
        next: safe_return_path(query.next.as_deref()).map(str::to_owned),
    }
    .into_response()
}

/// Set the principal's role.
///
/// The role applies in memory even when the durable write fails; the user
/// continues to the destination with a notice.
pub async fn choose_role(guard: Guarded<AnyIdentity>, Form(form): Form<RoleForm>) -> Response {
    let role = match form.validate() {
        Ok(role) => role,
        Err(e) => return redirect_with(ROLE_SELECTION_PATH, "error", e.code()).into_response(),
    };

    let result = guard.controller.set_role(Some(role)).await;
    let destination = destination_for(&guard.controller.snapshot(), form.next.as_deref());

    match result {
        Ok(()) => Redirect::to(&destination).into_response(),
        Err(e) => {
            e.report();
            redirect_with(&destination, "error", e.code()).into_response()
        }
    }
}
