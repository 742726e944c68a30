//! Landing page handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};

use golibre_core::Role;

use super::{MessageQuery, notice_for};
use crate::middleware::Client;
use crate::state::AppState;

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    /// Greeting for a signed-in visitor without a role.
    pub greeting: Option<String>,
}

/// Display the landing page.
///
/// Visitors with a known role go straight to their dashboard; everyone else
/// sees the customer sign-up and sign-in forms, or the role chooser links
/// when signed in without a role.
pub async fn landing(
    State(state): State<AppState>,
    Client(controller): Client,
    Query(query): Query<MessageQuery>,
) -> Response {
    let session = controller
        .wait_until(state.config().init_timeout, |s| !s.is_settling())
        .await;

    if let Some(dashboard) = session.role.as_ref().and_then(Role::dashboard_path)
        && session.is_authenticated()
        && !session.is_settling()
    {
        return Redirect::to(dashboard).into_response();
    }

    LandingTemplate {
        error: notice_for(query.error.as_deref()),
        success: notice_for(query.success.as_deref()),
        greeting: session
            .identity
            .as_ref()
            .map(|identity| identity.greeting_name().to_owned()),
    }
    .into_response()
}
