//! JSON API handlers.

use axum::{Json, extract::State};

use golibre_core::Session;

use crate::middleware::Client;
use crate::state::AppState;

/// Session snapshot of the requesting browser.
///
/// Waits (at most the init timeout) for the session to stop settling.
pub async fn session(State(state): State<AppState>, Client(controller): Client) -> Json<Session> {
    Json(
        controller
            .wait_until(state.config().init_timeout, |s| !s.is_settling())
            .await,
    )
}
