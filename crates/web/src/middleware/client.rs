//! Per-browser session controller extractor.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::session::SessionController;
use crate::state::AppState;

/// Session key holding the client id.
pub const CLIENT_ID_KEY: &str = "client_id";

/// Extractor for the requesting browser's [`SessionController`].
///
/// The first request of a browser session stores a fresh client id in the
/// tower session; the registry starts a controller for it on first use.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Client(controller): Client) -> impl IntoResponse {
///     Json(controller.snapshot())
/// }
/// ```
pub struct Client(pub Arc<SessionController>);

/// Error returned when the browser session cannot be resolved.
#[derive(Debug)]
pub enum ClientRejection {
    /// The session layer is not installed.
    MissingSession,
    /// The session store failed.
    Store(tower_sessions::session::Error),
}

impl IntoResponse for ClientRejection {
    fn into_response(self) -> Response {
        match self {
            Self::MissingSession => {
                tracing::error!("Session layer missing");
            }
            Self::Store(e) => {
                tracing::error!("Failed to access session: {}", e);
            }
        }
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

impl FromRequestParts<AppState> for Client {
    type Rejection = ClientRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(ClientRejection::MissingSession)?;

        let client = client_id(&session)
            .await
            .map_err(ClientRejection::Store)?;

        Ok(Self(state.registry().controller_for(client).await))
    }
}

/// Read the session's client id, assigning one on first use.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn client_id(session: &Session) -> Result<Uuid, tower_sessions::session::Error> {
    if let Some(id) = session.get::<Uuid>(CLIENT_ID_KEY).await? {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    session.insert(CLIENT_ID_KEY, id).await?;
    tracing::debug!(client = %id, "new browser session");
    Ok(id)
}
