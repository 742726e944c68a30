//! Customer route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::Query, response::IntoResponse};

use super::{MessageQuery, notice_for};
use crate::middleware::{CustomerOnly, Guarded};

/// Customer dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "customer/dashboard.html")]
pub struct CustomerDashboardTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub name: String,
}

/// Trip request placeholder template.
#[derive(Template, WebTemplate)]
#[template(path = "customer/request_trip.html")]
pub struct RequestTripTemplate {
    pub error: Option<String>,
    pub name: String,
}

fn display_name(guard: &Guarded<CustomerOnly>) -> String {
    guard
        .session
        .identity
        .as_ref()
        .map(|identity| identity.greeting_name().to_owned())
        .unwrap_or_default()
}

/// Display the customer dashboard.
pub async fn dashboard(
    guard: Guarded<CustomerOnly>,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    CustomerDashboardTemplate {
        error: notice_for(query.error.as_deref()),
        success: notice_for(query.success.as_deref()),
        name: display_name(&guard),
    }
}

/// Display the trip request placeholder.
pub async fn request_trip(guard: Guarded<CustomerOnly>) -> impl IntoResponse {
    RequestTripTemplate {
        error: None,
        name: display_name(&guard),
    }
}
