//! Service provider landing: choose which service to offer.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use super::{MessageQuery, notice_for};
use crate::middleware::Client;
use crate::state::AppState;

/// A service a provider can offer.
pub struct ServiceOption {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Management page, for services that have one.
    pub path: Option<&'static str>,
    /// Where an anonymous visitor signs up for the service.
    pub auth_path: &'static str,
}

impl ServiceOption {
    /// Link target for a visitor in the given sign-in state.
    #[must_use]
    pub fn href(&self, signed_in: bool) -> &'static str {
        match self.path {
            Some(path) if signed_in => path,
            _ => self.auth_path,
        }
    }
}

/// Services offered on the provider dashboard.
pub static SERVICES: [ServiceOption; 4] = [
    ServiceOption {
        id: "restaurant",
        title: "Restaurant",
        description: "Offer your dishes and reach more customers.",
        path: Some("/services/restaurant/profile"),
        auth_path: "/auth?next=%2Fservices%2Frestaurant%2Fprofile",
    },
    ServiceOption {
        id: "delivery",
        title: "Delivery",
        description: "Deliver orders and packages on your own schedule.",
        path: None,
        auth_path: "/auth?next=%2Fdriver%2Fdashboard",
    },
    ServiceOption {
        id: "stylist",
        title: "Stylist",
        description: "Offer beauty services and manage your appointments.",
        path: None,
        auth_path: "/auth?next=%2Fdriver%2Fdashboard",
    },
    ServiceOption {
        id: "taxi",
        title: "Taxi",
        description: "Carry passengers safely around the city.",
        path: None,
        auth_path: "/auth?next=%2Fdriver%2Fdashboard",
    },
];

/// A service card on the dashboard.
pub struct ServiceCard {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub href: &'static str,
}

/// Service selection template.
#[derive(Template, WebTemplate)]
#[template(path = "driver/dashboard.html")]
pub struct DriverDashboardTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub signed_in: bool,
    pub services: Vec<ServiceCard>,
}

/// Display the service selection page. Public.
pub async fn dashboard(
    State(state): State<AppState>,
    Client(controller): Client,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    let session = controller
        .wait_until(state.config().init_timeout, |s| !s.is_settling())
        .await;

    let signed_in = session.is_authenticated();
    DriverDashboardTemplate {
        error: notice_for(query.error.as_deref()),
        success: notice_for(query.success.as_deref()),
        signed_in,
        services: SERVICES
            .iter()
            .map(|service| ServiceCard {
                id: service.id,
                title: service.title,
                description: service.description,
                href: service.href(signed_in),
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service(id: &str) -> &'static ServiceOption {
        SERVICES.iter().find(|s| s.id == id).unwrap()
    }

    #[test]
    fn test_service_links() {
        let restaurant = service("restaurant");
        assert_eq!(restaurant.href(true), "/services/restaurant/profile");
        assert_eq!(
            restaurant.href(false),
            "/auth?next=%2Fservices%2Frestaurant%2Fprofile"
        );

        let taxi = service("taxi");
        assert_eq!(taxi.href(true), "/auth?next=%2Fdriver%2Fdashboard");
    }
}
