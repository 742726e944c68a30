//! HTTP route handlers for the web front end.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Landing page (customer sign-up / sign-in)
//! GET  /health                        - Health check
//!
//! # Auth
//! GET  /auth                          - Sign-in / provider sign-up page
//! POST /auth/sign-in                  - Sign in, then redirect (next / dashboard)
//! POST /auth/sign-up                  - Provider sign-up (multipart, role driver)
//! POST /auth/sign-up/customer         - Customer sign-up (multipart, role customer)
//! POST /auth/sign-out                 - Sign out, redirect to /
//!
//! # Roles (any identity)
//! GET  /role-selection                - Redirect by role, or choose one
//! POST /role-selection                - Set role explicitly
//!
//! # API
//! GET  /api/session                   - JSON snapshot of the session
//!
//! # Customer (requires customer)
//! GET  /customer/dashboard            - Customer dashboard
//! GET  /customer/request-trip         - Trip request placeholder
//!
//! # Service providers
//! GET  /driver/dashboard              - Service selection (public)
//! GET  /services/restaurant/profile   - Restaurant profile and menu (driver)
//! POST /services/restaurant/profile   - Save profile (multipart)
//! POST /services/restaurant/dishes    - Add dish (multipart)
//! POST /services/restaurant/dishes/{id}/delete - Delete dish
//! ```

pub mod api;
pub mod auth;
pub mod customer;
pub mod driver;
pub mod home;
pub mod restaurant;
pub mod role;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    response::Redirect,
    routing::{get, post},
};
use serde::Deserialize;

use golibre_core::Session;
use golibre_core::guard::{LANDING_PATH, safe_return_path};

use crate::state::AppState;

/// Path of the explicit role chooser.
pub const ROLE_SELECTION_PATH: &str = "/role-selection";

/// Largest body accepted by the forms that carry an image.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Notices
// =============================================================================

/// User-visible text for an `?error=` or `?success=` code.
#[must_use]
pub fn notice(code: &str) -> &'static str {
    match code {
        "credentials" => "Incorrect email or password.",
        "email_in_use" => "An account with this email already exists.",
        "weak_password" => "The password must be at least 6 characters.",
        "password_mismatch" => "The passwords do not match.",
        "invalid_email" => "Invalid email address.",
        "invalid_name" => "The full name must be at least 3 characters.",
        "invalid_phone" => "Invalid phone number. Include the country code, e.g. +18091234567.",
        "user_disabled" => "This account has been disabled.",
        "too_many_attempts" => "Too many attempts. Try again later.",
        "not_signed_in" => "Please sign in first.",
        "invalid_role" => "Choose either customer or service provider.",
        "invalid_restaurant_name" => "The restaurant name must be at least 2 characters.",
        "invalid_address" => "The address must be at least 5 characters.",
        "missing_location" => "Set the restaurant location.",
        "invalid_description" => "The description length is out of range.",
        "invalid_title" => "The title must be at least 2 characters.",
        "invalid_category" => "Choose a valid category.",
        "invalid_price" => "The price must be a positive number.",
        "incomplete_profile" => "Save the restaurant profile and its location before adding dishes.",
        "store_read" => "Your data could not be loaded. Try again.",
        "store_write" => "Your changes could not be saved. Try again.",
        "upload" => "The image could not be uploaded. Try again.",
        "not_found" => "That item no longer exists.",
        "bad_request" => "The form could not be read.",
        "welcome" => "Welcome to GoLibre!",
        "image_skipped" => "Welcome to GoLibre! Your profile photo could not be uploaded.",
        "profile_saved" => "Restaurant profile saved.",
        "dish_added" => "Dish added to the menu.",
        "dish_deleted" => "Dish deleted.",
        _ => "Something went wrong. Try again.",
    }
}

/// Map an optional code to its notice text.
#[must_use]
pub fn notice_for(code: Option<&str>) -> Option<String> {
    code.filter(|c| !c.is_empty()).map(|c| notice(c).to_string())
}

/// Redirect to `path` carrying `key=code`.
#[must_use]
pub fn redirect_with(path: &str, key: &str, code: &str) -> Redirect {
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{path}{separator}{key}={}", urlencoding::encode(code)))
}

/// Where a settled, signed-in session goes next.
///
/// A safe return path wins; otherwise the role's dashboard, the role
/// chooser for a principal without a role, or the landing page for a role
/// this build does not know.
#[must_use]
pub fn destination_for(session: &Session, next: Option<&str>) -> String {
    if let Some(path) = safe_return_path(next) {
        return path.to_owned();
    }
    match &session.role {
        Some(role) => role.dashboard_path().unwrap_or(LANDING_PATH).to_owned(),
        None => ROLE_SELECTION_PATH.to_owned(),
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(auth::auth_page))
        .route("/sign-in", post(auth::sign_in))
        .route(
            "/sign-up",
            post(auth::sign_up_provider).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/sign-up/customer",
            post(auth::sign_up_customer).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/sign-out", post(auth::sign_out))
}

/// Create the customer routes router.
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(customer::dashboard))
        .route("/request-trip", get(customer::request_trip))
}

/// Create the restaurant service routes router.
pub fn restaurant_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(restaurant::profile_page).post(restaurant::save_profile),
        )
        .route("/dishes", post(restaurant::add_dish))
        .route("/dishes/{id}/delete", post(restaurant::delete_dish))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create all routes for the web front end.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Landing page
        .route("/", get(home::landing))
        // Auth routes
        .nest("/auth", auth_routes())
        // Role selection
        .route(
            ROLE_SELECTION_PATH,
            get(role::role_selection_page).post(role::choose_role),
        )
        // Session snapshot
        .route("/api/session", get(api::session))
        // Customer routes
        .nest("/customer", customer_routes())
        // Service providers
        .route("/driver/dashboard", get(driver::dashboard))
        .nest("/services/restaurant", restaurant_routes())
}
