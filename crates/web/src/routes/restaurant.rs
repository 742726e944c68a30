//! Restaurant service route handlers.
//!
//! Profile and menu management for service providers. Every handler is
//! guarded by [`DriverOnly`]; the restaurant service prefix also admits
//! drivers whatever the declared roles.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, Query},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use golibre_core::{DishCategory, DocumentId, SubjectId};

use super::{notice_for, redirect_with};
use crate::error::{AppError, Result};
use crate::forms::{self, MultipartForm};
use crate::middleware::{DriverOnly, Guarded};
use crate::services::{Dish, RestaurantProfile, RestaurantService};

/// Path of the restaurant profile page.
pub const PROFILE_PATH: &str = "/services/restaurant/profile";

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters of the profile page.
#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    /// Menu filter; blank or unknown shows every dish.
    pub category: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Profile form values.
pub struct ProfileView {
    pub restaurant_name: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub description: String,
    pub image_src: String,
    pub complete: bool,
}

impl ProfileView {
    fn new(profile: Option<&RestaurantProfile>) -> Self {
        let coordinate = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
        match profile {
            Some(profile) => Self {
                restaurant_name: profile.restaurant_name.clone(),
                address: profile.address.clone(),
                latitude: coordinate(profile.latitude),
                longitude: coordinate(profile.longitude),
                description: profile.description.clone(),
                image_src: profile.image_src().to_owned(),
                complete: profile.is_complete(),
            },
            None => Self {
                restaurant_name: String::new(),
                address: String::new(),
                latitude: String::new(),
                longitude: String::new(),
                description: String::new(),
                image_src: crate::services::restaurant::PROFILE_PLACEHOLDER_IMAGE.to_owned(),
                complete: false,
            },
        }
    }
}

/// One menu entry.
pub struct DishView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub category: &'static str,
    pub image_src: String,
}

impl From<&Dish> for DishView {
    fn from(dish: &Dish) -> Self {
        Self {
            id: dish.id.to_string(),
            title: dish.title.clone(),
            description: dish.description.clone(),
            price: dish.price.map(|p| p.to_string()).unwrap_or_default(),
            category: dish.category.map_or("", DishCategory::label),
            image_src: dish.image_src().to_owned(),
        }
    }
}

/// A menu category option.
pub struct CategoryOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

impl CategoryOption {
    fn all(selected: Option<DishCategory>) -> Vec<Self> {
        DishCategory::ALL
            .into_iter()
            .map(|category| Self {
                value: category.as_str(),
                label: category.label(),
                selected: selected == Some(category),
            })
            .collect()
    }
}

/// Restaurant profile and menu template.
#[derive(Template, WebTemplate)]
#[template(path = "restaurant/profile.html")]
pub struct RestaurantProfileTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub profile: ProfileView,
    pub dishes: Vec<DishView>,
    pub categories: Vec<CategoryOption>,
    /// True when the menu is filtered.
    pub filtered: bool,
}

// =============================================================================
// Helpers
// =============================================================================

fn owner(guard: &Guarded<DriverOnly>) -> Result<SubjectId> {
    guard
        .subject()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("no principal".to_string()))
}

async fn read_form(multipart: Multipart) -> Result<MultipartForm> {
    MultipartForm::read(multipart)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Back to the profile page with a success or error notice.
fn outcome(result: Result<()>, success: &str) -> Redirect {
    match result {
        Ok(()) => redirect_with(PROFILE_PATH, "success", success),
        Err(e) => {
            e.report();
            redirect_with(PROFILE_PATH, "error", e.code())
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the profile form and the menu.
pub async fn profile_page(
    guard: Guarded<DriverOnly>,
    Query(query): Query<ProfileQuery>,
) -> Result<Response> {
    let owner = owner(&guard)?;
    let service = RestaurantService::for_session(&guard.controller);

    let selected = query
        .category
        .as_deref()
        .filter(|c| !c.is_empty())
        .and_then(|c| c.parse::<DishCategory>().ok());

    let profile = service.load_profile(&owner).await?;
    let dishes = service.list_dishes(&owner, selected).await?;

    Ok(RestaurantProfileTemplate {
        error: notice_for(query.error.as_deref()),
        success: notice_for(query.success.as_deref()),
        profile: ProfileView::new(profile.as_ref()),
        dishes: dishes.iter().map(DishView::from).collect(),
        categories: CategoryOption::all(selected),
        filtered: selected.is_some(),
    }
    .into_response())
}

/// Save the profile (multipart, optional image).
pub async fn save_profile(guard: Guarded<DriverOnly>, multipart: Multipart) -> Redirect {
    outcome(try_save_profile(&guard, multipart).await, "profile_saved")
}

async fn try_save_profile(guard: &Guarded<DriverOnly>, multipart: Multipart) -> Result<()> {
    let owner = owner(guard)?;
    let mut form = read_form(multipart).await?;
    let image = form.take_file();
    let input = forms::restaurant_profile(&form)?;
    RestaurantService::for_session(&guard.controller)
        .save_profile(&owner, input, image)
        .await
}

/// Add a dish (multipart, optional image).
pub async fn add_dish(guard: Guarded<DriverOnly>, multipart: Multipart) -> Redirect {
    outcome(try_add_dish(&guard, multipart).await, "dish_added")
}

async fn try_add_dish(guard: &Guarded<DriverOnly>, multipart: Multipart) -> Result<()> {
    let owner = owner(guard)?;
    let mut form = read_form(multipart).await?;
    let image = form.take_file();
    let input = forms::dish(&form)?;
    RestaurantService::for_session(&guard.controller)
        .add_dish(&owner, input, image)
        .await?;
    Ok(())
}

/// Delete a dish.
pub async fn delete_dish(guard: Guarded<DriverOnly>, Path(id): Path<String>) -> Redirect {
    let result = match owner(&guard) {
        Ok(owner) => {
            RestaurantService::for_session(&guard.controller)
                .delete_dish(&owner, &DocumentId::new(id))
                .await
        }
        Err(e) => Err(e),
    };
    outcome(result, "dish_deleted")
}
