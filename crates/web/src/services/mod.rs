//! Business flows built on top of the session controller's collaborators.
//!
//! - [`restaurant`] - restaurant profile and menu management

pub mod restaurant;

pub use restaurant::{Dish, RestaurantProfile, RestaurantService};
