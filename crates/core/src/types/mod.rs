//! Core types for GoLibre.
//!
//! This module provides type-safe wrappers for the marketplace's domain
//! concepts.

pub mod catalog;
pub mod email;
pub mod id;
pub mod identity;
pub mod price;
pub mod role;
pub mod session;

pub use catalog::{DishCategory, DishCategoryError};
pub use email::{Email, EmailError};
pub use id::{DocumentId, SubjectId};
pub use identity::Identity;
pub use price::{Price, PriceError};
pub use role::Role;
pub use session::{Session, SessionState};
