//! Form payloads and local validation.
//!
//! Every form is validated here before any collaborator is called; a
//! [`ValidationError`] never reaches the network.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::extract::Multipart;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use golibre_core::{DishCategory, DishCategoryError, Email, EmailError, Price, PriceError, Role};

use crate::backend::Blob;

/// Minimum password length accepted by the identity provider.
pub const MIN_PASSWORD_LEN: usize = 6;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("Invalid regex"));

/// A form field that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("name must be at least 3 characters")]
    NameTooShort,

    #[error("invalid phone number")]
    InvalidPhone,

    #[error("restaurant name must be at least 2 characters")]
    RestaurantNameTooShort,

    #[error("address must be at least 5 characters")]
    AddressTooShort,

    #[error("location is required")]
    MissingLocation,

    #[error("description must be between {min} and {max} characters")]
    DescriptionLength { min: usize, max: usize },

    #[error("title must be at least 2 characters")]
    TitleTooShort,

    #[error(transparent)]
    Category(#[from] DishCategoryError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error("unknown role")]
    UnknownRole,
}

impl ValidationError {
    /// Short code carried in `?error=` redirects.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Email(_) => "invalid_email",
            Self::PasswordTooShort => "weak_password",
            Self::PasswordMismatch => "password_mismatch",
            Self::NameTooShort => "invalid_name",
            Self::InvalidPhone => "invalid_phone",
            Self::RestaurantNameTooShort => "invalid_restaurant_name",
            Self::AddressTooShort => "invalid_address",
            Self::MissingLocation => "missing_location",
            Self::DescriptionLength { .. } => "invalid_description",
            Self::TitleTooShort => "invalid_title",
            Self::Category(_) => "invalid_category",
            Self::Price(_) => "invalid_price",
            Self::UnknownRole => "invalid_role",
        }
    }
}

fn char_len(s: &str) -> usize {
    s.trim().chars().count()
}

fn password(raw: &str) -> Result<SecretString, ValidationError> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(SecretString::from(raw.to_owned()))
}

fn description(raw: &str, min: usize, max: usize) -> Result<String, ValidationError> {
    let len = char_len(raw);
    if len < min || len > max {
        return Err(ValidationError::DescriptionLength { min, max });
    }
    Ok(raw.trim().to_owned())
}

/// Validate a phone number in international format.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPhone`] unless the number matches
/// `^\+?[1-9]\d{1,14}$` and has at least 10 characters.
pub fn phone(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.len() < 10 || !PHONE_RE.is_match(raw) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(raw.to_owned())
}

// =============================================================================
// Authentication
// =============================================================================

/// Sign-in form data.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    /// Path to return to after signing in.
    pub next: Option<String>,
}

/// Validated sign-in credentials.
#[derive(Debug)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl SignInForm {
    /// Validate the credentials.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<Credentials, ValidationError> {
        credentials(&self.email, &self.password)
    }
}

/// Validate an email/password pair.
///
/// # Errors
///
/// Returns the first invalid field.
pub fn credentials(email: &str, raw_password: &str) -> Result<Credentials, ValidationError> {
    Ok(Credentials {
        email: Email::parse(email)?,
        password: password(raw_password)?,
    })
}

/// Validated sign-up details.
#[derive(Debug)]
pub struct SignUpRequest {
    pub email: Email,
    pub password: SecretString,
    pub full_name: String,
    pub phone: String,
}

/// Parse sign-up fields from a multipart form.
///
/// # Errors
///
/// Returns the first missing or invalid field.
pub fn sign_up_request(form: &MultipartForm) -> Result<SignUpRequest, ValidationError> {
    let full_name = form.text("fullName").trim().to_owned();
    if char_len(&full_name) < 3 {
        return Err(ValidationError::NameTooShort);
    }
    let email = Email::parse(form.text("email"))?;
    let phone = phone(form.text("phone"))?;
    let password = password(form.text("password"))?;
    if form.text("password") != form.text("confirmPassword") {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(SignUpRequest {
        email,
        password,
        full_name,
        phone,
    })
}

/// Explicit role choice.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
    /// Path to continue to once the role is set.
    pub next: Option<String>,
}

impl RoleForm {
    /// Parse the chosen role. Only `customer` and `driver` are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownRole`] for anything else.
    pub fn validate(&self) -> Result<Role, ValidationError> {
        Role::from_selection(&self.role).ok_or(ValidationError::UnknownRole)
    }
}

// =============================================================================
// Restaurant
// =============================================================================

/// Validated restaurant profile fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantProfileInput {
    pub restaurant_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
}

/// Parse restaurant profile fields from a multipart form.
///
/// # Errors
///
/// Returns the first missing or invalid field.
pub fn restaurant_profile(form: &MultipartForm) -> Result<RestaurantProfileInput, ValidationError> {
    let restaurant_name = form.text("restaurantName").trim().to_owned();
    if char_len(&restaurant_name) < 2 {
        return Err(ValidationError::RestaurantNameTooShort);
    }
    let address = form.text("address").trim().to_owned();
    if char_len(&address) < 5 {
        return Err(ValidationError::AddressTooShort);
    }
    let coordinate = |name| {
        form.text(name)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(ValidationError::MissingLocation)
    };
    let latitude = coordinate("latitude")?;
    let longitude = coordinate("longitude")?;
    let description = description(form.text("description"), 10, 300)?;

    Ok(RestaurantProfileInput {
        restaurant_name,
        address,
        latitude,
        longitude,
        description,
    })
}

/// Validated dish fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DishInput {
    pub category: DishCategory,
    pub title: String,
    pub description: String,
    pub price: Price,
}

/// Parse dish fields from a multipart form.
///
/// # Errors
///
/// Returns the first missing or invalid field.
pub fn dish(form: &MultipartForm) -> Result<DishInput, ValidationError> {
    let category = form.text("category").parse::<DishCategory>()?;
    let title = form.text("title").trim().to_owned();
    if char_len(&title) < 2 {
        return Err(ValidationError::TitleTooShort);
    }
    let description = description(form.text("description"), 10, 200)?;
    let price = Price::parse(form.text("price"))?;

    Ok(DishInput {
        category,
        title,
        description,
        price,
    })
}

// =============================================================================
// Multipart
// =============================================================================

/// A multipart form read into memory: text fields plus at most one file.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    file: Option<Blob>,
}

impl MultipartForm {
    /// Name of the file field on every upload form.
    pub const FILE_FIELD: &'static str = "image";

    /// Drain a multipart body.
    ///
    /// An empty file part (no file chosen) is treated as no file.
    ///
    /// # Errors
    ///
    /// Returns the extractor error when the body is malformed.
    pub async fn read(mut multipart: Multipart) -> Result<Self, axum::extract::multipart::MultipartError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if name == Self::FILE_FIELD {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let data = field.bytes().await?;
                if !data.is_empty() {
                    form.file = Some(Blob {
                        file_name,
                        content_type,
                        data,
                    });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A text field, empty when absent.
    #[must_use]
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }

    /// Take the uploaded file, if one was chosen.
    pub fn take_file(&mut self) -> Option<Blob> {
        self.file.take()
    }

    #[cfg(test)]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_owned(), value.to_owned());
        self
    }

    #[cfg(test)]
    pub fn with_file(mut self, blob: Blob) -> Self {
        self.file = Some(blob);
        self
    }
}
