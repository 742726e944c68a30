//! Restaurant profile and menu management.
//!
//! A restaurant is owned by the signed-in provider: its profile lives at
//! `restaurants/{uid}` and its dishes under `restaurants/{uid}/dishes`.
//! Images given with a profile or a dish are mandatory: if the upload fails
//! after retries, nothing is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use url::Url;

use golibre_core::{DishCategory, DocumentId, Price, SubjectId};

use crate::backend::document::fields;
use crate::backend::{Blob, BlobStore, Document, FieldValue, ProfileStore};
use crate::error::{AppError, Result};
use crate::forms::{DishInput, RestaurantProfileInput};
use crate::session::SessionController;
use crate::upload::{RetryingUploader, dish_image_path, restaurant_image_path};

/// Collection of restaurant profiles, keyed by owner subject id.
pub const RESTAURANTS_COLLECTION: &str = "restaurants";

/// Shown when a profile or dish has no image.
pub const PROFILE_PLACEHOLDER_IMAGE: &str = "https://placehold.co/128x128.png";
pub const DISH_PLACEHOLDER_IMAGE: &str = "https://placehold.co/400x300.png";

fn dishes_collection(owner: &SubjectId) -> String {
    format!("{RESTAURANTS_COLLECTION}/{owner}/dishes")
}

fn url_field(doc: &Document, key: &str) -> Option<Url> {
    doc.str(key).and_then(|raw| Url::parse(raw).ok())
}

/// A restaurant's public profile.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantProfile {
    pub owner_id: SubjectId,
    pub restaurant_name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: String,
    pub image_url: Option<Url>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RestaurantProfile {
    fn from_document(doc: &Document) -> Self {
        Self {
            owner_id: SubjectId::new(doc.str("ownerId").unwrap_or(doc.id.as_str())),
            restaurant_name: doc.str("restaurantName").unwrap_or_default().to_owned(),
            address: doc.str("address").unwrap_or_default().to_owned(),
            latitude: doc.f64("latitude"),
            longitude: doc.f64("longitude"),
            description: doc.str("description").unwrap_or_default().to_owned(),
            image_url: url_field(doc, "imageUrl"),
            created_at: doc.timestamp("createdAt"),
        }
    }

    /// True once the profile has an address and a location; dishes can only
    /// be added to complete profiles.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && !self.address.trim().is_empty()
    }

    /// Image to display.
    #[must_use]
    pub fn image_src(&self) -> &str {
        self.image_url
            .as_ref()
            .map_or(PROFILE_PLACEHOLDER_IMAGE, Url::as_str)
    }
}

/// A menu item.
#[derive(Debug, Clone, PartialEq)]
pub struct Dish {
    pub id: DocumentId,
    pub title: String,
    pub description: String,
    pub price: Option<Price>,
    pub category: Option<DishCategory>,
    pub image_url: Option<Url>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Dish {
    fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.str("title").unwrap_or_default().to_owned(),
            description: doc.str("description").unwrap_or_default().to_owned(),
            price: doc.f64("price").and_then(Price::from_stored),
            category: doc.str("category").and_then(|c| c.parse().ok()),
            image_url: url_field(doc, "imageUrl"),
            created_at: doc.timestamp("createdAt"),
        }
    }

    /// Image to display.
    #[must_use]
    pub fn image_src(&self) -> &str {
        self.image_url
            .as_ref()
            .map_or(DISH_PLACEHOLDER_IMAGE, Url::as_str)
    }
}

/// Restaurant operations on behalf of one client.
#[derive(Clone)]
pub struct RestaurantService {
    profiles: Arc<dyn ProfileStore>,
    blobs: Arc<dyn BlobStore>,
    uploader: RetryingUploader,
}

impl RestaurantService {
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        blobs: Arc<dyn BlobStore>,
        uploader: RetryingUploader,
    ) -> Self {
        Self {
            profiles,
            blobs,
            uploader,
        }
    }

    /// The service acting as the controller's principal.
    #[must_use]
    pub fn for_session(controller: &SessionController) -> Self {
        Self::new(
            Arc::clone(controller.profiles()),
            Arc::clone(controller.blobs()),
            controller.uploader().clone(),
        )
    }

    /// Load the owner's profile, if one has been saved.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::StoreRead`] when the store cannot be read.
    pub async fn load_profile(&self, owner: &SubjectId) -> Result<Option<RestaurantProfile>> {
        let document = self
            .profiles
            .get_document(RESTAURANTS_COLLECTION, &DocumentId::new(owner.as_str()))
            .await
            .map_err(AppError::StoreRead)?;
        Ok(document.as_ref().map(RestaurantProfile::from_document))
    }

    /// Create or update the owner's profile.
    ///
    /// `createdAt` is only written for a new profile. Without a new image the
    /// current image URL is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upload`] when a given image cannot be uploaded,
    /// [`AppError::StoreRead`] or [`AppError::StoreWrite`] on store failures.
    #[instrument(skip(self, input, image), fields(owner = %owner))]
    pub async fn save_profile(
        &self,
        owner: &SubjectId,
        input: RestaurantProfileInput,
        image: Option<Blob>,
    ) -> Result<()> {
        let id = DocumentId::new(owner.as_str());
        let existing = self.load_profile(owner).await?;

        let image_url = match image {
            Some(blob) => {
                let path = restaurant_image_path(owner, &blob.file_name);
                Some(self.uploader.upload(&path, &blob).await?)
            }
            None => existing.as_ref().and_then(|p| p.image_url.clone()),
        };

        let mut document = fields([
            ("ownerId", owner.as_str().into()),
            ("restaurantName", input.restaurant_name.into()),
            ("address", input.address.into()),
            ("latitude", input.latitude.into()),
            ("longitude", input.longitude.into()),
            ("description", input.description.into()),
            ("imageUrl", image_url.as_ref().map(Url::as_str).into()),
            ("updatedAt", FieldValue::ServerTimestamp),
        ]);
        if existing.is_none() {
            document.insert("createdAt".to_owned(), FieldValue::ServerTimestamp);
        }

        self.profiles
            .set_document(RESTAURANTS_COLLECTION, &id, document, true)
            .await
            .map_err(AppError::StoreWrite)?;

        info!(new = existing.is_none(), "restaurant profile saved");
        Ok(())
    }

    /// The owner's dishes, newest first, optionally limited to one category.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::StoreRead`] when the store cannot be read.
    pub async fn list_dishes(
        &self,
        owner: &SubjectId,
        category: Option<DishCategory>,
    ) -> Result<Vec<Dish>> {
        let documents = self
            .profiles
            .list_documents(&dishes_collection(owner), "createdAt")
            .await
            .map_err(AppError::StoreRead)?;

        Ok(documents
            .iter()
            .map(Dish::from_document)
            .filter(|dish| category.is_none() || dish.category == category)
            .collect())
    }

    /// Add a dish to the owner's menu.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::IncompleteProfile`] until the profile has an
    /// address and a location, [`AppError::Upload`] when a given image cannot
    /// be uploaded, or a store error.
    #[instrument(skip(self, input, image), fields(owner = %owner))]
    pub async fn add_dish(
        &self,
        owner: &SubjectId,
        input: DishInput,
        image: Option<Blob>,
    ) -> Result<DocumentId> {
        let complete = self
            .load_profile(owner)
            .await?
            .is_some_and(|profile| profile.is_complete());
        if !complete {
            return Err(AppError::IncompleteProfile(
                "save the restaurant profile and its location first".to_string(),
            ));
        }

        let image_url = match image {
            Some(blob) => {
                let path = dish_image_path(owner, &blob.file_name);
                Some(self.uploader.upload(&path, &blob).await?)
            }
            None => None,
        };

        let document = fields([
            ("title", input.title.into()),
            ("description", input.description.into()),
            ("price", input.price.to_stored().into()),
            ("category", input.category.as_str().into()),
            ("imageUrl", image_url.as_ref().map(Url::as_str).into()),
            ("restaurantId", owner.as_str().into()),
            ("createdAt", FieldValue::ServerTimestamp),
            ("updatedAt", FieldValue::ServerTimestamp),
        ]);
        let id = self
            .profiles
            .add_document(&dishes_collection(owner), document)
            .await
            .map_err(AppError::StoreWrite)?;

        info!(dish = %id, "dish added");
        Ok(id)
    }

    /// Delete a dish, then its image when the image lives in the blob store.
    ///
    /// A failed image deletion is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown or malformed dish id,
    /// or a store error.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn delete_dish(&self, owner: &SubjectId, id: &DocumentId) -> Result<()> {
        if !id.is_plain_segment() {
            warn!(dish = %id, "rejected malformed dish id");
            return Err(AppError::NotFound(format!("dish {id}")));
        }
        let collection = dishes_collection(owner);
        let dish = self
            .profiles
            .get_document(&collection, id)
            .await
            .map_err(AppError::StoreRead)?
            .map(|doc| Dish::from_document(&doc))
            .ok_or_else(|| AppError::NotFound(format!("dish {id}")))?;

        self.profiles
            .delete_document(&collection, id)
            .await
            .map_err(AppError::StoreWrite)?;
        info!("dish deleted");

        if let Some(object) = dish
            .image_url
            .as_ref()
            .and_then(|url| self.blobs.object_for_url(url))
            && let Err(error) = self.blobs.delete(&object).await
        {
            warn!(path = %object.path, %error, "dish image not deleted");
        }
        Ok(())
    }
}
