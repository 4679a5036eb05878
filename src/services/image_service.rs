use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{DomainError, DomainResult};
use super::validation::{self, FieldRules};
use crate::database::models::Image;
use crate::database::{Scope, Store};
use crate::storage::ImageStorage;
use crate::types::Noun;

const UPDATABLE: &[&str] = &["alt", "dogId", "litterId"];

/// A decoded multipart upload
#[derive(Debug, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub dog_id: Option<String>,
    pub litter_id: Option<String>,
    pub alt: Option<String>,
}

#[derive(Clone)]
pub struct ImageService {
    store: Store,
    storage: Arc<dyn ImageStorage>,
}

impl ImageService {
    pub fn new(store: Store, storage: Arc<dyn ImageStorage>) -> Self {
        Self { store, storage }
    }

    /// Store the file under the breeder's folder and record it
    pub async fn upload(&self, breeder_id: &str, upload: Upload) -> DomainResult<Image> {
        let (Some(bytes), Some(name)) = (upload.bytes, upload.file_name) else {
            return Err(DomainError::Validation(format!(
                "{} not created. Missing required field(s): image",
                Noun::Image
            )));
        };

        if self.store.breeders.find_by_id(breeder_id, Scope::Active).await?.is_none() {
            return Err(DomainError::Validation(format!("Invalid breederId: {}", breeder_id)));
        }
        let dog_id = self.check_dog(upload.dog_id.as_deref(), breeder_id).await?;
        let litter_id = self.check_litter(upload.litter_id.as_deref(), breeder_id).await?;

        let id = Uuid::new_v4().to_string();
        let path = self.storage.save(breeder_id, &id, &name, &bytes).await?;
        let image = Image {
            id,
            breeder_id: breeder_id.to_string(),
            dog_id,
            litter_id,
            kind: upload
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            name,
            alt: upload.alt.unwrap_or_default(),
            path: path.clone(),
            deleted_at: None,
        };

        match self.store.images.create(image).await {
            Ok(image) => {
                info!(image = %image.id, breeder = breeder_id, "Uploaded image");
                Ok(image)
            }
            Err(e) => {
                warn!(breeder = breeder_id, path = %path, "Image record failed, removing stored file");
                self.storage.remove(&path).await?;
                Err(e.into())
            }
        }
    }

    /// `current` has already passed the owner-or-superuser gate
    pub async fn update(&self, current: &Image, body: Value) -> DomainResult<(Vec<String>, Image)> {
        let body = validation::into_body(body)?;
        validation::reject_invalid_updates(&body, UPDATABLE)?;

        let mut rules = FieldRules::new();
        let alt = rules.string(&body, "alt");
        let dog_id = optional_ref(&mut rules, body.get("dogId"), "dogId");
        let litter_id = optional_ref(&mut rules, body.get("litterId"), "litterId");
        rules.finish()?;

        let dog_id = match dog_id {
            Some(id) => Some(self.check_dog(id.as_deref(), &current.breeder_id).await?),
            None => None,
        };
        let litter_id = match litter_id {
            Some(id) => Some(self.check_litter(id.as_deref(), &current.breeder_id).await?),
            None => None,
        };

        let updated = self
            .store
            .images
            .modify(&current.id, Scope::Active, &|image: &mut Image| {
                if let Some(v) = &alt {
                    image.alt = v.clone();
                }
                if let Some(v) = &dog_id {
                    image.dog_id = v.clone();
                }
                if let Some(v) = &litter_id {
                    image.litter_id = v.clone();
                }
            })
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No image with ID {}", current.id)))?;

        let fields: Vec<String> = body.keys().cloned().collect();
        info!(image = %current.id, ?fields, "Updated image");
        Ok((fields, updated))
    }

    /// Tags must name an active dog of the same breeder
    async fn check_dog(&self, id: Option<&str>, breeder_id: &str) -> DomainResult<Option<String>> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        match self.store.dogs.find_by_id(id, Scope::Active).await? {
            Some(dog) if dog.breeder_id == breeder_id => Ok(Some(dog.id)),
            _ => Err(DomainError::Validation(format!("Invalid dogId: {}", id))),
        }
    }

    async fn check_litter(&self, id: Option<&str>, breeder_id: &str) -> DomainResult<Option<String>> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        match self.store.litters.find_by_id(id, Scope::Active).await? {
            Some(litter) if litter.breeder_id == breeder_id => Ok(Some(litter.id)),
            _ => Err(DomainError::Validation(format!("Invalid litterId: {}", id))),
        }
    }
}

/// `None`: untouched; `Some(None)`: cleared; `Some(Some(id))`: set
fn optional_ref(rules: &mut FieldRules, value: Option<&Value>, field: &str) -> Option<Option<String>> {
    match value? {
        Value::Null => Some(None),
        Value::String(id) => Some(Some(id.clone())),
        _ => {
            rules.fail(field, "must be a string or null");
            None
        }
    }
}
