pub mod association;
pub mod breeder_service;
pub mod cascade;
pub mod dog_service;
pub mod error;
pub mod image_service;
pub mod litter_service;
pub mod validation;

pub use association::{AssociationError, AssociationMaintainer, ParentRole};
pub use breeder_service::{BreederService, Login};
pub use cascade::{BreederCascade, CascadeController};
pub use dog_service::DogService;
pub use error::{DomainError, DomainResult};
pub use image_service::{ImageService, Upload};
pub use litter_service::LitterService;

use std::sync::Arc;

use crate::auth::Identity;
use crate::database::models::{Asset, Breeder, Dog, Litter};
use crate::database::{AssetFilter, Scope, Store};
use crate::storage::ImageStorage;

/// Every pipeline, wired to one store and one image storage
#[derive(Clone)]
pub struct Services {
    pub breeders: BreederService,
    pub dogs: DogService,
    pub litters: LitterService,
    pub images: ImageService,
    pub cascade: CascadeController,
    store: Store,
}

impl Services {
    pub fn new(store: Store, storage: Arc<dyn ImageStorage>) -> Self {
        let associations = AssociationMaintainer::new(store.clone());
        Self {
            breeders: BreederService::new(store.clone()),
            dogs: DogService::new(store.clone(), associations.clone()),
            litters: LitterService::new(store.clone(), associations.clone()),
            images: ImageService::new(store.clone(), storage.clone()),
            cascade: CascadeController::new(store.clone(), storage, associations),
            store,
        }
    }

    /// Collection read: superusers see everything, breeders only their own
    pub async fn list<T: Asset>(&self, identity: &Identity, scope: Scope) -> DomainResult<Vec<T>> {
        let filter = if identity.superuser {
            AssetFilter::All
        } else {
            AssetFilter::field(T::OWNER_FIELD, identity.id.as_str())
        };
        Ok(T::repository(&self.store).find_all(&filter, scope).await?)
    }

    pub async fn count<T: Asset>(&self) -> DomainResult<usize> {
        Ok(T::repository(&self.store).count(Scope::Active).await?)
    }

    /// A breeder's dogs, sorted by name
    pub async fn dogs_of_breeder(&self, breeder_id: &str) -> DomainResult<Vec<Dog>> {
        let mut dogs = self
            .store
            .dogs
            .find_all(&AssetFilter::breeder(breeder_id), Scope::Active)
            .await?;
        dogs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(dogs)
    }

    pub async fn litters_of_breeder(&self, breeder_id: &str) -> DomainResult<Vec<Litter>> {
        Ok(self
            .store
            .litters
            .find_all(&AssetFilter::breeder(breeder_id), Scope::Active)
            .await?)
    }

    /// Active dogs whose `litterId` names this litter
    pub async fn pups_of_litter(&self, litter_id: &str) -> DomainResult<Vec<Dog>> {
        Ok(self
            .store
            .dogs
            .find_all(&AssetFilter::field("litterId", litter_id), Scope::Active)
            .await?)
    }

    pub async fn breeder_of(&self, breeder_id: &str) -> DomainResult<Breeder> {
        self.store
            .breeders
            .find_by_id(breeder_id, Scope::Active)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No breeder with ID {}", breeder_id)))
    }
}
