use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::association::AssociationMaintainer;
use super::error::{DomainError, DomainResult};
use crate::database::models::{Asset, Breeder, Dog, Image, Litter};
use crate::database::{AssetFilter, Scope, Store, StoreError};
use crate::storage::ImageStorage;

/// What a breeder delete or restore touched
#[derive(Debug, Clone, Serialize)]
pub struct BreederCascade {
    pub breeder: Breeder,
    pub dogs: Vec<Dog>,
    pub litters: Vec<Litter>,
}

/// Multi-entity soft delete and restore.
///
/// Children go first and the parent last. Children that are already
/// tombstoned are skipped, so a cascade that failed half way can be re-run.
#[derive(Clone)]
pub struct CascadeController {
    store: Store,
    storage: Arc<dyn ImageStorage>,
    associations: AssociationMaintainer,
}

fn not_found<T: Asset>(id: &str) -> DomainError {
    DomainError::NotFound(format!("No {} with ID {}", T::NOUN, id))
}

fn already_active<T: Asset>(id: &str) -> DomainError {
    DomainError::InvalidState(format!("{} {} is not deleted", T::NOUN, id))
}

fn superuser_only(action: &str) -> DomainError {
    DomainError::Forbidden(format!("Only a superuser can {} a breeder", action))
}

fn email_in_use(breeder: &Breeder) -> DomainError {
    DomainError::Conflict(format!(
        "Can't restore breeder {}: email {} is already in use",
        breeder.id, breeder.email
    ))
}

impl CascadeController {
    pub fn new(
        store: Store,
        storage: Arc<dyn ImageStorage>,
        associations: AssociationMaintainer,
    ) -> Self {
        Self {
            store,
            storage,
            associations,
        }
    }

    /// Leave the litter but keep `litterId` on the tombstone for a later restore
    pub async fn delete_dog(&self, dog: &Dog) -> DomainResult<Dog> {
        if dog.has_litter() {
            self.associations
                .detach_pup_from_litter(&dog.id, &dog.litter_id, false)
                .await?;
        }
        let snapshot = self
            .store
            .dogs
            .soft_delete(&dog.id)
            .await?
            .ok_or_else(|| not_found::<Dog>(&dog.id))?;
        info!(dog = %dog.id, "Deleted dog");
        Ok(snapshot)
    }

    /// Release every pup, then tombstone the litter with its `pups` intact
    pub async fn delete_litter(&self, litter: &Litter) -> DomainResult<Litter> {
        let litter_id = litter.id.clone();
        let released = self
            .store
            .dogs
            .modify_all(
                &AssetFilter::field("litterId", litter_id.as_str()),
                Scope::Active,
                &|dog: &mut Dog| dog.litter_id.clear(),
            )
            .await?;

        let snapshot = self
            .store
            .litters
            .soft_delete(&litter_id)
            .await?
            .ok_or_else(|| not_found::<Litter>(&litter_id))?;
        info!(litter = %litter_id, released = released.len(), "Deleted litter");
        Ok(snapshot)
    }

    pub async fn delete_breeder(
        &self,
        breeder: &Breeder,
        requester_is_superuser: bool,
    ) -> DomainResult<BreederCascade> {
        if !requester_is_superuser {
            return Err(superuser_only("delete"));
        }
        let owned = AssetFilter::breeder(&breeder.id);

        // Children are tombstoned directly: their own associations all point
        // inside this breeder and come back together on restore.
        let mut dogs = Vec::new();
        for dog in self.store.dogs.find_all(&owned, Scope::Active).await? {
            if let Some(snapshot) = self.store.dogs.soft_delete(&dog.id).await? {
                dogs.push(snapshot);
            }
        }

        let mut litters = Vec::new();
        for litter in self.store.litters.find_all(&owned, Scope::Active).await? {
            if let Some(snapshot) = self.store.litters.soft_delete(&litter.id).await? {
                litters.push(snapshot);
            }
        }

        let mut images = 0;
        for image in self.store.images.find_all(&owned, Scope::Active).await? {
            if self.store.images.soft_delete(&image.id).await?.is_some() {
                self.remove_file(&image).await;
                images += 1;
            }
        }

        let breeder = self
            .store
            .breeders
            .soft_delete(&breeder.id)
            .await?
            .ok_or_else(|| not_found::<Breeder>(&breeder.id))?;

        info!(
            breeder = %breeder.id,
            dogs = dogs.len(),
            litters = litters.len(),
            images,
            "Deleted breeder"
        );
        Ok(BreederCascade {
            breeder,
            dogs,
            litters,
        })
    }

    pub async fn delete_image(&self, image: &Image) -> DomainResult<Image> {
        let snapshot = self
            .store
            .images
            .soft_delete(&image.id)
            .await?
            .ok_or_else(|| not_found::<Image>(&image.id))?;
        self.remove_file(&snapshot).await;
        info!(image = %image.id, "Deleted image");
        Ok(snapshot)
    }

    pub async fn restore_dog(&self, dog: &Dog) -> DomainResult<Dog> {
        let restored = self
            .store
            .dogs
            .restore(&dog.id)
            .await?
            .ok_or_else(|| already_active::<Dog>(&dog.id))?;
        self.associations.relink_dog(&restored).await?;
        info!(dog = %dog.id, "Restored dog");
        self.reload::<Dog>(&dog.id).await
    }

    pub async fn restore_litter(&self, litter: &Litter) -> DomainResult<Litter> {
        self.store
            .litters
            .restore(&litter.id)
            .await?
            .ok_or_else(|| already_active::<Litter>(&litter.id))?;
        self.associations.relink_litter(&litter.id).await?;
        info!(litter = %litter.id, "Restored litter");
        self.reload::<Litter>(&litter.id).await
    }

    /// Bring back the breeder and everything of theirs that is tombstoned,
    /// then re-link litters and dogs. Images stay deleted since their files
    /// were removed.
    pub async fn restore_breeder(
        &self,
        breeder: &Breeder,
        requester_is_superuser: bool,
    ) -> DomainResult<BreederCascade> {
        if !requester_is_superuser {
            return Err(superuser_only("restore"));
        }
        if !breeder.is_deleted() {
            return Err(already_active::<Breeder>(&breeder.id));
        }

        // Someone may have registered the address while this breeder was deleted
        let email = breeder.email.trim().to_lowercase();
        let holders = self
            .store
            .breeders
            .find_all(&AssetFilter::field("email", email), Scope::Active)
            .await?;
        if holders.iter().any(|other| other.id != breeder.id) {
            return Err(email_in_use(breeder));
        }

        let restored_breeder = self
            .store
            .breeders
            .restore(&breeder.id)
            .await
            .map_err(|e| match e {
                StoreError::Constraint(_) => email_in_use(breeder),
                other => other.into(),
            })?
            .ok_or_else(|| already_active::<Breeder>(&breeder.id))?;
        let owned = AssetFilter::breeder(&breeder.id);

        let mut dogs = Vec::new();
        for dog in self.store.dogs.find_all(&owned, Scope::IncludeDeleted).await? {
            if dog.is_deleted() {
                if let Some(restored) = self.store.dogs.restore(&dog.id).await? {
                    dogs.push(restored);
                }
            }
        }

        let mut litters = Vec::new();
        for litter in self.store.litters.find_all(&owned, Scope::IncludeDeleted).await? {
            if litter.is_deleted() {
                if let Some(restored) = self.store.litters.restore(&litter.id).await? {
                    litters.push(restored);
                }
            }
        }

        for litter in &litters {
            self.associations.relink_litter(&litter.id).await?;
        }
        for dog in &dogs {
            self.associations.relink_dog(dog).await?;
        }

        info!(
            breeder = %breeder.id,
            dogs = dogs.len(),
            litters = litters.len(),
            "Restored breeder"
        );

        // Report the records as they stand after re-linking
        let dog_ids = dogs.iter().map(|d| d.id.clone()).collect();
        let litter_ids = litters.iter().map(|l| l.id.clone()).collect();
        Ok(BreederCascade {
            breeder: restored_breeder,
            dogs: self
                .store
                .dogs
                .find_all(&AssetFilter::Ids(dog_ids), Scope::Active)
                .await?,
            litters: self
                .store
                .litters
                .find_all(&AssetFilter::Ids(litter_ids), Scope::Active)
                .await?,
        })
    }

    pub async fn restore_image(&self, image: &Image) -> DomainResult<Image> {
        Err(DomainError::InvalidState(format!(
            "image {} cannot be restored, its file was removed",
            image.id
        )))
    }

    async fn reload<T: Asset>(&self, id: &str) -> DomainResult<T> {
        T::repository(&self.store)
            .find_by_id(id, Scope::IncludeDeleted)
            .await?
            .ok_or_else(|| not_found::<T>(id))
    }

    async fn remove_file(&self, image: &Image) {
        if let Err(e) = self.storage.remove(&image.path).await {
            warn!(image = %image.id, path = %image.path, "Failed to remove image file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ParentRef, Sex};
    use crate::storage::MemoryStorage;

    fn breeder(id: &str) -> Breeder {
        Breeder {
            id: id.to_string(),
            firstname: "Fred".to_string(),
            lastname: "Astaire".to_string(),
            city: String::new(),
            state: String::new(),
            email: format!("{id}@example.com"),
            password: String::new(),
            salt: String::new(),
            superuser: false,
            deleted_at: None,
        }
    }

    fn dog(id: &str, breeder_id: &str) -> Dog {
        Dog {
            id: id.to_string(),
            name: id.to_string(),
            breed: String::new(),
            color: String::new(),
            sex: Sex::Unknown,
            weight: 0,
            primary_image: None,
            breeder_id: breeder_id.to_string(),
            litter_id: String::new(),
            deleted_at: None,
        }
    }

    fn litter(id: &str, breeder_id: &str) -> Litter {
        Litter {
            id: id.to_string(),
            breeder_id: breeder_id.to_string(),
            count: 0,
            dam: ParentRef {
                id: None,
                name: Some("Bella".to_string()),
            },
            sire: None,
            pups: Vec::new(),
            deleted_at: None,
        }
    }

    struct Fixture {
        store: Store,
        storage: Arc<MemoryStorage>,
        assoc: AssociationMaintainer,
        cascade: CascadeController,
    }

    fn fixture() -> Fixture {
        let store = Store::memory();
        let storage = Arc::new(MemoryStorage::new());
        let assoc = AssociationMaintainer::new(store.clone());
        let cascade = CascadeController::new(store.clone(), storage.clone(), assoc.clone());
        Fixture {
            store,
            storage,
            assoc,
            cascade,
        }
    }

    async fn active_dog(store: &Store, id: &str) -> Dog {
        store.dogs.find_by_id(id, Scope::Active).await.unwrap().unwrap()
    }

    async fn active_litter(store: &Store, id: &str) -> Litter {
        store.litters.find_by_id(id, Scope::Active).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn dog_delete_and_restore_round_trip_the_litter() {
        let f = fixture();
        f.store.dogs.create(dog("rex", "b1")).await.unwrap();
        f.store.litters.create(litter("l1", "b1")).await.unwrap();
        f.assoc.attach_pup_to_litter("rex", "l1").await.unwrap();

        let snapshot = f.cascade.delete_dog(&active_dog(&f.store, "rex").await).await.unwrap();
        assert_eq!(snapshot.litter_id, "l1");
        assert!(active_litter(&f.store, "l1").await.pups.is_empty());

        let tomb = f.store.dogs.find_by_id("rex", Scope::IncludeDeleted).await.unwrap().unwrap();
        assert_eq!(tomb.litter_id, "l1");

        let restored = f.cascade.restore_dog(&tomb).await.unwrap();
        assert_eq!(restored.litter_id, "l1");
        assert_eq!(active_litter(&f.store, "l1").await.pups, vec!["rex"]);

        assert!(matches!(
            f.cascade.restore_dog(&restored).await,
            Err(DomainError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn litter_delete_releases_pups_and_restore_reclaims_them() {
        let f = fixture();
        f.store.dogs.create(dog("a", "b1")).await.unwrap();
        f.store.dogs.create(dog("b", "b1")).await.unwrap();
        f.store.litters.create(litter("l1", "b1")).await.unwrap();
        f.assoc.attach_pup_to_litter("a", "l1").await.unwrap();
        f.assoc.attach_pup_to_litter("b", "l1").await.unwrap();

        let snapshot = f
            .cascade
            .delete_litter(&active_litter(&f.store, "l1").await)
            .await
            .unwrap();
        assert_eq!(snapshot.pups, vec!["a", "b"]);
        assert_eq!(active_dog(&f.store, "a").await.litter_id, "");

        let tomb = f.store.litters.find_by_id("l1", Scope::IncludeDeleted).await.unwrap().unwrap();
        assert_eq!(tomb.pups, vec!["a", "b"]);

        // "b" joins another litter in the meantime
        f.store.litters.create(litter("l2", "b1")).await.unwrap();
        f.assoc.attach_pup_to_litter("b", "l2").await.unwrap();

        let restored = f.cascade.restore_litter(&tomb).await.unwrap();
        assert_eq!(restored.pups, vec!["a"]);
        assert_eq!(active_dog(&f.store, "a").await.litter_id, "l1");
        assert_eq!(active_dog(&f.store, "b").await.litter_id, "l2");
    }

    #[tokio::test]
    async fn breeder_cascade_requires_superuser() {
        let f = fixture();
        f.store.breeders.create(breeder("b1")).await.unwrap();
        let b = breeder("b1");
        assert!(matches!(
            f.cascade.delete_breeder(&b, false).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(f.store.breeders.find_by_id("b1", Scope::Active).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn breeder_cascade_is_complete() {
        let f = fixture();
        f.store.breeders.create(breeder("b1")).await.unwrap();
        f.store.breeders.create(breeder("b2")).await.unwrap();
        for id in ["d1", "d2", "d3"] {
            f.store.dogs.create(dog(id, "b1")).await.unwrap();
        }
        f.store.dogs.create(dog("other", "b2")).await.unwrap();
        f.store.litters.create(litter("l1", "b1")).await.unwrap();
        f.store.litters.create(litter("l2", "b1")).await.unwrap();
        f.assoc.attach_pup_to_litter("d1", "l1").await.unwrap();
        f.assoc.attach_pup_to_litter("d2", "l2").await.unwrap();

        let path = f.storage.save("b1", "i1", "rex.png", b"png").await.unwrap();
        f.store
            .images
            .create(Image {
                id: "i1".into(),
                breeder_id: "b1".into(),
                dog_id: None,
                litter_id: None,
                kind: "image/png".into(),
                name: "rex.png".into(),
                alt: String::new(),
                path: path.clone(),
                deleted_at: None,
            })
            .await
            .unwrap();

        let deleted = f.cascade.delete_breeder(&breeder("b1"), true).await.unwrap();
        assert_eq!(deleted.dogs.len(), 3);
        assert_eq!(deleted.litters.len(), 2);
        assert_eq!(f.store.dogs.count(Scope::Active).await.unwrap(), 1);
        assert_eq!(f.store.litters.count(Scope::Active).await.unwrap(), 0);
        assert!(!f.storage.contains(&path).await);

        let tomb = f.store.breeders.find_by_id("b1", Scope::IncludeDeleted).await.unwrap().unwrap();
        let restored = f.cascade.restore_breeder(&tomb, true).await.unwrap();
        assert_eq!(restored.dogs.len(), 3);
        assert_eq!(restored.litters.len(), 2);
        assert_eq!(active_litter(&f.store, "l1").await.pups, vec!["d1"]);
        assert_eq!(active_litter(&f.store, "l2").await.pups, vec!["d2"]);
        assert_eq!(active_dog(&f.store, "d1").await.litter_id, "l1");
        assert_eq!(active_dog(&f.store, "d3").await.litter_id, "");
        // images do not come back
        assert_eq!(f.store.images.count(Scope::Active).await.unwrap(), 0);
    }
}
