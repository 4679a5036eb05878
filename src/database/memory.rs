use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::database::models::Asset;
use crate::database::repository::{AssetFilter, AssetRepository, Mutation, Scope, StoreError};

/// In-process repository used by tests and by `--store memory`.
///
/// Every mutating call holds the write guard for its whole read-modify-write,
/// which is what makes `modify` atomic.
pub struct MemoryRepository<T> {
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Active-record uniqueness, the in-process twin of the partial unique
/// indexes `ensure_schema` creates
fn check_unique<T: Asset>(rows: &BTreeMap<String, T>, candidate: &T) -> Result<(), StoreError> {
    if candidate.is_deleted() {
        return Ok(());
    }
    let Some((field, key)) = candidate.unique_key() else {
        return Ok(());
    };
    let taken = rows.values().any(|other| {
        other.id() != candidate.id()
            && !other.is_deleted()
            && other.unique_key().is_some_and(|(_, k)| k == key)
    });
    if taken {
        return Err(StoreError::Constraint(format!("{} is already in use", field)));
    }
    Ok(())
}

#[async_trait]
impl<T: Asset> AssetRepository<T> for MemoryRepository<T> {
    async fn find_by_id(&self, id: &str, scope: Scope) -> Result<Option<T>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(id).filter(|a| scope.admits(*a)).cloned())
    }

    async fn find_all(&self, filter: &AssetFilter, scope: Scope) -> Result<Vec<T>, StoreError> {
        let rows = self.rows.read().await;
        let mut found = Vec::new();
        for asset in rows.values() {
            if scope.admits(asset) && filter.matches(asset)? {
                found.push(asset.clone());
            }
        }
        Ok(found)
    }

    async fn create(&self, asset: T) -> Result<T, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(asset.id()) {
            return Err(StoreError::DuplicateId(asset.id().to_string()));
        }
        check_unique(&rows, &asset)?;
        rows.insert(asset.id().to_string(), asset.clone());
        Ok(asset)
    }

    async fn modify(
        &self,
        id: &str,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Option<T>, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(mut asset) = rows.get(id).filter(|a| scope.admits(*a)).cloned() else {
            return Ok(None);
        };
        mutation(&mut asset);
        check_unique(&rows, &asset)?;
        rows.insert(id.to_string(), asset.clone());
        Ok(Some(asset))
    }

    async fn modify_all(
        &self,
        filter: &AssetFilter,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut rows = self.rows.write().await;
        let mut updated = Vec::new();
        for asset in rows.values() {
            if scope.admits(asset) && filter.matches(asset)? {
                let mut asset = asset.clone();
                mutation(&mut asset);
                check_unique(&rows, &asset)?;
                updated.push(asset);
            }
        }
        for asset in &updated {
            rows.insert(asset.id().to_string(), asset.clone());
        }
        Ok(updated)
    }

    async fn soft_delete(&self, id: &str) -> Result<Option<T>, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id) {
            Some(asset) if !asset.is_deleted() => {
                let snapshot = asset.clone();
                asset.set_deleted_at(Some(Utc::now()));
                Ok(Some(snapshot))
            }
            _ => Ok(None),
        }
    }

    async fn restore(&self, id: &str) -> Result<Option<T>, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(mut asset) = rows.get(id).filter(|a| a.is_deleted()).cloned() else {
            return Ok(None);
        };
        asset.set_deleted_at(None);
        check_unique(&rows, &asset)?;
        rows.insert(id.to_string(), asset.clone());
        Ok(Some(asset))
    }

    async fn purge(&self, id: &str) -> Result<(), StoreError> {
        self.rows.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Breeder, Dog, Sex};

    fn dog(id: &str, breeder: &str) -> Dog {
        Dog {
            id: id.to_string(),
            name: format!("dog {id}"),
            breed: String::new(),
            color: String::new(),
            sex: Sex::Unknown,
            weight: 0,
            primary_image: None,
            breeder_id: breeder.to_string(),
            litter_id: String::new(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn soft_delete_hides_from_active_scope() {
        let repo = MemoryRepository::<Dog>::new();
        repo.create(dog("d1", "b1")).await.unwrap();

        let snapshot = repo.soft_delete("d1").await.unwrap().unwrap();
        assert!(snapshot.deleted_at.is_none());

        assert!(repo.find_by_id("d1", Scope::Active).await.unwrap().is_none());
        assert!(repo.find_by_id("d1", Scope::IncludeDeleted).await.unwrap().is_some());
        assert!(repo.soft_delete("d1").await.unwrap().is_none());

        repo.restore("d1").await.unwrap().unwrap();
        assert!(repo.restore("d1").await.unwrap().is_none());
        assert!(repo.find_by_id("d1", Scope::Active).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_even_when_deleted() {
        let repo = MemoryRepository::<Dog>::new();
        repo.create(dog("d1", "b1")).await.unwrap();
        repo.soft_delete("d1").await.unwrap();
        let err = repo.create(dog("d1", "b2")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "d1"));
    }

    fn breeder(id: &str, email: &str) -> Breeder {
        Breeder {
            id: id.to_string(),
            firstname: "Fred".to_string(),
            lastname: "Astaire".to_string(),
            city: String::new(),
            state: String::new(),
            email: email.to_string(),
            password: String::new(),
            salt: String::new(),
            superuser: false,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn active_emails_stay_unique_on_every_write() {
        let repo = MemoryRepository::<Breeder>::new();
        repo.create(breeder("fred", "fred@astaire.com")).await.unwrap();

        let err = repo.create(breeder("ginger", "Fred@Astaire.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        repo.create(breeder("ginger", "ginger@rogers.com")).await.unwrap();
        let err = repo
            .modify("ginger", Scope::Active, &|b: &mut Breeder| {
                b.email = "fred@astaire.com".into()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        let ginger = repo.find_by_id("ginger", Scope::Active).await.unwrap().unwrap();
        assert_eq!(ginger.email, "ginger@rogers.com");

        // A tombstone frees its address, and cannot come back while it is taken
        repo.soft_delete("fred").await.unwrap();
        repo.create(breeder("astaire", "fred@astaire.com")).await.unwrap();
        let err = repo.restore("fred").await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(repo.find_by_id("fred", Scope::Active).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn field_filter_matches_wire_names() {
        let repo = MemoryRepository::<Dog>::new();
        repo.create(dog("d1", "b1")).await.unwrap();
        repo.create(dog("d2", "b2")).await.unwrap();
        repo.create(dog("d3", "b1")).await.unwrap();

        let owned = repo
            .find_all(&AssetFilter::breeder("b1"), Scope::Active)
            .await
            .unwrap();
        let ids: Vec<_> = owned.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
        assert_eq!(repo.count(Scope::Active).await.unwrap(), 3);
    }
}
