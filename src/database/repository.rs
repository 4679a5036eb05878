use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::database::models::Asset;

/// Errors surfaced by repository implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Constraint enforced by the store itself (e.g. unique active email)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Which lifecycle states a read may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Active,
    IncludeDeleted,
}

impl Scope {
    pub fn admits<T: Asset>(&self, asset: &T) -> bool {
        match self {
            Scope::Active => !asset.is_deleted(),
            Scope::IncludeDeleted => true,
        }
    }
}

/// Row selection for list reads and bulk updates
#[derive(Debug, Clone, PartialEq)]
pub enum AssetFilter {
    All,
    Ids(Vec<String>),
    /// Equality on a top-level wire field, e.g. `breederId` or `email`
    Field { name: &'static str, value: Value },
}

impl AssetFilter {
    pub fn field(name: &'static str, value: impl Into<Value>) -> Self {
        AssetFilter::Field {
            name,
            value: value.into(),
        }
    }

    pub fn breeder(breeder_id: &str) -> Self {
        Self::field("breederId", breeder_id)
    }

    /// In-process evaluation, used by the memory store
    pub fn matches<T: Asset>(&self, asset: &T) -> Result<bool, StoreError> {
        match self {
            AssetFilter::All => Ok(true),
            AssetFilter::Ids(ids) => Ok(ids.iter().any(|id| id == asset.id())),
            AssetFilter::Field { name, value } => {
                let encoded = serde_json::to_value(asset)?;
                Ok(encoded.get(*name) == Some(value))
            }
        }
    }
}

/// In-place edit applied by `modify` and `modify_all`
pub type Mutation<'m, T> = dyn for<'a> Fn(&'a mut T) + Send + Sync + 'm;

/// Persistence boundary for one asset type.
///
/// `modify` and `modify_all` are the only read-modify-write paths; they must
/// be atomic with respect to each other for the same record.
#[async_trait]
pub trait AssetRepository<T: Asset>: Send + Sync {
    async fn find_by_id(&self, id: &str, scope: Scope) -> Result<Option<T>, StoreError>;

    async fn find_all(&self, filter: &AssetFilter, scope: Scope) -> Result<Vec<T>, StoreError>;

    async fn count(&self, scope: Scope) -> Result<usize, StoreError> {
        Ok(self.find_all(&AssetFilter::All, scope).await?.len())
    }

    /// Insert a new record. Fails with `DuplicateId` if the id exists in any state.
    async fn create(&self, asset: T) -> Result<T, StoreError>;

    /// Apply `mutation` to the record under the store's write guard.
    /// Returns `None` when no record is visible in `scope`.
    async fn modify(
        &self,
        id: &str,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Option<T>, StoreError>;

    /// Bulk variant of `modify`, returns the updated records
    async fn modify_all(
        &self,
        filter: &AssetFilter,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Vec<T>, StoreError>;

    /// Tombstone an active record. Returns the pre-deletion snapshot, or `None`
    /// if there was no active record with that id.
    async fn soft_delete(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Clear the tombstone. Returns `None` if there was no deleted record with that id.
    async fn restore(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Physically remove a record; only used to undo a failed create
    async fn purge(&self, id: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
