pub mod breeder;
pub mod dog;
pub mod image;
pub mod litter;

pub use breeder::Breeder;
pub use dog::{Dog, Sex};
pub use image::Image;
pub use litter::{Litter, ParentRef};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::database::repository::AssetRepository;
use crate::database::Store;
use crate::types::Noun;

/// Common behaviour of every persisted record.
///
/// The noun and the repository lookup are resolved at compile time, so generic
/// code (the gate, the cascade controller) never dispatches on strings.
pub trait Asset: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const NOUN: Noun;

    /// Wire field naming the owning breeder, used to scope list reads
    const OWNER_FIELD: &'static str = "breederId";

    fn id(&self) -> &str;

    /// Breeder id that owns this asset. For a breeder this is its own id.
    fn owner_id(&self) -> &str;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    fn repository(store: &Store) -> &Arc<dyn AssetRepository<Self>>;

    /// Wire field and normalized value that must be unique among active
    /// records of this type
    fn unique_key(&self) -> Option<(&'static str, String)> {
        None
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
