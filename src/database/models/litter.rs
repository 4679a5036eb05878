use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Asset;
use crate::database::repository::AssetRepository;
use crate::database::Store;
use crate::types::Noun;

/// Dam or sire of a litter: a reference to a dog record, a free-text name, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Litter {
    pub id: String,
    pub breeder_id: String,
    #[serde(default)]
    pub count: i64,
    pub dam: ParentRef,
    #[serde(default)]
    pub sire: Option<ParentRef>,
    #[serde(default)]
    pub pups: Vec<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Litter {
    pub fn has_pup(&self, dog_id: &str) -> bool {
        self.pups.iter().any(|p| p == dog_id)
    }
}

impl Asset for Litter {
    const NOUN: Noun = Noun::Litter;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.breeder_id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn repository(store: &Store) -> &Arc<dyn AssetRepository<Self>> {
        &store.litters
    }
}
