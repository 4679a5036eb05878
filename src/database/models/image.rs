use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Asset;
use crate::database::repository::AssetRepository;
use crate::database::Store;
use crate::types::Noun;

/// Uploaded picture owned by a breeder, optionally tagged with a dog or litter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    pub breeder_id: String,
    #[serde(default)]
    pub dog_id: Option<String>,
    #[serde(default)]
    pub litter_id: Option<String>,
    /// MIME type reported by the upload
    #[serde(rename = "type", default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub alt: String,
    pub path: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Asset for Image {
    const NOUN: Noun = Noun::Image;

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
        &store.images
    }
}
