use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Asset;
use crate::database::repository::AssetRepository;
use crate::database::Store;
use crate::types::Noun;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "f")]
    Female,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl Sex {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "m" => Some(Sex::Male),
            "f" => Some(Sex::Female),
            "" => Some(Sex::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dog {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub breed: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub primary_image: Option<String>,
    pub breeder_id: String,
    /// Empty string means the dog is not part of a litter
    #[serde(default)]
    pub litter_id: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Dog {
    pub fn has_litter(&self) -> bool {
        !self.litter_id.is_empty()
    }
}

impl Asset for Dog {
    const NOUN: Noun = Noun::Dog;

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
        &store.dogs
    }
}
