use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Asset;
use crate::database::repository::AssetRepository;
use crate::database::Store;
use crate::types::Noun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breeder {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub email: String,
    /// Salted hash, never the plain text password
    pub password: String,
    pub salt: String,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Asset for Breeder {
    const NOUN: Noun = Noun::Breeder;
    const OWNER_FIELD: &'static str = "id";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn repository(store: &Store) -> &Arc<dyn AssetRepository<Self>> {
        &store.breeders
    }

    fn unique_key(&self) -> Option<(&'static str, String)> {
        Some(("email", self.email.trim().to_lowercase()))
    }
}
