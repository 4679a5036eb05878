pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;

pub use manager::{DatabaseError, DatabaseManager};
pub use repository::{AssetFilter, AssetRepository, Mutation, Scope, StoreError};

use sqlx::PgPool;
use std::sync::Arc;

use memory::MemoryRepository;
use models::{Breeder, Dog, Image, Litter};
use postgres::PgRepository;

/// One repository per noun, shared by every request
#[derive(Clone)]
pub struct Store {
    pub breeders: Arc<dyn AssetRepository<Breeder>>,
    pub dogs: Arc<dyn AssetRepository<Dog>>,
    pub litters: Arc<dyn AssetRepository<Litter>>,
    pub images: Arc<dyn AssetRepository<Image>>,
}

impl Store {
    pub fn memory() -> Self {
        Self {
            breeders: Arc::new(MemoryRepository::new()),
            dogs: Arc::new(MemoryRepository::new()),
            litters: Arc::new(MemoryRepository::new()),
            images: Arc::new(MemoryRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            breeders: Arc::new(PgRepository::new(pool.clone())),
            dogs: Arc::new(PgRepository::new(pool.clone())),
            litters: Arc::new(PgRepository::new(pool.clone())),
            images: Arc::new(PgRepository::new(pool)),
        }
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.breeders.ping().await
    }
}
