use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;

use crate::database::models::Asset;
use crate::database::repository::{AssetFilter, AssetRepository, Mutation, Scope, StoreError};
use crate::types::Noun;

/// PostgreSQL repository. Each asset type lives in its own table shaped as
/// `(id TEXT PRIMARY KEY, data JSONB, trashed_at TIMESTAMPTZ)`; `trashed_at`
/// is authoritative for the soft-delete state.
pub struct PgRepository<T> {
    table: &'static str,
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Asset> PgRepository<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            table: T::NOUN.plural(),
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    fn decode(row: &PgRow) -> Result<T, StoreError> {
        let Json(data): Json<Value> = row.try_get("data")?;
        let trashed_at: Option<DateTime<Utc>> = row.try_get("trashed_at")?;
        let mut asset: T = serde_json::from_value(data)?;
        asset.set_deleted_at(trashed_at);
        Ok(asset)
    }

    fn encode(asset: &T) -> Result<Json<Value>, StoreError> {
        Ok(Json(serde_json::to_value(asset)?))
    }

    /// `SELECT ... WHERE <filter> <scope>`; callers may append further clauses
    fn select<'q>(&self, filter: &AssetFilter, scope: Scope) -> QueryBuilder<'q, Postgres> {
        let mut query = QueryBuilder::new(format!(
            "SELECT id, data, trashed_at FROM \"{}\" WHERE ",
            self.table
        ));
        match filter {
            AssetFilter::All => {
                query.push("TRUE");
            }
            AssetFilter::Ids(ids) => {
                query.push("id = ANY(").push_bind(ids.clone()).push(")");
            }
            AssetFilter::Field { name, value } => {
                query
                    .push("data -> ")
                    .push_bind(name.to_string())
                    .push(" = ")
                    .push_bind(Json(value.clone()));
            }
        }
        if scope == Scope::Active {
            query.push(" AND trashed_at IS NULL");
        }
        query
    }

    async fn write(
        &self,
        executor: &mut sqlx::PgConnection,
        asset: &T,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "UPDATE \"{}\" SET data = $2, trashed_at = $3 WHERE id = $1",
            self.table
        ))
        .bind(asset.id())
        .bind(Self::encode(asset)?)
        .bind(asset.deleted_at())
        .execute(executor)
        .await
        .map_err(classify)?;
        Ok(())
    }
}

/// Unique-index violations are constraint errors the API reports as 400s
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Sqlx(err)
}

#[async_trait]
impl<T: Asset> AssetRepository<T> for PgRepository<T> {
    async fn find_by_id(&self, id: &str, scope: Scope) -> Result<Option<T>, StoreError> {
        let mut query = self.select(&AssetFilter::Ids(vec![id.to_string()]), scope);
        let row = query.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_all(&self, filter: &AssetFilter, scope: Scope) -> Result<Vec<T>, StoreError> {
        let mut query = self.select(filter, scope);
        query.push(" ORDER BY id");
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn count(&self, scope: Scope) -> Result<usize, StoreError> {
        let sql = match scope {
            Scope::Active => format!("SELECT COUNT(*) FROM \"{}\" WHERE trashed_at IS NULL", self.table),
            Scope::IncludeDeleted => format!("SELECT COUNT(*) FROM \"{}\"", self.table),
        };
        let count: (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count.0 as usize)
    }

    async fn create(&self, asset: T) -> Result<T, StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO \"{}\" (id, data, trashed_at) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
            self.table
        ))
        .bind(asset.id())
        .bind(Self::encode(&asset)?)
        .bind(asset.deleted_at())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId(asset.id().to_string()));
        }
        Ok(asset)
    }

    async fn modify(
        &self,
        id: &str,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Option<T>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut query = self.select(&AssetFilter::Ids(vec![id.to_string()]), scope);
        query.push(" FOR UPDATE");
        let Some(row) = query.build().fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };

        let mut asset = Self::decode(&row)?;
        mutation(&mut asset);
        self.write(&mut *tx, &asset).await?;
        tx.commit().await?;
        Ok(Some(asset))
    }

    async fn modify_all(
        &self,
        filter: &AssetFilter,
        scope: Scope,
        mutation: &Mutation<'_, T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut query = self.select(filter, scope);
        query.push(" ORDER BY id FOR UPDATE");
        let rows = query.build().fetch_all(&mut *tx).await?;

        let mut updated = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut asset = Self::decode(row)?;
            mutation(&mut asset);
            self.write(&mut *tx, &asset).await?;
            updated.push(asset);
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn soft_delete(&self, id: &str) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE \"{}\" SET trashed_at = now() WHERE id = $1 AND trashed_at IS NULL \
             RETURNING id, data, NULL::timestamptz AS trashed_at",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn restore(&self, id: &str) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE \"{}\" SET trashed_at = NULL WHERE id = $1 AND trashed_at IS NOT NULL \
             RETURNING id, data, trashed_at",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn purge(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("DELETE FROM \"{}\" WHERE id = $1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create the asset tables and the active-email unique index if missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for noun in [Noun::Breeder, Noun::Dog, Noun::Litter, Noun::Image] {
        let table = noun.plural();
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                trashed_at TIMESTAMPTZ
            )"
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{table}_breeder_idx\" ON \"{table}\" ((data ->> 'breederId'))"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS breeders_active_email_idx \
         ON breeders ((lower(data ->> 'email'))) WHERE trashed_at IS NULL",
    )
    .execute(pool)
    .await?;

    info!("Database schema ready");
    Ok(())
}
