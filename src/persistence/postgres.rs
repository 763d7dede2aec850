//! PostgreSQL implementation of the record store.
//!
//! All collections share one `records` table with a JSONB `body`.
//! Updates lock the row with `SELECT ... FOR UPDATE` inside a
//! transaction, so concurrent writers to the same record serialize.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{Collection, Patch, RecordStore, StoreError, apply_patch, created_at, stamp_new};
use crate::config::BurnerConfig;
use crate::domain::RecordId;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the configured URL and pool limits, then runs the
    /// embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection or a migration
    /// fails.
    pub async fn connect(config: &BurnerConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "postgres record store connected"
        );
        Ok(store)
    }

    /// Applies the migrations under `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError> {
        let (id, doc) = stamp_new(collection, body)?;
        let stamped = created_at(collection, &doc).unwrap_or_else(Utc::now);
        sqlx::query(
            "INSERT INTO records (id, collection, body, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(*id.as_uuid())
        .bind(collection.as_str())
        .bind(&doc)
        .bind(stamped)
        .execute(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: RecordId,
        patch: Patch<'_>,
    ) -> Result<Value, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM records WHERE id = $1 AND collection = $2 FOR UPDATE",
        )
        .bind(*id.as_uuid())
        .bind(collection.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut doc) = row else {
            return Err(StoreError::NotFound { collection, id });
        };

        // An error here drops `tx`, which rolls back and releases the lock.
        apply_patch(collection, id, &mut doc, patch)?;

        sqlx::query("UPDATE records SET body = $1, updated_at = now() WHERE id = $2")
            .bind(&doc)
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(doc)
    }

    async fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM records WHERE id = $1 AND collection = $2",
        )
        .bind(*id.as_uuid())
        .bind(collection.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM records WHERE collection = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
