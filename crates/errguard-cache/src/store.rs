//! SQLite implementation of IStateStore
//!
//! Each key maps to one row of `state_entries`. Writes are upserts, so the
//! last writer wins per key, matching the port contract.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use errguard_core::ports::IStateStore;

use crate::CacheError;

/// SQLite-backed persistent state store
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists stored keys in alphabetical order
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query("SELECT key FROM state_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("key")).collect())
    }

    /// Removes every stored key
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM state_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM state_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO state_entries (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(&updated_at)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        tracing::trace!(key, bytes = value.len(), "Stored state entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM state_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(())
    }
}
