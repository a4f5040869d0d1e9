//! SQLite-backed implementation of the store primitives.
//!
//! Values are stored as JSON text, counters included.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::kv::{counter_value, KvError, KvStore};

/// Database repository for the `kv` table.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for Repository {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                let value: Value = serde_json::from_str(&raw)?;
                Ok(Some(value).filter(|v| !v.is_null()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), KvError> {
        let raw = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(&raw)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so concurrent increments serialize.
        sqlx::query("UPDATE kv SET updated_at = ? WHERE key = ?")
            .bind(&now)
            .bind(key)
            .execute(&mut *tx)
            .await?;

        let current = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

        let next = match current {
            Some(row) => {
                let raw: String = row.get("value");
                let value: Value = serde_json::from_str(&raw)?;
                match value {
                    Value::Null => 1,
                    value => {
                        counter_value(&value).ok_or_else(|| KvError::NotANumber {
                            key: key.to_string(),
                        })? + 1
                    }
                }
            }
            None => 1,
        };

        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(next.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
