use async_trait::async_trait;
use chrono::Utc;

use frontdesk_core::quota::{CounterStore, CounterStoreError};

use crate::DbPool;

/// Durable counter backing for the quota tracker: one row per counter key in
/// the `chat_quota` table.
pub struct SqlCounterStore {
    pool: DbPool,
}

impl SqlCounterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for SqlCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterStoreError> {
        sqlx::query_scalar::<_, i64>("SELECT consumed FROM chat_quota WHERE counter_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| CounterStoreError(error.to_string()))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterStoreError> {
        sqlx::query(
            "INSERT INTO chat_quota (counter_key, consumed, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(counter_key) DO UPDATE SET
                consumed = excluded.consumed,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| CounterStoreError(error.to_string()))?;

        Ok(())
    }
}
