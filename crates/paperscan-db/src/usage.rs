//! AI usage ledger repository.

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use tracing::debug;

use paperscan_core::{Error, Result, UsageRecord, UsageRepository};

/// SQLite implementation of UsageRepository.
#[derive(Clone)]
pub struct SqliteUsageRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUsageRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Total estimated tokens recorded for a month.
    pub async fn monthly_tokens(&self, month: &str) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(estimated_tokens), 0) FROM ai_usage WHERE month = ?",
        )
        .bind(month)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl UsageRepository for SqliteUsageRepository {
    async fn record(&self, record: &UsageRecord) -> Result<u64> {
        let month = record.month_key();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO ai_usage (id, month, source, estimated_tokens, image_bytes, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(paperscan_core::new_v7().to_string())
        .bind(&month)
        .bind(record.source.as_str())
        .bind(record.estimated_tokens as i64)
        .bind(record.image_bytes as i64)
        .bind(record.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_usage WHERE month = ?")
            .bind(&month)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "usage",
            op = "record",
            usage_count = count,
            estimated_tokens = record.estimated_tokens,
            "Recorded AI usage"
        );
        Ok(count.max(0) as u64)
    }

    async fn monthly_count(&self, month: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_usage WHERE month = ?")
            .bind(month)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count.max(0) as u64)
    }
}
