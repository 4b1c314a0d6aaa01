//! Upload queue repository implementation.

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use paperscan_core::{
    Error, QueueEntry, QueueRepository, QueueStatus, Result, UploadMetadata,
};

/// SQLite implementation of QueueRepository.
#[derive(Clone)]
pub struct SqliteQueueRepository {
    pool: Pool<Sqlite>,
}

impl SqliteQueueRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Parse a queue row into a QueueEntry.
    fn parse_entry_row(row: &SqliteRow) -> Result<QueueEntry> {
        let id: String = row.try_get("id").map_err(Error::Database)?;
        let files: String = row.try_get("files").map_err(Error::Database)?;
        let tag_ids: String = row.try_get("tag_ids").map_err(Error::Database)?;
        let status: String = row.try_get("status").map_err(Error::Database)?;
        let attempt_count: i64 = row.try_get("attempt_count").map_err(Error::Database)?;
        let max_attempts: i64 = row.try_get("max_attempts").map_err(Error::Database)?;

        Ok(QueueEntry {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::Serialization(format!("invalid queue id {id}: {e}")))?,
            files: serde_json::from_str::<Vec<PathBuf>>(&files)?,
            multi_page: row.try_get("multi_page").map_err(Error::Database)?,
            metadata: UploadMetadata {
                title: row.try_get("title").map_err(Error::Database)?,
                tag_ids: serde_json::from_str(&tag_ids)?,
                document_type_id: row.try_get("document_type_id").map_err(Error::Database)?,
                correspondent_id: row.try_get("correspondent_id").map_err(Error::Database)?,
            },
            status: QueueStatus::from_str(&status)?,
            attempt_count: attempt_count.max(0) as u32,
            max_attempts: max_attempts.max(1) as u32,
            last_error: row.try_get("last_error").map_err(Error::Database)?,
            next_attempt_at: row.try_get("next_attempt_at").map_err(Error::Database)?,
            enqueued_at: row.try_get("enqueued_at").map_err(Error::Database)?,
            updated_at: row.try_get("updated_at").map_err(Error::Database)?,
        })
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        let files = serde_json::to_string(&entry.files)?;
        let tag_ids = serde_json::to_string(&entry.metadata.tag_ids)?;

        sqlx::query(
            "INSERT INTO upload_queue
                (id, files, multi_page, title, tag_ids, document_type_id, correspondent_id,
                 status, attempt_count, max_attempts, last_error, next_attempt_at,
                 enqueued_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(files)
        .bind(entry.multi_page)
        .bind(&entry.metadata.title)
        .bind(tag_ids)
        .bind(entry.metadata.document_type_id)
        .bind(entry.metadata.correspondent_id)
        .bind(entry.status.as_str())
        .bind(entry.attempt_count as i64)
        .bind(entry.max_attempts as i64)
        .bind(&entry.last_error)
        .bind(entry.next_attempt_at)
        .bind(entry.enqueued_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueuePersistence(e.to_string()))?;

        info!(
            subsystem = "db",
            component = "queue",
            op = "insert",
            queue_id = %entry.id,
            page_count = entry.files.len(),
            "Upload queued"
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>> {
        let row = sqlx::query("SELECT * FROM upload_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_entry_row).transpose()
    }

    async fn list(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query("SELECT * FROM upload_queue ORDER BY enqueued_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_entry_row).collect()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueueEntry>> {
        // Single statement: SQLite serializes writers, so two claimers can
        // never move the same row to 'uploading'.
        let row = sqlx::query(
            "UPDATE upload_queue
             SET status = 'uploading', attempt_count = attempt_count + 1, updated_at = ?1
             WHERE id = (
                 SELECT id FROM upload_queue
                 WHERE status = 'pending'
                   AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                 ORDER BY enqueued_at, id
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let entry = row.as_ref().map(Self::parse_entry_row).transpose()?;
        if let Some(ref entry) = entry {
            debug!(
                subsystem = "db",
                component = "queue",
                op = "claim_next",
                queue_id = %entry.id,
                attempt = entry.attempt_count,
                "Claimed queue entry"
            );
        }
        Ok(entry)
    }

    async fn complete(&self, id: Uuid, task_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM upload_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("queue entry {id}")));
        }
        info!(
            subsystem = "db",
            component = "queue",
            op = "complete",
            queue_id = %id,
            task_id,
            "Queue entry completed and removed"
        );
        Ok(())
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<QueueStatus> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let counts: Option<(i64, i64)> =
            sqlx::query_as("SELECT attempt_count, max_attempts FROM upload_queue WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;

        let (attempt_count, max_attempts) =
            counts.ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;

        let status = match retry_at {
            Some(retry_at) if attempt_count < max_attempts => {
                sqlx::query(
                    "UPDATE upload_queue
                     SET status = 'pending', last_error = ?, next_attempt_at = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(error)
                .bind(retry_at)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                QueueStatus::Pending
            }
            _ => {
                sqlx::query(
                    "UPDATE upload_queue
                     SET status = 'failed', last_error = ?, next_attempt_at = NULL, updated_at = ?
                     WHERE id = ?",
                )
                .bind(error)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                QueueStatus::Failed
            }
        };

        tx.commit().await.map_err(Error::Database)?;
        Ok(status)
    }

    async fn reset(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE upload_queue
             SET status = 'pending', attempt_count = 0, next_attempt_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'failed'",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("failed queue entry {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM upload_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_queue WHERE status IN ('pending', 'uploading')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn recover_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE upload_queue SET status = 'pending', updated_at = ? WHERE status = 'uploading'",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(
                subsystem = "db",
                component = "queue",
                op = "recover_interrupted",
                recovered,
                "Returned interrupted uploads to the queue"
            );
        }
        Ok(recovered)
    }
}
