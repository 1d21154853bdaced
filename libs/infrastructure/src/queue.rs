//! SQLite-backed `Queue`: a single-table work queue tracking in-flight
//! delivery state separately from the job's own business status in
//! `store`. Transactional dequeue, heartbeat-based zombie reclaim via
//! `julianday()` arithmetic, mirrors the teacher's job-queue shape.

use async_trait::async_trait;
use chrono::Utc;
use planner_core::domain::JobId;
use planner_core::error::PlannerError;
use planner_core::traits::{Queue, QueueMessage};
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    pub async fn new(pool: SqlitePool) -> Result<Self, PlannerError> {
        let queue = Self { pool };
        queue.init_db().await?;
        Ok(queue)
    }

    async fn init_db(&self) -> Result<(), PlannerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queue_messages (
                job_id TEXT PRIMARY KEY,
                status TEXT NOT NULL CHECK(status IN ('pending', 'in_flight')),
                delivery_attempts INTEGER NOT NULL DEFAULT 0,
                enqueued_at TEXT NOT NULL,
                last_heartbeat TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to create queue_messages table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_status_enqueued
             ON queue_messages(status, enqueued_at);",
        )
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }
}

#[async_trait]
impl Queue for SqliteQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO queue_messages (job_id, status, delivery_attempts, enqueued_at)
             VALUES (?, 'pending', 0, ?)
             ON CONFLICT(job_id) DO UPDATE SET
                status = 'pending',
                enqueued_at = excluded.enqueued_at,
                last_heartbeat = NULL",
        )
        .bind(job_id.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to enqueue job {job_id}: {e}")))?;

        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>, PlannerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PlannerError::store(format!("failed to begin dequeue transaction: {e}")))?;

        let row = sqlx::query(
            "SELECT job_id, delivery_attempts FROM queue_messages
             WHERE status = 'pending'
             ORDER BY enqueued_at ASC
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| PlannerError::store(format!("failed to select pending message: {e}")))?;

        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(None);
        };

        let job_id_raw: String = row.get("job_id");
        let delivery_attempts: i64 = row.get("delivery_attempts");
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE queue_messages
             SET status = 'in_flight', delivery_attempts = delivery_attempts + 1, last_heartbeat = ?
             WHERE job_id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(&job_id_raw)
        .execute(&mut *tx)
        .await
        .map_err(|e| PlannerError::store(format!("failed to claim message: {e}")))?;

        if result.rows_affected() == 0 {
            tx.commit().await.ok();
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|e| PlannerError::store(format!("failed to commit dequeue: {e}")))?;

        let job_id = job_id_raw
            .parse()
            .map_err(|e| PlannerError::internal(format!("corrupt queue job id: {e}")))?;

        Ok(Some(QueueMessage {
            job_id,
            delivery_attempts: (delivery_attempts + 1) as u32,
        }))
    }

    async fn ack(&self, job_id: JobId) -> Result<(), PlannerError> {
        sqlx::query("DELETE FROM queue_messages WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to ack job {job_id}: {e}")))?;

        Ok(())
    }

    async fn nack(&self, job_id: JobId) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE queue_messages SET status = 'pending', enqueued_at = ?, last_heartbeat = NULL
             WHERE job_id = ?",
        )
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to nack job {job_id}: {e}")))?;

        Ok(())
    }

    async fn heartbeat(&self, job_id: JobId) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE queue_messages SET last_heartbeat = ? WHERE job_id = ? AND status = 'in_flight'",
        )
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to heartbeat job {job_id}: {e}")))?;

        Ok(())
    }

    async fn reclaim_stale(&self, stale_after_minutes: i64) -> Result<u64, PlannerError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE queue_messages
             SET status = 'pending', last_heartbeat = NULL
             WHERE status = 'in_flight'
               AND last_heartbeat IS NOT NULL
               AND (julianday(?) - julianday(last_heartbeat)) * 1440.0 > ?",
        )
        .bind(&now)
        .bind(stale_after_minutes as f64)
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to reclaim stale messages: {e}")))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_queue() -> SqliteQueue {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        SqliteQueue::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn dequeue_empty_queue_returns_none() {
        let queue = test_queue().await;
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_claims_message_once() {
        let queue = test_queue().await;
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        let msg = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.job_id, job_id);
        assert_eq!(msg.delivery_attempts, 1);

        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_makes_message_redeliverable_with_incremented_attempts() {
        let queue = test_queue().await;
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.nack(job_id).await.unwrap();

        let msg = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.delivery_attempts, 2);
    }

    #[tokio::test]
    async fn ack_removes_message_permanently() {
        let queue = test_queue().await;
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.ack(job_id).await.unwrap();

        queue.enqueue(job_id).await.unwrap();
        let msg = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.delivery_attempts, 1);
    }

    #[tokio::test]
    async fn reclaim_stale_returns_in_flight_message_with_old_heartbeat_to_pending() {
        let queue = test_queue().await;
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.dequeue().await.unwrap();

        sqlx::query("UPDATE queue_messages SET last_heartbeat = '2000-01-01T00:00:00+00:00' WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&queue.pool)
            .await
            .unwrap();

        let reclaimed = queue.reclaim_stale(5).await.unwrap();
        assert_eq!(reclaimed, 1);

        let msg = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.job_id, job_id);
    }
}
