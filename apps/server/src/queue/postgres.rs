use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{Job, QueuedJob, MERGE_QUEUE};
use crate::queue::JobQueue;

/// Job queue stored in the `jobs` table.
///
/// Workers claim rows with `FOR UPDATE SKIP LOCKED`, so any number of worker
/// processes can poll the same table without handing a job out twice while its
/// lock is held.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    queue: String,
}

fn to_chrono(duration: Duration) -> AppResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| AppError::Internal(format!("Invalid job delay: {}", e)))
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            queue: MERGE_QUEUE.to_string(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Atomically claims the oldest runnable job.
    ///
    /// A job is runnable when its `run_at` has passed and it is either unlocked
    /// or its previous lock expired.
    pub async fn claim(
        &self,
        worker_id: &str,
        lock_timeout: Duration,
    ) -> AppResult<Option<QueuedJob>> {
        let locked_until = Utc::now() + to_chrono(lock_timeout)?;

        let job = sqlx::query_as::<_, QueuedJob>(
            r#"
            UPDATE jobs
            SET locked_by = $2, locked_until = $3, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND run_at <= NOW()
                  AND (locked_until IS NULL OR locked_until < NOW())
                ORDER BY run_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(&self.queue)
        .bind(worker_id)
        .bind(locked_until)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Removes a job whose handler finished
    pub async fn complete(&self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Releases a failed job and schedules it to run again after `delay`
    pub async fn retry(&self, id: i64, delay: Duration, error: &str) -> AppResult<()> {
        let run_at = Utc::now() + to_chrono(delay)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET run_at = $2, locked_by = NULL, locked_until = NULL, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Jobs of this queue that are due to run, claimed or not
    pub async fn pending_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE queue = $1 AND run_at <= NOW()",
        )
        .bind(&self.queue)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Loads a job by id
    pub async fn get(&self, id: i64) -> AppResult<Option<QueuedJob>> {
        let job = sqlx::query_as::<_, QueuedJob>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &Job, delay: Duration) -> AppResult<i64> {
        let payload = serde_json::to_value(job)?;
        let run_at = Utc::now() + to_chrono(delay)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (queue, task, payload, run_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&self.queue)
        .bind(job.task_name())
        .bind(payload)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await?;

        log::debug!(
            "job.enqueued id={} task={} delay={}s",
            id,
            job.task_name(),
            delay.as_secs()
        );

        Ok(id)
    }
}
