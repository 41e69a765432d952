//! Durable job queue.
//!
//! One queue entry per run. Claiming uses `FOR UPDATE SKIP LOCKED` so
//! concurrent claimants skip rows another transaction is examining
//! instead of blocking on them; exactly one worker ever owns a job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use suiterun_core::{JobStatus, ResourceId};
use tracing::info;

use crate::{DbError, DbResult};

/// A queue entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: uuid::Uuid,
    pub run_id: uuid::Uuid,
    pub status: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending/processing totals for reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueDepth {
    pub pending: i64,
    pub processing: i64,
}

#[async_trait]
pub trait JobQueueRepo: Send + Sync {
    /// Atomically claim the highest-priority, oldest pending job with
    /// attempts remaining. Increments `attempts` and records the lock.
    /// Returns None when nothing is eligible.
    async fn claim(&self, worker_id: &str) -> DbResult<Option<JobRecord>>;

    /// Mark a job completed and its run successful, in one transaction.
    /// Fails with a conflict unless the job is still locked by `worker_id`.
    async fn complete(&self, job_id: ResourceId, worker_id: &str) -> DbResult<()>;

    /// Record a failed attempt. With attempts remaining the job returns
    /// to pending for any worker to reclaim; otherwise it is terminally
    /// failed and the run is marked failed. Returns the resulting status.
    async fn fail(&self, job_id: ResourceId, worker_id: &str, message: &str)
    -> DbResult<JobStatus>;

    /// Reset processing jobs whose lock is older than `older_than` back
    /// to pending. The only recovery path for crashed workers.
    async fn release_stuck(&self, older_than: Duration) -> DbResult<u64>;

    /// Delete completed/failed jobs older than the retention window.
    async fn cleanup_old(&self, retention: Duration) -> DbResult<u64>;

    async fn get(&self, job_id: ResourceId) -> DbResult<JobRecord>;
    async fn for_run(&self, run_id: ResourceId) -> DbResult<Option<JobRecord>>;
    async fn depth(&self) -> DbResult<QueueDepth>;
}

/// PostgreSQL implementation of JobQueueRepo.
pub struct PgJobQueueRepo {
    pool: PgPool,
}

impl PgJobQueueRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueueRepo for PgJobQueueRepo {
    async fn claim(&self, worker_id: &str) -> DbResult<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE job_queue
            SET status = 'processing', attempts = attempts + 1,
                locked_by = $1, locked_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM job_queue
                WHERE status = 'pending' AND attempts < max_attempts
                ORDER BY priority DESC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn complete(&self, job_id: ResourceId, worker_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE job_queue
            SET status = 'completed', locked_by = NULL, locked_at = NULL, updated_at = NOW()
            WHERE id = $1 AND locked_by = $2 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::Conflict(format!("job {job_id} is not locked by {worker_id}")))?;

        // The execution engine normally finishes the run first; this
        // covers callers that complete the job directly.
        sqlx::query(
            r#"
            UPDATE runs
            SET status = 'success',
                end_time = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - start_time)) * 1000)::bigint,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'in_progress')
            "#,
        )
        .bind(job.run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fail(
        &self,
        job_id: ResourceId,
        worker_id: &str,
        message: &str,
    ) -> DbResult<JobStatus> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT * FROM job_queue
            WHERE id = $1 AND locked_by = $2 AND status = 'processing'
            FOR UPDATE
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::Conflict(format!("job {job_id} is not locked by {worker_id}")))?;

        let resulting = if job.attempts < job.max_attempts {
            // Attempts remain: reopen for any worker. The poll interval is
            // the only retry delay.
            sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'pending', locked_by = NULL, locked_at = NULL,
                    error_message = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(message)
            .execute(&mut *tx)
            .await?;
            JobStatus::Pending
        } else {
            sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'failed', locked_by = NULL, locked_at = NULL,
                    error_message = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(message)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE runs
                SET status = 'failed',
                    end_time = NOW(),
                    duration_ms = (EXTRACT(EPOCH FROM (NOW() - start_time)) * 1000)::bigint,
                    error_log = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status IN ('queued', 'in_progress')
                "#,
            )
            .bind(job.run_id)
            .bind(message)
            .execute(&mut *tx)
            .await?;
            JobStatus::Failed
        };

        tx.commit().await?;
        Ok(resulting)
    }

    async fn release_stuck(&self, older_than: Duration) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'pending', locked_by = NULL, locked_at = NULL, updated_at = NOW()
            WHERE status = 'processing'
              AND locked_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;
        let released = result.rows_affected();
        if released > 0 {
            info!(released, "released stuck jobs back to pending");
        }
        Ok(released)
    }

    async fn cleanup_old(&self, retention: Duration) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM job_queue
            WHERE status IN ('completed', 'failed')
              AND updated_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(retention.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, job_id: ResourceId) -> DbResult<JobRecord> {
        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM job_queue WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {job_id}")))?;
        Ok(job)
    }

    async fn for_run(&self, run_id: ResourceId) -> DbResult<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM job_queue WHERE run_id = $1")
            .bind(run_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn depth(&self) -> DbResult<QueueDepth> {
        let depth = sqlx::query_as::<_, QueueDepth>(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE status = 'processing') AS processing
            FROM job_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(depth)
    }
}
