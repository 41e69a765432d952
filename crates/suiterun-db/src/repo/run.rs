//! Run registry repository.
//!
//! Runs and their queue entries are created together in one transaction;
//! every trigger (manual, API, webhook, cron) funnels through
//! [`RunRepo::create_with_job`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use suiterun_core::job::DEFAULT_PRIORITY;
use suiterun_core::{NewRun, ResourceId, RunStatus};

use crate::{DbError, DbResult};

/// A run record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunRecord {
    pub id: uuid::Uuid,
    pub environment_id: uuid::Uuid,
    pub schedule_id: Option<uuid::Uuid>,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_log: Option<String>,
    pub trace_url: Option<String>,
    pub custom_config: serde_json::Value,
    pub test_command: String,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-environment active-run usage, for admission reporting.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvironmentUsage {
    pub environment_id: uuid::Uuid,
    pub name: String,
    pub concurrency_limit: i32,
    pub active: i64,
}

#[async_trait]
pub trait RunRepo: Send + Sync {
    /// Create a run (status=queued) and its queue entry (status=pending)
    /// atomically. This is the single creation path for all triggers.
    async fn create_with_job(&self, new_run: NewRun) -> DbResult<RunRecord>;

    async fn get(&self, id: ResourceId) -> DbResult<RunRecord>;
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<RunRecord>>;
    async fn list_for_environment(
        &self,
        environment_id: ResourceId,
        limit: i64,
    ) -> DbResult<Vec<RunRecord>>;

    /// Transition a run into in_progress, stamping start_time. A run being
    /// retried re-enters from failed/error; its previous outcome fields
    /// are cleared.
    async fn mark_in_progress(&self, id: ResourceId) -> DbResult<RunRecord>;

    /// Terminal transition: success, failed or error, stamping end_time
    /// and duration computed from start_time.
    async fn finish(
        &self,
        id: ResourceId,
        status: RunStatus,
        error_log: Option<&str>,
        trace_url: Option<&str>,
    ) -> DbResult<RunRecord>;

    /// Cancel a queued run. Rejected with a conflict for any other state.
    async fn cancel(&self, id: ResourceId) -> DbResult<RunRecord>;

    /// Number of runs currently queued or in progress for an environment.
    async fn count_active(&self, environment_id: ResourceId) -> DbResult<i64>;

    /// Active counts across all environments, with their limits.
    async fn active_counts(&self) -> DbResult<Vec<EnvironmentUsage>>;
}

/// PostgreSQL implementation of RunRepo.
pub struct PgRunRepo {
    pool: PgPool,
}

impl PgRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepo for PgRunRepo {
    async fn create_with_job(&self, new_run: NewRun) -> DbResult<RunRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            INSERT INTO runs (id, environment_id, schedule_id, status, custom_config,
                              test_command, triggered_by, created_at, updated_at)
            VALUES ($1, $2, $3, 'queued', $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(new_run.environment_id.as_uuid())
        .bind(new_run.schedule_id.as_ref().map(|id| *id.as_uuid()))
        .bind(&new_run.custom_config)
        .bind(&new_run.test_command)
        .bind(new_run.triggered_by.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO job_queue (id, run_id, status, priority, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, NOW(), NOW())
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(record.id)
        .bind(new_run.priority.unwrap_or(DEFAULT_PRIORITY))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get(&self, id: ResourceId) -> DbResult<RunRecord> {
        let record = sqlx::query_as::<_, RunRecord>("SELECT * FROM runs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("run {id}")))?;
        Ok(record)
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<RunRecord>> {
        let records =
            sqlx::query_as::<_, RunRecord>("SELECT * FROM runs ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    async fn list_for_environment(
        &self,
        environment_id: ResourceId,
        limit: i64,
    ) -> DbResult<Vec<RunRecord>> {
        let records = sqlx::query_as::<_, RunRecord>(
            "SELECT * FROM runs WHERE environment_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(environment_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn mark_in_progress(&self, id: ResourceId) -> DbResult<RunRecord> {
        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs
            SET status = 'in_progress', start_time = NOW(), end_time = NULL,
                duration_ms = NULL, error_log = NULL, trace_url = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'failed', 'error')
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::Conflict(format!("run {id} cannot start")))?;
        Ok(record)
    }

    async fn finish(
        &self,
        id: ResourceId,
        status: RunStatus,
        error_log: Option<&str>,
        trace_url: Option<&str>,
    ) -> DbResult<RunRecord> {
        if !status.is_terminal() || status == RunStatus::Cancelled {
            return Err(DbError::Conflict(format!(
                "run {id} cannot finish with status {status}"
            )));
        }
        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs
            SET status = $2,
                end_time = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - start_time)) * 1000)::bigint,
                error_log = $3,
                trace_url = COALESCE($4, trace_url),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(error_log)
        .bind(trace_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::Conflict(format!("run {id} is not active")))?;
        Ok(record)
    }

    async fn cancel(&self, id: ResourceId) -> DbResult<RunRecord> {
        let mut tx = self.pool.begin().await?;
        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        match record {
            Some(record) => {
                // The queue entry must go with the run, or a worker
                // would claim a cancelled run.
                sqlx::query("DELETE FROM job_queue WHERE run_id = $1 AND status = 'pending'")
                    .bind(record.id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(record)
            }
            // Distinguish "no such run" from "not cancellable".
            None => {
                let existing = self.get(id).await?;
                Err(DbError::Conflict(format!(
                    "run {id} is {} and can no longer be cancelled",
                    existing.status
                )))
            }
        }
    }

    async fn count_active(&self, environment_id: ResourceId) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM runs
            WHERE environment_id = $1 AND status IN ('queued', 'in_progress')
            "#,
        )
        .bind(environment_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn active_counts(&self) -> DbResult<Vec<EnvironmentUsage>> {
        let usages = sqlx::query_as::<_, EnvironmentUsage>(
            r#"
            SELECT e.id AS environment_id, e.name, e.concurrency_limit,
                   COUNT(r.id) FILTER (WHERE r.status IN ('queued', 'in_progress')) AS active
            FROM environments e
            LEFT JOIN runs r ON r.environment_id = e.id
            GROUP BY e.id, e.name, e.concurrency_limit
            ORDER BY e.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(usages)
    }
}
