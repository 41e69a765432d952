//! Cron schedule repository.
//!
//! Schedules are purely declarative; the cron scheduler mirrors the
//! enabled set into its in-memory registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use suiterun_core::ResourceId;

use crate::{DbError, DbResult};

/// A schedule record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleRecord {
    pub id: uuid::Uuid,
    pub name: String,
    pub cron_expression: String,
    pub environment_id: uuid::Uuid,
    pub enabled: bool,
    pub test_command: String,
    pub custom_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScheduleRepo: Send + Sync {
    async fn create(
        &self,
        name: &str,
        cron_expression: &str,
        environment_id: ResourceId,
        test_command: &str,
        custom_config: serde_json::Value,
    ) -> DbResult<ScheduleRecord>;
    async fn get(&self, id: ResourceId) -> DbResult<ScheduleRecord>;
    async fn list(&self) -> DbResult<Vec<ScheduleRecord>>;
    async fn list_enabled(&self) -> DbResult<Vec<ScheduleRecord>>;
    async fn set_enabled(&self, id: ResourceId, enabled: bool) -> DbResult<ScheduleRecord>;
    async fn delete(&self, id: ResourceId) -> DbResult<()>;
}

/// PostgreSQL implementation of ScheduleRepo.
pub struct PgScheduleRepo {
    pool: PgPool,
}

impl PgScheduleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepo for PgScheduleRepo {
    async fn create(
        &self,
        name: &str,
        cron_expression: &str,
        environment_id: ResourceId,
        test_command: &str,
        custom_config: serde_json::Value,
    ) -> DbResult<ScheduleRecord> {
        let record = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            INSERT INTO schedules (id, name, cron_expression, environment_id, enabled,
                                   test_command, custom_config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(name)
        .bind(cron_expression)
        .bind(environment_id.as_uuid())
        .bind(test_command)
        .bind(custom_config)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get(&self, id: ResourceId) -> DbResult<ScheduleRecord> {
        let record = sqlx::query_as::<_, ScheduleRecord>("SELECT * FROM schedules WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        Ok(record)
    }

    async fn list(&self) -> DbResult<Vec<ScheduleRecord>> {
        let records = sqlx::query_as::<_, ScheduleRecord>("SELECT * FROM schedules ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list_enabled(&self) -> DbResult<Vec<ScheduleRecord>> {
        let records = sqlx::query_as::<_, ScheduleRecord>(
            "SELECT * FROM schedules WHERE enabled = TRUE ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn set_enabled(&self, id: ResourceId, enabled: bool) -> DbResult<ScheduleRecord> {
        let record = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            UPDATE schedules SET enabled = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(enabled)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        Ok(record)
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }
}
