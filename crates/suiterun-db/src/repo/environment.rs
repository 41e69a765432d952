//! Target environment repository.
//!
//! Environments are read-only to the engine; the CLI is their producer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use suiterun_core::ResourceId;

use crate::{DbError, DbResult};

/// A target environment record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvironmentRecord {
    pub id: uuid::Uuid,
    pub name: String,
    pub base_url: String,
    pub concurrency_limit: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait EnvironmentRepo: Send + Sync {
    async fn create(
        &self,
        name: &str,
        base_url: &str,
        concurrency_limit: i32,
    ) -> DbResult<EnvironmentRecord>;
    async fn get(&self, id: ResourceId) -> DbResult<EnvironmentRecord>;
    async fn get_by_name(&self, name: &str) -> DbResult<EnvironmentRecord>;
    async fn list(&self) -> DbResult<Vec<EnvironmentRecord>>;
    async fn update_limit(&self, id: ResourceId, concurrency_limit: i32) -> DbResult<()>;
}

/// PostgreSQL implementation of EnvironmentRepo.
pub struct PgEnvironmentRepo {
    pool: PgPool,
}

impl PgEnvironmentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnvironmentRepo for PgEnvironmentRepo {
    async fn create(
        &self,
        name: &str,
        base_url: &str,
        concurrency_limit: i32,
    ) -> DbResult<EnvironmentRecord> {
        let record = sqlx::query_as::<_, EnvironmentRecord>(
            r#"
            INSERT INTO environments (id, name, base_url, concurrency_limit, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(name)
        .bind(base_url)
        .bind(concurrency_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("environment {name}"))
            }
            _ => DbError::Database(e),
        })?;
        Ok(record)
    }

    async fn get(&self, id: ResourceId) -> DbResult<EnvironmentRecord> {
        let record =
            sqlx::query_as::<_, EnvironmentRecord>("SELECT * FROM environments WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("environment {id}")))?;
        Ok(record)
    }

    async fn get_by_name(&self, name: &str) -> DbResult<EnvironmentRecord> {
        let record =
            sqlx::query_as::<_, EnvironmentRecord>("SELECT * FROM environments WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("environment {name}")))?;
        Ok(record)
    }

    async fn list(&self) -> DbResult<Vec<EnvironmentRecord>> {
        let records =
            sqlx::query_as::<_, EnvironmentRecord>("SELECT * FROM environments ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    async fn update_limit(&self, id: ResourceId, concurrency_limit: i32) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE environments SET concurrency_limit = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(concurrency_limit)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("environment {id}")));
        }
        Ok(())
    }
}
