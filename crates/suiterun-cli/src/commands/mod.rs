//! CLI command implementations.

pub mod envs;
pub mod runs;
pub mod schedules;
pub mod worker;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use suiterun_core::config::MaintenanceConfig;
use suiterun_core::{NewRun, ResourceId};
use suiterun_db::{EnvironmentRepo, JobQueueRepo, PgEnvironmentRepo, PgJobQueueRepo, PgRunRepo, RunRepo};
use suiterun_scheduler::RateLimiter;
use tracing::info;

pub async fn migrate(pool: &PgPool) -> Result<()> {
    suiterun_db::run_migrations(pool).await?;
    println!("Migrations applied");
    Ok(())
}

pub async fn trigger(
    pool: &PgPool,
    environment: &str,
    command: &str,
    config: &str,
    priority: Option<i32>,
    no_gate: bool,
) -> Result<()> {
    let custom_config: serde_json::Value =
        serde_json::from_str(config).context("--config must be valid JSON")?;
    if !custom_config.is_object() {
        bail!("--config must be a JSON object");
    }

    let environments = Arc::new(PgEnvironmentRepo::new(pool.clone()));
    let runs = Arc::new(PgRunRepo::new(pool.clone()));
    let env = environments.get_by_name(environment).await?;
    let environment_id = ResourceId::from_uuid(env.id);

    if !no_gate {
        let limiter = RateLimiter::new(runs.clone(), environments.clone());
        limiter.enforce(environment_id).await?;
    }

    let mut new_run = NewRun::new(environment_id, command);
    new_run.custom_config = custom_config;
    new_run.priority = priority;
    let run = runs.create_with_job(new_run).await?;

    info!(run_id = %run.id, environment = env.name, "run enqueued");
    println!("Enqueued run {} against {}", run.id, env.name);
    Ok(())
}

pub async fn status(pool: &PgPool) -> Result<()> {
    let environments = Arc::new(PgEnvironmentRepo::new(pool.clone()));
    let runs = Arc::new(PgRunRepo::new(pool.clone()));
    let queue = PgJobQueueRepo::new(pool.clone());

    let limiter = RateLimiter::new(runs, environments);
    println!("Environments:");
    for usage in limiter.report().await? {
        println!(
            "  {:<24} {}/{} active",
            usage.name, usage.active, usage.concurrency_limit
        );
    }

    let depth = queue.depth().await?;
    println!(
        "Queue: {} pending, {} processing",
        depth.pending, depth.processing
    );
    Ok(())
}

pub async fn sweep(
    pool: &PgPool,
    stuck_after_mins: u64,
    retention_days: u64,
    interval: Option<u64>,
) -> Result<()> {
    let queue = PgJobQueueRepo::new(pool.clone());
    let config = MaintenanceConfig {
        stuck_job_timeout: Duration::from_secs(stuck_after_mins * 60),
        retention_window: Duration::from_secs(retention_days * 24 * 60 * 60),
    };

    loop {
        let released = queue.release_stuck(config.stuck_job_timeout).await?;
        let purged = queue.cleanup_old(config.retention_window).await?;
        println!("Released {} stuck jobs, purged {} old jobs", released, purged);

        match interval {
            Some(secs) => tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => break,
            },
            None => break,
        }
    }
    Ok(())
}
