//! Long-running worker and scheduler processes.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use suiterun_core::config::{WorkerConfig, default_worker_id};
use suiterun_db::{PgEnvironmentRepo, PgJobQueueRepo, PgRunRepo, PgScheduleRepo};
use suiterun_executor::{LocalArtifactStore, ProcessTestRunner};
use suiterun_scheduler::{CronScheduler, JobProcessor, Worker};
use tokio::sync::watch;
use tracing::info;

pub async fn run(
    pool: &PgPool,
    worker_id: Option<String>,
    poll_interval: u64,
    max_concurrent: usize,
    timeout: u64,
    results_dir: &str,
    artifacts_dir: &str,
) -> Result<()> {
    let config = WorkerConfig {
        worker_id: worker_id.unwrap_or_else(default_worker_id),
        poll_interval: Duration::from_secs(poll_interval),
        max_concurrent_jobs: max_concurrent,
        execution_timeout: Duration::from_secs(timeout),
    };

    let runs = Arc::new(PgRunRepo::new(pool.clone()));
    let environments = Arc::new(PgEnvironmentRepo::new(pool.clone()));
    let queue = Arc::new(PgJobQueueRepo::new(pool.clone()));
    let runner = Arc::new(ProcessTestRunner::new(results_dir));
    let artifacts = Arc::new(LocalArtifactStore::new(artifacts_dir));

    let processor = Arc::new(JobProcessor::new(
        runs,
        environments,
        queue.clone(),
        runner,
        artifacts,
        config.execution_timeout,
    ));
    let worker = Worker::new(config, queue, processor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

pub async fn scheduler(pool: &PgPool, reload_interval: u64) -> Result<()> {
    let schedules = Arc::new(PgScheduleRepo::new(pool.clone()));
    let runs = Arc::new(PgRunRepo::new(pool.clone()));
    let scheduler = CronScheduler::new(schedules, runs);

    let registered = scheduler.load().await?;
    info!(registered, "cron scheduler started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // Periodic reload picks up schedule changes made through the CLI.
    scheduler
        .run(Duration::from_secs(reload_interval), shutdown_rx)
        .await;
    Ok(())
}
