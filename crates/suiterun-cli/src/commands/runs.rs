//! Run inspection commands.

use anyhow::Result;
use sqlx::PgPool;
use suiterun_core::ResourceId;
use suiterun_db::{
    EnvironmentRepo, JobQueueRepo, PgEnvironmentRepo, PgJobQueueRepo, PgRunRepo, RunRecord, RunRepo,
};

pub async fn list(pool: &PgPool, environment: Option<String>, limit: i64) -> Result<()> {
    let repo = PgRunRepo::new(pool.clone());
    let runs = match environment {
        Some(name) => {
            let envs = PgEnvironmentRepo::new(pool.clone());
            let env = envs.get_by_name(&name).await?;
            repo.list_for_environment(ResourceId::from_uuid(env.id), limit)
                .await?
        }
        None => repo.list_recent(limit).await?,
    };

    if runs.is_empty() {
        println!("No runs");
        return Ok(());
    }
    println!(
        "{:<36}  {:<12}  {:<10}  {:<10}  COMMAND",
        "ID", "STATUS", "TRIGGER", "DURATION"
    );
    for run in runs {
        println!(
            "{:<36}  {:<12}  {:<10}  {:<10}  {}",
            run.id,
            run.status,
            run.triggered_by,
            format_duration(&run),
            run.test_command
        );
    }
    Ok(())
}

pub async fn show(pool: &PgPool, id: &str) -> Result<()> {
    let run_id = id.parse::<ResourceId>()?;
    let repo = PgRunRepo::new(pool.clone());
    let run = repo.get(run_id).await?;

    println!("Run {}", run.id);
    println!("  Status:      {}", run.status);
    println!("  Environment: {}", run.environment_id);
    println!("  Trigger:     {}", run.triggered_by);
    println!("  Command:     {}", run.test_command);
    if let Some(start) = run.start_time {
        println!("  Started:     {}", start);
    }
    if let Some(end) = run.end_time {
        println!("  Ended:       {}", end);
    }
    if let Some(ms) = run.duration_ms {
        println!("  Duration:    {}ms", ms);
    }
    if let Some(url) = &run.trace_url {
        println!("  Trace:       {}", url);
    }
    if let Some(log) = &run.error_log {
        println!("  Error:       {}", log);
    }

    let queue = PgJobQueueRepo::new(pool.clone());
    if let Some(job) = queue.for_run(run_id).await? {
        println!(
            "  Job:         {} ({}, attempt {}/{})",
            job.id, job.status, job.attempts, job.max_attempts
        );
    }
    Ok(())
}

pub async fn cancel(pool: &PgPool, id: &str) -> Result<()> {
    let repo = PgRunRepo::new(pool.clone());
    let run = repo.cancel(id.parse::<ResourceId>()?).await?;
    println!("Cancelled run {}", run.id);
    Ok(())
}

fn format_duration(run: &RunRecord) -> String {
    match run.duration_ms {
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        None => "-".to_string(),
    }
}
