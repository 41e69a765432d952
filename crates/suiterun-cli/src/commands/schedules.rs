//! Schedule commands.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use suiterun_core::ResourceId;
use suiterun_db::{EnvironmentRepo, PgEnvironmentRepo, PgScheduleRepo, ScheduleRepo};
use suiterun_scheduler::cron::parse_cron;

pub async fn add(
    pool: &PgPool,
    name: &str,
    cron: &str,
    environment: &str,
    command: &str,
    config: &str,
) -> Result<()> {
    // Reject bad expressions here rather than at fire time.
    parse_cron(cron)?;
    let custom_config: serde_json::Value =
        serde_json::from_str(config).context("--config must be valid JSON")?;
    if !custom_config.is_object() {
        bail!("--config must be a JSON object");
    }

    let envs = PgEnvironmentRepo::new(pool.clone());
    let env = envs.get_by_name(environment).await?;

    let repo = PgScheduleRepo::new(pool.clone());
    let schedule = repo
        .create(
            name,
            cron,
            ResourceId::from_uuid(env.id),
            command,
            custom_config,
        )
        .await?;
    println!("Created schedule {} ({})", schedule.name, schedule.id);
    Ok(())
}

pub async fn list(pool: &PgPool) -> Result<()> {
    let repo = PgScheduleRepo::new(pool.clone());
    let schedules = repo.list().await?;
    if schedules.is_empty() {
        println!("No schedules");
        return Ok(());
    }
    println!(
        "{:<36}  {:<24}  {:<16}  {:<8}  COMMAND",
        "ID", "NAME", "CRON", "ENABLED"
    );
    for s in schedules {
        println!(
            "{:<36}  {:<24}  {:<16}  {:<8}  {}",
            s.id, s.name, s.cron_expression, s.enabled, s.test_command
        );
    }
    Ok(())
}

pub async fn set_enabled(pool: &PgPool, id: &str, enabled: bool) -> Result<()> {
    let repo = PgScheduleRepo::new(pool.clone());
    let schedule = repo.set_enabled(id.parse::<ResourceId>()?, enabled).await?;
    println!(
        "Schedule {} is now {}",
        schedule.name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn remove(pool: &PgPool, id: &str) -> Result<()> {
    let repo = PgScheduleRepo::new(pool.clone());
    repo.delete(id.parse::<ResourceId>()?).await?;
    println!("Deleted schedule {}", id);
    Ok(())
}
