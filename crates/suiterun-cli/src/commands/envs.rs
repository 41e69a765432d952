//! Environment commands.

use anyhow::Result;
use sqlx::PgPool;
use suiterun_core::ResourceId;
use suiterun_db::{EnvironmentRepo, PgEnvironmentRepo};

pub async fn add(pool: &PgPool, name: &str, base_url: &str, limit: i32) -> Result<()> {
    let repo = PgEnvironmentRepo::new(pool.clone());
    let env = repo.create(name, base_url, limit).await?;
    println!("Created environment {} ({})", env.name, env.id);
    Ok(())
}

pub async fn list(pool: &PgPool) -> Result<()> {
    let repo = PgEnvironmentRepo::new(pool.clone());
    let envs = repo.list().await?;
    if envs.is_empty() {
        println!("No environments");
        return Ok(());
    }
    println!("{:<36}  {:<24}  {:<6}  URL", "ID", "NAME", "LIMIT");
    for env in envs {
        println!(
            "{:<36}  {:<24}  {:<6}  {}",
            env.id, env.name, env.concurrency_limit, env.base_url
        );
    }
    Ok(())
}

pub async fn set_limit(pool: &PgPool, name: &str, limit: i32) -> Result<()> {
    let repo = PgEnvironmentRepo::new(pool.clone());
    let env = repo.get_by_name(name).await?;
    repo.update_limit(ResourceId::from_uuid(env.id), limit).await?;
    println!("Set {} concurrency limit to {}", env.name, limit);
    Ok(())
}
