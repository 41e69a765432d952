//! Per-environment admission checks.
//!
//! An environment's `concurrency_limit` caps how many runs may be
//! queued or in progress against it at once. The worker dispatch path
//! does not consult this; enforcement happens at creation time when the
//! caller asks for it.

use std::sync::Arc;
use std::time::Duration;

use suiterun_core::{Error, ResourceId, Result};
use suiterun_db::{EnvironmentRepo, EnvironmentUsage, RunRepo};
use tracing::debug;

pub struct RateLimiter {
    runs: Arc<dyn RunRepo>,
    environments: Arc<dyn EnvironmentRepo>,
}

impl RateLimiter {
    pub fn new(runs: Arc<dyn RunRepo>, environments: Arc<dyn EnvironmentRepo>) -> Self {
        Self { runs, environments }
    }

    /// Whether the environment has a free slot right now.
    pub async fn can_admit(&self, environment_id: ResourceId) -> Result<bool> {
        let environment = self.environments.get(environment_id).await?;
        let active = self.runs.count_active(environment_id).await?;
        Ok(active < environment.concurrency_limit as i64)
    }

    /// Error with `RateLimited` if the environment is already at its
    /// concurrency limit.
    pub async fn enforce(&self, environment_id: ResourceId) -> Result<()> {
        let environment = self.environments.get(environment_id).await?;
        let active = self.runs.count_active(environment_id).await?;
        if active >= environment.concurrency_limit as i64 {
            return Err(Error::RateLimited {
                environment: environment.name,
                active,
                limit: environment.concurrency_limit,
            });
        }
        Ok(())
    }

    /// Poll until a slot frees up, at most `max_wait`. Returns whether a
    /// slot was observed free.
    pub async fn wait_for_slot(
        &self,
        environment_id: ResourceId,
        max_wait: Duration,
        poll_every: Duration,
    ) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if self.can_admit(environment_id).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() + poll_every > deadline {
                debug!(environment_id = %environment_id, "gave up waiting for a free slot");
                return Ok(false);
            }
            tokio::time::sleep(poll_every).await;
        }
    }

    /// Active-vs-limit usage for every environment.
    pub async fn report(&self) -> Result<Vec<EnvironmentUsage>> {
        Ok(self.runs.active_counts().await?)
    }
}
