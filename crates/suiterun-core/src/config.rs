//! Runtime configuration knobs.
//!
//! All knobs are plain structs with sane defaults; the CLI overrides
//! them from flags and environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Identifier recorded as `locked_by` on claimed jobs.
    pub worker_id: String,
    /// How often the poll loop ticks.
    pub poll_interval: Duration,
    /// Executions a single worker may have in flight at once.
    pub max_concurrent_jobs: usize,
    /// Hard wall-clock limit per test-suite process.
    pub execution_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            poll_interval: Duration::from_secs(5),
            max_concurrent_jobs: 3,
            execution_timeout: Duration::from_secs(600),
        }
    }
}

/// Configuration for the maintenance sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Processing jobs locked longer than this are presumed abandoned.
    pub stuck_job_timeout: Duration,
    /// Completed/failed jobs older than this are deleted.
    pub retention_window: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stuck_job_timeout: Duration::from_secs(30 * 60),
            retention_window: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Hostname-pid identifier so two workers on one host stay distinct.
pub fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}
