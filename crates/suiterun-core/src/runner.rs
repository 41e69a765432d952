//! Test-process collaborator trait.
//!
//! Runners launch the actual test-suite process for a run. The engine
//! hands over a command string, a flattened environment map, and a hard
//! wall-clock timeout; the runner reports how the process ended.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Outcome of one test-suite process invocation.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Process exit code. Zero means the suite passed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Trace artifact the suite produced, if any.
    pub trace_path: Option<PathBuf>,
}

impl TestOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for test-suite process backends.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run `command` with the given environment variables, enforcing the
    /// timeout by force-killing the process.
    async fn run(
        &self,
        command: &str,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<TestOutcome>;
}
