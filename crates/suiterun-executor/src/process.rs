//! Local process test runner.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use suiterun_core::runner::{TestOutcome, TestRunner};
use suiterun_core::{Error, Result};

/// Runs the test command as a local shell process.
///
/// The command runs under `sh -c` with the engine-provided environment
/// plus `TRACE_DIR`, a per-run directory where the suite may drop a
/// `trace.zip`. The timeout is a hard wall clock: when it expires the
/// process is force-killed and the attempt reports a timeout error.
pub struct ProcessTestRunner {
    results_dir: PathBuf,
}

impl ProcessTestRunner {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    fn trace_dir(&self, env: &HashMap<String, String>) -> PathBuf {
        match env.get("RUN_ID") {
            Some(run_id) => self.results_dir.join(run_id),
            None => self.results_dir.clone(),
        }
    }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
    async fn run(
        &self,
        command: &str,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<TestOutcome> {
        let trace_dir = self.trace_dir(&env);
        tokio::fs::create_dir_all(&trace_dir).await?;

        debug!(command, trace_dir = %trace_dir.display(), "spawning test process");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(&env)
            .env("TRACE_DIR", &trace_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the process
            // down with it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExecutionFailed(format!("failed to spawn test process: {e}")))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| Error::ExecutionFailed(format!("test process failed: {e}")))?,
            Err(_) => {
                warn!(command, timeout_secs = timeout.as_secs(), "test process timed out");
                return Err(Error::Timeout(timeout.as_secs()));
            }
        };

        let trace_path = trace_dir.join("trace.zip");
        let trace_path = trace_path.exists().then_some(trace_path);

        Ok(TestOutcome {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            trace_path,
        })
    }
}
