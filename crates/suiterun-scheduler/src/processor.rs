//! Execution engine: drives one claimed job through the run lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use suiterun_core::artifact::{ArtifactKey, ArtifactStore};
use suiterun_core::{ResourceId, Result, RunStatus, TestRunner};
use suiterun_db::{EnvironmentRepo, JobQueueRepo, JobRecord, RunRepo};
use tracing::{error, info, warn};

/// What an execution attempt concluded, before it is folded back into
/// the queue and the run registry.
#[derive(Debug)]
struct Verdict {
    success: bool,
    error: Option<String>,
}

/// Executes claimed jobs: loads the run and its environment, launches
/// the test-suite process, stores any trace artifact, and records the
/// outcome on both the run and the queue entry.
pub struct JobProcessor {
    runs: Arc<dyn RunRepo>,
    environments: Arc<dyn EnvironmentRepo>,
    queue: Arc<dyn JobQueueRepo>,
    runner: Arc<dyn TestRunner>,
    artifacts: Arc<dyn ArtifactStore>,
    execution_timeout: Duration,
}

impl JobProcessor {
    pub fn new(
        runs: Arc<dyn RunRepo>,
        environments: Arc<dyn EnvironmentRepo>,
        queue: Arc<dyn JobQueueRepo>,
        runner: Arc<dyn TestRunner>,
        artifacts: Arc<dyn ArtifactStore>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            runs,
            environments,
            queue,
            runner,
            artifacts,
            execution_timeout,
        }
    }

    /// Process one claimed job to completion.
    ///
    /// This is the error boundary for the whole execution path: nothing
    /// escapes to the poller. Unexpected failures are recorded as an
    /// `error` run status and reported to the queue as a failed attempt.
    pub async fn process(&self, job: JobRecord, worker_id: &str) {
        let run_id = ResourceId::from_uuid(job.run_id);
        info!(job_id = %job.id, run_id = %run_id, attempt = job.attempts, "processing job");

        match self.execute(&job).await {
            Ok(Verdict { success: true, .. }) => {
                if let Err(e) = self.queue.complete(ResourceId::from_uuid(job.id), worker_id).await
                {
                    warn!(job_id = %job.id, error = %e, "failed to mark job complete");
                }
            }
            Ok(Verdict { error, .. }) => {
                let message = error.unwrap_or_else(|| "test suite failed".to_string());
                self.report_failure(&job, worker_id, &message).await;
            }
            Err(e) => {
                // Unexpected failure anywhere in the sequence: surface it
                // on the run as an error, then record the failed attempt.
                error!(job_id = %job.id, run_id = %run_id, error = %e, "job processing error");
                if let Err(finish_err) = self
                    .runs
                    .finish(run_id, RunStatus::Error, Some(&e.to_string()), None)
                    .await
                {
                    warn!(run_id = %run_id, error = %finish_err, "could not record run error");
                }
                self.report_failure(&job, worker_id, &e.to_string()).await;
            }
        }
    }

    async fn report_failure(&self, job: &JobRecord, worker_id: &str, message: &str) {
        match self
            .queue
            .fail(ResourceId::from_uuid(job.id), worker_id, message)
            .await
        {
            Ok(status) => {
                info!(job_id = %job.id, resulting_status = %status, "recorded failed attempt");
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "failed to record job failure");
            }
        }
    }

    /// Run the test suite for a claimed job. Any `Err` here means the
    /// engine itself broke, not that the suite failed.
    async fn execute(&self, job: &JobRecord) -> Result<Verdict> {
        let run_id = ResourceId::from_uuid(job.run_id);
        let run = self.runs.get(run_id).await?;
        let environment = self
            .environments
            .get(ResourceId::from_uuid(run.environment_id))
            .await?;

        let run = self.runs.mark_in_progress(run_id).await?;

        let mut env = flatten_custom_config(&run.custom_config);
        env.insert("RUN_ID".to_string(), run.id.to_string());
        env.insert("ENVIRONMENT_ID".to_string(), environment.id.to_string());
        env.insert("ENVIRONMENT_NAME".to_string(), environment.name.clone());
        env.insert("BASE_URL".to_string(), environment.base_url.clone());

        info!(
            run_id = %run_id,
            environment = %environment.name,
            command = %run.test_command,
            "starting test suite"
        );
        let outcome = self
            .runner
            .run(&run.test_command, env, self.execution_timeout)
            .await?;

        let trace_url = match &outcome.trace_path {
            Some(path) => {
                let url = self
                    .artifacts
                    .store(path, &ArtifactKey::trace(run_id))
                    .await?;
                info!(run_id = %run_id, url = %url, "stored trace artifact");
                Some(url)
            }
            None => None,
        };

        // Success is decided purely by the process exit code.
        if outcome.succeeded() {
            let finished = self
                .runs
                .finish(run_id, RunStatus::Success, None, trace_url.as_deref())
                .await?;
            info!(run_id = %run_id, duration_ms = ?finished.duration_ms, "run succeeded");
            Ok(Verdict {
                success: true,
                error: None,
            })
        } else {
            let message = if outcome.stderr.trim().is_empty() {
                format!("test suite exited with code {:?}", outcome.exit_code)
            } else {
                outcome.stderr.trim().to_string()
            };
            self.runs
                .finish(run_id, RunStatus::Failed, Some(&message), trace_url.as_deref())
                .await?;
            info!(run_id = %run_id, exit_code = ?outcome.exit_code, "run failed");
            Ok(Verdict {
                success: false,
                error: Some(message),
            })
        }
    }
}

/// Flatten a run's custom configuration into environment variables.
/// String values pass through untouched; anything else is JSON text.
fn flatten_custom_config(config: &serde_json::Value) -> HashMap<String, String> {
    let mut env = HashMap::new();
    if let Some(map) = config.as_object() {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env.insert(key.clone(), rendered);
        }
    }
    env
}
