//! Worker that polls the queue and dispatches executions.

use std::sync::Arc;

use suiterun_core::config::WorkerConfig;
use suiterun_db::JobQueueRepo;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::processor::JobProcessor;

/// A polling worker.
///
/// Each tick reaps finished executions, and claims at most one job if a
/// slot is free. Claimed jobs are dispatched fire-and-forget into a
/// `JoinSet`, so a worker keeps up to `max_concurrent_jobs` executions
/// in flight while the loop keeps ticking.
pub struct Worker {
    config: WorkerConfig,
    queue: Arc<dyn JobQueueRepo>,
    processor: Arc<JobProcessor>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueueRepo>,
        processor: Arc<JobProcessor>,
    ) -> Self {
        Self {
            config,
            queue,
            processor,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the poll loop until `shutdown` flips to true, then drain
    /// in-flight executions.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker_id = %self.config.worker_id,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            poll_interval = ?self.config.poll_interval,
            "starting worker"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&mut in_flight).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            worker_id = %self.config.worker_id,
            in_flight = in_flight.len(),
            "shutting down, draining in-flight executions"
        );
        while in_flight.join_next().await.is_some() {}
    }

    async fn tick(&self, in_flight: &mut JoinSet<()>) {
        while in_flight.try_join_next().is_some() {}

        if in_flight.len() >= self.config.max_concurrent_jobs {
            return;
        }

        // One claim per tick; an error here is left for the next tick.
        match self.queue.claim(&self.config.worker_id).await {
            Ok(Some(job)) => {
                info!(
                    worker_id = %self.config.worker_id,
                    job_id = %job.id,
                    run_id = %job.run_id,
                    attempt = job.attempts,
                    "claimed job"
                );
                let processor = self.processor.clone();
                let worker_id = self.config.worker_id.clone();
                in_flight.spawn(async move {
                    processor.process(job, &worker_id).await;
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(worker_id = %self.config.worker_id, error = %e, "failed to claim job");
            }
        }
    }
}
