//! Cron-driven run creation.
//!
//! Enabled schedules are mirrored into an in-memory registry of live
//! timer tasks. The registry is a cache over the schedules table, never
//! authoritative: `load`/`reload` reconcile it from the database. Each
//! firing creates a run through the same creation path as on-demand
//! triggers; the scheduler never touches the job queue directly.

use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use suiterun_core::{Error, NewRun, ResourceId, Result, TriggerKind};
use suiterun_db::{RunRepo, ScheduleRecord, ScheduleRepo};

/// Parse a cron expression, accepting the common five-field form by
/// assuming second zero.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| Error::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

pub struct CronScheduler {
    schedules: Arc<dyn ScheduleRepo>,
    runs: Arc<dyn RunRepo>,
    entries: Mutex<HashMap<uuid::Uuid, JoinHandle<()>>>,
}

impl CronScheduler {
    pub fn new(schedules: Arc<dyn ScheduleRepo>, runs: Arc<dyn RunRepo>) -> Self {
        Self {
            schedules,
            runs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register every enabled schedule, replacing the current registry.
    /// Invalid cron expressions are skipped with a warning so one bad
    /// row cannot take the scheduler down. Returns how many registered.
    ///
    /// The current registry is kept intact if the database read fails.
    pub async fn load(&self) -> Result<usize> {
        let enabled = self.schedules.list_enabled().await?;
        self.shutdown();
        let mut registered = 0;
        for schedule in enabled {
            match self.add(schedule.clone()) {
                Ok(()) => registered += 1,
                Err(e) => {
                    warn!(schedule = %schedule.name, error = %e, "skipping schedule");
                }
            }
        }
        info!(registered, "cron schedules loaded");
        Ok(registered)
    }

    /// Reconcile the in-memory registry with the database.
    pub async fn reload(&self) -> Result<usize> {
        self.load().await
    }

    /// Reload the registry every `reload_every` until `shutdown` flips
    /// to true. Reload errors are logged and retried on the next tick;
    /// a transient database outage never takes the daemon down.
    pub async fn run(&self, reload_every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(reload_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the caller just loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "schedule reload failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Register a single schedule without a full reload.
    pub fn add(&self, schedule: ScheduleRecord) -> Result<()> {
        let cron = parse_cron(&schedule.cron_expression)?;
        let id = schedule.id;
        let runs = self.runs.clone();
        let handle = tokio::spawn(fire_loop(schedule, cron, runs));
        if let Some(previous) = self.entries.lock().unwrap().insert(id, handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Deregister a schedule. Runs it already created are unaffected.
    pub fn remove(&self, id: ResourceId) -> bool {
        match self.entries.lock().unwrap().remove(id.as_uuid()) {
            Some(handle) => {
                handle.abort();
                info!(schedule_id = %id, "cron schedule removed");
                true
            }
            None => false,
        }
    }

    pub fn registered(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Abort every live registration.
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock().unwrap();
        for (_, handle) in entries.drain() {
            handle.abort();
        }
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn fire_loop(schedule: ScheduleRecord, cron: cron::Schedule, runs: Arc<dyn RunRepo>) {
    loop {
        let Some(next) = cron.upcoming(Utc).next() else {
            warn!(schedule = %schedule.name, "cron expression has no upcoming fire");
            return;
        };
        let Ok(wait) = (next - Utc::now()).to_std() else {
            // The computed fire slipped into the past; recompute.
            continue;
        };
        tokio::time::sleep(wait).await;

        let new_run = NewRun {
            environment_id: ResourceId::from_uuid(schedule.environment_id),
            schedule_id: Some(ResourceId::from_uuid(schedule.id)),
            test_command: schedule.test_command.clone(),
            custom_config: schedule.custom_config.clone(),
            triggered_by: TriggerKind::Schedule,
            priority: None,
        };
        match runs.create_with_job(new_run).await {
            Ok(run) => {
                info!(schedule = %schedule.name, run_id = %run.id, "schedule fired, run created");
            }
            Err(e) => {
                warn!(schedule = %schedule.name, error = %e, "scheduled run creation failed");
            }
        }
    }
}
