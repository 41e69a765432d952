//! In-memory fakes for the repository and collaborator traits.
//!
//! The store mirrors the PostgreSQL semantics the dispatch layer relies
//! on: claim eligibility and ordering, lock ownership guards, attempt
//! bookkeeping, and the run/job status coupling.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use suiterun_core::artifact::{ArtifactKey, ArtifactStore};
use suiterun_core::job::DEFAULT_MAX_ATTEMPTS;
use suiterun_core::runner::{TestOutcome, TestRunner};
use suiterun_core::{JobStatus, NewRun, ResourceId, Result, RunStatus};
use suiterun_db::{
    DbError, DbResult, EnvironmentRecord, EnvironmentRepo, EnvironmentUsage, JobQueueRepo,
    JobRecord, QueueDepth, RunRecord, RunRepo, ScheduleRecord, ScheduleRepo,
};

#[derive(Default)]
struct State {
    environments: Vec<EnvironmentRecord>,
    runs: Vec<RunRecord>,
    jobs: Vec<JobRecord>,
    schedules: Vec<ScheduleRecord>,
    artifacts: Vec<(PathBuf, String)>,
}

/// One fake implementing every repository trait plus artifact storage.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_claims: AtomicBool,
    fail_schedule_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn shared() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn add_environment(&self, name: &str, base_url: &str, limit: i32) -> ResourceId {
        let id = ResourceId::new();
        let now = Utc::now();
        self.state.lock().unwrap().environments.push(EnvironmentRecord {
            id: *id.as_uuid(),
            name: name.to_string(),
            base_url: base_url.to_string(),
            concurrency_limit: limit,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn add_schedule(
        &self,
        name: &str,
        cron_expression: &str,
        environment_id: ResourceId,
    ) -> ScheduleRecord {
        let now = Utc::now();
        let record = ScheduleRecord {
            id: uuid::Uuid::now_v7(),
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            environment_id: *environment_id.as_uuid(),
            enabled: true,
            test_command: "npx playwright test".to_string(),
            custom_config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().schedules.push(record.clone());
        record
    }

    pub fn set_max_attempts(&self, run_id: ResourceId, max_attempts: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.run_id == *run_id.as_uuid()) {
            job.max_attempts = max_attempts;
        }
    }

    /// Backdate the lock on a processing job, as a crashed worker would
    /// leave it.
    pub fn age_lock(&self, run_id: ResourceId, age: Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.run_id == *run_id.as_uuid()) {
            job.locked_at = Some(Utc::now() - chrono::Duration::from_std(age).unwrap());
        }
    }

    pub fn inject_claim_failures(&self, enabled: bool) {
        self.fail_claims.store(enabled, Ordering::SeqCst);
    }

    pub fn inject_schedule_read_failures(&self, enabled: bool) {
        self.fail_schedule_reads.store(enabled, Ordering::SeqCst);
    }

    pub fn stored_artifacts(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().unwrap().artifacts.clone()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().runs.len()
    }

    /// Inherent lookup so tests need not disambiguate the repo traits'
    /// `get` methods.
    pub fn get_run(&self, id: ResourceId) -> RunRecord {
        self.state
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == *id.as_uuid())
            .cloned()
            .expect("run exists")
    }

    pub fn runs_with_status(&self, status: RunStatus) -> usize {
        self.state
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.status == status.as_str())
            .count()
    }
}

#[async_trait]
impl EnvironmentRepo for InMemoryStore {
    async fn create(
        &self,
        name: &str,
        base_url: &str,
        concurrency_limit: i32,
    ) -> DbResult<EnvironmentRecord> {
        let id = self.add_environment(name, base_url, concurrency_limit);
        EnvironmentRepo::get(self, id).await
    }

    async fn get(&self, id: ResourceId) -> DbResult<EnvironmentRecord> {
        self.state
            .lock()
            .unwrap()
            .environments
            .iter()
            .find(|e| e.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("environment {id}")))
    }

    async fn get_by_name(&self, name: &str) -> DbResult<EnvironmentRecord> {
        self.state
            .lock()
            .unwrap()
            .environments
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("environment {name}")))
    }

    async fn list(&self) -> DbResult<Vec<EnvironmentRecord>> {
        Ok(self.state.lock().unwrap().environments.clone())
    }

    async fn update_limit(&self, id: ResourceId, concurrency_limit: i32) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let env = state
            .environments
            .iter_mut()
            .find(|e| e.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("environment {id}")))?;
        env.concurrency_limit = concurrency_limit;
        Ok(())
    }
}

#[async_trait]
impl RunRepo for InMemoryStore {
    async fn create_with_job(&self, new_run: NewRun) -> DbResult<RunRecord> {
        let now = Utc::now();
        let record = RunRecord {
            id: uuid::Uuid::now_v7(),
            environment_id: *new_run.environment_id.as_uuid(),
            schedule_id: new_run.schedule_id.map(|id| *id.as_uuid()),
            status: RunStatus::Queued.as_str().to_string(),
            start_time: None,
            end_time: None,
            duration_ms: None,
            error_log: None,
            trace_url: None,
            custom_config: new_run.custom_config.clone(),
            test_command: new_run.test_command.clone(),
            triggered_by: new_run.triggered_by.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        let job = JobRecord {
            id: uuid::Uuid::now_v7(),
            run_id: record.id,
            status: JobStatus::Pending.as_str().to_string(),
            priority: new_run.priority.unwrap_or(0),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            locked_at: None,
            locked_by: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().unwrap();
        state.runs.push(record.clone());
        state.jobs.push(job);
        Ok(record)
    }

    async fn get(&self, id: ResourceId) -> DbResult<RunRecord> {
        self.state
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("run {id}")))
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<RunRecord>> {
        let state = self.state.lock().unwrap();
        let mut runs = state.runs.clone();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_for_environment(
        &self,
        environment_id: ResourceId,
        limit: i64,
    ) -> DbResult<Vec<RunRecord>> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<_> = state
            .runs
            .iter()
            .filter(|r| r.environment_id == *environment_id.as_uuid())
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn mark_in_progress(&self, id: ResourceId) -> DbResult<RunRecord> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == *id.as_uuid())
            .ok_or_else(|| DbError::Conflict(format!("run {id} cannot start")))?;
        if !matches!(run.status.as_str(), "queued" | "failed" | "error") {
            return Err(DbError::Conflict(format!("run {id} cannot start")));
        }
        run.status = RunStatus::InProgress.as_str().to_string();
        run.start_time = Some(Utc::now());
        run.end_time = None;
        run.duration_ms = None;
        run.error_log = None;
        run.trace_url = None;
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    async fn finish(
        &self,
        id: ResourceId,
        status: RunStatus,
        error_log: Option<&str>,
        trace_url: Option<&str>,
    ) -> DbResult<RunRecord> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("run {id}")))?;
        if !matches!(run.status.as_str(), "queued" | "in_progress") {
            return Err(DbError::Conflict(format!("run {id} is not active")));
        }
        let now = Utc::now();
        run.status = status.as_str().to_string();
        run.end_time = Some(now);
        run.duration_ms = run.start_time.map(|s| (now - s).num_milliseconds());
        run.error_log = error_log.map(str::to_string);
        if trace_url.is_some() {
            run.trace_url = trace_url.map(str::to_string);
        }
        run.updated_at = now;
        Ok(run.clone())
    }

    async fn cancel(&self, id: ResourceId) -> DbResult<RunRecord> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("run {id}")))?;
        if run.status != "queued" {
            return Err(DbError::Conflict(format!(
                "run {id} is {} and can no longer be cancelled",
                run.status
            )));
        }
        run.status = RunStatus::Cancelled.as_str().to_string();
        run.updated_at = Utc::now();
        let cancelled = run.clone();
        state
            .jobs
            .retain(|j| !(j.run_id == *id.as_uuid() && j.status == "pending"));
        Ok(cancelled)
    }

    async fn count_active(&self, environment_id: ResourceId) -> DbResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .runs
            .iter()
            .filter(|r| {
                r.environment_id == *environment_id.as_uuid()
                    && matches!(r.status.as_str(), "queued" | "in_progress")
            })
            .count() as i64)
    }

    async fn active_counts(&self) -> DbResult<Vec<EnvironmentUsage>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .environments
            .iter()
            .map(|env| EnvironmentUsage {
                environment_id: env.id,
                name: env.name.clone(),
                concurrency_limit: env.concurrency_limit,
                active: state
                    .runs
                    .iter()
                    .filter(|r| {
                        r.environment_id == env.id
                            && matches!(r.status.as_str(), "queued" | "in_progress")
                    })
                    .count() as i64,
            })
            .collect())
    }
}

#[async_trait]
impl JobQueueRepo for InMemoryStore {
    async fn claim(&self, worker_id: &str) -> DbResult<Option<JobRecord>> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(DbError::Conflict("injected claim failure".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let mut eligible: Vec<usize> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == "pending" && j.attempts < j.max_attempts)
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by(|&a, &b| {
            let (ja, jb) = (&state.jobs[a], &state.jobs[b]);
            jb.priority
                .cmp(&ja.priority)
                .then(ja.created_at.cmp(&jb.created_at))
        });
        let Some(&index) = eligible.first() else {
            return Ok(None);
        };
        let job = &mut state.jobs[index];
        job.status = JobStatus::Processing.as_str().to_string();
        job.attempts += 1;
        job.locked_by = Some(worker_id.to_string());
        job.locked_at = Some(Utc::now());
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: ResourceId, worker_id: &str) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| {
                j.id == *job_id.as_uuid()
                    && j.status == "processing"
                    && j.locked_by.as_deref() == Some(worker_id)
            })
            .ok_or_else(|| {
                DbError::Conflict(format!("job {job_id} is not locked by {worker_id}"))
            })?;
        job.status = JobStatus::Completed.as_str().to_string();
        job.locked_by = None;
        job.locked_at = None;
        job.updated_at = Utc::now();
        let run_id = job.run_id;
        if let Some(run) = state.runs.iter_mut().find(|r| {
            r.id == run_id && matches!(r.status.as_str(), "queued" | "in_progress")
        }) {
            let now = Utc::now();
            run.status = RunStatus::Success.as_str().to_string();
            run.end_time = Some(now);
            run.duration_ms = run.start_time.map(|s| (now - s).num_milliseconds());
            run.updated_at = now;
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: ResourceId,
        worker_id: &str,
        message: &str,
    ) -> DbResult<JobStatus> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| {
                j.id == *job_id.as_uuid()
                    && j.status == "processing"
                    && j.locked_by.as_deref() == Some(worker_id)
            })
            .ok_or_else(|| {
                DbError::Conflict(format!("job {job_id} is not locked by {worker_id}"))
            })?;
        job.locked_by = None;
        job.locked_at = None;
        job.error_message = Some(message.to_string());
        job.updated_at = Utc::now();
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Pending.as_str().to_string();
            Ok(JobStatus::Pending)
        } else {
            job.status = JobStatus::Failed.as_str().to_string();
            let run_id = job.run_id;
            if let Some(run) = state.runs.iter_mut().find(|r| {
                r.id == run_id && matches!(r.status.as_str(), "queued" | "in_progress")
            }) {
                let now = Utc::now();
                run.status = RunStatus::Failed.as_str().to_string();
                run.end_time = Some(now);
                run.duration_ms = run.start_time.map(|s| (now - s).num_milliseconds());
                run.error_log = Some(message.to_string());
                run.updated_at = now;
            }
            Ok(JobStatus::Failed)
        }
    }

    async fn release_stuck(&self, older_than: Duration) -> DbResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap();
        let mut state = self.state.lock().unwrap();
        let mut released = 0;
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.status == "processing" && j.locked_at.is_some_and(|at| at < cutoff))
        {
            job.status = JobStatus::Pending.as_str().to_string();
            job.locked_by = None;
            job.locked_at = None;
            job.updated_at = Utc::now();
            released += 1;
        }
        Ok(released)
    }

    async fn cleanup_old(&self, retention: Duration) -> DbResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap();
        let mut state = self.state.lock().unwrap();
        let before = state.jobs.len();
        state.jobs.retain(|j| {
            !(matches!(j.status.as_str(), "completed" | "failed") && j.updated_at < cutoff)
        });
        Ok((before - state.jobs.len()) as u64)
    }

    async fn get(&self, job_id: ResourceId) -> DbResult<JobRecord> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == *job_id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {job_id}")))
    }

    async fn for_run(&self, run_id: ResourceId) -> DbResult<Option<JobRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.run_id == *run_id.as_uuid())
            .cloned())
    }

    async fn depth(&self) -> DbResult<QueueDepth> {
        let state = self.state.lock().unwrap();
        Ok(QueueDepth {
            pending: state.jobs.iter().filter(|j| j.status == "pending").count() as i64,
            processing: state.jobs.iter().filter(|j| j.status == "processing").count() as i64,
        })
    }
}

#[async_trait]
impl ScheduleRepo for InMemoryStore {
    async fn create(
        &self,
        name: &str,
        cron_expression: &str,
        environment_id: ResourceId,
        test_command: &str,
        custom_config: serde_json::Value,
    ) -> DbResult<ScheduleRecord> {
        let now = Utc::now();
        let record = ScheduleRecord {
            id: uuid::Uuid::now_v7(),
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            environment_id: *environment_id.as_uuid(),
            enabled: true,
            test_command: test_command.to_string(),
            custom_config,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().schedules.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: ResourceId) -> DbResult<ScheduleRecord> {
        self.state
            .lock()
            .unwrap()
            .schedules
            .iter()
            .find(|s| s.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))
    }

    async fn list(&self) -> DbResult<Vec<ScheduleRecord>> {
        Ok(self.state.lock().unwrap().schedules.clone())
    }

    async fn list_enabled(&self) -> DbResult<Vec<ScheduleRecord>> {
        if self.fail_schedule_reads.load(Ordering::SeqCst) {
            return Err(DbError::Conflict("injected schedule read failure".to_string()));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .schedules
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn set_enabled(&self, id: ResourceId, enabled: bool) -> DbResult<ScheduleRecord> {
        let mut state = self.state.lock().unwrap();
        let schedule = state
            .schedules
            .iter_mut()
            .find(|s| s.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        schedule.enabled = enabled;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.schedules.len();
        state.schedules.retain(|s| s.id != *id.as_uuid());
        if state.schedules.len() == before {
            return Err(DbError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    async fn store(&self, local_path: &Path, key: &ArtifactKey) -> Result<String> {
        let url = format!("file:///artifacts/{key}");
        self.state
            .lock()
            .unwrap()
            .artifacts
            .push((local_path.to_path_buf(), key.to_string()));
        Ok(url)
    }
}

/// Programmable `TestRunner`: pops queued outcomes, defaulting to a
/// passing run, and tracks invocation env maps plus peak concurrency.
pub struct StubRunner {
    outcomes: Mutex<VecDeque<Result<TestOutcome>>>,
    invocations: Mutex<Vec<HashMap<String, String>>>,
    delay: Option<Duration>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl StubRunner {
    pub fn succeeding() -> std::sync::Arc<Self> {
        Self::build(Vec::new(), None)
    }

    pub fn with_outcomes(outcomes: Vec<Result<TestOutcome>>) -> std::sync::Arc<Self> {
        Self::build(outcomes, None)
    }

    pub fn succeeding_with_delay(delay: Duration) -> std::sync::Arc<Self> {
        Self::build(Vec::new(), Some(delay))
    }

    fn build(outcomes: Vec<Result<TestOutcome>>, delay: Option<Duration>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            invocations: Mutex::new(Vec::new()),
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn invocations(&self) -> Vec<HashMap<String, String>> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for StubRunner {
    async fn run(
        &self,
        _command: &str,
        env: HashMap<String, String>,
        _timeout: Duration,
    ) -> Result<TestOutcome> {
        self.invocations.lock().unwrap().push(env);
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(TestOutcome {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                trace_path: None,
            })
        })
    }
}

impl std::fmt::Debug for StubRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubRunner").finish_non_exhaustive()
    }
}

// Queue-semantics tests. The fake stands in for the SKIP LOCKED claim
// statement, so these pin down the contract the dispatch layer builds
// on: exclusive ownership, ordering, attempt bounds, lock guards and
// the stuck sweep.
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn seed_jobs(store: &Arc<InMemoryStore>, count: usize) {
        let env = store.add_environment("staging", "https://staging.example.com", 50);
        for _ in 0..count {
            store
                .create_with_job(NewRun::new(env, "npm test"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn concurrent_claimants_never_share_a_job() {
        let store = InMemoryStore::shared();
        seed_jobs(&store, 5).await;

        let mut handles = Vec::new();
        for worker in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim(&format!("worker-{worker}")).await.unwrap()
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                claimed.push(job);
            }
        }

        // Five jobs, ten claimants: each job claimed exactly once.
        assert_eq!(claimed.len(), 5);
        let ids: HashSet<_> = claimed.iter().map(|j| j.id).collect();
        assert_eq!(ids.len(), 5);
        for job in &claimed {
            assert_eq!(job.status, "processing");
            assert!(job.locked_by.is_some());
            assert!(job.locked_at.is_some());
        }
    }

    #[tokio::test]
    async fn claims_follow_priority_then_fifo() {
        let store = InMemoryStore::shared();
        let env = store.add_environment("staging", "https://staging.example.com", 50);
        let mut low_first = NewRun::new(env, "npm test");
        low_first.priority = Some(0);
        let low_first = store.create_with_job(low_first).await.unwrap();
        let mut high = NewRun::new(env, "npm test");
        high.priority = Some(10);
        let high = store.create_with_job(high).await.unwrap();
        let mut low_second = NewRun::new(env, "npm test");
        low_second.priority = Some(0);
        let low_second = store.create_with_job(low_second).await.unwrap();

        let order: Vec<_> = [
            store.claim("w").await.unwrap().unwrap().run_id,
            store.claim("w").await.unwrap().unwrap().run_id,
            store.claim("w").await.unwrap().unwrap().run_id,
        ]
        .to_vec();
        assert_eq!(order, vec![high.id, low_first.id, low_second.id]);
    }

    #[tokio::test]
    async fn complete_requires_the_owning_worker() {
        let store = InMemoryStore::shared();
        seed_jobs(&store, 1).await;
        let job = store.claim("worker-a").await.unwrap().unwrap();
        let job_id = ResourceId::from_uuid(job.id);

        assert!(matches!(
            store.complete(job_id, "worker-b").await,
            Err(DbError::Conflict(_))
        ));
        store.complete(job_id, "worker-a").await.unwrap();

        // The run was folded to success in the same unit.
        let job = JobQueueRepo::get(&*store, job_id).await.unwrap();
        assert_eq!(job.status, "completed");
        let run = store.get_run(ResourceId::from_uuid(job.run_id));
        assert_eq!(run.status, "success");
    }

    #[tokio::test]
    async fn stuck_jobs_are_swept_back_to_pending() {
        let store = InMemoryStore::shared();
        seed_jobs(&store, 1).await;
        let job = store.claim("worker-a").await.unwrap().unwrap();
        let run_id = ResourceId::from_uuid(job.run_id);
        store.age_lock(run_id, Duration::from_secs(40 * 60));

        // A fresh lock elsewhere must survive the sweep.
        seed_jobs(&store, 1).await;
        let fresh = store.claim("worker-b").await.unwrap().unwrap();

        let released = store.release_stuck(Duration::from_secs(30 * 60)).await.unwrap();
        assert_eq!(released, 1);

        let swept = store.for_run(run_id).await.unwrap().unwrap();
        assert_eq!(swept.status, "pending");
        assert!(swept.locked_by.is_none());
        assert!(swept.locked_at.is_none());

        let fresh = JobQueueRepo::get(&*store, ResourceId::from_uuid(fresh.id))
            .await
            .unwrap();
        assert_eq!(fresh.status, "processing");

        // Swept job is reclaimable.
        let reclaimed = store.claim("worker-c").await.unwrap().unwrap();
        assert_eq!(reclaimed.run_id, *run_id.as_uuid());
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_a_run_started() {
        let store = InMemoryStore::shared();
        seed_jobs(&store, 2).await;
        let runs = store.list_recent(10).await.unwrap();

        let queued = ResourceId::from_uuid(runs[0].id);
        let cancelled = store.cancel(queued).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        // The pending queue entry is gone with the run.
        assert!(store.for_run(queued).await.unwrap().is_none());

        let started = ResourceId::from_uuid(runs[1].id);
        store.mark_in_progress(started).await.unwrap();
        assert!(matches!(
            store.cancel(started).await,
            Err(DbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_terminal_jobs() {
        let store = InMemoryStore::shared();
        seed_jobs(&store, 2).await;
        let job = store.claim("worker-a").await.unwrap().unwrap();
        store
            .complete(ResourceId::from_uuid(job.id), "worker-a")
            .await
            .unwrap();

        // Nothing old enough yet.
        assert_eq!(store.cleanup_old(Duration::from_secs(3600)).await.unwrap(), 0);
        // Zero-width window: the completed job goes, the pending one stays.
        assert_eq!(store.cleanup_old(Duration::from_secs(0)).await.unwrap(), 1);
        let depth = store.depth().await.unwrap();
        assert_eq!(depth.pending, 1);
        assert_eq!(depth.processing, 0);
    }
}
