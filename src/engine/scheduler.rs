//! Per-job collection loops and the shared job board.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::QueryConfig;
use crate::engine::job::{CollectionOutcome, CycleStatus, QueryJob};
use crate::engine::telemetry::CollectionTelemetry;

/// Lifecycle state of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    /// Registered, not started yet.
    Idle,
    /// A cycle is executing.
    Running,
    /// Waiting for the next cycle.
    Sleeping,
    /// The loop has exited.
    Stopped,
}

/// Public view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub database: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub state: JobState,
    /// Completed cycles, whatever their status.
    pub cycles: u64,
    pub last_run: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde::option")]
    pub last_duration: Option<Duration>,
    pub last_status: Option<CycleStatus>,
    pub last_error: Option<String>,
}

/// Shared, cloneable table of job states read by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    jobs: Arc<RwLock<BTreeMap<String, JobInfo>>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job in the `Idle` state.
    pub fn register(&self, query: &QueryConfig) {
        let info = JobInfo {
            name: query.name.clone(),
            database: query.database.clone(),
            interval: query.interval,
            state: JobState::Idle,
            cycles: 0,
            last_run: None,
            last_duration: None,
            last_status: None,
            last_error: None,
        };
        self.write().insert(query.name.clone(), info);
    }

    pub fn set_state(&self, name: &str, state: JobState) {
        if let Some(info) = self.write().get_mut(name) {
            info.state = state;
        }
    }

    /// Record a finished cycle.
    pub fn record_cycle(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: &CollectionOutcome,
    ) {
        if let Some(info) = self.write().get_mut(name) {
            info.cycles += 1;
            info.last_run = Some(started_at);
            info.last_duration = Some(elapsed);
            info.last_status = Some(outcome.status());
            info.last_error = outcome.error_message();
        }
    }

    pub fn get(&self, name: &str) -> Option<JobInfo> {
        self.read().get(name).cloned()
    }

    /// All jobs ordered by name.
    pub fn list(&self) -> Vec<JobInfo> {
        self.read().values().cloned().collect()
    }

    /// Whether every job has completed at least one cycle.
    pub fn all_collected(&self) -> bool {
        self.read().values().all(|info| info.cycles > 0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, JobInfo>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, JobInfo>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Jobs that exited and jobs left running after [`CollectionScheduler::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub abandoned: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// One tokio task per job, all stopped through a shared cancellation token.
#[derive(Debug)]
pub struct CollectionScheduler {
    cancel: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl CollectionScheduler {
    /// Spawn a collection loop for every job. The first cycle starts immediately.
    pub fn start(
        jobs: &[Arc<QueryJob>],
        board: &JobBoard,
        telemetry: &Arc<CollectionTelemetry>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tasks = jobs
            .iter()
            .map(|job| {
                let handle = tokio::spawn(run_job(
                    Arc::clone(job),
                    board.clone(),
                    Arc::clone(telemetry),
                    cancel.clone(),
                ));
                (job.name().to_string(), handle)
            })
            .collect();

        tracing::info!(jobs = jobs.len(), "Collection scheduler started");
        Self { cancel, tasks }
    }

    /// Signal every loop to stop and wait up to `timeout` for them to exit.
    ///
    /// A cycle in progress is allowed to finish. Loops still running at the
    /// deadline are detached and reported as abandoned.
    pub async fn stop(self, timeout: Duration) -> StopReport {
        self.cancel.cancel();
        let deadline = Instant::now() + timeout;
        let mut report = StopReport::default();

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped.push(name),
                Ok(Err(e)) => {
                    tracing::error!(query = %name, error = %e, "Collection task failed");
                    report.stopped.push(name);
                }
                Err(_) => {
                    tracing::warn!(query = %name, "Collection task did not stop in time, abandoning");
                    report.abandoned.push(name);
                }
            }
        }

        if report.is_clean() {
            tracing::info!(stopped = report.stopped.len(), "Collection scheduler shutdown complete");
        } else {
            tracing::warn!(
                stopped = report.stopped.len(),
                abandoned = report.abandoned.len(),
                "Collection scheduler shutdown timed out"
            );
        }
        report
    }
}

/// Execute one cycle, catching panics, and record it on the board and telemetry.
pub(crate) async fn run_cycle(
    job: &QueryJob,
    board: &JobBoard,
    telemetry: &CollectionTelemetry,
) -> CollectionOutcome {
    board.set_state(job.name(), JobState::Running);
    let started_at = Utc::now();
    let started = Instant::now();

    let outcome = match AssertUnwindSafe(job.execute()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(query = %job.name(), panic = %message, "Collection cycle panicked");
            CollectionOutcome::Panicked(message)
        }
    };

    let elapsed = started.elapsed();
    telemetry.record(job.name(), outcome.status(), elapsed);
    board.record_cycle(job.name(), started_at, elapsed, &outcome);
    outcome
}

async fn run_job(
    job: Arc<QueryJob>,
    board: JobBoard,
    telemetry: Arc<CollectionTelemetry>,
    cancel: CancellationToken,
) {
    let name = job.name().to_string();
    let interval = job.query().interval;
    tracing::debug!(query = %name, interval = ?interval, "Collection loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let started = Instant::now();
        run_cycle(&job, &board, &telemetry).await;

        let pause = interval.saturating_sub(started.elapsed());
        if pause.is_zero() {
            tracing::debug!(query = %name, interval = ?interval, "Cycle overran its interval");
        }

        board.set_state(&name, JobState::Sleeping);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    board.set_state(&name, JobState::Stopped);
    tracing::debug!(query = %name, "Collection loop stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
