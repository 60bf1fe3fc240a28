//! Collection engine: owns the jobs, their schedule and the metric registry.
//!
//! Each configured query becomes a [`QueryJob`]. Once started, every job runs
//! in its own tokio task: execute, then sleep for whatever is left of the
//! interval. A slow or failing job never delays or breaks another one.

mod job;
mod scheduler;
mod telemetry;

#[cfg(test)]
mod test_support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use job::{CollectionOutcome, CycleStatus, QueryJob};
pub use scheduler::{CollectionScheduler, JobBoard, JobInfo, JobState, StopReport};
pub use telemetry::{COLLECTION_DURATION, COLLECTIONS_TOTAL, CollectionTelemetry};

use crate::config::QueryConfig;
use crate::database::QueryRunner;
use crate::metrics::{MetricRegistry, RegistryError};

/// Errors raised while building or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metric registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("duplicate query name '{0}'")]
    DuplicateQuery(String),

    #[error("unknown query '{0}'")]
    UnknownQuery(String),

    #[error("collection engine is already running")]
    AlreadyRunning,
}

/// Runs every configured query on its own schedule.
pub struct CollectionEngine {
    registry: Arc<MetricRegistry>,
    jobs: Vec<Arc<QueryJob>>,
    board: JobBoard,
    telemetry: Arc<CollectionTelemetry>,
    scheduler: Option<CollectionScheduler>,
}

impl std::fmt::Debug for CollectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngine")
            .field("jobs", &self.jobs.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl CollectionEngine {
    /// Build an engine with a fresh registry.
    ///
    /// # Errors
    /// See [`CollectionEngine::with_registry`].
    pub fn new(queries: Vec<QueryConfig>, runner: Arc<dyn QueryRunner>) -> Result<Self, EngineError> {
        Self::with_registry(queries, runner, Arc::new(MetricRegistry::new()))
    }

    /// Build an engine writing into an existing registry.
    ///
    /// Every declared metric is registered up front.
    ///
    /// # Errors
    /// Returns `EngineError::DuplicateQuery` if two queries share a name, or
    /// `EngineError::Registry` if a metric conflicts with one already registered.
    pub fn with_registry(
        queries: Vec<QueryConfig>,
        runner: Arc<dyn QueryRunner>,
        registry: Arc<MetricRegistry>,
    ) -> Result<Self, EngineError> {
        let mut names = HashSet::new();
        for query in &queries {
            if !names.insert(query.name.as_str()) {
                return Err(EngineError::DuplicateQuery(query.name.clone()));
            }
        }

        let telemetry = Arc::new(CollectionTelemetry::register(&registry)?);
        for query in &queries {
            for metric in &query.metrics {
                registry.get_or_create(metric)?;
            }
        }

        let board = JobBoard::new();
        let jobs = queries
            .into_iter()
            .map(|query| {
                board.register(&query);
                Arc::new(QueryJob::new(query, Arc::clone(&runner), Arc::clone(&registry)))
            })
            .collect();

        Ok(Self {
            registry,
            jobs,
            board,
            telemetry,
            scheduler: None,
        })
    }

    /// Start one collection loop per job. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.scheduler.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.scheduler = Some(CollectionScheduler::start(
            &self.jobs,
            &self.board,
            &self.telemetry,
        ));
        Ok(())
    }

    /// Stop all loops, waiting up to `timeout` for cycles in progress.
    ///
    /// Returns an empty report if the engine was not running.
    pub async fn stop(&mut self, timeout: Duration) -> StopReport {
        match self.scheduler.take() {
            Some(scheduler) => scheduler.stop(timeout).await,
            None => StopReport::default(),
        }
    }

    /// Run one cycle of the named query, or of every query in order.
    pub async fn collect_once(
        &self,
        query: Option<&str>,
    ) -> Result<Vec<(String, CollectionOutcome)>, EngineError> {
        let selected: Vec<&Arc<QueryJob>> = match query {
            Some(name) => vec![
                self.jobs
                    .iter()
                    .find(|job| job.name() == name)
                    .ok_or_else(|| EngineError::UnknownQuery(name.to_string()))?,
            ],
            None => self.jobs.iter().collect(),
        };

        let mut outcomes = Vec::with_capacity(selected.len());
        for job in selected {
            let previous = self.board.get(job.name()).map(|info| info.state);
            let outcome = scheduler::run_cycle(job, &self.board, &self.telemetry).await;
            let state = match previous {
                Some(JobState::Stopped) => JobState::Stopped,
                _ if self.is_running() => JobState::Sleeping,
                _ => JobState::Idle,
            };
            self.board.set_state(job.name(), state);
            outcomes.push((job.name().to_string(), outcome));
        }
        Ok(outcomes)
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Job states, shared with the HTTP layer.
    pub fn jobs(&self) -> &JobBoard {
        &self.board
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }
}
