//! Scripted query runner for engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::database::{QueryError, QueryRunner, ResultRow};

type Script = dyn Fn(&str, usize) -> Result<Vec<ResultRow>, QueryError> + Send + Sync;

/// Call bookkeeping shared between a runner and its test.
#[derive(Debug, Default)]
pub(crate) struct RunnerStats {
    starts: Mutex<HashMap<String, Vec<Instant>>>,
    in_flight: Mutex<HashMap<String, (usize, usize)>>,
}

impl RunnerStats {
    pub(crate) fn calls(&self, database: &str) -> usize {
        self.starts(database).len()
    }

    pub(crate) fn starts(&self, database: &str) -> Vec<Instant> {
        self.starts
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn max_in_flight(&self, database: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .get(database)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }

    fn begin(&self, database: &str) -> usize {
        let mut starts = self.starts.lock().unwrap();
        let entry = starts.entry(database.to_string()).or_default();
        entry.push(Instant::now());
        let call = entry.len() - 1;

        let mut in_flight = self.in_flight.lock().unwrap();
        let (current, max) = in_flight.entry(database.to_string()).or_default();
        *current += 1;
        *max = (*max).max(*current);
        call
    }

    fn end(&self, database: &str) {
        if let Some((current, _)) = self.in_flight.lock().unwrap().get_mut(database) {
            *current -= 1;
        }
    }
}

/// Runner answering from a closure of `(database, call index)`.
///
/// The optional delay is slept before the closure runs, so a panicking
/// script still leaves the in-flight count balanced.
pub(crate) struct ScriptedRunner {
    script: Box<Script>,
    delay: Duration,
    stats: Arc<RunnerStats>,
}

impl ScriptedRunner {
    pub(crate) fn new<F>(script: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<ResultRow>, QueryError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            stats: Arc::new(RunnerStats::default()),
        }
    }

    /// Runner returning the same rows for every call.
    pub(crate) fn rows(rows: Vec<ResultRow>) -> Self {
        Self::new(move |_, _| Ok(rows.clone()))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn stats(&self) -> Arc<RunnerStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait::async_trait]
impl QueryRunner for ScriptedRunner {
    async fn execute(
        &self,
        database: &str,
        _sql: &str,
        _timeout: Duration,
    ) -> Result<Vec<ResultRow>, QueryError> {
        let call = self.stats.begin(database);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.stats.end(database);
        (self.script)(database, call)
    }
}
