//! A single query bound to its runner and metric registry.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::Mutex;

use crate::config::QueryConfig;
use crate::database::{QueryError, QueryRunner};
use crate::metrics::{MappedRows, MappingDiagnostic, MetricRegistry, map_rows};

/// Status label of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleStatus {
    Success,
    MappingFailure,
    QueryFailure,
    Panic,
}

/// Result of one execution of a [`QueryJob`].
///
/// Outcomes feed logs, telemetry and the job board. They never change when
/// the next cycle runs.
#[derive(Debug, Clone)]
pub enum CollectionOutcome {
    /// Every (row, metric) pair was applied.
    Success { rows: usize, updates: usize },
    /// The query ran but some pairs were skipped or rejected.
    MappingFailure {
        rows: usize,
        updates: usize,
        diagnostics: Vec<MappingDiagnostic>,
    },
    /// The query failed; no metric was touched.
    QueryFailure(QueryError),
    /// The cycle panicked; the message is the panic payload if it was a string.
    Panicked(String),
}

impl CollectionOutcome {
    pub fn status(&self) -> CycleStatus {
        match self {
            Self::Success { .. } => CycleStatus::Success,
            Self::MappingFailure { .. } => CycleStatus::MappingFailure,
            Self::QueryFailure(_) => CycleStatus::QueryFailure,
            Self::Panicked(_) => CycleStatus::Panic,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short error description for failed cycles.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::MappingFailure { diagnostics, .. } => Some(format!(
                "{} mapping diagnostic(s), first: {}",
                diagnostics.len(),
                diagnostics
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            )),
            Self::QueryFailure(e) => Some(e.to_string()),
            Self::Panicked(msg) => Some(format!("panicked: {msg}")),
        }
    }
}

impl fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { rows, updates } => {
                write!(f, "success: {rows} row(s), {updates} update(s)")
            }
            Self::MappingFailure {
                rows,
                updates,
                diagnostics,
            } => write!(
                f,
                "mapping failure: {rows} row(s), {updates} update(s), {} diagnostic(s), {} skipped",
                diagnostics.len(),
                diagnostics.iter().filter(|d| d.is_skip()).count()
            ),
            Self::QueryFailure(e) => write!(f, "query failure: {e}"),
            Self::Panicked(msg) => write!(f, "panic: {msg}"),
        }
    }
}

/// A configured query ready to be executed.
///
/// At most one execution of a job runs at a time, whether triggered by the
/// scheduler or by [`CollectionEngine::collect_once`](crate::CollectionEngine::collect_once).
pub struct QueryJob {
    query: QueryConfig,
    runner: Arc<dyn QueryRunner>,
    registry: Arc<MetricRegistry>,
    in_flight: Mutex<()>,
}

impl fmt::Debug for QueryJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryJob")
            .field("name", &self.query.name)
            .field("database", &self.query.database)
            .field("interval", &self.query.interval)
            .finish_non_exhaustive()
    }
}

impl QueryJob {
    pub fn new(
        query: QueryConfig,
        runner: Arc<dyn QueryRunner>,
        registry: Arc<MetricRegistry>,
    ) -> Self {
        Self {
            query,
            runner,
            registry,
            in_flight: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.query.name
    }

    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    /// Run the query once and apply the resulting updates.
    ///
    /// Waits for a concurrent execution of the same job to finish first.
    pub async fn execute(&self) -> CollectionOutcome {
        let _guard = self.in_flight.lock().await;
        let query = &self.query;

        tracing::debug!(query = %query.name, database = %query.database, "Running collection");

        let rows = match self
            .runner
            .execute(&query.database, &query.sql, query.timeout)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                let reason = if e.is_connection_failure() {
                    "Database unreachable"
                } else {
                    "Query failed"
                };
                tracing::error!(
                    query = %query.name,
                    database = %query.database,
                    error = %e,
                    "{reason}, keeping previous metric values"
                );
                return CollectionOutcome::QueryFailure(e);
            }
        };

        if rows.is_empty() {
            tracing::warn!(query = %query.name, "Query returned no rows");
            return CollectionOutcome::Success {
                rows: 0,
                updates: 0,
            };
        }

        let MappedRows {
            updates,
            mut diagnostics,
        } = map_rows(&rows, &query.metrics);

        let mut applied = 0;
        for update in &updates {
            match self.registry.apply(update) {
                Ok(()) => applied += 1,
                Err(e) => diagnostics.push(MappingDiagnostic::UpdateRejected {
                    metric: update.metric.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        for diagnostic in &diagnostics {
            tracing::warn!(query = %query.name, "{}", diagnostic);
        }

        tracing::debug!(
            query = %query.name,
            rows = rows.len(),
            updates = applied,
            "Collection finished"
        );

        if diagnostics.is_empty() {
            CollectionOutcome::Success {
                rows: rows.len(),
                updates: applied,
            }
        } else {
            CollectionOutcome::MappingFailure {
                rows: rows.len(),
                updates: applied,
                diagnostics,
            }
        }
    }
}
