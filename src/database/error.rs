//! Query execution errors.
//!
//! Every failure a [`QueryRunner`](super::QueryRunner) can report is a
//! [`QueryError`]. They end the current collection cycle for one query only.

use std::time::Duration;

use thiserror::Error;

use crate::config::DriverKind;

/// Errors that can occur while executing a query.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The database could not be reached or the pool is unavailable.
    #[error("connection error: {0}")]
    Connection(String),

    /// The database rejected the statement or its result could not be read.
    #[error("driver error: {0}")]
    Driver(String),

    /// Execution did not finish within the query timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// No driver is available for this database kind.
    #[error("unsupported driver: {0}")]
    UnsupportedDriver(DriverKind),

    /// The query refers to a database that is not configured.
    #[error("database '{0}' is not configured")]
    UnknownDatabase(String),
}

impl QueryError {
    /// Whether the failure happened before the statement reached the database.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::UnsupportedDriver(_) | Self::UnknownDatabase(_)
        )
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err.to_string()),
            _ => Self::Driver(err.to_string()),
        }
    }
}
