//! Native sqlx backends, one per supported driver.
//!
//! Each backend owns a lazily-connected pool of its driver's own type and
//! decodes columns with that driver's type mapping, so types such as
//! `NUMERIC`, `DECIMAL` or `TIMESTAMP` reach the mapper as values.

mod mysql;
mod postgres;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::pool::PoolOptions;
use sqlx::{Column, Row};

use crate::config::{ConfigError, DatabaseConfig, DriverKind};
use crate::database::runner::DatabaseConnection;
use crate::database::{QueryError, ResultRow, ScalarValue};

pub use mysql::MySqlBackend;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// How long a query waits for a free pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle pooled connections are closed after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the connection handle for a database, choosing the driver once.
pub(crate) fn open_connection(
    config: &DatabaseConfig,
) -> Result<Arc<dyn DatabaseConnection>, ConfigError> {
    Ok(match config.driver {
        DriverKind::Sqlite => Arc::new(SqliteBackend::connect_lazy(config)?),
        DriverKind::Mysql => Arc::new(MySqlBackend::connect_lazy(config)?),
        DriverKind::Postgresql => Arc::new(PostgresBackend::connect_lazy(config)?),
        DriverKind::Mssql => Arc::new(UnsupportedConnection {
            driver: config.driver,
        }),
    })
}

/// Pool settings shared by every driver.
fn pool_options<DB: sqlx::Database>(config: &DatabaseConfig) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
}

fn invalid_settings(config: &DatabaseConfig, err: sqlx::Error) -> ConfigError {
    ConfigError::ValidationError(format!(
        "database '{}': invalid connection settings: {}",
        config.name, err
    ))
}

/// Decode every column of a row with a driver-specific cell decoder.
fn decode_row<R: Row>(row: &R, decode_value: impl Fn(&R, usize) -> ScalarValue) -> ResultRow {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                decode_value(row, column.ordinal()),
            )
        })
        .collect()
}

/// Whole decimals that fit stay integers; everything else becomes a float.
fn decimal_value(value: Decimal) -> ScalarValue {
    if value.fract().is_zero() {
        if let Some(int) = value.to_i64() {
            return ScalarValue::Int(int);
        }
    }
    value
        .to_f64()
        .map(ScalarValue::Float)
        .unwrap_or_else(|| ScalarValue::Text(value.to_string()))
}

/// Unsigned integers beyond `i64::MAX` fall back to a float.
fn unsigned_value(value: u64) -> ScalarValue {
    i64::try_from(value)
        .map(ScalarValue::Int)
        .unwrap_or(ScalarValue::Float(value as f64))
}

/// Binary cells are kept when they hold UTF-8 text.
fn bytes_value(value: Vec<u8>) -> ScalarValue {
    String::from_utf8(value)
        .map(ScalarValue::Text)
        .unwrap_or(ScalarValue::Null)
}

fn unsupported_column(type_name: &str, index: usize) -> ScalarValue {
    tracing::debug!(
        column = index,
        r#type = type_name,
        "Unsupported column type, treating as NULL"
    );
    ScalarValue::Null
}

/// Placeholder for drivers sqlx cannot serve; every call fails.
#[derive(Debug)]
struct UnsupportedConnection {
    driver: DriverKind,
}

#[async_trait::async_trait]
impl DatabaseConnection for UnsupportedConnection {
    fn driver(&self) -> DriverKind {
        self.driver
    }

    async fn query(&self, _sql: &str) -> Result<Vec<ResultRow>, QueryError> {
        Err(QueryError::UnsupportedDriver(self.driver))
    }

    async fn ping(&self) -> Result<(), QueryError> {
        Err(QueryError::UnsupportedDriver(self.driver))
    }
}
