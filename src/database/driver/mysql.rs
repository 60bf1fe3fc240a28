//! MySQL / MariaDB backend.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};

use super::{
    bytes_value, decimal_value, decode_row, invalid_settings, pool_options, unsigned_value,
    unsupported_column,
};
use crate::config::{ConfigError, DatabaseConfig, DriverKind};
use crate::database::runner::DatabaseConnection;
use crate::database::{QueryError, ResultRow, ScalarValue};

/// Pooled MySQL connection.
#[derive(Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
}

impl std::fmt::Debug for MySqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlBackend").finish_non_exhaustive()
    }
}

impl MySqlBackend {
    /// Create a pool without connecting. The first query opens a connection.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the connection URL is malformed.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        let url = config.connection_url()?;
        let options =
            MySqlConnectOptions::from_str(&url).map_err(|e| invalid_settings(config, e))?;

        Ok(Self {
            pool: pool_options(config).connect_lazy_with(options),
        })
    }
}

#[async_trait::async_trait]
impl DatabaseConnection for MySqlBackend {
    fn driver(&self) -> DriverKind {
        DriverKind::Mysql
    }

    async fn query(&self, sql: &str) -> Result<Vec<ResultRow>, QueryError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| decode_row(row, decode_value)).collect())
    }

    async fn ping(&self) -> Result<(), QueryError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decode one cell by its MySQL column type.
///
/// `TINYINT` through `BIGINT` decode as integers (`BIGINT UNSIGNED` beyond
/// `i64` as a float), `DECIMAL` through `Decimal`, `DATETIME` and `TIMESTAMP`
/// as ISO-8601 text and binary strings as UTF-8 text.
fn decode_value(row: &MySqlRow, index: usize) -> ScalarValue {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return ScalarValue::Null,
        Ok(_) => {}
        Err(_) => return ScalarValue::Null,
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return ScalarValue::Int(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return unsigned_value(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(index) {
        return ScalarValue::Float(f64::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return ScalarValue::Float(v);
    }
    if let Ok(v) = row.try_get::<Decimal, _>(index) {
        return decimal_value(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return ScalarValue::Text(v);
    }
    if let Ok(v) = row.try_get::<DateTime<Utc>, _>(index) {
        return ScalarValue::Text(v.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<NaiveDateTime, _>(index) {
        return ScalarValue::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(index) {
        return ScalarValue::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<NaiveTime, _>(index) {
        return ScalarValue::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return bytes_value(v);
    }

    unsupported_column(row.column(index).type_info().name(), index)
}
