//! SQLite backend.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};

use super::{bytes_value, decode_row, invalid_settings, pool_options, unsupported_column};
use crate::config::{ConfigError, DatabaseConfig, DriverKind};
use crate::database::runner::DatabaseConnection;
use crate::database::{QueryError, ResultRow, ScalarValue};

/// Pooled SQLite connection. Database files are never created.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Create a pool without connecting. The first query opens a connection.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the connection URL is malformed.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        let url = config.connection_url()?;
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| invalid_settings(config, e))?
            .create_if_missing(false);

        Ok(Self {
            pool: pool_options(config).connect_lazy_with(options),
        })
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[async_trait::async_trait]
impl DatabaseConnection for SqliteBackend {
    fn driver(&self) -> DriverKind {
        DriverKind::Sqlite
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

/// SQLite cells carry their own storage class; decode by that.
fn decode_value(row: &SqliteRow, index: usize) -> ScalarValue {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return ScalarValue::Null,
        Ok(_) => {}
        Err(_) => return ScalarValue::Null,
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return ScalarValue::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return ScalarValue::Float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return ScalarValue::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return bytes_value(v);
    }

    unsupported_column(row.column(index).type_info().name(), index)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn memory() -> SqliteBackend {
        SqliteBackend::connect_lazy(&DatabaseConfig::sqlite("mem", ":memory:")).unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_memory_query() {
        let conn = memory();
        let rows = conn.query("SELECT 42 AS value").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("value"), Some(&ScalarValue::Int(42)));
        conn.close().await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_sqlite_mixed_columns() {
        let conn = memory();
        let rows = conn
            .query("SELECT 'eu' AS region, 2.5 AS ratio, NULL AS missing, X'6f6b' AS raw")
            .await
            .unwrap();

        let row = &rows[0];
        assert_eq!(row.get("region"), Some(&ScalarValue::from("eu")));
        assert_eq!(row.get("ratio"), Some(&ScalarValue::Float(2.5)));
        assert_eq!(row.get("missing"), Some(&ScalarValue::Null));
        assert_eq!(row.get("raw"), Some(&ScalarValue::from("ok")));
    }

    #[tokio::test]
    async fn test_sqlite_multiple_rows_keep_order() {
        let conn = memory();
        let rows = conn
            .query("SELECT 'a' AS k, 1 AS value UNION ALL SELECT 'b', 2")
            .await
            .unwrap();

        let keys: Vec<_> = rows.iter().map(|r| r.get("k").cloned()).collect();
        assert_eq!(
            keys,
            vec![Some(ScalarValue::from("a")), Some(ScalarValue::from("b"))]
        );
    }

    #[tokio::test]
    async fn test_sqlite_syntax_error_is_driver_error() {
        let conn = memory();
        let err = conn.query("SELEC nonsense").await.unwrap_err();
        assert!(matches!(err, QueryError::Driver(_)));
    }

    #[tokio::test]
    async fn test_sqlite_ping() {
        let conn = memory();
        conn.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_missing_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let config = DatabaseConfig::sqlite("absent", path.to_str().unwrap());

        let conn = SqliteBackend::connect_lazy(&config).unwrap();
        let err = conn.ping().await.unwrap_err();
        assert!(err.is_connection_failure() || matches!(err, QueryError::Driver(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sqlite_file_database() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.flush().unwrap();
        let config = DatabaseConfig::sqlite("file", file.path().to_str().unwrap());
        let conn = SqliteBackend::connect_lazy(&config).unwrap();

        conn.query("CREATE TABLE orders (region TEXT, total REAL)")
            .await
            .unwrap();
        conn.query("INSERT INTO orders VALUES ('eu', 10.5), ('eu', 4.5), ('us', 3)")
            .await
            .unwrap();
        let rows = conn
            .query("SELECT region, SUM(total) AS total FROM orders GROUP BY region ORDER BY region")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("total"), Some(&ScalarValue::Float(15.0)));
        assert_eq!(rows[1].get("region"), Some(&ScalarValue::from("us")));
        conn.close().await;
    }
}
