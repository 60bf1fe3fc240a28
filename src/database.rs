//! Database access layer.
//!
//! Queries reach databases through the [`QueryRunner`] trait. The provided
//! [`QueryExecutor`] keeps one [`DatabaseConnection`] per configured database,
//! resolved to a concrete driver when the configuration is loaded:
//!
//! - SQLite ([`SqliteBackend`]), MySQL ([`MySqlBackend`]) and PostgreSQL
//!   ([`PostgresBackend`]): lazily-connected native sqlx pools, each decoding
//!   its driver's own column types
//! - MSSQL: accepted by configuration, reports [`QueryError::UnsupportedDriver`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sql_exporter::config::DatabaseConfig;
//! use sql_exporter::database::{QueryExecutor, QueryRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut executor = QueryExecutor::new();
//! executor.add_database(&DatabaseConfig::sqlite("main", ":memory:"))?;
//! let rows = executor
//!     .execute("main", "SELECT 42 AS value", Duration::from_secs(5))
//!     .await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

mod driver;
mod error;
mod row;
mod runner;

pub use driver::{MySqlBackend, PostgresBackend, SqliteBackend};
pub use error::QueryError;
pub use row::{ResultRow, ScalarValue};
pub use runner::{CONNECTION_TEST_TIMEOUT, DatabaseConnection, QueryExecutor, QueryRunner};
