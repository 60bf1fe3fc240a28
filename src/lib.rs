//! SQL Exporter - SQL query results as Prometheus metrics
//!
//! This crate runs configured SQL queries against one or more databases on a
//! fixed interval and publishes the results as Prometheus metrics. It can be
//! used as a library or run as the standalone `sql-exporter` binary.
//!
//! # Architecture
//!
//! - **Config**: YAML configuration with environment variable expansion
//! - **Database**: query execution through sqlx (SQLite, MySQL, PostgreSQL)
//! - **Metrics**: typed metric registry and result-row mapping
//! - **Engine**: one independent collection loop per query
//! - **Server**: `/metrics` exposition, health checks and job status API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sql_exporter::{AppConfig, CollectionEngine, QueryExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("config/config.yaml")?;
//!     let executor = Arc::new(QueryExecutor::from_config(&config.databases)?);
//!     let mut engine = CollectionEngine::new(config.queries, executor)?;
//!
//!     engine.start()?;
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     println!("{}", engine.registry().render()?);
//!     engine.stop(Duration::from_secs(5)).await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod metrics;
pub mod server;

pub use config::{AppConfig, ConfigError, DatabaseConfig, MetricConfig, MetricKind, QueryConfig};
pub use database::{QueryError, QueryExecutor, QueryRunner, ResultRow, ScalarValue};
pub use engine::{
    CollectionEngine, CollectionOutcome, EngineError, JobBoard, JobInfo, JobState, StopReport,
};
pub use metrics::{MetricRegistry, RegistryError, map_rows};
