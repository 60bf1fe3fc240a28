//! Configuration module for the SQL exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Exporter settings (bind address, port, log level, shutdown timeout)
//! - Database targets (driver and connection parameters, `${VAR}` expansion)
//! - Queries and the metrics extracted from their results

mod app;
mod database;
mod query;
mod validation;

pub use app::{AppConfig, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT, ExporterConfig};
pub use database::{DEFAULT_MAX_CONNECTIONS, DatabaseConfig, DriverKind};
pub use query::{
    DEFAULT_INTERVAL, DEFAULT_TIMEOUT, DEFAULT_VALUE_COLUMN, MetricConfig, MetricKind,
    QueryConfig,
};
pub use validation::{
    ConfigError, deserialize_duration, expand_env_vars, load_env_file, parse_duration,
};
