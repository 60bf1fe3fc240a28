//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::database::DatabaseConfig;
use super::query::QueryConfig;
use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default exporter port.
pub const DEFAULT_PORT: u16 = 9090;

/// Default wait for collection jobs to stop on shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// HTTP exposition and process settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Bind address (default: "0.0.0.0").
    pub host: String,

    /// Port (default: 9090).
    pub port: u16,

    /// Log level used when `RUST_LOG` is not set (default: "INFO").
    pub log_level: String,

    /// Wait for collection jobs to stop on shutdown (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            log_level: "INFO".to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ExporterConfig {
    /// Translate the configured level into a `tracing` filter directive.
    ///
    /// Accepts the usual level names case-insensitively, plus `WARNING` and
    /// `CRITICAL` as aliases of `warn` and `error`.
    pub fn log_directive(&self) -> String {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            "" => "info".to_string(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Exporter settings.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Database targets keyed by name.
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,

    /// Queries to collect.
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, environment-expand and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        for (name, database) in config.databases.iter_mut() {
            database.name = name.clone();
            database.expand_env();
        }
        config.validate()?;
        Ok(config)
    }

    /// Non-fatal configuration warnings, to be logged once tracing is set up.
    pub fn warnings(&self) -> Vec<String> {
        self.queries.iter().flat_map(QueryConfig::warnings).collect()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exporter.host.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid exporter host address: '{}'",
                self.exporter.host
            ))
        })?;

        if self.exporter.port == 0 {
            return Err(ConfigError::ValidationError(
                "exporter port must be non-zero".to_string(),
            ));
        }

        for (name, database) in &self.databases {
            if name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "database name cannot be empty".to_string(),
                ));
            }
            if database.max_connections == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "database '{}': max_connections must be positive",
                    name
                )));
            }
            database.connection_url()?;
        }

        let mut seen_names = HashSet::new();
        for query in &self.queries {
            query.validate()?;
            if !seen_names.insert(&query.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate query name: '{}'",
                    query.name
                )));
            }
            if !self.databases.contains_key(&query.database) {
                return Err(ConfigError::ValidationError(format!(
                    "query '{}': unknown database '{}'",
                    query.name, query.database
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverKind, MetricKind};
    use std::io::Write;

    const SAMPLE: &str = r#"
exporter:
  host: 127.0.0.1
  port: 9399
  log_level: WARNING
  shutdown_timeout: 2s
databases:
  main:
    driver: sqlite
    database: ":memory:"
  warehouse:
    driver: postgres
    host: ${SQL_EXPORTER_APP_TEST_HOST:-pg.internal}
    username: monitor
    password: ${SQL_EXPORTER_APP_TEST_PASSWORD:-changeme}
    database: dw
queries:
  - name: answer
    sql: SELECT 42 AS value
    database: main
    interval: 1
    timeout: 5
    metrics:
      - name: test_metric
        help: The answer
        type: gauge
"#;

    #[test]
    fn test_exporter_config_default() {
        let config = ExporterConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_log_directive_aliases() {
        let mut config = ExporterConfig::default();
        assert_eq!(config.log_directive(), "info");
        config.log_level = "WARNING".to_string();
        assert_eq!(config.log_directive(), "warn");
        config.log_level = "Critical".to_string();
        assert_eq!(config.log_directive(), "error");
        config.log_level = "debug".to_string();
        assert_eq!(config.log_directive(), "debug");
    }

    #[test]
    fn test_from_yaml_full() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.exporter.host, "127.0.0.1");
        assert_eq!(config.exporter.port, 9399);
        assert_eq!(config.exporter.shutdown_timeout, Duration::from_secs(2));

        let main = &config.databases["main"];
        assert_eq!(main.name, "main");
        assert_eq!(main.driver, DriverKind::Sqlite);

        let warehouse = &config.databases["warehouse"];
        assert_eq!(warehouse.driver, DriverKind::Postgresql);
        assert_eq!(warehouse.host.as_deref(), Some("pg.internal"));
        assert_eq!(warehouse.password.as_deref(), Some("changeme"));

        let query = &config.queries[0];
        assert_eq!(query.interval, Duration::from_secs(1));
        assert_eq!(query.timeout, Duration::from_secs(5));
        assert_eq!(query.metrics[0].kind, MetricKind::Gauge);
    }

    #[test]
    fn test_warnings_survive_loading() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.warnings(),
            vec!["query 'answer': timeout 5s exceeds interval 1s, slow cycles will run back to back"
                .to_string()]
        );
    }

    #[test]
    fn test_from_yaml_minimal_uses_defaults() {
        let config = AppConfig::from_yaml("databases: {}\n").unwrap();
        assert_eq!(config.exporter.port, DEFAULT_PORT);
        assert!(config.queries.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.queries.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load("/nonexistent/sql-exporter/config.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_unsupported_driver_rejected() {
        let yaml = r#"
databases:
  legacy:
    driver: oracle
    host: db
"#;
        assert!(matches!(
            AppConfig::from_yaml(yaml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_unknown_database() {
        let yaml = r#"
databases:
  main:
    driver: sqlite
    database: ":memory:"
queries:
  - name: q
    sql: SELECT 1 AS value
    database: other
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown database 'other'"));
    }

    #[test]
    fn test_validation_duplicate_query_names() {
        let yaml = r#"
databases:
  main:
    driver: sqlite
    database: ":memory:"
queries:
  - name: q
    sql: SELECT 1 AS value
    database: main
  - name: q
    sql: SELECT 2 AS value
    database: main
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate query name"));
    }

    #[test]
    fn test_validation_invalid_host() {
        let config = AppConfig {
            exporter: ExporterConfig {
                host: "not-an-ip".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid exporter host"));
    }

    #[test]
    fn test_validation_invalid_port() {
        let config = AppConfig {
            exporter: ExporterConfig {
                port: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_network_database_without_host() {
        let yaml = r#"
databases:
  shop:
    driver: mysql
    database: shop
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("requires 'host'"));
    }
}
