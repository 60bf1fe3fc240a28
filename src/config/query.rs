//! Query and metric definitions.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::validation::{ConfigError, deserialize_duration};

/// Default collection interval (60 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default query execution timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default result column holding the metric value.
pub const DEFAULT_VALUE_COLUMN: &str = "value";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_value_column() -> String {
    DEFAULT_VALUE_COLUMN.to_string()
}

/// Prometheus metric type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    /// Last value wins.
    Gauge,
    /// Monotonic sum of observed values.
    Counter,
    /// Bucketed distribution of observed values.
    Histogram,
}

/// One metric extracted from every row of a query result.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    /// Metric name, unique across the process.
    pub name: String,
    /// Help text shown in the exposition format.
    pub help: String,
    /// Metric type.
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Result columns used as label values, in order.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Result column holding the numeric value (default: "value").
    #[serde(default = "default_value_column")]
    pub value_column: String,
    /// Histogram bucket upper bounds (histograms only).
    #[serde(default)]
    pub buckets: Option<Vec<f64>>,
}

impl MetricConfig {
    /// Create a metric definition with no labels reading the `value` column.
    pub fn new(name: impl Into<String>, help: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels: Vec::new(),
            value_column: DEFAULT_VALUE_COLUMN.to_string(),
            buckets: None,
        }
    }

    /// Set label columns.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the value column.
    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }

    /// Set histogram buckets.
    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Validate the definition in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.name.is_empty() {
            return fail("metric name cannot be empty".to_string());
        }
        if self.help.trim().is_empty() {
            return fail(format!("metric '{}': help cannot be empty", self.name));
        }
        if self.value_column.is_empty() {
            return fail(format!("metric '{}': value_column cannot be empty", self.name));
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.is_empty() {
                return fail(format!("metric '{}': label name cannot be empty", self.name));
            }
            if !seen.insert(label) {
                return fail(format!(
                    "metric '{}': duplicate label '{}'",
                    self.name, label
                ));
            }
        }

        if let Some(buckets) = &self.buckets {
            if self.kind != MetricKind::Histogram {
                return fail(format!(
                    "metric '{}': buckets are only valid for histograms",
                    self.name
                ));
            }
            if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
                return fail(format!(
                    "metric '{}': buckets must be non-empty and strictly increasing",
                    self.name
                ));
            }
        }

        Ok(())
    }
}

/// A SQL query executed on a fixed interval against one database.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Unique query name.
    pub name: String,
    /// SQL text.
    pub sql: String,
    /// Name of the target database.
    pub database: String,
    /// Metrics extracted from each result row.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    /// Collection interval (default: 60s).
    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Execution timeout (default: 30s).
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl QueryConfig {
    /// Create a query definition with default interval and timeout.
    pub fn new(
        name: impl Into<String>,
        database: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            database: database.into(),
            metrics: Vec::new(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add a metric definition.
    pub fn with_metric(mut self, metric: MetricConfig) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Set the collection interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accepted but suspicious settings, one message each.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.timeout > self.interval {
            warnings.push(format!(
                "query '{}': timeout {} exceeds interval {}, slow cycles will run back to back",
                self.name,
                humantime::format_duration(self.timeout),
                humantime::format_duration(self.interval)
            ));
        }
        if self.metrics.is_empty() {
            warnings.push(format!("query '{}': defines no metrics", self.name));
        }
        warnings
    }

    /// Validate the query in isolation (database references are checked by
    /// [`AppConfig::validate`](super::AppConfig::validate)).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "query name cannot be empty".to_string(),
            ));
        }
        if self.sql.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "query '{}': sql cannot be empty",
                self.name
            )));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "query '{}': interval must be positive",
                self.name
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "query '{}': timeout must be positive",
                self.name
            )));
        }

        for metric in &self.metrics {
            metric.validate().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("query '{}': {}", self.name, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
