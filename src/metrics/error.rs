//! Metric registry error types.

use thiserror::Error;

use crate::config::MetricKind;

/// Errors raised while registering or updating metrics.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The same metric name was declared with a different kind or label set.
    #[error(
        "metric '{name}' is already registered as {existing_kind} with labels [{existing_labels}], \
         cannot redefine it as {kind} with labels [{labels}]"
    )]
    SchemaConflict {
        name: String,
        existing_kind: MetricKind,
        existing_labels: String,
        kind: MetricKind,
        labels: String,
    },

    /// An update referred to a metric that was never registered.
    #[error("metric '{0}' is not registered")]
    UnknownMetric(String),

    /// A counter update was negative or not finite.
    #[error("counter '{metric}' cannot be incremented by {value}")]
    InvalidIncrement { metric: String, value: f64 },

    /// Rejected by the Prometheus client (invalid name, label mismatch, ...).
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Rendering the exposition text failed.
    #[error("failed to encode metrics: {0}")]
    Encode(String),
}
