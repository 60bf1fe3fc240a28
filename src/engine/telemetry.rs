//! Self-metrics describing collection cycles.

use std::time::Duration;

use crate::config::{MetricConfig, MetricKind};
use crate::engine::CycleStatus;
use crate::metrics::{MetricHandle, MetricRegistry, RegistryError};

/// Cycles per query and status.
pub const COLLECTIONS_TOTAL: &str = "sql_exporter_collections_total";

/// Wall time of the last cycle per query.
pub const COLLECTION_DURATION: &str = "sql_exporter_collection_duration_seconds";

/// Handles to the exporter's own metrics, registered next to the user metrics.
#[derive(Debug, Clone)]
pub struct CollectionTelemetry {
    collections: MetricHandle,
    duration: MetricHandle,
}

impl CollectionTelemetry {
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        let collections = registry.get_or_create(
            &MetricConfig::new(
                COLLECTIONS_TOTAL,
                "Collection cycles by query and status",
                MetricKind::Counter,
            )
            .with_labels(["query", "status"]),
        )?;
        let duration = registry.get_or_create(
            &MetricConfig::new(
                COLLECTION_DURATION,
                "Wall time of the last collection cycle",
                MetricKind::Gauge,
            )
            .with_labels(["query"]),
        )?;

        Ok(Self {
            collections,
            duration,
        })
    }

    pub fn record(&self, query: &str, status: CycleStatus, elapsed: Duration) {
        let counted = self.collections.record(
            &[
                ("query".to_string(), query.to_string()),
                ("status".to_string(), status.to_string()),
            ],
            1.0,
        );
        let timed = self.duration.record(
            &[("query".to_string(), query.to_string())],
            elapsed.as_secs_f64(),
        );

        if let Err(e) = counted.and(timed) {
            tracing::debug!(query, error = %e, "Failed to record collection telemetry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SampleValue;

    #[test]
    fn test_record_counts_by_status() {
        let registry = MetricRegistry::new();
        let telemetry = CollectionTelemetry::register(&registry).unwrap();

        telemetry.record("q", CycleStatus::Success, Duration::from_millis(250));
        telemetry.record("q", CycleStatus::Success, Duration::from_millis(500));
        telemetry.record("q", CycleStatus::QueryFailure, Duration::from_secs(1));

        let counts = registry.samples(COLLECTIONS_TOTAL);
        assert_eq!(counts.len(), 2);
        let success = counts
            .iter()
            .find(|s| s.labels["status"] == "success")
            .unwrap();
        assert_eq!(success.value, SampleValue::Counter(2.0));

        let duration = registry.samples(COLLECTION_DURATION);
        assert_eq!(duration[0].value, SampleValue::Gauge(1.0));
    }

    #[test]
    fn test_register_twice_shares_families() {
        let registry = MetricRegistry::new();
        CollectionTelemetry::register(&registry).unwrap();
        CollectionTelemetry::register(&registry).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
