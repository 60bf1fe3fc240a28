//! Metric registry mapping metric names to typed Prometheus families.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::proto::MetricType;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::config::{MetricConfig, MetricKind};
use crate::metrics::sink::{MetricSink, build_sink};
use crate::metrics::{MetricUpdate, RegistryError};

/// Content type of [`MetricRegistry::render`] output.
pub const TEXT_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Handle to one registered metric family.
///
/// Cloning is cheap; all clones write to the same family.
#[derive(Clone)]
pub struct MetricHandle {
    name: String,
    help: String,
    kind: MetricKind,
    labels: Vec<String>,
    sink: Arc<dyn MetricSink>,
}

impl std::fmt::Debug for MetricHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl MetricHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Declared label names, in registration order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Record a value for one label combination.
    ///
    /// Label pairs may come in any order but must name exactly the declared labels.
    pub fn record(&self, labels: &[(String, String)], value: f64) -> Result<(), RegistryError> {
        let labels: HashMap<&str, &str> = labels
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        self.sink.record(&labels, value)
    }

    fn matches_schema(&self, definition: &MetricConfig) -> bool {
        let mut mine: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        let mut theirs: Vec<&str> = definition.labels.iter().map(String::as_str).collect();
        mine.sort_unstable();
        theirs.sort_unstable();
        self.kind == definition.kind && mine == theirs
    }
}

/// Value of one label combination in a [`MetricSample`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Gauge(f64),
    Counter(f64),
    Histogram { count: u64, sum: f64 },
}

impl SampleValue {
    /// Scalar value for gauges and counters, observation sum for histograms.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Gauge(v) | Self::Counter(v) => v,
            Self::Histogram { sum, .. } => sum,
        }
    }
}

/// Point-in-time reading of one label combination.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: BTreeMap<String, String>,
    pub value: SampleValue,
}

/// Process-wide set of metric families.
///
/// Families are created on first reference and kept for the process
/// lifetime. Label combinations inside a family are created on first
/// observation and never evicted, so high-cardinality label columns grow
/// memory without bound.
pub struct MetricRegistry {
    registry: Registry,
    families: RwLock<HashMap<String, MetricHandle>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("families", &self.len())
            .finish_non_exhaustive()
    }
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: RwLock::new(HashMap::new()),
        }
    }

    /// Return the family for `definition`, creating it on first call.
    ///
    /// # Errors
    /// Returns `RegistryError::SchemaConflict` if the name is already taken by a
    /// family with a different kind or label set, or `RegistryError::Prometheus`
    /// if the name, labels or buckets are rejected.
    pub fn get_or_create(&self, definition: &MetricConfig) -> Result<MetricHandle, RegistryError> {
        let mut families = self
            .families
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = families.get(&definition.name) {
            if !existing.matches_schema(definition) {
                return Err(RegistryError::SchemaConflict {
                    name: definition.name.clone(),
                    existing_kind: existing.kind,
                    existing_labels: existing.labels.join(", "),
                    kind: definition.kind,
                    labels: definition.labels.join(", "),
                });
            }
            if existing.help != definition.help {
                tracing::debug!(
                    metric = %definition.name,
                    "Metric redeclared with different help text, keeping the first"
                );
            }
            return Ok(existing.clone());
        }

        let sink = build_sink(definition)?;
        self.registry.register(sink.collector())?;

        let handle = MetricHandle {
            name: definition.name.clone(),
            help: definition.help.clone(),
            kind: definition.kind,
            labels: definition.labels.clone(),
            sink,
        };
        families.insert(definition.name.clone(), handle.clone());
        tracing::debug!(metric = %definition.name, kind = %definition.kind, "Metric registered");
        Ok(handle)
    }

    /// Look up a registered family.
    pub fn get(&self, name: &str) -> Option<MetricHandle> {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Apply one update produced by the result mapper.
    pub fn apply(&self, update: &MetricUpdate) -> Result<(), RegistryError> {
        let handle = self
            .get(&update.metric)
            .ok_or_else(|| RegistryError::UnknownMetric(update.metric.clone()))?;
        if handle.kind != update.kind {
            return Err(RegistryError::SchemaConflict {
                name: update.metric.clone(),
                existing_kind: handle.kind,
                existing_labels: handle.labels.join(", "),
                kind: update.kind,
                labels: update
                    .labels
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        handle.record(&update.labels, update.value)
    }

    /// Number of registered families.
    pub fn len(&self) -> usize {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every live label combination.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();

        for family in self.registry.gather() {
            let kind = match family.get_field_type() {
                MetricType::GAUGE => MetricKind::Gauge,
                MetricType::COUNTER => MetricKind::Counter,
                MetricType::HISTOGRAM => MetricKind::Histogram,
                _ => continue,
            };

            for metric in family.get_metric() {
                let labels = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                let value = match kind {
                    MetricKind::Gauge => SampleValue::Gauge(metric.get_gauge().get_value()),
                    MetricKind::Counter => SampleValue::Counter(metric.get_counter().get_value()),
                    MetricKind::Histogram => {
                        let histogram = metric.get_histogram();
                        SampleValue::Histogram {
                            count: histogram.get_sample_count(),
                            sum: histogram.get_sample_sum(),
                        }
                    }
                };
                samples.push(MetricSample {
                    name: family.get_name().to_string(),
                    help: family.get_help().to_string(),
                    kind,
                    labels,
                    value,
                });
            }
        }

        samples
    }

    /// Samples of one metric name.
    pub fn samples(&self, name: &str) -> Vec<MetricSample> {
        self.snapshot()
            .into_iter()
            .filter(|sample| sample.name == name)
            .collect()
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Encode(e.to_string()))
    }
}
