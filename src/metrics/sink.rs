//! Per-kind metric sinks backed by Prometheus vectors.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts};

use crate::config::{MetricConfig, MetricKind};
use crate::metrics::RegistryError;

/// Write capability of one metric family, implemented once per metric kind.
///
/// `record` applies a value with the kind's semantics: gauges set,
/// counters increment, histograms observe. Each call touches exactly one
/// label combination, which Prometheus updates atomically.
pub trait MetricSink: Send + Sync + 'static {
    /// Metric kind implemented by this sink.
    fn kind(&self) -> MetricKind;

    /// Apply `value` to the child selected by `labels`, creating it on first use.
    fn record(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<(), RegistryError>;

    /// Collector to register with a Prometheus registry.
    fn collector(&self) -> Box<dyn Collector>;
}

/// Build the sink matching the definition's kind.
pub(crate) fn build_sink(definition: &MetricConfig) -> Result<Arc<dyn MetricSink>, RegistryError> {
    let labels: Vec<&str> = definition.labels.iter().map(String::as_str).collect();
    let name = definition.name.as_str();
    let help = definition.help.as_str();

    let sink: Arc<dyn MetricSink> = match definition.kind {
        MetricKind::Gauge => Arc::new(GaugeSink {
            vec: GaugeVec::new(Opts::new(name, help), &labels)?,
        }),
        MetricKind::Counter => Arc::new(CounterSink {
            name: definition.name.clone(),
            vec: CounterVec::new(Opts::new(name, help), &labels)?,
        }),
        MetricKind::Histogram => {
            let mut opts = HistogramOpts::new(name, help);
            if let Some(buckets) = &definition.buckets {
                opts = opts.buckets(buckets.clone());
            }
            Arc::new(HistogramSink {
                vec: HistogramVec::new(opts, &labels)?,
            })
        }
    };
    Ok(sink)
}

struct GaugeSink {
    vec: GaugeVec,
}

impl MetricSink for GaugeSink {
    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn record(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<(), RegistryError> {
        self.vec.get_metric_with(labels)?.set(value);
        Ok(())
    }

    fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}

struct CounterSink {
    name: String,
    vec: CounterVec,
}

impl MetricSink for CounterSink {
    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn record(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<(), RegistryError> {
        if !value.is_finite() || value < 0.0 {
            return Err(RegistryError::InvalidIncrement {
                metric: self.name.clone(),
                value,
            });
        }
        self.vec.get_metric_with(labels)?.inc_by(value);
        Ok(())
    }

    fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}

struct HistogramSink {
    vec: HistogramVec,
}

impl MetricSink for HistogramSink {
    fn kind(&self) -> MetricKind {
        MetricKind::Histogram
    }

    fn record(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<(), RegistryError> {
        self.vec.get_metric_with(labels)?.observe(value);
        Ok(())
    }

    fn collector(&self) -> Box<dyn Collector> {
        Box::new(self.vec.clone())
    }
}
