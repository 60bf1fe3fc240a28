//! Metric storage and result mapping.
//!
//! [`MetricRegistry`] owns every metric family exposed by the process.
//! Families are typed through a per-kind [`MetricSink`] chosen once at
//! registration. [`map_rows`] turns query results into [`MetricUpdate`]s that
//! the registry applies.

mod error;
mod mapper;
mod registry;
mod sink;

pub use error::RegistryError;
pub use mapper::{MappedRows, MappingDiagnostic, MetricUpdate, map_rows};
pub use registry::{MetricHandle, MetricRegistry, MetricSample, SampleValue, TEXT_CONTENT_TYPE};
pub use sink::MetricSink;
