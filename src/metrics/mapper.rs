//! Translation of query result rows into metric updates.
//!
//! Mapping is pure: the same rows and definitions always produce the same
//! updates and diagnostics, in row-major, metric-minor order.

use std::fmt;

use crate::config::{MetricConfig, MetricKind};
use crate::database::ResultRow;

/// One value to apply to one label combination of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub metric: String,
    /// Label name/value pairs in declaration order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
    pub kind: MetricKind,
}

/// A (row, metric) pair that could not be mapped cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingDiagnostic {
    /// The value column is not in the row; the pair was skipped.
    MissingColumn {
        row: usize,
        metric: String,
        column: String,
    },
    /// The value column is NULL or not numeric; the pair was skipped.
    ValueCoercionFailure {
        row: usize,
        metric: String,
        column: String,
        value: String,
    },
    /// A label column is not in the row; the label was set to "".
    MissingLabel {
        row: usize,
        metric: String,
        label: String,
    },
    /// The registry refused the update.
    UpdateRejected { metric: String, reason: String },
}

impl MappingDiagnostic {
    /// Whether the affected update was dropped.
    pub fn is_skip(&self) -> bool {
        !matches!(self, Self::MissingLabel { .. })
    }
}

impl fmt::Display for MappingDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn {
                row,
                metric,
                column,
            } => write!(
                f,
                "row {row}: metric '{metric}' skipped, value column '{column}' not found"
            ),
            Self::ValueCoercionFailure {
                row,
                metric,
                column,
                value,
            } => write!(
                f,
                "row {row}: metric '{metric}' skipped, column '{column}' value '{value}' is not numeric"
            ),
            Self::MissingLabel { row, metric, label } => write!(
                f,
                "row {row}: metric '{metric}' label column '{label}' not found, using empty value"
            ),
            Self::UpdateRejected { metric, reason } => {
                write!(f, "metric '{metric}' update rejected: {reason}")
            }
        }
    }
}

/// Result of mapping a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRows {
    pub updates: Vec<MetricUpdate>,
    pub diagnostics: Vec<MappingDiagnostic>,
}

/// Map every row against every metric definition.
pub fn map_rows(rows: &[ResultRow], metrics: &[MetricConfig]) -> MappedRows {
    let mut mapped = MappedRows::default();

    for (index, row) in rows.iter().enumerate() {
        for metric in metrics {
            if let Some(update) = map_one(index, row, metric, &mut mapped.diagnostics) {
                mapped.updates.push(update);
            }
        }
    }

    mapped
}

fn map_one(
    index: usize,
    row: &ResultRow,
    metric: &MetricConfig,
    diagnostics: &mut Vec<MappingDiagnostic>,
) -> Option<MetricUpdate> {
    let Some(cell) = row.get(&metric.value_column) else {
        diagnostics.push(MappingDiagnostic::MissingColumn {
            row: index,
            metric: metric.name.clone(),
            column: metric.value_column.clone(),
        });
        return None;
    };

    let Some(value) = cell.as_f64() else {
        diagnostics.push(MappingDiagnostic::ValueCoercionFailure {
            row: index,
            metric: metric.name.clone(),
            column: metric.value_column.clone(),
            value: cell.to_string(),
        });
        return None;
    };

    let labels = metric
        .labels
        .iter()
        .map(|label| {
            let value = match row.get(label) {
                Some(cell) => cell.to_label_value(),
                None => {
                    diagnostics.push(MappingDiagnostic::MissingLabel {
                        row: index,
                        metric: metric.name.clone(),
                        label: label.clone(),
                    });
                    String::new()
                }
            };
            (label.clone(), value)
        })
        .collect();

    Some(MetricUpdate {
        metric: metric.name.clone(),
        labels,
        value,
        kind: metric.kind,
    })
}
