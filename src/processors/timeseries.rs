//! Averaging of timeseries rows selected from a tidy export.
//!
//! Rows are selected by substring filters on name, component, type and
//! owner, parsed into a sample matrix, stripped of incomplete rows and of
//! rows that barely vary, then averaged column-wise.

use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::config::{PipelineConfig, StatsConfig};
use crate::core::loaders::{self, LoaderError, TidyRecord, TidyTable};
use crate::core::transforms::{self, Fences};
use crate::processors::scanner;

/// Errors that can occur while computing statistics from an export.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("No file ending with '{suffix}' under {root}")]
    FileNotFound { root: PathBuf, suffix: String },

    #[error("No rows match {0}")]
    NoRowsMatched(String),

    #[error("Record {0} has no data attribute")]
    MissingData(String),

    #[error("Malformed number '{token}' in record {record}")]
    MalformedNumber { record: String, token: String },

    #[error("Record {record} has {found} samples, expected {expected}")]
    RaggedRows {
        record: String,
        expected: usize,
        found: usize,
    },

    #[error("All {0} matching rows contain missing samples")]
    NoCompleteRows(usize),

    #[error("None of {complete} complete rows has a standard deviation above {threshold}")]
    NoRowsAboveThreshold { complete: usize, threshold: f64 },

    #[error("{0} is a session descriptor, not a component export")]
    UnexpectedTable(PathBuf),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Substring filters selecting timeseries rows. All four must match.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesQuery {
    /// e.g. "Left Knee Angles"
    pub name: String,
    /// e.g. "X"
    pub component: String,
    /// e.g. "DERIVED" or "LINK_MODEL_BASED"
    pub kind: String,
    pub owner: String,
}

impl TimeseriesQuery {
    /// Build a query using the configured owner filter.
    pub fn new(name: &str, component: &str, kind: &str, config: &StatsConfig) -> Self {
        Self {
            name: name.to_string(),
            component: component.to_string(),
            kind: kind.to_string(),
            owner: config.owner_filter.clone(),
        }
    }

    /// Whether a record passes all four filters. Missing fields never match.
    pub fn matches(&self, record: &TidyRecord) -> bool {
        contains(&record.name, &self.name)
            && contains(&record.component_value, &self.component)
            && contains(&record.kind, &self.kind)
            && contains(&record.owner, &self.owner)
    }

    fn describe(&self) -> String {
        format!(
            "name~'{}' component~'{}' type~'{}' owner~'{}'",
            self.name, self.component, self.kind, self.owner
        )
    }
}

fn contains(field: &Option<String>, needle: &str) -> bool {
    field.as_deref().is_some_and(|v| v.contains(needle))
}

/// Per-row statistics of a complete (NaN-free) row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowStats {
    /// Record label, see [`TidyRecord::label`].
    pub record: String,
    pub std: f64,
    pub fences: Fences,
    pub retained: bool,
}

/// Outcome of averaging a timeseries selection.
#[derive(Debug, Clone)]
pub struct TimeseriesSummary {
    /// Column-wise mean of retained rows.
    pub mean: Vec<f64>,
    pub rows_matched: usize,
    pub rows_complete: usize,
    pub rows_retained: usize,
    /// One entry per complete row, in document order.
    pub rows: Vec<RowStats>,
}

/// Parse the `data` field of a record into samples.
pub fn record_values(record: &TidyRecord) -> Result<Vec<f64>> {
    let data = record
        .data
        .as_deref()
        .ok_or_else(|| StatsError::MissingData(record.label()))?;

    transforms::parse_data_field(data).map_err(|token| StatsError::MalformedNumber {
        record: record.label(),
        token,
    })
}

/// Select, filter and average timeseries rows from a tidy table.
///
/// # Errors
///
/// Fails when no row matches, when rows differ in length, when every row
/// has a missing sample, or when no row varies more than the configured
/// threshold.
pub fn summarize_timeseries(
    table: &TidyTable,
    query: &TimeseriesQuery,
    config: &StatsConfig,
) -> Result<TimeseriesSummary> {
    let selected: Vec<&TidyRecord> = table.iter().filter(|r| query.matches(r)).collect();
    if selected.is_empty() {
        return Err(StatsError::NoRowsMatched(query.describe()));
    }

    let mut matrix: Vec<(&TidyRecord, Vec<f64>)> = Vec::with_capacity(selected.len());
    for record in selected.iter().copied() {
        let values = record_values(record)?;
        if let Some((first, first_values)) = matrix.first() {
            if first_values.len() != values.len() {
                debug!("Row length differs from {}", first.label());
                return Err(StatsError::RaggedRows {
                    record: record.label(),
                    expected: first_values.len(),
                    found: values.len(),
                });
            }
        }
        matrix.push((record, values));
    }

    let rows_matched = matrix.len();
    let complete: Vec<(&TidyRecord, Vec<f64>)> = matrix
        .into_iter()
        .filter(|(_, values)| !values.iter().any(|v| v.is_nan()))
        .collect();
    if complete.is_empty() {
        return Err(StatsError::NoCompleteRows(rows_matched));
    }

    let mut rows: Vec<RowStats> = complete
        .iter()
        .map(|(record, values)| {
            let std = transforms::std_dev(values);
            RowStats {
                record: record.label(),
                std,
                // Complete rows are non-empty and NaN-free
                fences: Fences::from_values(values, config.iqr_multiplier).unwrap_or(Fences {
                    q25: f64::NAN,
                    q75: f64::NAN,
                    lower: f64::NAN,
                    upper: f64::NAN,
                }),
                retained: std > config.std_threshold,
            }
        })
        .collect();

    if config.reject_outlier_rows {
        reject_outlier_rows(&mut rows, config.iqr_multiplier);
    }

    let retained: Vec<Vec<f64>> = complete
        .iter()
        .zip(&rows)
        .filter(|(_, stats)| stats.retained)
        .map(|((_, values), _)| values.clone())
        .collect();

    if retained.is_empty() {
        return Err(StatsError::NoRowsAboveThreshold {
            complete: complete.len(),
            threshold: config.std_threshold,
        });
    }

    debug!(
        "{}: {} matched, {} complete, {} retained",
        query.describe(),
        rows_matched,
        complete.len(),
        retained.len()
    );

    Ok(TimeseriesSummary {
        mean: transforms::column_means(&retained),
        rows_matched,
        rows_complete: complete.len(),
        rows_retained: retained.len(),
        rows,
    })
}

/// Un-retain rows whose standard deviation lies outside the Tukey fences
/// computed over the standard deviations of currently retained rows.
fn reject_outlier_rows(rows: &mut [RowStats], k: f64) {
    let stds: Vec<f64> = rows.iter().filter(|r| r.retained).map(|r| r.std).collect();
    let Some(fences) = Fences::from_values(&stds, k) else {
        return;
    };

    for row in rows.iter_mut().filter(|r| r.retained) {
        if !fences.contains(row.std) {
            debug!("Rejecting outlier row {} (std {:.3})", row.record, row.std);
            row.retained = false;
        }
    }
}

/// Locate the timeseries export under `root` and average the selected rows.
pub fn load_timeseries_data(
    root: &Path,
    query: &TimeseriesQuery,
    config: &PipelineConfig,
) -> Result<TimeseriesSummary> {
    let suffix = &config.scan.timeseries_suffix;
    let path = scanner::scan_for_suffix(root, suffix)?
        .selected()
        .map(Path::to_path_buf)
        .ok_or_else(|| StatsError::FileNotFound {
            root: root.to_path_buf(),
            suffix: suffix.clone(),
        })?;

    let table = loaders::parse_xml(&path, config)?
        .into_tidy()
        .ok_or_else(|| StatsError::UnexpectedTable(path.clone()))?;

    info!("Loaded {} records from {}", table.len(), path.display());
    summarize_timeseries(&table, query, &config.stats)
}
