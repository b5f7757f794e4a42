//! Extraction of single per-trial metrics such as `Left_Stance_Time_StdDev`.

use std::path::Path;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::core::loaders::{self, TidyTable};
use crate::core::transforms;
use crate::processors::scanner;
use crate::processors::timeseries::{record_values, Result, StatsError};

/// Values of one metric together with their mean and standard deviation.
///
/// Mean and std are taken over every value, so a single `nodata` sample
/// makes both NaN.
#[derive(Debug, Clone)]
pub struct ParameterSummary {
    pub values: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl ParameterSummary {
    pub fn from_values(values: Vec<f64>) -> Self {
        let mean = transforms::mean(&values);
        let std = transforms::std_dev(&values);
        Self { values, mean, std }
    }

    /// Number of values that are not NaN.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Take the first record whose name contains `name` and summarize it.
pub fn extract_parameter(table: &TidyTable, name: &str) -> Result<ParameterSummary> {
    let mut matching = table
        .iter()
        .filter(|r| r.name.as_deref().is_some_and(|n| n.contains(name)));

    let record = matching
        .next()
        .ok_or_else(|| StatsError::NoRowsMatched(format!("name~'{}'", name)))?;

    let others = matching.count();
    if others > 0 {
        warn!(
            "{} further records match '{}', using {}",
            others,
            name,
            record.label()
        );
    }

    Ok(ParameterSummary::from_values(record_values(record)?))
}

/// Locate the per-trial metrics export under `root` and extract a metric.
pub fn get_parameter(root: &Path, name: &str, config: &PipelineConfig) -> Result<ParameterSummary> {
    let suffix = &config.scan.metrics_suffix;
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

    info!("Loaded {} metric records from {}", table.len(), path.display());
    extract_parameter(&table, name)
}
