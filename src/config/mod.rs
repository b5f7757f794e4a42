//! Configuration types for the motion-capture pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name suffixes used to locate export files in a session directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Suffix of the timeseries export
    #[serde(default = "default_timeseries_suffix")]
    pub timeseries_suffix: String,

    /// Suffix of the session descriptor
    #[serde(default = "default_session_suffix")]
    pub session_suffix: String,

    /// Suffix of the per-trial metrics export
    #[serde(default = "default_metrics_suffix")]
    pub metrics_suffix: String,
}

fn default_timeseries_suffix() -> String {
    "timeseries.xml".to_string()
}

fn default_session_suffix() -> String {
    "session.xml".to_string()
}

fn default_metrics_suffix() -> String {
    "metrics_per_trial.xml".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeseries_suffix: default_timeseries_suffix(),
            session_suffix: default_session_suffix(),
            metrics_suffix: default_metrics_suffix(),
        }
    }
}

/// Configuration for session descriptor extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Encoding label of session files (WHATWG label, e.g. "utf-16").
    /// A byte-order mark in the file takes precedence.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Element paths whose first match contributes fields, after the root row
    #[serde(default = "default_selectors")]
    pub selectors: Vec<String>,
}

fn default_encoding() -> String {
    "utf-16".to_string()
}

fn default_selectors() -> Vec<String> {
    vec![
        "Session/Fields".to_string(),
        "Subsession/Fields".to_string(),
        "Measurement/Fields".to_string(),
    ]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            selectors: default_selectors(),
        }
    }
}

/// How `owner/type/folder` levels are walked in generic exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Each level is searched inside the element of the level above.
    #[default]
    Nested,
    /// Legacy behaviour: owner, type and folder are each searched across the
    /// whole document, yielding every combination.
    CrossProduct,
}

/// Configuration for generic export extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub traversal: TraversalMode,
}

/// Configuration for timeseries statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Owner substring every timeseries row must contain
    #[serde(default = "default_owner_filter")]
    pub owner_filter: String,

    /// Rows need a standard deviation strictly above this to be averaged
    #[serde(default = "default_std_threshold")]
    pub std_threshold: f64,

    /// Multiplier applied to the IQR for Tukey fences
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,

    /// Drop rows whose standard deviation falls outside the Tukey fences
    /// of all retained rows
    #[serde(default)]
    pub reject_outlier_rows: bool,
}

fn default_owner_filter() -> String {
    "Gait".to_string()
}

fn default_std_threshold() -> f64 {
    1.0
}

fn default_iqr_multiplier() -> f64 {
    1.5
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            owner_filter: default_owner_filter(),
            std_threshold: default_std_threshold(),
            iqr_multiplier: default_iqr_multiplier(),
            reject_outlier_rows: false,
        }
    }
}

/// Configuration for the JSON splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Input used when none is given on the command line
    #[serde(default = "default_split_input")]
    pub input: PathBuf,

    /// Approximate upper bound per part file, in MiB
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: f64,

    /// Number of appended items between size checks
    #[serde(default = "default_check_interval")]
    pub check_interval: usize,
}

fn default_split_input() -> PathBuf {
    PathBuf::from("data/data_filtered.json")
}

fn default_max_size_mb() -> f64 {
    90.0
}

fn default_check_interval() -> usize {
    100
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            input: default_split_input(),
            max_size_mb: default_max_size_mb(),
            check_interval: default_check_interval(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub split: SplitConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
