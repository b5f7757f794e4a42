//! Motion-capture export extraction and JSON splitting.
//!
//! This crate provides tools for:
//! - Locating session, timeseries and per-trial metric exports in a directory tree
//! - Flattening XML exports into tidy component records or session field tables
//! - Averaging gait timeseries rows with missing-value and variability filtering
//! - Extracting single per-trial metrics with their mean and standard deviation
//! - Splitting large JSON arrays into size-bounded part files
//!
//! # Example
//!
//! ```no_run
//! use mocap_pipeline::processors::timeseries::{load_timeseries_data, TimeseriesQuery};
//! use mocap_pipeline::PipelineConfig;
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let query = TimeseriesQuery::new("Left Knee Angles", "X", "DERIVED", &config.stats);
//! let summary = load_timeseries_data(Path::new("data/patient01"), &query, &config).unwrap();
//! println!("{} samples", summary.mean.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    ExtractionConfig, PipelineConfig, ScanConfig, SessionConfig, SplitConfig, StatsConfig,
    TraversalMode,
};
pub use crate::core::loaders::{SessionTable, TidyRecord, TidyTable, XmlTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
