//! Data processing modules.

pub mod parameters;
pub mod scanner;
pub mod splitter;
pub mod timeseries;

// Re-export key types for convenience
pub use parameters::{extract_parameter, get_parameter, ParameterSummary};
pub use scanner::{
    find_matching_files, load_session_data, scan_for_suffix, select_table, ScanOutcome,
};
pub use splitter::{
    merge_parts, plan_chunks, split_json_file, PartInfo, SplitError, SplitOptions, SplitReport,
};
pub use timeseries::{
    load_timeseries_data, summarize_timeseries, RowStats, StatsError, TimeseriesQuery,
    TimeseriesSummary,
};
