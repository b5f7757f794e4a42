//! Command-line interface for the motion-capture pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{SplitConfig, StatsConfig};
use crate::core::loaders::{self, XmlTable};
use crate::core::writers;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "mocap-pipeline")]
#[command(about = "Motion-capture export extraction and JSON splitting", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the session descriptor found under a directory
    Session {
        /// Directory containing the session export
        directory: PathBuf,
        /// Write the field table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Flatten a single export file into a table
    Extract {
        /// XML export file
        file: PathBuf,
        /// Write the table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Average timeseries rows matching the given filters
    Timeseries {
        /// Directory containing the timeseries export
        directory: PathBuf,
        /// Name substring, e.g. "Left Knee Angles"
        #[arg(long)]
        name: String,
        /// Component substring, e.g. "X"
        #[arg(long)]
        component: String,
        /// Type substring, e.g. "DERIVED" or "LINK_MODEL_BASED"
        #[arg(long, visible_alias = "type")]
        kind: String,
        /// Owner substring (defaults to the configured owner filter)
        #[arg(long)]
        owner: Option<String>,
        /// Minimum row standard deviation (defaults to the configured threshold)
        #[arg(long)]
        threshold: Option<f64>,
        /// Write the averaged series to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract one per-trial metric with its mean and standard deviation
    Parameter {
        /// Directory containing the per-trial metrics export
        directory: PathBuf,
        /// Metric name substring, e.g. "Left_Stance_Time_StdDev"
        name: String,
    },

    /// Split a JSON array file into size-bounded part files
    Split {
        /// Input JSON file (defaults to the configured input)
        input: Option<PathBuf>,
        /// Approximate maximum size per part in MiB
        #[arg(long)]
        max_size_mb: Option<f64>,
        /// Number of items between size checks
        #[arg(long)]
        check_interval: Option<usize>,
    },

    /// Concatenate <stem>_partN.json files back into one array
    Merge {
        /// Directory holding the part files
        directory: PathBuf,
        /// File stem the parts were written with
        stem: String,
        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Run `f` behind a spinner, clearing it whatever the outcome.
fn with_spinner<T>(message: &str, f: impl FnOnce() -> T) -> T {
    let spinner = create_spinner(message);
    let result = f();
    spinner.finish_and_clear();
    result
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::Session { directory, output } => cmd_session(&directory, output.as_deref(), &config),
        Commands::Extract { file, output } => cmd_extract(&file, output.as_deref(), &config),
        Commands::Timeseries { directory, name, component, kind, owner, threshold, output } => {
            let stats = StatsConfig {
                owner_filter: owner.unwrap_or_else(|| config.stats.owner_filter.clone()),
                std_threshold: threshold.unwrap_or(config.stats.std_threshold),
                ..config.stats.clone()
            };
            cmd_timeseries(&directory, &name, &component, &kind, &stats, output.as_deref(), &config)
        }
        Commands::Parameter { directory, name } => cmd_parameter(&directory, &name, &config),
        Commands::Split { input, max_size_mb, check_interval } => {
            let split = SplitConfig {
                input: input.unwrap_or_else(|| config.split.input.clone()),
                max_size_mb: max_size_mb.unwrap_or(config.split.max_size_mb),
                check_interval: check_interval.unwrap_or(config.split.check_interval),
            };
            cmd_split(&split)
        }
        Commands::Merge { directory, stem, output } => cmd_merge(&directory, &stem, &output),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_session(directory: &Path, output: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    use crate::processors::scanner;

    let start = Instant::now();
    let suffix = &config.scan.session_suffix;

    let table = with_spinner("Searching for session descriptor...", || {
        scanner::load_session_data(directory, config)
    })
    .with_context(|| format!("Failed to load session data from {}", directory.display()))?;

    let Some(table) = table else {
        println!("No file ending with '{}' under {}", suffix, directory.display());
        return Ok(());
    };

    for field in table.iter() {
        println!("{:<30} {}", field.field, field.data.as_deref().unwrap_or(""));
    }

    if let Some(path) = output {
        writers::write_session_csv(path, &table)?;
    }

    print_summary(
        "Session Loaded",
        &[
            ("Directory", directory.display().to_string()),
            (
                "Source",
                table
                    .source_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            ("Fields", table.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_extract(file: &Path, output: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let start = Instant::now();

    let table = with_spinner("Parsing export...", || loaders::parse_xml(file, config))
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let kind = match &table {
        XmlTable::Session(_) => "session",
        XmlTable::Tidy(_) => "component records",
    };

    if let Some(path) = output {
        match &table {
            XmlTable::Session(session) => writers::write_session_csv(path, session)?,
            XmlTable::Tidy(tidy) => writers::write_tidy_csv(path, tidy)?,
        }
    }

    print_summary(
        "Extraction Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Table", kind.to_string()),
            ("Rows", table.len().to_string()),
            (
                "Output",
                output.map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_timeseries(
    directory: &Path,
    name: &str,
    component: &str,
    kind: &str,
    stats: &StatsConfig,
    output: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    use crate::processors::timeseries::{load_timeseries_data, TimeseriesQuery};

    let start = Instant::now();
    let query = TimeseriesQuery::new(name, component, kind, stats);
    let config = PipelineConfig {
        stats: stats.clone(),
        ..config.clone()
    };

    let summary = with_spinner("Averaging timeseries rows...", || {
        load_timeseries_data(directory, &query, &config)
    })
    .with_context(|| format!("Failed to load timeseries '{}' from {}", name, directory.display()))?;

    match output {
        Some(path) => writers::write_series_csv(path, &summary.mean)?,
        None => {
            let values: Vec<String> = summary.mean.iter().map(|v| format!("{:.4}", v)).collect();
            println!("{}", values.join(", "));
        }
    }

    print_summary(
        "Timeseries Averaged",
        &[
            ("Name", name.to_string()),
            ("Component", component.to_string()),
            ("Type", kind.to_string()),
            ("Owner", query.owner.clone()),
            ("Rows matched", summary.rows_matched.to_string()),
            ("Rows complete", summary.rows_complete.to_string()),
            ("Rows averaged", summary.rows_retained.to_string()),
            ("Samples", summary.mean.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_parameter(directory: &Path, name: &str, config: &PipelineConfig) -> Result<()> {
    use crate::processors::parameters;

    let start = Instant::now();

    let summary = parameters::get_parameter(directory, name, config)
        .with_context(|| format!("Failed to extract parameter '{}'", name))?;

    let values: Vec<String> = summary.values.iter().map(|v| v.to_string()).collect();
    println!("{}", values.join(", "));

    print_summary(
        "Parameter Extracted",
        &[
            ("Name", name.to_string()),
            ("Values", summary.values.len().to_string()),
            ("Valid values", summary.valid_count().to_string()),
            ("Mean", format!("{:.4}", summary.mean)),
            ("Std", format!("{:.4}", summary.std)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_split(split: &SplitConfig) -> Result<()> {
    use crate::processors::splitter::{self, SplitOptions};

    let start = Instant::now();
    let options = SplitOptions::from_config(split);

    println!("Splitting {}...", split.input.display());
    println!("Max size per part: {} MB", split.max_size_mb);

    let report = with_spinner("Writing part files...", || {
        splitter::split_json_file(&split.input, &options)
    })
    .with_context(|| format!("Failed to split {}", split.input.display()))?;

    for part in &report.parts {
        println!(
            "  {} ({:.2} MB, {} items)",
            part.path.display(),
            part.bytes as f64 / (1024.0 * 1024.0),
            part.items
        );
    }

    print_summary(
        "Split Complete",
        &[
            ("Input file", split.input.display().to_string()),
            ("Total items", report.total_items.to_string()),
            ("Parts written", report.parts.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_merge(directory: &Path, stem: &str, output: &Path) -> Result<()> {
    use crate::processors::splitter;

    let start = Instant::now();

    let items = splitter::merge_parts(directory, stem)
        .with_context(|| format!("Failed to merge parts of '{}'", stem))?;
    let bytes = writers::write_json_chunk(output, &items)?;

    print_summary(
        "Merge Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Items", items.len().to_string()),
            ("Output file", output.display().to_string()),
            ("Bytes", bytes.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}
