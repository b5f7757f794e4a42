//! Splitting of large JSON arrays into size-bounded part files.
//!
//! Parts are written next to the input as `<stem>_part<N>.json`, numbered
//! from 1, pretty-printed with a two-space indent. Concatenating the parts
//! in numeric order gives back the original array.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::config::SplitConfig;
use crate::core::writers::{self, WriteError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Errors that can occur while splitting or merging JSON files.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Input path has no file name: {0}")]
    InvalidInputPath(PathBuf),

    #[error("Part file does not hold a JSON array: {0}")]
    NotAnArray(PathBuf),

    #[error("Invalid part file pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for split operations.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Size bound and check cadence for a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    pub max_size_bytes: u64,
    /// Size is measured after this many appended items and at the last item.
    pub check_interval: usize,
}

impl SplitOptions {
    pub fn from_config(config: &SplitConfig) -> Self {
        Self {
            max_size_bytes: (config.max_size_mb * BYTES_PER_MB) as u64,
            check_interval: config.check_interval,
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::from_config(&SplitConfig::default())
    }
}

/// One written part file.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    pub path: PathBuf,
    pub items: usize,
    pub bytes: u64,
}

/// Summary of a completed split.
#[derive(Debug, Clone, Default)]
pub struct SplitReport {
    pub total_items: usize,
    pub parts: Vec<PartInfo>,
}

/// Path of part `part` for an input with file stem `stem` in `dir`.
pub fn part_path(dir: &Path, stem: &str, part: usize) -> PathBuf {
    dir.join(format!("{}_part{}.json", stem, part))
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).map_err(|source| SplitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SplitError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Turn any JSON document into a list of items.
///
/// Arrays are used as-is, an object contributes its values in key order
/// and any other value becomes a single item.
pub fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            warn!("JSON document is an object, splitting its values");
            map.into_iter().map(|(_, v)| v).collect()
        }
        other => {
            warn!("JSON document is a single value, writing it as one item");
            vec![other]
        }
    }
}

/// Serialized size of a candidate chunk in bytes.
fn encoded_len(chunk: &[&Value]) -> serde_json::Result<u64> {
    serde_json::to_vec_pretty(chunk).map(|bytes| bytes.len() as u64)
}

/// Cut `items` into consecutive chunks bounded by `options`.
///
/// Returns the length of each chunk. Every chunk holds at least one item.
/// Because the size is only measured every `check_interval` items and a
/// single item is dropped on overshoot, a chunk can exceed the bound when
/// `check_interval` is larger than 1.
pub fn plan_chunks(items: &[Value], options: &SplitOptions) -> serde_json::Result<Vec<usize>> {
    let interval = options.check_interval.max(1);
    let total = items.len();
    let mut lengths = Vec::new();
    let mut start = 0;

    while start < total {
        let mut chunk: Vec<&Value> = Vec::new();
        for (i, item) in items.iter().enumerate().skip(start) {
            chunk.push(item);

            let checkpoint = chunk.len() % interval == 0 || i == total - 1;
            if checkpoint && encoded_len(&chunk)? > options.max_size_bytes {
                if chunk.len() > 1 {
                    chunk.pop();
                }
                break;
            }
        }

        debug!("Chunk at item {} holds {} items", start, chunk.len());
        lengths.push(chunk.len());
        start += chunk.len();
    }

    Ok(lengths)
}

/// Split the JSON file at `input` into `<stem>_part<N>.json` files next to it.
///
/// # Example
///
/// ```no_run
/// use mocap_pipeline::processors::splitter::{split_json_file, SplitOptions};
/// use std::path::Path;
///
/// let report = split_json_file(Path::new("data/data_filtered.json"), &SplitOptions::default()).unwrap();
/// println!("{} parts", report.parts.len());
/// ```
pub fn split_json_file(input: &Path, options: &SplitOptions) -> Result<SplitReport> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| SplitError::InvalidInputPath(input.to_path_buf()))?;
    let output_dir = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    info!("Loading {}", input.display());
    let items = into_items(read_json(input)?);
    info!("{} items in total", items.len());

    let mut report = SplitReport {
        total_items: items.len(),
        parts: Vec::new(),
    };

    let lengths = plan_chunks(&items, options).map_err(|source| SplitError::Json {
        path: input.to_path_buf(),
        source,
    })?;

    let mut start = 0;
    for (index, len) in lengths.into_iter().enumerate() {
        let path = part_path(&output_dir, &stem, index + 1);
        let chunk = &items[start..start + len];
        let bytes = writers::write_json_chunk(&path, chunk)?;

        info!(
            "Created {} ({:.2} MB, {} items)",
            path.display(),
            bytes as f64 / BYTES_PER_MB,
            len
        );

        report.parts.push(PartInfo {
            path,
            items: len,
            bytes,
        });
        start += len;
    }

    info!("Done, {} part files written", report.parts.len());
    Ok(report)
}

/// Concatenate `<stem>_part<N>.json` files in `dir` in numeric part order.
///
/// Returns an empty list when no part exists.
pub fn merge_parts(dir: &Path, stem: &str) -> Result<Vec<Value>> {
    let pattern = Regex::new(&format!(r"^{}_part(\d+)\.json$", regex::escape(stem)))?;

    let entries = fs::read_dir(dir).map_err(|source| SplitError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut parts: Vec<(u64, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            let number = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((number, path))
        })
        .collect();
    parts.sort_by_key(|(number, _)| *number);

    let mut merged = Vec::new();
    for (_, path) in parts {
        match read_json(&path)? {
            Value::Array(items) => {
                debug!("{}: {} items", path.display(), items.len());
                merged.extend(items);
            }
            _ => return Err(SplitError::NotAnArray(path)),
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_input(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    fn options(max_size_bytes: u64, check_interval: usize) -> SplitOptions {
        SplitOptions {
            max_size_bytes,
            check_interval,
        }
    }

    fn sample_items(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"id": i, "label": format!("item-{}", i), "values": [i, i * 2]}))
            .collect()
    }

    #[test]
    fn test_three_items_single_part() {
        let temp_dir = TempDir::new().unwrap();
        let value = json!([{"a": 1}, {"a": 2}, {"a": 3}]);
        let input = write_input(temp_dir.path(), "data.json", &value);

        let report = split_json_file(&input, &options(1024 * 1024, 100)).unwrap();

        assert_eq!(report.total_items, 3);
        assert_eq!(report.parts.len(), 1);
        assert_eq!(report.parts[0].path, temp_dir.path().join("data_part1.json"));
        assert_eq!(report.parts[0].items, 3);

        let content = fs::read_to_string(&report.parts[0].path).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, value);
        assert!(!temp_dir.path().join("data_part2.json").exists());
    }

    #[test]
    fn test_empty_array_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_input(temp_dir.path(), "empty.json", &json!([]));

        let report = split_json_file(&input, &options(1024, 100)).unwrap();

        assert_eq!(report.total_items, 0);
        assert!(report.parts.is_empty());
        assert!(merge_parts(temp_dir.path(), "empty").unwrap().is_empty());
    }

    #[test]
    fn test_oversized_single_item() {
        let temp_dir = TempDir::new().unwrap();
        let big = json!([{"blob": "x".repeat(500)}]);
        let input = write_input(temp_dir.path(), "big.json", &big);

        let report = split_json_file(&input, &options(64, 100)).unwrap();

        assert_eq!(report.parts.len(), 1);
        assert_eq!(report.parts[0].items, 1);
        assert!(report.parts[0].bytes > 64);
        assert_eq!(merge_parts(temp_dir.path(), "big").unwrap(), big.as_array().unwrap().clone());
    }

    #[test]
    fn test_exact_bound_with_check_every_item() {
        // "[\n" + k * "  \"xxxxxxxxxx\"" joined by ",\n" + "\n]" = 16k + 2 bytes
        let items: Vec<Value> = (0..10).map(|_| json!("xxxxxxxxxx")).collect();

        let lengths = plan_chunks(&items, &options(50, 1)).unwrap();

        assert_eq!(lengths, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_sparse_check_can_overshoot() {
        let items: Vec<Value> = (0..250).map(|_| json!("xxxxxxxxxx")).collect();

        // Bound fits 60 items, but size is only checked at 100
        let lengths = plan_chunks(&items, &options(16 * 60 + 2, 100)).unwrap();

        assert_eq!(lengths[0], 99);
        assert_eq!(lengths.iter().sum::<usize>(), 250);
    }

    #[test]
    fn test_round_trip_various_sizes() {
        for &(n, max_bytes) in &[
            (1usize, 1_000_000u64),
            (99, 1_000),
            (250, 1_000_000),
            (1_000, 2_000),
            (3_000, 150),
        ] {
            let temp_dir = TempDir::new().unwrap();
            let items = sample_items(n);
            let input = write_input(temp_dir.path(), "records.json", &Value::Array(items.clone()));

            let report = split_json_file(&input, &options(max_bytes, 100)).unwrap();

            assert_eq!(report.parts.iter().map(|p| p.items).sum::<usize>(), n);
            assert!(report.parts.iter().all(|p| p.items >= 1));
            let merged = merge_parts(temp_dir.path(), "records").unwrap();
            assert_eq!(merged, items, "round trip failed for n={}", n);
        }
    }

    #[test]
    fn test_big_integers_survive_split() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("data.json");
        let text = "[123456789012345678901234567890, 18446744073709551616, 0.1]";
        fs::write(&input, text).unwrap();

        let report = split_json_file(&input, &SplitOptions::default()).unwrap();
        assert_eq!(report.parts.len(), 1);

        let content = fs::read_to_string(&report.parts[0].path).unwrap();
        assert!(content.contains("123456789012345678901234567890"));
        assert!(content.contains("18446744073709551616"));
        assert!(!content.contains("e+"));

        let original: Value = serde_json::from_str(text).unwrap();
        let merged = merge_parts(temp_dir.path(), "data").unwrap();
        assert_eq!(Value::Array(merged), original);
    }

    #[test]
    fn test_object_and_scalar_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let object = write_input(temp_dir.path(), "obj.json", &json!({"b": 2, "a": 1}));
        let scalar = write_input(temp_dir.path(), "scalar.json", &json!(42));

        split_json_file(&object, &SplitOptions::default()).unwrap();
        split_json_file(&scalar, &SplitOptions::default()).unwrap();

        assert_eq!(merge_parts(temp_dir.path(), "obj").unwrap(), vec![json!(2), json!(1)]);
        assert_eq!(merge_parts(temp_dir.path(), "scalar").unwrap(), vec![json!(42)]);
    }

    #[test]
    fn test_merge_orders_parts_numerically() {
        let temp_dir = TempDir::new().unwrap();
        for part in [1usize, 2, 10] {
            let path = part_path(temp_dir.path(), "log", part);
            fs::write(&path, serde_json::to_vec(&json!([part])).unwrap()).unwrap();
        }
        // Unrelated files are ignored
        fs::write(temp_dir.path().join("log_part3.json.bak"), "[3]").unwrap();
        fs::write(temp_dir.path().join("other_part4.json"), "[4]").unwrap();

        let merged = merge_parts(temp_dir.path(), "log").unwrap();
        assert_eq!(merged, vec![json!(1), json!(2), json!(10)]);
    }

    #[test]
    fn test_merge_rejects_non_array_part() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(part_path(temp_dir.path(), "bad", 1), "{\"a\": 1}").unwrap();

        let result = merge_parts(temp_dir.path(), "bad");
        assert!(matches!(result, Err(SplitError::NotAnArray(_))));
    }

    #[test]
    fn test_invalid_json_input() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "[1, 2").unwrap();

        let result = split_json_file(&path, &SplitOptions::default());
        assert!(matches!(result, Err(SplitError::Json { .. })));
    }

    #[test]
    fn test_options_from_config() {
        let config = SplitConfig {
            max_size_mb: 2.0,
            ..SplitConfig::default()
        };
        let opts = SplitOptions::from_config(&config);
        assert_eq!(opts.max_size_bytes, 2 * 1024 * 1024);
        assert_eq!(opts.check_interval, 100);
    }
}
