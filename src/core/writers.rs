//! Data writers for CSV and JSON formats.
//!
//! This module provides functions for writing extracted tables to disk:
//! - CSV of tidy component records
//! - CSV of session fields (`index,data`)
//! - CSV of an averaged timeseries (`sample,mean`)
//! - Pretty-printed JSON arrays (splitter parts)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::loaders::{SessionTable, TidyTable};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Serialize rows into a CSV file with headers taken from the row type.
fn write_rows_csv<'a, T, I>(path: &Path, rows: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    for row in rows {
        csv_writer.serialize(row).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write tidy records to CSV.
///
/// Columns: `owner,type,folder,name,component_value,Event_Sequence,
/// Frame_Start,Frame_End,Time_Start,Time_End,frames,data`. Missing
/// attributes become empty cells. An empty table produces an empty file.
///
/// # Example
///
/// ```no_run
/// use mocap_pipeline::core::loaders::TidyTable;
/// use mocap_pipeline::core::writers::write_tidy_csv;
/// use std::path::Path;
///
/// let table = TidyTable::default();
/// write_tidy_csv(Path::new("timeseries.csv"), &table).unwrap();
/// ```
pub fn write_tidy_csv(path: &Path, table: &TidyTable) -> Result<()> {
    write_rows_csv(path, &table.records)
}

/// Write session fields to CSV with columns `index,data`.
pub fn write_session_csv(path: &Path, table: &SessionTable) -> Result<()> {
    write_rows_csv(path, &table.fields)
}

/// Write an averaged timeseries to CSV with columns `sample,mean`.
pub fn write_series_csv(path: &Path, values: &[f64]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["sample", "mean"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (i, value) in values.iter().enumerate() {
        csv_writer
            .write_record(&[i.to_string(), format!("{:.6}", value)])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write items as a pretty-printed JSON array (two-space indent).
///
/// Returns the number of bytes written.
pub fn write_json_chunk<T: Serialize>(path: &Path, items: &[T]) -> Result<u64> {
    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let bytes = serde_json::to_vec_pretty(items).map_err(|e| WriteError::Json {
        path: path_str.clone(),
        source: e,
    })?;

    let mut writer = create_buffered_writer(path)?;
    writer.write_all(&bytes).map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(bytes.len() as u64)
}
