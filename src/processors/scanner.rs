//! Recursive discovery of export files by name suffix.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::core::loaders::{self, LoaderError, SessionTable, XmlTable};

/// Outcome of searching a directory tree for a file suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No file matched.
    NotFound,
    /// Exactly one file matched.
    Found { path: PathBuf },
    /// Several files matched; `chosen` is the first in walk order.
    Ambiguous {
        chosen: PathBuf,
        ignored: Vec<PathBuf>,
    },
}

impl ScanOutcome {
    /// The path that callers should use, if any.
    pub fn selected(&self) -> Option<&Path> {
        match self {
            ScanOutcome::NotFound => None,
            ScanOutcome::Found { path } => Some(path),
            ScanOutcome::Ambiguous { chosen, .. } => Some(chosen),
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, ScanOutcome::NotFound)
    }
}

/// Walk `root` and collect every file whose name ends with `suffix`.
///
/// Within each directory, files are visited before subdirectories and both
/// in lexicographic order, so a match directly under a directory wins over
/// one nested deeper. Unreadable entries are skipped.
pub fn find_matching_files(root: &Path, suffix: &str) -> loaders::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(LoaderError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut matches = Vec::new();
    let walker = WalkDir::new(root).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if entry.file_name().to_string_lossy().ends_with(suffix) {
            matches.push(entry.into_path());
        }
    }

    Ok(matches)
}

/// Search `root` for a file ending with `suffix`.
pub fn scan_for_suffix(root: &Path, suffix: &str) -> loaders::Result<ScanOutcome> {
    let mut matches = find_matching_files(root, suffix)?;

    let outcome = match matches.len() {
        0 => ScanOutcome::NotFound,
        1 => ScanOutcome::Found {
            path: matches.remove(0),
        },
        _ => {
            let chosen = matches.remove(0);
            warn!(
                "{} files ending with '{}' under {}, using {}",
                matches.len() + 1,
                suffix,
                root.display(),
                chosen.display()
            );
            ScanOutcome::Ambiguous {
                chosen,
                ignored: matches,
            }
        }
    };

    Ok(outcome)
}

/// Find the first file ending with `suffix` under `root` and parse it.
///
/// Returns `Ok(None)` when no file matched.
pub fn select_table(
    root: &Path,
    suffix: &str,
    config: &PipelineConfig,
) -> loaders::Result<Option<XmlTable>> {
    match scan_for_suffix(root, suffix)?.selected() {
        Some(path) => loaders::parse_xml(path, config).map(Some),
        None => {
            debug!("No file ending with '{}' under {}", suffix, root.display());
            Ok(None)
        }
    }
}

/// Locate the session descriptor under `root` and return its field table.
pub fn load_session_data(root: &Path, config: &PipelineConfig) -> loaders::Result<Option<SessionTable>> {
    let table = select_table(root, &config.scan.session_suffix, config)?;
    Ok(table.and_then(XmlTable::into_session))
}
