//! Walks a data directory and loads every file, one transaction per file.

use super::error::PipelineError;
use super::log_loader::{process_log_file, LevelPolicy, LogFileStats};
use super::song_loader::{process_song_file, SongFileStats};
use crate::warehouse::WarehouseStore;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Extension of the data files, compared case-insensitively.
const DATA_FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Songs,
    Logs,
}

/// What to do when a single file fails to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the run at the first failing file.
    #[default]
    Abort,
    /// Roll the failing file back and continue with the next one.
    Skip,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub error_policy: ErrorPolicy,
    pub level_policy: LevelPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub files_found: usize,
    pub files_loaded: usize,
    pub failed_files: Vec<PathBuf>,
    pub songs: SongFileStats,
    pub logs: LogFileStats,
}

/// Finds every data file under `dir`, sorted by name at each level.
///
/// Log files are named after their day, so this is also chronological order.
pub fn find_data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let is_data_file = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(DATA_FILE_EXTENSION))
                .unwrap_or(false);
        if is_data_file {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn process_file(
    store: &dyn WarehouseStore,
    path: &Path,
    kind: DataKind,
    options: &BatchOptions,
    report: &mut BatchReport,
) -> Result<()> {
    store.begin()?;
    match kind {
        DataKind::Songs => report.songs += process_song_file(store, path)?,
        DataKind::Logs => report.logs += process_log_file(store, path, options.level_policy)?,
    }
    store.commit()
}

/// Loads every data file under `dir` with the loader for `kind`.
pub fn process_data(
    store: &dyn WarehouseStore,
    dir: &Path,
    kind: DataKind,
    options: &BatchOptions,
) -> Result<BatchReport, PipelineError> {
    let files = find_data_files(dir).map_err(PipelineError::Setup)?;
    let mut report = BatchReport {
        files_found: files.len(),
        ..Default::default()
    };
    info!("{} files found in {}", files.len(), dir.display());

    for (index, path) in files.iter().enumerate() {
        if let Err(error) = process_file(store, path, kind, options, &mut report) {
            store.rollback().map_err(PipelineError::Setup)?;
            match options.error_policy {
                ErrorPolicy::Abort => {
                    return Err(PipelineError::File {
                        path: path.clone(),
                        source: error,
                    })
                }
                ErrorPolicy::Skip => {
                    warn!("Skipping {}: {:#}", path.display(), error);
                    report.failed_files.push(path.clone());
                }
            }
        } else {
            report.files_loaded += 1;
        }
        info!(" > {}/{} files processed.", index + 1, files.len());
    }
    Ok(report)
}
