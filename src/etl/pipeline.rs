//! The full run: song catalog, then activity logs, then verification.

use super::batch::{process_data, BatchOptions, BatchReport, DataKind};
use super::error::PipelineError;
use super::integrity::{verify, IntegrityReport};
use crate::config::AppConfig;
use crate::warehouse::{SqliteWarehouseStore, StoreOptions, WarehouseStore};
use anyhow::Context;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub songs: BatchReport,
    pub logs: BatchReport,
    pub integrity: IntegrityReport,
}

impl PipelineSummary {
    pub fn failed_files(&self) -> usize {
        self.songs.failed_files.len() + self.logs.failed_files.len()
    }
}

/// Runs the loaders and the verifier against an already opened store.
pub fn run_with_store(
    store: &dyn WarehouseStore,
    song_dir: &Path,
    log_dir: &Path,
    options: &BatchOptions,
) -> Result<PipelineSummary, PipelineError> {
    info!("Song data processing started");
    let songs = process_data(store, song_dir, DataKind::Songs, options)?;
    info!("Song data processing completed");

    info!("Log data processing started");
    let logs = process_data(store, log_dir, DataKind::Logs, options)?;
    info!("Log data processing completed");

    info!("Integrity verification started");
    let integrity = verify(store).map_err(PipelineError::Setup)?;
    info!("Integrity verification completed");

    Ok(PipelineSummary {
        songs,
        logs,
        integrity,
    })
}

/// Runs the whole pipeline for a resolved configuration.
///
/// The configuration has already checked the input directories, so the
/// database is only opened for runs that can start. The connection is closed
/// when the store goes out of scope, whichever way this returns.
pub fn run(config: &AppConfig) -> Result<PipelineSummary, PipelineError> {
    let db_path = config.database.db_path();
    info!("Opening warehouse database at {:?}...", db_path);
    let store = SqliteWarehouseStore::open(
        &db_path,
        &StoreOptions {
            play_key: config.play_key,
            reset: config.reset,
            busy_timeout: Some(config.database.busy_timeout),
        },
    )
    .context("Failed to open the warehouse")
    .map_err(PipelineError::Setup)?;

    let options = BatchOptions {
        error_policy: config.error_policy,
        level_policy: config.level_policy,
    };
    run_with_store(
        &store,
        &config.song_data_dir(),
        &config.log_data_dir(),
        &options,
    )
}
