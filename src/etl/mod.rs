//! Loading the data lake into the warehouse.

pub mod batch;
mod error;
pub mod integrity;
pub mod log_loader;
pub mod pipeline;
pub mod song_loader;

pub use batch::{process_data, BatchOptions, BatchReport, DataKind, ErrorPolicy};
pub use error::PipelineError;
pub use integrity::{verify, IntegrityReport, IntegrityVerdict};
pub use log_loader::{process_log_file, LevelPolicy, LogFileStats};
pub use pipeline::{run, run_with_store, PipelineSummary};
pub use song_loader::{process_song_file, SongFileStats};
