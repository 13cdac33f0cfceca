//! Sparkify ETL Library
//!
//! Loads the song catalog and activity logs of a data lake into a SQLite
//! star-schema warehouse. Exposed as a library for testing.

pub mod config;
pub mod etl;
pub mod records;
pub mod sqlite_persistence;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use etl::{ErrorPolicy, LevelPolicy, PipelineError, PipelineSummary};
pub use warehouse::{PlayKey, SqliteWarehouseStore, StoreOptions, WarehouseStore};
