//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{next_song, page_view, song_record, DataLake};

use sparkify_etl::config::{CliConfig, DatabaseSettings};
use sparkify_etl::{AppConfig, SqliteWarehouseStore, StoreOptions};

/// Start of 2018-11-15 UTC, in epoch milliseconds.
#[allow(dead_code)]
pub const NOV_15_2018_MS: i64 = 1_542_240_000_000;

/// Resolves a configuration for `lake` with the database in its `db` folder.
#[allow(dead_code)]
pub fn config_for(lake: &DataLake, cli: CliConfig) -> AppConfig {
    let cli = CliConfig {
        data_dir: Some(lake.data_dir()),
        db_dir: Some(lake.db_dir()),
        ..cli
    };
    AppConfig::resolve(&cli, None).unwrap()
}

/// Reopens the database written by a run, for inspection.
#[allow(dead_code)]
pub fn open_warehouse(database: &DatabaseSettings) -> SqliteWarehouseStore {
    SqliteWarehouseStore::open(database.db_path(), &StoreOptions::default()).unwrap()
}
