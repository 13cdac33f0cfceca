mod file_config;

pub use file_config::{DatabaseFileConfig, FileConfig};

use crate::etl::{ErrorPolicy, LevelPolicy};
use crate::warehouse::PlayKey;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subdirectory of the data directory holding the song catalog.
pub const SONG_DATA_DIR: &str = "song_data";
/// Subdirectory of the data directory holding the activity logs.
pub const LOG_DATA_DIR: &str = "log_data";

const DEFAULT_DB_NAME: &str = "sparkifydb";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub db_dir: Option<PathBuf>,
    pub db_name: Option<String>,
    pub play_key: PlayKey,
    pub level_policy: LevelPolicy,
    pub error_policy: ErrorPolicy,
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub play_key: PlayKey,
    pub level_policy: LevelPolicy,
    pub error_policy: ErrorPolicy,
    pub reset: bool,

    pub database: DatabaseSettings,
}

/// Where the warehouse lives. Replaces fixed connection constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub db_dir: PathBuf,
    pub name: String,
    pub busy_timeout: Duration,
}

impl DatabaseSettings {
    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(format!("{}.db", self.name))
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("."),
            name: DEFAULT_DB_NAME.to_string(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

fn validate_dir(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist: {:?}", what, path);
    }
    if !path.is_dir() {
        bail!("{} is not a directory: {:?}", what, path);
    }
    Ok(())
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    ///
    /// Every input directory is checked here, before anything touches the
    /// database.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified on the command line or in config file")
            })?;
        validate_dir(&data_dir, "Data directory")?;
        validate_dir(&data_dir.join(SONG_DATA_DIR), "Song data directory")?;
        validate_dir(&data_dir.join(LOG_DATA_DIR), "Log data directory")?;

        let db_file = file.database.unwrap_or_default();
        let defaults = DatabaseSettings::default();
        let db_dir = db_file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .unwrap_or(defaults.db_dir);
        validate_dir(&db_dir, "Database directory")?;

        let name = db_file
            .name
            .or_else(|| cli.db_name.clone())
            .unwrap_or(defaults.name);
        if name.trim().is_empty() {
            bail!("Database name must not be empty");
        }

        let busy_timeout = db_file
            .busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.busy_timeout);

        Ok(Self {
            data_dir,
            play_key: file.play_key.unwrap_or(cli.play_key),
            level_policy: file.level_policy.unwrap_or(cli.level_policy),
            error_policy: file.error_policy.unwrap_or(cli.error_policy),
            reset: file.reset.unwrap_or(cli.reset),
            database: DatabaseSettings {
                db_dir,
                name,
                busy_timeout,
            },
        })
    }

    pub fn song_data_dir(&self) -> PathBuf {
        self.data_dir.join(SONG_DATA_DIR)
    }

    pub fn log_data_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DATA_DIR)
    }
}
