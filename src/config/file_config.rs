use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::etl::{ErrorPolicy, LevelPolicy};
use crate::warehouse::PlayKey;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub play_key: Option<PlayKey>,
    pub level_policy: Option<LevelPolicy>,
    pub error_policy: Option<ErrorPolicy>,
    pub reset: Option<bool>,

    pub database: Option<DatabaseFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DatabaseFileConfig {
    pub db_dir: Option<String>,
    /// Database name, the file is `<db_dir>/<name>.db`
    pub name: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
