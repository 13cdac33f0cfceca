use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use sparkify_etl::config::{AppConfig, CliConfig, FileConfig};
use sparkify_etl::etl::{self, IntegrityVerdict, PipelineSummary};
use sparkify_etl::{ErrorPolicy, LevelPolicy, PlayKey};
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlayKeyArg {
    StartTime,
    StartTimeSession,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LevelPolicyArg {
    Appearance,
    LatestEvent,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ErrorPolicyArg {
    Abort,
    Skip,
}

#[derive(Parser, Debug)]
#[clap(about = "Loads a song catalog and activity logs into the analytics warehouse")]
struct CliArgs {
    /// Root of the data lake, containing song_data and log_data.
    #[clap(value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the warehouse database file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Name of the warehouse database, stored as <db_dir>/<name>.db.
    #[clap(long)]
    pub database: Option<String>,

    /// Natural key of the songplays table.
    #[clap(long, value_enum, default_value = "start-time")]
    pub play_key: PlayKeyArg,

    /// Which row decides a user's level when it changes within a file.
    #[clap(long, value_enum, default_value = "appearance")]
    pub level_policy: LevelPolicyArg,

    /// What to do when a file fails to load.
    #[clap(long, value_enum, default_value = "abort")]
    pub error_policy: ErrorPolicyArg,

    /// Drop and recreate every warehouse table before loading.
    #[clap(long)]
    pub reset: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            data_dir: self.data_dir.clone(),
            db_dir: self.db_dir.clone(),
            db_name: self.database.clone(),
            play_key: match self.play_key {
                PlayKeyArg::StartTime => PlayKey::StartTime,
                PlayKeyArg::StartTimeSession => PlayKey::StartTimeSession,
            },
            level_policy: match self.level_policy {
                LevelPolicyArg::Appearance => LevelPolicy::Appearance,
                LevelPolicyArg::LatestEvent => LevelPolicy::LatestEvent,
            },
            error_policy: match self.error_policy {
                ErrorPolicyArg::Abort => ErrorPolicy::Abort,
                ErrorPolicyArg::Skip => ErrorPolicy::Skip,
            },
            reset: self.reset,
        }
    }
}

fn log_summary(summary: &PipelineSummary) {
    info!(
        "Songs: {}/{} files loaded, {} songs and {} artists inserted",
        summary.songs.files_loaded,
        summary.songs.files_found,
        summary.songs.songs.songs_inserted,
        summary.songs.songs.artists_inserted
    );
    info!(
        "Logs: {}/{} files loaded, {} plays read, {} inserted, {} matched a song",
        summary.logs.files_loaded,
        summary.logs.files_found,
        summary.logs.logs.plays,
        summary.logs.logs.songplays_inserted,
        summary.logs.logs.songs_matched
    );
    if summary.failed_files() > 0 {
        warn!("{} files were skipped", summary.failed_files());
    }
    match summary.integrity.verdict {
        IntegrityVerdict::Mismatch { .. } | IntegrityVerdict::Violations(_) => {
            warn!("Warehouse loaded without foreign keys")
        }
        _ => info!("Warehouse loaded, {}", summary.integrity.verdict),
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the log subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => match FileConfig::load(path) {
            Ok(config) => Some(config),
            Err(e) => {
                error!("{:#}", e);
                return Ok(());
            }
        },
        None => None,
    };

    // A data directory may come from the config file alone
    let data_dir_in_file = file_config
        .as_ref()
        .map(|c| c.data_dir.is_some())
        .unwrap_or(false);
    if cli_args.data_dir.is_none() && !data_dir_in_file {
        println!("{}", CliArgs::command().render_usage());
        return Ok(());
    }

    let config = match AppConfig::resolve(&cli_args.to_cli_config(), file_config) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return Ok(());
        }
    };

    let summary = etl::run(&config).map_err(|e| {
        if e.is_file_failure() {
            error!("Run aborted, files loaded before the failing one stay committed");
        }
        anyhow::Error::from(e)
    })?;
    log_summary(&summary);
    Ok(())
}
