//! Resolution of CLI paths and the persisted device config.

use std::env;
use std::path::{Path, PathBuf};

use cradle_core::config::{CradleConfig, CONFIG_FILE_NAME};

use crate::error::CliError;

const ENV_DB_PATH: &str = "CRADLE_DB_PATH";
const ENV_CONFIG: &str = "CRADLE_CONFIG";

/// Everything a command needs to know about where things live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub config: CradleConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub spool_dir: PathBuf,
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("cradle").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("cradle"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn resolve_settings(
    cli_db_path: Option<PathBuf>,
    cli_config_path: Option<PathBuf>,
) -> Result<RuntimeSettings, CliError> {
    resolve_settings_with(cli_db_path, cli_config_path, |key| env::var(key).ok())
}

/// Precedence: command-line flag, then environment, then config file, then
/// per-user defaults.
pub fn resolve_settings_with<F>(
    cli_db_path: Option<PathBuf>,
    cli_config_path: Option<PathBuf>,
    get_env: F,
) -> Result<RuntimeSettings, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_path = |key: &str| {
        get_env(key)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    };

    let config_path = match cli_config_path.or_else(|| env_path(ENV_CONFIG)) {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = CradleConfig::load_from_path(&config_path)?;

    let db_path = match cli_db_path
        .or_else(|| env_path(ENV_DB_PATH))
        .or_else(|| config.db_path.clone())
    {
        Some(path) => path,
        None => default_data_dir()?.join("cradle.db"),
    };

    let spool_dir = match config.spool_dir.clone() {
        Some(dir) => dir,
        None => sibling_spool_dir(&db_path),
    };

    Ok(RuntimeSettings {
        config,
        config_path,
        db_path,
        spool_dir,
    })
}

fn sibling_spool_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from("outbound"), |parent| parent.join("outbound"))
}
