/// Canonical file paths for StatusSyn data files.
///
/// Both files live under `<config dir>/StatusSyn/`
/// (`~/Library/Application Support/StatusSyn/` on macOS):
///   - config.toml  Written by the user or the status-bar shell, read by the daemon.
///   - status.toml  Written by the daemon, read by the status-bar shell.
use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "StatusSyn";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the StatusSyn application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no per-user configuration directory on this platform")?;
    Ok(base.join(APP_DIR_NAME))
}

/// Returns the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

/// Returns the full path to the status file.
pub fn status_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(STATUS_FILE_NAME))
}
