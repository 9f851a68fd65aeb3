use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::event::DaemonEvent;

pub const MIN_INTERVAL_MS: u64 = 100;
pub const MAX_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MIN_CHECK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TOLERANCE_MS: u64 = 200;
pub const DEFAULT_DEBOUNCE_MS: u64 = 3_000;
pub const DEFAULT_FRONTMOST_POLL_INTERVAL_MS: u64 = 500;

/// Root configuration structure. Deserialized from `<config dir>/StatusSyn/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// The `[sync]` table: the user's toggle plus the remote target.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// When false the daemon still tracks and displays, but never reports.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub auth_key: Option<String>,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: None,
            auth_key: None,
        }
    }
}

impl SyncSection {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            endpoint: self.endpoint.clone(),
            auth_key: self.auth_key.clone(),
        }
    }

    /// True when status updates should be reported at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.sync_config().is_configured()
    }
}

/// Where status updates are sent. Read-only to the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub endpoint: Option<String>,
    pub auth_key: Option<String>,
}

impl SyncConfig {
    /// Both fields present and non-blank.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.endpoint) && present(&self.auth_key)
    }
}

/// The `[monitor]` table. Every interval is clamped to
/// [`MIN_INTERVAL_MS`]–[`MAX_INTERVAL_MS`] when read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_min_check_interval")]
    pub min_check_interval_ms: u64,
    /// Slack allowed on the minimum check interval. Not clamped to the
    /// interval range; capped at the minimum check interval instead.
    #[serde(default = "default_tolerance")]
    pub tolerance_ms: u64,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    #[serde(default = "default_frontmost_poll_interval")]
    pub frontmost_poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            min_check_interval_ms: DEFAULT_MIN_CHECK_INTERVAL_MS,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            frontmost_poll_interval_ms: DEFAULT_FRONTMOST_POLL_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        clamped(self.poll_interval_ms)
    }

    pub fn min_check_interval(&self) -> Duration {
        clamped(self.min_check_interval_ms)
    }

    pub fn tolerance(&self) -> Duration {
        Duration::from_millis(self.tolerance_ms).min(self.min_check_interval())
    }

    pub fn debounce(&self) -> Duration {
        clamped(self.debounce_ms)
    }

    pub fn frontmost_poll_interval(&self) -> Duration {
        clamped(self.frontmost_poll_interval_ms)
    }
}

fn clamped(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS))
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to create config watcher");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let Some(watch_dir) = path.parent().map(Path::to_path_buf) else {
        error!(path = %path.display(), "config path has no parent directory");
        return;
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!(error = %e, dir = %watch_dir.display(), "failed to watch config directory");
        return;
    }
    info!(path = %path.display(), "watching config");

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("failed to reload config, keeping previous: {e:#}"),
            }
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_min_check_interval() -> u64 {
    DEFAULT_MIN_CHECK_INTERVAL_MS
}

fn default_tolerance() -> u64 {
    DEFAULT_TOLERANCE_MS
}

fn default_debounce() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_frontmost_poll_interval() -> u64 {
    DEFAULT_FRONTMOST_POLL_INTERVAL_MS
}
