use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::browser::TabSnapshot;

/// Longest tab title shown before it is cut and marked with [`ELLIPSIS`].
pub const MAX_TITLE_CHARS: usize = 50;
pub const ELLIPSIS: &str = "...";

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Not observing (starting up or shut down).
    Idle,
    /// The tab monitor is polling.
    Running,
}

/// Display data written by the daemon to `<config dir>/StatusSyn/status.toml`.
/// The status-bar shell reads this file (read-only) to render its icon and menu.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DisplayStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    /// Name of the frontmost application, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// `.app` bundle to take the icon from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_icon: Option<String>,
    /// Browser whose tab is shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Active tab title, cut to [`MAX_TITLE_CHARS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_title: Option<String>,
    /// Full URL of the active tab, shown as the tooltip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_tooltip: Option<String>,
    pub sync_enabled: bool,
    /// RFC 3339 timestamp of the last change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl DisplayStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            app_name: None,
            app_icon: None,
            browser: None,
            tab_title: None,
            tab_tooltip: None,
            sync_enabled: false,
            updated_at: None,
        }
    }

    pub fn set_tab(&mut self, tab: Option<&TabSnapshot>) {
        self.browser = tab.map(|t| t.browser.display_name().to_string());
        self.tab_title = tab.map(|t| truncate_title(&t.title));
        self.tab_tooltip = tab.map(|t| t.url.clone());
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(chrono::Local::now().to_rfc3339());
    }
}

/// Cuts `title` to [`MAX_TITLE_CHARS`] characters, appending [`ELLIPSIS`]
/// when anything was removed.
pub fn truncate_title(title: &str) -> String {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &title[..cut]),
        None => title.to_string(),
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged, never returned.
pub fn write_status(path: &Path, status: &DisplayStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(error = %e, dir = %parent.display(), "failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!(error = %e, "failed to write status file");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize status"),
    }
}
