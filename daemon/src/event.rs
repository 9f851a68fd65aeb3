use std::path::PathBuf;

use crate::browser::{BrowserKind, TabSnapshot};
use crate::config::Config;

/// The frontmost application as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedApplication {
    pub name: String,
    /// Set when the application is one of the inspected browsers.
    pub browser: Option<BrowserKind>,
    /// On-disk `.app` bundle the shell can load an icon from.
    pub icon_ref: Option<PathBuf>,
}

#[derive(Debug)]
pub enum DaemonEvent {
    /// A different application became frontmost.
    FrontmostChanged(ObservedApplication),
    /// The effective browser tab changed; `None` clears it.
    TabChanged(Option<TabSnapshot>),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should release its timers and exit.
    Shutdown,
}
