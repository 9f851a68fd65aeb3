/// Central dispatch for [`DaemonEvent`]s.
///
/// Runs on the main task and is the only place that touches the display
/// status, the sync handle and the tab monitor's lifecycle.  It also owns the
/// caller-side sync rules: report only while sync is active, drop queued and
/// acknowledged state when it turns off, and re-report when it turns back on.
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::browser::TabSnapshot;
use crate::config::Config;
use crate::event::{DaemonEvent, ObservedApplication};
use crate::frontmost::FrontmostSource;
use crate::inspector::TabInspector;
use crate::monitor::BrowserTabMonitor;
use crate::status::{self, DaemonState, DisplayStatus};
use crate::sync::SyncHandle;

pub struct EventLoop {
    cfg: Config,
    status: DisplayStatus,
    status_path: PathBuf,
    current_tab: Option<TabSnapshot>,
    monitor: BrowserTabMonitor,
    sync: SyncHandle,
    frontmost: Arc<dyn FrontmostSource>,
    inspector: Arc<dyn TabInspector>,
    events: mpsc::Sender<DaemonEvent>,
}

impl EventLoop {
    pub fn new(
        cfg: Config,
        status_path: PathBuf,
        sync: SyncHandle,
        frontmost: Arc<dyn FrontmostSource>,
        inspector: Arc<dyn TabInspector>,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let monitor = BrowserTabMonitor::new(
            Arc::clone(&frontmost),
            Arc::clone(&inspector),
            events.clone(),
            &cfg.monitor,
        );
        let mut status = DisplayStatus::new();
        status.sync_enabled = cfg.sync.is_active();
        Self {
            cfg,
            status,
            status_path,
            current_tab: None,
            monitor,
            sync,
            frontmost,
            inspector,
            events,
        }
    }

    /// Starts the tab monitor and publishes the running status.
    pub fn start(&mut self) {
        self.monitor.start();
        self.status.state = DaemonState::Running;
        self.publish();
    }

    /// Dispatches events until `Shutdown` arrives or every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DaemonEvent>) {
        while let Some(evt) = rx.recv().await {
            if self.handle(evt).is_break() {
                break;
            }
        }
        self.monitor.stop();
    }

    pub fn handle(&mut self, evt: DaemonEvent) -> ControlFlow<()> {
        match evt {
            DaemonEvent::FrontmostChanged(app) => self.on_frontmost(app),
            DaemonEvent::TabChanged(tab) => self.on_tab(tab),
            DaemonEvent::ConfigReloaded(new_config) => self.on_config(new_config),
            DaemonEvent::Shutdown => {
                info!("shutting down");
                self.monitor.stop();
                self.status.state = DaemonState::Idle;
                self.status.app_name = None;
                self.status.app_icon = None;
                self.status.set_tab(None);
                self.publish();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_frontmost(&mut self, app: ObservedApplication) {
        self.monitor.frontmost_changed();

        self.status.app_name = Some(app.name.clone());
        self.status.app_icon = app
            .icon_ref
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        self.publish();

        if self.cfg.sync.is_active() {
            self.sync.notify_app_name(app.name.clone());
            // The monitor may have reported this browser's tab before the
            // watcher noticed the switch; the tab still wins.
            if let Some(tab) = self.tab_of(&app) {
                self.sync.notify_tab_info(Some(tab));
            }
        }
    }

    fn on_tab(&mut self, tab: Option<TabSnapshot>) {
        self.status.set_tab(tab.as_ref());
        self.publish();

        if self.cfg.sync.is_active() {
            self.sync.notify_tab_info(tab.clone());
        }
        self.current_tab = tab;
    }

    fn on_config(&mut self, new_config: Config) {
        info!("config reloaded");
        let was_active = self.cfg.sync.is_active();
        let active = new_config.sync.is_active();

        self.sync.update_config(new_config.sync.sync_config());
        if !active {
            self.sync.cancel_pending();
            self.sync.reset_last_sent();
        } else if !was_active {
            if let Some(app) = &self.status.app_name {
                self.sync.notify_app_name(app.clone());
            }
            if self.current_tab.is_some() {
                self.sync.notify_tab_info(self.current_tab.clone());
            }
        }

        if new_config.monitor != self.cfg.monitor {
            let restart = self.monitor.is_running();
            self.monitor.stop();
            self.monitor = BrowserTabMonitor::new(
                Arc::clone(&self.frontmost),
                Arc::clone(&self.inspector),
                self.events.clone(),
                &new_config.monitor,
            );
            if restart {
                self.monitor.start();
            }
            if new_config.monitor.debounce() != self.cfg.monitor.debounce()
                || new_config.monitor.frontmost_poll_interval()
                    != self.cfg.monitor.frontmost_poll_interval()
            {
                warn!("debounce and frontmost intervals apply after restart");
            }
        }

        self.status.sync_enabled = active;
        self.publish();
        self.cfg = new_config;
    }

    /// The last reported tab, if it belongs to `app`.
    fn tab_of(&self, app: &ObservedApplication) -> Option<TabSnapshot> {
        self.current_tab
            .as_ref()
            .filter(|tab| app.browser == Some(tab.browser))
            .cloned()
    }

    fn publish(&mut self) {
        self.status.touch();
        status::write_status(&self.status_path, &self.status);
    }
}
