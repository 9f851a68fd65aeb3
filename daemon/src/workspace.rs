use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::event::{DaemonEvent, ObservedApplication};
use crate::browser::BrowserKind;
use crate::frontmost::{self, FrontmostApp, FrontmostSource};

/// Polls the frontmost application every `every` and emits
/// [`DaemonEvent::FrontmostChanged`] once at startup and then whenever a
/// different application comes to the front.
///
/// Moments with nothing frontmost (e.g. during a Space switch) are ignored:
/// the last application stays current until another one takes its place.
pub async fn run(source: Arc<dyn FrontmostSource>, every: Duration, tx: mpsc::Sender<DaemonEvent>) {
    let mut sys = System::new();
    let mut active: Option<String> = None;
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(app) = frontmost::query(&source).await else {
            continue;
        };
        if active.as_deref() == Some(app.identity.as_str()) {
            continue;
        }

        info!(app = %app.display_name, "frontmost application changed");
        active = Some(app.identity.clone());
        let observed = observe(&mut sys, app);
        if tx.send(DaemonEvent::FrontmostChanged(observed)).await.is_err() {
            break;
        }
    }
}

fn observe(sys: &mut System, app: FrontmostApp) -> ObservedApplication {
    let icon_ref = app.pid.and_then(|pid| bundle_path(sys, pid));
    if icon_ref.is_none() {
        debug!(identity = %app.identity, "no app bundle found for icon");
    }
    ObservedApplication {
        browser: BrowserKind::from_bundle_id(&app.identity),
        name: app.display_name,
        icon_ref,
    }
}

/// Resolves the `.app` bundle the process `pid` was launched from.
fn bundle_path(sys: &mut System, pid: u32) -> Option<PathBuf> {
    let pid = Pid::from_u32(pid);
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
    );
    app_bundle_of(sys.process(pid)?.exe()?)
}

/// Innermost `*.app` directory containing `exe`.
pub fn app_bundle_of(exe: &Path) -> Option<PathBuf> {
    exe.ancestors()
        .find(|p| p.extension().is_some_and(|ext| ext == "app"))
        .map(Path::to_path_buf)
}
