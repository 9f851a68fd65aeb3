mod browser;
mod config;
mod event;
mod event_loop;
mod frontmost;
mod inspector;
mod monitor;
mod paths;
mod scheduler;
mod status;
mod sync;
mod transport;
mod workspace;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::event_loop::EventLoop;
use crate::frontmost::{FrontmostSource, SystemEventsFrontmost};
use crate::inspector::{OsaScriptInspector, TabInspector};
use crate::sync::SyncEngine;
use crate::transport::HttpTransport;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,statussyn_daemon=debug")),
        )
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let (config_path, status_path) = match prepare_data_dir() {
        Ok(paths) => paths,
        Err(e) => {
            error!("failed to prepare app data directory: {e:#}");
            std::process::exit(1);
        }
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    let cfg = config::load_or_default(&config_path).unwrap_or_else(|e| {
        error!("config error, using defaults: {e:#}");
        config::Config::default()
    });

    // ── Sync engine ───────────────────────────────────────────────────────────
    let transport = match HttpTransport::new() {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let (sync, _sync_task) =
        SyncEngine::new(transport, cfg.sync.sync_config(), cfg.monitor.debounce()).spawn();

    let (event_tx, event_rx) = mpsc::channel::<event::DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    let frontmost: Arc<dyn FrontmostSource> = Arc::new(SystemEventsFrontmost);
    let inspector: Arc<dyn TabInspector> = Arc::new(OsaScriptInspector);

    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(workspace::run(
        Arc::clone(&frontmost),
        cfg.monitor.frontmost_poll_interval(),
        event_tx.clone(),
    ));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut event_loop = EventLoop::new(cfg, status_path, sync, frontmost, inspector, event_tx);
    event_loop.start();
    info!(version = env!("CARGO_PKG_VERSION"), "statussyn-daemon started");
    event_loop.run(event_rx).await;
}

/// Creates the app data directory and returns the config and status paths.
fn prepare_data_dir() -> Result<(PathBuf, PathBuf)> {
    let app_dir = paths::app_data_dir()?;
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("cannot create {}", app_dir.display()))?;
    Ok((paths::config_file_path()?, paths::status_file_path()?))
}
