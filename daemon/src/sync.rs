/// Status debounce and sync engine.
///
/// Turns a burst of tab/app changes into at most one outbound call per quiet
/// period.  The engine is a single task that owns the pending emission, the
/// last acknowledged payload and the current [`SyncConfig`]; callers talk to it
/// through a cloneable [`SyncHandle`].
///
/// Debounce is trailing-edge with cancel-and-replace: every notification
/// overwrites the one pending emission and pushes its deadline out to
/// `debounce` from now, so only the last notification of a burst is sent.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::browser::TabSnapshot;
use crate::config::SyncConfig;
use crate::transport::{StatusUpdate, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionKind {
    Tab,
    AppName,
}

/// The single status report waiting for its debounce deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmission {
    pub kind: EmissionKind,
    pub payload_text: String,
    pub scheduled_at: Instant,
}

enum SyncCommand {
    TabInfo(Option<TabSnapshot>),
    AppName(String),
    Configure(SyncConfig),
    ResetLastSent,
    CancelPending,
}

/// Outcome of a spawned transport call, reported back to the engine task.
struct Ack {
    epoch: u64,
    payload: String,
    outcome: Result<u16, TransportError>,
}

/// Cheap, cloneable sender side of the engine.  Sends never block; once the
/// engine has stopped they are silently dropped.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// Reports the active tab, or its absence. A cleared tab reports the most
    /// recently notified app name instead.
    pub fn notify_tab_info(&self, tab: Option<TabSnapshot>) {
        let _ = self.tx.send(SyncCommand::TabInfo(tab));
    }

    pub fn notify_app_name(&self, name: impl Into<String>) {
        let _ = self.tx.send(SyncCommand::AppName(name.into()));
    }

    pub fn update_config(&self, config: SyncConfig) {
        let _ = self.tx.send(SyncCommand::Configure(config));
    }

    /// Forgets the last acknowledged payload so the next report is sent even
    /// if identical. Call when sync is disabled or the target changes.
    pub fn reset_last_sent(&self) {
        let _ = self.tx.send(SyncCommand::ResetLastSent);
    }

    /// Drops the report waiting for its debounce deadline, if any. Call when
    /// sync is switched off so nothing queued before the switch goes out.
    pub fn cancel_pending(&self) {
        let _ = self.tx.send(SyncCommand::CancelPending);
    }
}

pub struct SyncEngine<T: Transport> {
    transport: Arc<T>,
    config: SyncConfig,
    debounce: Duration,
    pending: Option<PendingEmission>,
    last_sent: Option<String>,
    current_app: Option<String>,
    /// Bumped on reset so acknowledgements from before the reset are ignored.
    epoch: u64,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(transport: Arc<T>, config: SyncConfig, debounce: Duration) -> Self {
        Self {
            transport,
            config,
            debounce,
            pending: None,
            last_sent: None,
            current_app: None,
            epoch: 0,
        }
    }

    /// Spawns the engine task. It runs until every [`SyncHandle`] is dropped.
    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (SyncHandle { tx }, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();

        loop {
            let deadline = self.pending.as_ref().map(|p| p.scheduled_at);
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire(&ack_tx);
                }
                Some(ack) = ack_rx.recv() => self.on_ack(ack),
            }
        }
        debug!("sync engine stopped");
    }

    fn handle(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::TabInfo(Some(tab)) => self.schedule(EmissionKind::Tab, tab.status_text()),
            SyncCommand::TabInfo(None) => match self.current_app.clone() {
                Some(app) => self.schedule(EmissionKind::AppName, app),
                None => {
                    if self.pending.take().is_some() {
                        debug!("pending status cancelled, nothing to report");
                    }
                }
            },
            SyncCommand::AppName(name) => {
                self.current_app = Some(name.clone());
                self.schedule(EmissionKind::AppName, name);
            }
            SyncCommand::Configure(config) => self.config = config,
            SyncCommand::ResetLastSent => {
                self.last_sent = None;
                self.epoch += 1;
            }
            SyncCommand::CancelPending => {
                if let Some(p) = self.pending.take() {
                    debug!(payload = %p.payload_text, "pending status dropped");
                }
            }
        }
    }

    fn schedule(&mut self, kind: EmissionKind, payload_text: String) {
        let scheduled_at = Instant::now() + self.debounce;
        debug!(?kind, payload = %payload_text, "status scheduled");
        self.pending = Some(PendingEmission {
            kind,
            payload_text,
            scheduled_at,
        });
    }

    fn fire(&mut self, ack_tx: &mpsc::UnboundedSender<Ack>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if !self.config.is_configured() {
            debug!(payload = %pending.payload_text, "sync not configured, status dropped");
            return;
        }
        if self.last_sent.as_deref() == Some(pending.payload_text.as_str()) {
            debug!(payload = %pending.payload_text, "status unchanged, not sent");
            return;
        }

        let update = match StatusUpdate::new(&self.config, pending.payload_text) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "sync target unusable");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let ack_tx = ack_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = transport.send(&update).await;
            let _ = ack_tx.send(Ack {
                epoch,
                payload: update.payload().to_string(),
                outcome,
            });
        });
    }

    fn on_ack(&mut self, ack: Ack) {
        match ack.outcome {
            Ok(status) => {
                info!(status, payload = %ack.payload, "status synced");
                if ack.epoch == self.epoch {
                    self.last_sent = Some(ack.payload);
                }
            }
            Err(e) => warn!(error = %e, payload = %ack.payload, "status sync failed"),
        }
    }
}
