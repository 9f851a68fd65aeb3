/// Poll scheduling for the tab monitor.
///
/// A [`PollTask`] owns one repeating timer plus a wake-up [`Notify`] used for
/// frontmost-application changes.  The callback is awaited inside the loop,
/// so checks never overlap.  Ticks that come due while a check is still
/// running are not queued: [`MissedTickBehavior::Skip`] folds them into one
/// late tick, which the [`Throttle`] then rejects because the previous check
/// has only just completed.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// What caused a check to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The repeating timer fired; subject to the [`Throttle`].
    Tick,
    /// The frontmost application changed; checked immediately.
    FrontmostChanged,
}

/// Minimum spacing between completed checks.
///
/// Measured from the end of the previous check, so a slow check pushes the
/// next one back.  `tolerance` lets a tick that lands slightly early still
/// count instead of waiting a whole extra period.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    tolerance: Duration,
    last_completed: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration, tolerance: Duration) -> Self {
        Self {
            min_interval,
            tolerance: tolerance.min(min_interval),
            last_completed: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last_completed {
            None => true,
            Some(last) => now.saturating_duration_since(last) + self.tolerance >= self.min_interval,
        }
    }

    pub fn record(&mut self, completed_at: Instant) {
        self.last_completed = Some(completed_at);
    }

    #[cfg(test)]
    pub fn last_completed(&self) -> Option<Instant> {
        self.last_completed
    }
}

/// A running poll loop. Dropping it cancels the loop.
pub struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawns the loop: `on_trigger(Tick)` every `interval` (first tick
    /// immediately) and `on_trigger(FrontmostChanged)` whenever `wake` is
    /// notified.
    pub fn spawn<F, Fut>(interval: Duration, wake: Arc<Notify>, mut on_trigger: F) -> Self
    where
        F: FnMut(Trigger) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let cancel = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            trace!(interval_ms = interval.as_millis() as u64, "poll loop started");

            loop {
                let trigger = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = wake.notified() => Trigger::FrontmostChanged,
                    _ = ticker.tick() => Trigger::Tick,
                };
                on_trigger(trigger).await;
            }
            trace!("poll loop stopped");
        });

        Self { token, handle }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
