/// Browser tab monitor.
///
/// Keeps a deduplicated view of "which page is the user looking at" while a
/// recognized browser is frontmost and publishes every effective change as
/// [`DaemonEvent::TabChanged`].  All state lives in [`TabPoller`] and is only
/// touched from the poll loop; the event loop in `main` receives results over
/// the channel, never by reading this state.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::browser::{BrowserKind, TabSnapshot};
use crate::config::MonitorConfig;
use crate::event::DaemonEvent;
use crate::frontmost::{self, FrontmostSource};
use crate::inspector::{InspectionError, RawTabResult, TabInspector};
use crate::scheduler::{PollTask, Throttle, Trigger};

/// Everything the monitor remembers between checks.
///
/// `last_snapshot` is only ever `Some` for the browser in
/// `last_recognized_browser`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorState {
    pub last_recognized_browser: Option<BrowserKind>,
    pub last_snapshot: Option<TabSnapshot>,
    pub last_process_identity: Option<String>,
    /// Whether the listener currently holds a tab (last emission was `Some`).
    pub published: bool,
}

/// The check itself: classify the frontmost process, inspect, dedup, emit.
pub struct TabPoller {
    frontmost: Arc<dyn FrontmostSource>,
    inspector: Arc<dyn TabInspector>,
    listener: mpsc::Sender<DaemonEvent>,
    throttle: Throttle,
    state: MonitorState,
}

impl TabPoller {
    pub fn new(
        frontmost: Arc<dyn FrontmostSource>,
        inspector: Arc<dyn TabInspector>,
        listener: mpsc::Sender<DaemonEvent>,
        throttle: Throttle,
    ) -> Self {
        Self {
            frontmost,
            inspector,
            listener,
            throttle,
            state: MonitorState::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    #[cfg(test)]
    pub fn last_poll(&self) -> Option<Instant> {
        self.throttle.last_completed()
    }

    /// Runs one check. Timer ticks are throttled against the end of the
    /// previous check; frontmost-change wake-ups are not.
    pub async fn on_poll_tick(&mut self, trigger: Trigger) {
        if trigger == Trigger::Tick && !self.throttle.ready(Instant::now()) {
            return;
        }
        self.check().await;
        self.throttle.record(Instant::now());
    }

    async fn check(&mut self) {
        let Some(app) = frontmost::query(&self.frontmost).await else {
            if self.state.last_process_identity.take().is_some() {
                info!("switched to: no frontmost application");
            }
            self.clear().await;
            return;
        };

        if self.state.last_process_identity.as_deref() != Some(app.identity.as_str()) {
            info!(app = %app.display_name, identity = %app.identity, "switched application");
            self.state.last_process_identity = Some(app.identity.clone());
        }

        let Some(browser) = BrowserKind::from_bundle_id(&app.identity) else {
            self.clear().await;
            return;
        };

        if self.state.last_recognized_browser != Some(browser) {
            // Browser switch: start over and inspect right away on this task.
            debug!(browser = browser.display_name(), "browser became frontmost");
            self.state.last_recognized_browser = Some(browser);
            self.state.last_snapshot = None;
            let result = self.inspector.inspect(browser);
            self.apply(browser, result).await;
        } else {
            let inspector = Arc::clone(&self.inspector);
            let result = tokio::task::spawn_blocking(move || inspector.inspect(browser))
                .await
                .unwrap_or_else(|e| Err(InspectionError::from(e)));
            self.apply(browser, result).await;
        }
    }

    async fn apply(&mut self, browser: BrowserKind, result: RawTabResult) {
        let snapshot = match result {
            Ok(raw) => match raw.into_snapshot(browser) {
                Some(snapshot) => snapshot,
                None => {
                    debug!(browser = browser.display_name(), "no active tab");
                    self.clear().await;
                    return;
                }
            },
            Err(e) => {
                debug!(browser = browser.display_name(), error = %e, "tab inspection failed");
                self.clear().await;
                return;
            }
        };

        if self.state.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        info!(browser = browser.display_name(), title = %snapshot.title, "tab changed");
        self.state.last_snapshot = Some(snapshot.clone());
        self.emit(Some(snapshot)).await;
    }

    /// Forgets the browser and its tab; tells the listener only if it was
    /// showing one.
    async fn clear(&mut self) {
        self.state.last_recognized_browser = None;
        self.state.last_snapshot = None;
        if self.state.published {
            self.emit(None).await;
        }
    }

    async fn emit(&mut self, tab: Option<TabSnapshot>) {
        self.state.published = tab.is_some();
        if self.listener.send(DaemonEvent::TabChanged(tab)).await.is_err() {
            debug!("tab listener gone");
        }
    }
}

/// Owner of the poll loop around a [`TabPoller`].
pub struct BrowserTabMonitor {
    poller: Arc<Mutex<TabPoller>>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    task: Option<PollTask>,
}

impl BrowserTabMonitor {
    pub fn new(
        frontmost: Arc<dyn FrontmostSource>,
        inspector: Arc<dyn TabInspector>,
        listener: mpsc::Sender<DaemonEvent>,
        config: &MonitorConfig,
    ) -> Self {
        let throttle = Throttle::new(config.min_check_interval(), config.tolerance());
        Self {
            poller: Arc::new(Mutex::new(TabPoller::new(frontmost, inspector, listener, throttle))),
            wake: Arc::new(Notify::new()),
            poll_interval: config.poll_interval(),
            task: None,
        }
    }

    /// Starts polling. Calling it while already running does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let poller = Arc::clone(&self.poller);
        self.task = Some(PollTask::spawn(self.poll_interval, Arc::clone(&self.wake), move |trigger| {
            let poller = Arc::clone(&poller);
            async move { poller.lock().await.on_poll_tick(trigger).await }
        }));
        info!(interval_ms = self.poll_interval.as_millis() as u64, "tab monitor started");
    }

    /// Stops polling and releases the timer. Safe to call when stopped.
    pub fn stop(&mut self) {
        if self.task.take().is_some() {
            info!("tab monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Requests an immediate, unthrottled check after the frontmost
    /// application changed.
    pub fn frontmost_changed(&self) {
        self.wake.notify_one();
    }

    #[cfg(test)]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[cfg(test)]
    pub async fn state(&self) -> MonitorState {
        self.poller.lock().await.state().clone()
    }
}

impl Drop for BrowserTabMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::RawTab;
    use crate::frontmost::FrontmostApp;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::thread::{self, ThreadId};

    const SECOND: Duration = Duration::from_secs(1);

    #[derive(Default)]
    struct FakeFrontmost(StdMutex<Option<FrontmostApp>>);

    impl FakeFrontmost {
        fn set(&self, identity: Option<&str>) {
            *self.0.lock().unwrap() = identity.map(|id| FrontmostApp {
                identity: id.to_string(),
                display_name: id.rsplit('.').next().unwrap_or(id).to_string(),
                pid: None,
            });
        }
    }

    impl FrontmostSource for FakeFrontmost {
        fn current_frontmost(&self) -> Option<FrontmostApp> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Answers with whatever tab was scripted for a browser; unscripted
    /// browsers fail like a script error would.
    #[derive(Default)]
    struct ScriptedInspector {
        tabs: StdMutex<HashMap<BrowserKind, RawTab>>,
        calls: StdMutex<Vec<(BrowserKind, ThreadId)>>,
    }

    impl ScriptedInspector {
        fn show(&self, browser: BrowserKind, title: &str, url: &str, tab_index: i64) {
            self.tabs.lock().unwrap().insert(
                browser,
                RawTab {
                    title: title.to_string(),
                    url: url.to_string(),
                    tab_index,
                },
            );
        }

        fn fail(&self, browser: BrowserKind) {
            self.tabs.lock().unwrap().remove(&browser);
        }

        fn calls(&self) -> Vec<(BrowserKind, ThreadId)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TabInspector for ScriptedInspector {
        fn inspect(&self, browser: BrowserKind) -> RawTabResult {
            self.calls.lock().unwrap().push((browser, thread::current().id()));
            self.tabs
                .lock()
                .unwrap()
                .get(&browser)
                .cloned()
                .ok_or_else(|| InspectionError::Malformed("scripted failure".to_string()))
        }
    }

    struct Harness {
        frontmost: Arc<FakeFrontmost>,
        inspector: Arc<ScriptedInspector>,
        poller: TabPoller,
        rx: mpsc::Receiver<DaemonEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let frontmost = Arc::new(FakeFrontmost::default());
            let inspector = Arc::new(ScriptedInspector::default());
            let (tx, rx) = mpsc::channel(32);
            let poller = TabPoller::new(
                frontmost.clone(),
                inspector.clone(),
                tx,
                Throttle::new(SECOND, Duration::ZERO),
            );
            Self { frontmost, inspector, poller, rx }
        }

        /// Advances past the throttle and runs one timer tick.
        async fn tick(&mut self) {
            tokio::time::advance(SECOND).await;
            self.poller.on_poll_tick(Trigger::Tick).await;
            self.assert_invariant();
        }

        fn emitted(&mut self) -> Vec<Option<TabSnapshot>> {
            let mut out = Vec::new();
            while let Ok(evt) = self.rx.try_recv() {
                match evt {
                    DaemonEvent::TabChanged(tab) => out.push(tab),
                    other => panic!("unexpected event {other:?}"),
                }
            }
            out
        }

        fn assert_invariant(&self) {
            let state = self.poller.state();
            if let Some(snapshot) = &state.last_snapshot {
                assert_eq!(state.last_recognized_browser, Some(snapshot.browser));
            }
        }
    }

    fn titles(tabs: &[Option<TabSnapshot>]) -> Vec<Option<&str>> {
        tabs.iter().map(|t| t.as_ref().map(|s| s.title.as_str())).collect()
    }

    // ── dedup ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn identical_inspections_emit_once() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);

        for _ in 0..4 {
            h.tick().await;
        }

        assert_eq!(titles(&h.emitted()), vec![Some("Docs")]);
        assert_eq!(h.inspector.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn any_field_change_emits() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.apple.Safari"));
        h.inspector.show(BrowserKind::Safari, "A", "https://a.example", 1);
        h.tick().await;
        h.inspector.show(BrowserKind::Safari, "A", "https://a.example/next", 1);
        h.tick().await;
        h.inspector.show(BrowserKind::Safari, "A", "https://a.example/next", 2);
        h.tick().await;
        h.inspector.show(BrowserKind::Safari, "B", "https://a.example/next", 2);
        h.tick().await;

        let emitted = h.emitted();
        assert_eq!(emitted.len(), 4);
        assert_eq!(emitted[2].as_ref().unwrap().tab_index, 2);
        assert_eq!(h.poller.state().last_snapshot, emitted[3]);
    }

    // ── validity ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn invalid_answers_are_never_emitted() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));

        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 0);
        h.tick().await;
        h.inspector.show(BrowserKind::Chrome, "", "https://docs.rs", 1);
        h.tick().await;
        h.inspector.show(BrowserKind::Chrome, "Docs", "", 1);
        h.tick().await;

        assert!(h.emitted().is_empty());
        assert!(h.poller.state().last_snapshot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_answer_after_valid_tab_clears_once() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.tick().await;
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 0);
        h.tick().await;
        h.tick().await;

        assert_eq!(titles(&h.emitted()), vec![Some("Docs"), None]);
    }

    // ── clearing ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn unrecognized_app_clears_held_snapshot_once() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.microsoft.edgemac"));
        h.inspector.show(BrowserKind::Edge, "Mail", "https://mail.example", 1);
        h.tick().await;
        assert_eq!(titles(&h.emitted()), vec![Some("Mail")]);

        h.frontmost.set(Some("com.apple.Terminal"));
        h.tick().await;
        h.tick().await;

        assert_eq!(h.emitted(), vec![None]);
        let state = h.poller.state();
        assert!(state.last_snapshot.is_none());
        assert!(state.last_recognized_browser.is_none());
        assert_eq!(state.last_process_identity.as_deref(), Some("com.apple.Terminal"));
    }

    #[tokio::test(start_paused = true)]
    async fn losing_the_frontmost_app_clears_state() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.apple.Safari"));
        h.inspector.show(BrowserKind::Safari, "Home", "https://example.com", 1);
        h.tick().await;

        h.frontmost.set(None);
        h.tick().await;

        assert_eq!(titles(&h.emitted()), vec![Some("Home"), None]);
        assert_eq!(*h.poller.state(), MonitorState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn non_browser_without_prior_tab_emits_nothing() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.apple.finder"));
        h.tick().await;
        h.tick().await;

        assert!(h.emitted().is_empty());
        assert!(h.inspector.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn inspection_failure_clears_then_recovers() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.tick().await;

        h.inspector.fail(BrowserKind::Chrome);
        h.tick().await;
        h.tick().await;

        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.tick().await;

        assert_eq!(titles(&h.emitted()), vec![Some("Docs"), None, Some("Docs")]);
    }

    // ── browser switch & throttling ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn browser_switch_inspects_immediately_bypassing_throttle() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.inspector.show(BrowserKind::Safari, "News", "https://news.example", 4);
        h.tick().await;

        // Same instant as the previous check: a timer tick would be throttled.
        h.frontmost.set(Some("com.apple.Safari"));
        h.poller.on_poll_tick(Trigger::Tick).await;
        assert_eq!(h.inspector.calls().len(), 1);

        h.poller.on_poll_tick(Trigger::FrontmostChanged).await;

        let emitted = h.emitted();
        assert_eq!(titles(&emitted), vec![Some("Docs"), Some("News")]);
        assert_eq!(emitted[1].as_ref().unwrap().browser, BrowserKind::Safari);
        assert_eq!(h.poller.state().last_recognized_browser, Some(BrowserKind::Safari));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_inside_min_interval_is_a_no_op() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.tick().await;
        let finished = h.poller.last_poll().unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        h.poller.on_poll_tick(Trigger::Tick).await;

        assert_eq!(h.inspector.calls().len(), 1);
        assert_eq!(h.poller.last_poll(), Some(finished));
    }

    #[tokio::test(start_paused = true)]
    async fn switch_inspects_inline_and_steady_state_offloads() {
        let mut h = Harness::new();
        h.frontmost.set(Some("com.google.Chrome"));
        h.inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);
        h.tick().await;
        h.tick().await;

        let calls = h.inspector.calls();
        let here = thread::current().id();
        assert_eq!(calls[0].1, here, "switch inspection should run on the poll task");
        assert_ne!(calls[1].1, here, "steady-state inspection should be offloaded");
    }

    // ── BrowserTabMonitor ─────────────────────────────────────────────────────

    fn monitor() -> (
        BrowserTabMonitor,
        Arc<FakeFrontmost>,
        Arc<ScriptedInspector>,
        mpsc::Receiver<DaemonEvent>,
    ) {
        let frontmost = Arc::new(FakeFrontmost::default());
        let inspector = Arc::new(ScriptedInspector::default());
        let (tx, rx) = mpsc::channel(32);
        let monitor = BrowserTabMonitor::new(
            frontmost.clone(),
            inspector.clone(),
            tx,
            &MonitorConfig::default(),
        );
        (monitor, frontmost, inspector, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_polls_until_stopped() {
        let (mut monitor, frontmost, inspector, mut rx) = monitor();
        frontmost.set(Some("com.google.Chrome"));
        inspector.show(BrowserKind::Chrome, "Docs", "https://docs.rs", 1);

        monitor.start();
        assert!(monitor.is_running());
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        let Some(DaemonEvent::TabChanged(Some(tab))) = rx.recv().await else {
            panic!("expected a tab");
        };
        assert_eq!(tab.title, "Docs");
        let polled = inspector.calls().len();
        assert!(polled >= 3, "expected steady polling, got {polled} inspections");

        monitor.stop();
        monitor.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!monitor.is_running());
        assert_eq!(inspector.calls().len(), polled);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_keeps_one_loop() {
        let (mut monitor, frontmost, inspector, _rx) = monitor();
        frontmost.set(Some("com.apple.Safari"));
        inspector.show(BrowserKind::Safari, "Home", "https://example.com", 1);

        monitor.start();
        monitor.start();
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        // One loop: immediate tick plus ticks at 1s and 2s.
        assert_eq!(inspector.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn frontmost_change_wakes_the_loop() {
        let (mut monitor, frontmost, inspector, mut rx) = monitor();
        frontmost.set(Some("com.apple.Terminal"));
        inspector.show(BrowserKind::Safari, "Home", "https://example.com", 1);
        monitor.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        frontmost.set(Some("com.apple.Safari"));
        monitor.frontmost_changed();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let Ok(DaemonEvent::TabChanged(Some(tab))) = rx.try_recv() else {
            panic!("expected the wake-up to inspect Safari before the next tick");
        };
        assert_eq!(tab.browser, BrowserKind::Safari);
        assert_eq!(
            monitor.state().await.last_recognized_browser,
            Some(BrowserKind::Safari)
        );
    }
}
