/// Frontmost-application capability.
///
/// Both the tab monitor and the workspace watcher ask "which process has
/// focus right now?" through [`FrontmostSource`].  The production source asks
/// System Events via `osascript`; any failure is reported as "nothing
/// frontmost".
use std::sync::Arc;

use tracing::debug;

use crate::inspector::run_osascript;

const FRONTMOST_SCRIPT: &str = r#"
tell application "System Events"
    set frontApp to first application process whose frontmost is true
    set bundleId to ""
    try
        set bundleId to bundle identifier of frontApp
        if bundleId is missing value then set bundleId to ""
    end try
    return bundleId & linefeed & (displayed name of frontApp) & linefeed & ((unix id of frontApp) as string)
end tell
"#;

/// The process currently receiving user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmostApp {
    /// Bundle identifier; the value browsers are classified by.
    pub identity: String,
    pub display_name: String,
    pub pid: Option<u32>,
}

pub trait FrontmostSource: Send + Sync + 'static {
    /// Returns `None` when no frontmost process, or no identity for it, can
    /// be resolved.
    fn current_frontmost(&self) -> Option<FrontmostApp>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEventsFrontmost;

impl FrontmostSource for SystemEventsFrontmost {
    fn current_frontmost(&self) -> Option<FrontmostApp> {
        match run_osascript(FRONTMOST_SCRIPT) {
            Ok(stdout) => parse_frontmost_output(&stdout),
            Err(e) => {
                debug!(error = %e, "frontmost query failed");
                None
            }
        }
    }
}

/// Asks `source` on the blocking pool so a slow `osascript` never stalls a
/// runtime worker. A panicked query reads as nothing frontmost.
pub async fn query(source: &Arc<dyn FrontmostSource>) -> Option<FrontmostApp> {
    let source = Arc::clone(source);
    match tokio::task::spawn_blocking(move || source.current_frontmost()).await {
        Ok(app) => app,
        Err(e) => {
            debug!(error = %e, "frontmost query worker died");
            None
        }
    }
}

/// Parses `bundle id \n name \n pid`. An empty bundle id means the process
/// has no identity and is reported as `None`.
pub fn parse_frontmost_output(stdout: &str) -> Option<FrontmostApp> {
    let body = stdout.strip_suffix('\n').unwrap_or(stdout);
    let mut fields = body.splitn(3, '\n');
    let identity = fields.next()?.trim();
    let display_name = fields.next()?.trim();
    let pid = fields.next().and_then(|p| p.trim().parse::<u32>().ok());

    if identity.is_empty() {
        return None;
    }
    let display_name = if display_name.is_empty() { identity } else { display_name };

    Some(FrontmostApp {
        identity: identity.to_string(),
        display_name: display_name.to_string(),
        pid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identity_name_and_pid() {
        let app = parse_frontmost_output("com.apple.Safari\nSafari\n412\n").unwrap();
        assert_eq!(app.identity, "com.apple.Safari");
        assert_eq!(app.display_name, "Safari");
        assert_eq!(app.pid, Some(412));
    }

    #[test]
    fn missing_bundle_id_means_no_identity() {
        assert!(parse_frontmost_output("\nsome-cli-tool\n77\n").is_none());
    }

    #[test]
    fn unparsable_pid_is_dropped() {
        let app = parse_frontmost_output("com.apple.Terminal\nTerminal\n?\n").unwrap();
        assert_eq!(app.pid, None);
    }

    #[test]
    fn empty_name_falls_back_to_identity() {
        let app = parse_frontmost_output("com.example.Tool\n\n9\n").unwrap();
        assert_eq!(app.display_name, "com.example.Tool");
    }

    #[test]
    fn truncated_output_is_none() {
        assert!(parse_frontmost_output("com.apple.Safari").is_none());
        assert!(parse_frontmost_output("").is_none());
    }

    // ── query ─────────────────────────────────────────────────────────────────

    struct ThreadRecorder(std::sync::Mutex<Option<std::thread::ThreadId>>);

    impl FrontmostSource for ThreadRecorder {
        fn current_frontmost(&self) -> Option<FrontmostApp> {
            *self.0.lock().unwrap() = Some(std::thread::current().id());
            parse_frontmost_output("com.apple.Terminal\nTerminal\n7\n")
        }
    }

    #[tokio::test]
    async fn query_runs_off_the_runtime_thread() {
        let recorder = Arc::new(ThreadRecorder(std::sync::Mutex::new(None)));
        let source: Arc<dyn FrontmostSource> = recorder.clone();

        let app = query(&source).await.unwrap();
        assert_eq!(app.identity, "com.apple.Terminal");

        let worker = recorder.0.lock().unwrap().unwrap();
        assert_ne!(worker, std::thread::current().id());
    }

    struct Panicking;

    impl FrontmostSource for Panicking {
        fn current_frontmost(&self) -> Option<FrontmostApp> {
            panic!("System Events unavailable")
        }
    }

    #[tokio::test]
    async fn panicked_query_reads_as_nothing_frontmost() {
        let source: Arc<dyn FrontmostSource> = Arc::new(Panicking);
        assert!(query(&source).await.is_none());
    }
}
