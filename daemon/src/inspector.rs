/// Tab inspection capability.
///
/// The monitor only depends on [`TabInspector`]; the production
/// implementation runs the browser's AppleScript through `osascript`.  Both a
/// failed script and an empty answer are ordinary outcomes here: the caller
/// treats them exactly like "no tab".
use std::process::{Command, Output};

use thiserror::Error;

use crate::browser::{BrowserKind, RawTab};

/// Why a tab could not be read.
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("failed to launch osascript: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("script exited with {status}: {stderr}")]
    Script { status: i32, stderr: String },
    #[error("malformed script output: {0:?}")]
    Malformed(String),
    #[error("inspection worker died: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type RawTabResult = Result<RawTab, InspectionError>;

/// Reads the active tab of a browser. Implementations may block; the monitor
/// decides which thread they run on.
pub trait TabInspector: Send + Sync + 'static {
    fn inspect(&self, browser: BrowserKind) -> RawTabResult;
}

/// [`TabInspector`] backed by the per-browser AppleScript.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsaScriptInspector;

impl TabInspector for OsaScriptInspector {
    fn inspect(&self, browser: BrowserKind) -> RawTabResult {
        let stdout = run_osascript(browser.tab_script())?;
        parse_tab_output(&stdout)
    }
}

/// Runs `source` with `osascript -e` and returns its stdout.
pub fn run_osascript(source: &str) -> Result<String, InspectionError> {
    let output = Command::new("osascript").arg("-e").arg(source).output()?;
    stdout_of(output)
}

fn stdout_of(output: Output) -> Result<String, InspectionError> {
    if !output.status.success() {
        return Err(InspectionError::Script {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits `title \n url \n index` as printed by the tab scripts.
///
/// Fields are taken from the right so a title containing a line break cannot
/// shift the URL or index.
pub fn parse_tab_output(stdout: &str) -> Result<RawTab, InspectionError> {
    let body = stdout.strip_suffix('\n').unwrap_or(stdout);
    let mut fields = body.rsplitn(3, '\n');
    let (Some(index), Some(url), Some(title)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(InspectionError::Malformed(stdout.to_string()));
    };
    let tab_index = index
        .trim()
        .parse::<i64>()
        .map_err(|_| InspectionError::Malformed(stdout.to_string()))?;

    Ok(RawTab {
        title: title.to_string(),
        url: url.trim().to_string(),
        tab_index,
    })
}
