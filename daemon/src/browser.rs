/// Recognized browsers and the tab snapshots read from them.
///
/// A browser is recognized purely by an exact match on the bundle identifier
/// of the frontmost process.  Each kind carries the AppleScript used to read
/// its active tab; every script answers with three line-feed separated fields
/// (title, URL, tab index) and reports an empty tab with index `0` when the
/// browser is not frontmost or has no active tab.
use serde::Serialize;

/// One of the browsers whose active tab can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Safari,
    Chrome,
    Edge,
}

impl BrowserKind {
    pub const ALL: [BrowserKind; 3] = [BrowserKind::Safari, BrowserKind::Chrome, BrowserKind::Edge];

    /// Bundle identifier used to classify the frontmost process.
    pub fn bundle_id(self) -> &'static str {
        match self {
            BrowserKind::Safari => "com.apple.Safari",
            BrowserKind::Chrome => "com.google.Chrome",
            BrowserKind::Edge => "com.microsoft.edgemac",
        }
    }

    /// Human-readable name, also the prefix of the synced tab status.
    pub fn display_name(self) -> &'static str {
        match self {
            BrowserKind::Safari => "Safari",
            BrowserKind::Chrome => "Google Chrome",
            BrowserKind::Edge => "Microsoft Edge",
        }
    }

    /// Classifies a process identity. Matching is exact: no case folding,
    /// no prefix matching (`com.google.Chrome.canary` is not Chrome).
    pub fn from_bundle_id(identity: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.bundle_id() == identity)
    }

    /// AppleScript source that reads the active tab of this browser.
    pub fn tab_script(self) -> &'static str {
        match self {
            BrowserKind::Safari => SAFARI_SCRIPT,
            BrowserKind::Chrome => CHROME_SCRIPT,
            BrowserKind::Edge => EDGE_SCRIPT,
        }
    }
}

const SAFARI_SCRIPT: &str = r#"
tell application "Safari"
    if frontmost then
        tell front window
            try
                set tabTitle to name of current tab
                set tabURL to URL of current tab
                set tabIndex to index of current tab
                return tabTitle & linefeed & tabURL & linefeed & (tabIndex as string)
            on error
                return "" & linefeed & "" & linefeed & "0"
            end try
        end tell
    end if
    return "" & linefeed & "" & linefeed & "0"
end tell
"#;

const CHROME_SCRIPT: &str = r#"
tell application "Google Chrome"
    if frontmost then
        tell front window
            try
                set tabTitle to title of active tab
                set tabURL to URL of active tab
                set tabIndex to active tab index
                return tabTitle & linefeed & tabURL & linefeed & (tabIndex as string)
            on error
                return "" & linefeed & "" & linefeed & "0"
            end try
        end tell
    end if
    return "" & linefeed & "" & linefeed & "0"
end tell
"#;

// Edge does not expose a usable index for its active tab, so a found tab
// always reports index 1.
const EDGE_SCRIPT: &str = r#"
tell application "Microsoft Edge"
    if frontmost then
        try
            if (count of windows) > 0 then
                tell first window
                    if (count of tabs) > 0 then
                        set activeTab to active tab
                        return (title of activeTab) & linefeed & (URL of activeTab) & linefeed & "1"
                    end if
                end tell
            end if
        on error
            return "" & linefeed & "" & linefeed & "0"
        end try
    end if
    return "" & linefeed & "" & linefeed & "0"
end tell
"#;

/// Raw answer of a tab inspection, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTab {
    pub title: String,
    pub url: String,
    pub tab_index: i64,
}

impl RawTab {
    /// Attaches the browser kind, returning `None` when the answer does not
    /// describe a real tab. An invalid answer is never promoted to a snapshot.
    pub fn into_snapshot(self, browser: BrowserKind) -> Option<TabSnapshot> {
        let snapshot = TabSnapshot {
            title: self.title,
            url: self.url,
            browser,
            tab_index: self.tab_index,
        };
        snapshot.is_valid().then_some(snapshot)
    }
}

/// Point-in-time record of the active tab of the frontmost browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    pub title: String,
    pub url: String,
    pub browser: BrowserKind,
    pub tab_index: i64,
}

impl TabSnapshot {
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.url.is_empty() && self.tab_index > 0
    }

    /// Status text reported for this tab: `"<browser>: <title>"`.
    pub fn status_text(&self) -> String {
        format!("{}: {}", self.browser.display_name(), self.title)
    }
}
