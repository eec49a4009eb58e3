//! Route-change tracking and page snapshots.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserSession;
use crate::classify::UrlParts;
use crate::detect::TechnologyDetector;
use crate::events::{now_timestamp, LiveNavEvent};
use crate::filter::{shorten_url, DEFAULT_URL_DISPLAY_LEN};
use crate::persist::{PersistOutcome, ResourcePersister};
use crate::session::SessionHandle;
use crate::types::Category;

/// Time the page gets to render after a route change before its markup is read.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Longest snapshot name before the `.html` extension.
const MAX_SNAPSHOT_NAME_LEN: usize = 100;

/// Schemes whose locations never carry page content.
const NON_CONTENT_SCHEMES: &[&str] = &[
    "about:",
    "data:",
    "blob:",
    "javascript:",
    "chrome:",
    "chrome-error:",
];

/// Whether a navigation target is a real page worth tracking.
pub fn is_content_url(url: &str) -> bool {
    !url.is_empty() && !NON_CONTENT_SCHEMES.iter().any(|s| url.starts_with(s))
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid regex"))
}

/// Filesystem-safe snapshot name for a page URL, without extension.
///
/// `https://ex.com:8080/a/b` → `ex_com_8080_a_b`; an empty path becomes `index`.
pub fn snapshot_filename(url: &str) -> String {
    let parts = UrlParts::split(url);
    let domain = parts.netloc.replace(':', "_");
    let path = parts.path.replace('/', "_");
    let path = match path.trim_matches('_') {
        "" => "index",
        trimmed => trimmed,
    };

    let joined = format!("{domain}_{path}");
    let safe = unsafe_chars().replace_all(&joined, "_");
    safe.chars().take(MAX_SNAPSHOT_NAME_LEN).collect()
}

/// Result of handling one navigation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Sub-frame, empty or non-content location.
    Ignored,
    Stored(PathBuf),
    Failed { reason: String },
}

/// Follows main-frame navigations, recording visits and snapshotting pages.
pub struct NavigationTracker {
    session: SessionHandle,
    browser: Arc<dyn BrowserSession>,
    persister: Arc<ResourcePersister>,
    detector: TechnologyDetector,
    events: broadcast::Sender<LiveNavEvent>,
}

impl NavigationTracker {
    pub fn new(
        session: SessionHandle,
        browser: Arc<dyn BrowserSession>,
        persister: Arc<ResourcePersister>,
        detector: TechnologyDetector,
        events: broadcast::Sender<LiveNavEvent>,
    ) -> Self {
        Self {
            session,
            browser,
            persister,
            detector,
            events,
        }
    }

    /// Handle a frame navigation end to end.
    ///
    /// Every qualifying event produces a snapshot, including revisits; only
    /// the visited-location list is deduplicated.
    pub async fn on_navigated(&self, is_main_frame: bool, url: &str) -> SnapshotOutcome {
        if !self.accept(is_main_frame, url) {
            return SnapshotOutcome::Ignored;
        }
        self.settle_and_snapshot(url).await
    }

    /// Filter a navigation and record the visit without waiting.
    ///
    /// Must be called in event order: the visited-location list keeps the
    /// order in which visits are enqueued here.
    pub fn accept(&self, is_main_frame: bool, url: &str) -> bool {
        if !is_main_frame || !is_content_url(url) {
            debug!("ignoring navigation to {url:?} (main frame: {is_main_frame})");
            return false;
        }

        info!("NAVIGATION DETECTED: {}", shorten_url(url, DEFAULT_URL_DISPLAY_LEN));
        if let Err(e) = self.session.note_visit(url) {
            warn!("could not record visit to {url}: {e}");
        }
        true
    }

    /// Wait for the page to render, then snapshot and scan it.
    pub async fn settle_and_snapshot(&self, url: &str) -> SnapshotOutcome {
        tokio::time::sleep(SETTLE_DELAY).await;
        self.snapshot(url).await
    }

    async fn snapshot(&self, url: &str) -> SnapshotOutcome {
        let markup = match self.browser.current_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                error!("Error capturing snapshot: {e}");
                return self.failed(url, e.to_string());
            }
        };

        let filename = format!("{}.html", snapshot_filename(url));
        let outcome = match self
            .persister
            .persist(Category::Pages, &filename, markup.as_bytes())
            .await
        {
            PersistOutcome::Stored(path) => {
                info!("SNAPSHOT: {filename}");
                let _ = self.events.send(LiveNavEvent::SnapshotCaptured {
                    url: url.to_string(),
                    stored_path: path.display().to_string(),
                    timestamp: now_timestamp(),
                });
                SnapshotOutcome::Stored(path)
            }
            PersistOutcome::Failed { reason } => {
                error!("Error capturing snapshot: {reason}");
                self.failed(url, reason)
            }
        };

        self.detector.scan_markup(url, &markup).await;
        outcome
    }

    fn failed(&self, url: &str, reason: String) -> SnapshotOutcome {
        let _ = self.events.send(LiveNavEvent::CaptureFailed {
            url: url.to_string(),
            reason: reason.clone(),
            timestamp: now_timestamp(),
        });
        SnapshotOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_urls() {
        assert!(is_content_url("https://ex.com/"));
        assert!(is_content_url("http://localhost:3000/app"));
        assert!(!is_content_url(""));
        assert!(!is_content_url("about:blank"));
        assert!(!is_content_url("data:text/html,<p>x</p>"));
        assert!(!is_content_url("chrome-error://chromewebdata/"));
        assert!(!is_content_url("javascript:void(0)"));
    }

    #[test]
    fn test_snapshot_filename() {
        assert_eq!(snapshot_filename("https://ex.com/home"), "ex_com_home");
        assert_eq!(snapshot_filename("https://ex.com/"), "ex_com_index");
        assert_eq!(snapshot_filename("https://ex.com"), "ex_com_index");
        assert_eq!(
            snapshot_filename("http://localhost:8080/app/users/"),
            "localhost_8080_app_users"
        );
        assert_eq!(snapshot_filename("https://ex.com/a b/ü"), "ex_com_a_20b__C3_BC");
    }

    #[test]
    fn test_snapshot_filename_ignores_query() {
        assert_eq!(snapshot_filename("https://ex.com/search?q=1#top"), "ex_com_search");
    }

    #[test]
    fn test_snapshot_filename_truncated() {
        let url = format!("https://ex.com/{}", "a".repeat(300));
        let name = snapshot_filename(&url);
        assert_eq!(name.len(), MAX_SNAPSHOT_NAME_LEN);
        assert!(name.starts_with("ex_com_aaa"));
    }
}
