//! Noise filtering for browser events.
//!
//! Pure predicates that decide whether a request or response is worth
//! printing or capturing. Matching is a case-insensitive substring test on
//! the raw URL, not a parsed-URL comparison, so vendor variants such as
//! `www.google-analytics.com/g/collect` and `ssl.google-analytics.com` are
//! caught by the same pattern.

use crate::browser::ConsoleLevel;
use crate::types::ResourceKind;

/// URL substrings denoting analytics, tracking and beacon endpoints.
pub const SKIP_PATTERNS: &[&str] = &[
    "google-analytics",
    "googletag",
    "doubleclick",
    "facebook.com/tr",
    "analytics",
    "tracking",
    "beacon",
    "monitoring",
    "gtm",
    "hotjar",
];

/// Default display width for shortened URLs in log lines.
pub const DEFAULT_URL_DISPLAY_LEN: usize = 80;

/// What happens to a response given its HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Status 200: proceed to capture.
    Capture,
    /// Status >= 400: log as a failure, then drop.
    Failed,
    /// Redirects, not-modified and every other status: drop silently.
    Ignored,
}

/// Classify a response by status code. Only exactly 200 is captured.
pub fn response_disposition(status: u16) -> ResponseDisposition {
    match status {
        200 => ResponseDisposition::Capture,
        s if s >= 400 => ResponseDisposition::Failed,
        _ => ResponseDisposition::Ignored,
    }
}

/// Kinds too noisy to print per request. Capture is unaffected.
pub fn should_skip_logging(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Image | ResourceKind::Font | ResourceKind::Media
    )
}

/// Whether a URL belongs to a tracking/analytics endpoint and must not be captured.
pub fn should_skip_capture(url: &str) -> bool {
    let lower = url.to_lowercase();
    SKIP_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Only errors and warnings from the page console reach the log.
pub fn should_log_console(level: ConsoleLevel) -> bool {
    matches!(level, ConsoleLevel::Error | ConsoleLevel::Warning)
}

/// Failed image and font loads are routine; everything else is logged.
pub fn should_log_failed_request(kind: ResourceKind) -> bool {
    !matches!(kind, ResourceKind::Image | ResourceKind::Font)
}

/// Truncate a URL for display, ending with `...` when cut.
pub fn shorten_url(url: &str, max_len: usize) -> String {
    if url.chars().count() <= max_len {
        return url.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut short: String = url.chars().take(keep).collect();
    short.push_str("...");
    short
}
