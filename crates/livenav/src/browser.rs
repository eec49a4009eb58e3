//! Browser capability abstraction.
//!
//! The capture pipeline never talks to a concrete automation driver. It
//! depends on a [`BrowserSession`] that publishes typed [`BrowserEvent`]s on
//! a broadcast channel and can hand back response bodies and the current
//! rendered markup. Acquisition (which binary, which fallback) lives behind
//! [`BrowserLauncher`].

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{BrowserPreference, LiveNavResult, ResourceKind};

/// Severity of a page console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warning,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Error => "error",
        }
    }
}

/// An outgoing request as seen by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub resource_kind: ResourceKind,
}

/// A completed response. The body is fetched on demand through
/// [`BrowserSession::body_bytes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub request_id: String,
    pub url: String,
    pub status: u16,
    pub resource_kind: ResourceKind,
    /// Response headers, keys lowercased.
    pub headers: HashMap<String, String>,
}

impl ResponseInfo {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Lowercased `Content-Type`, empty when absent.
    pub fn content_type(&self) -> String {
        self.header("content-type")
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Everything a live browser session reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrowserEvent {
    Request(RequestInfo),
    Response(ResponseInfo),
    /// A frame committed a navigation, including same-document route changes.
    Navigated { is_main_frame: bool, url: String },
    Console { level: ConsoleLevel, text: String },
    PageError { message: String },
    RequestFailed {
        url: String,
        resource_kind: ResourceKind,
        error_text: String,
    },
}

/// A live browser tab the capture pipeline observes.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Label recorded in the report (the browser actually in use).
    fn label(&self) -> &str;

    /// Subscribe to all future browser events.
    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent>;

    /// Navigate the observed tab. Callers bound this with their own timeout.
    async fn navigate(&self, url: &str) -> LiveNavResult<()>;

    /// Current fully rendered markup of the observed tab.
    async fn current_markup(&self) -> LiveNavResult<String>;

    /// Body of a completed response; empty when the browser has none.
    async fn body_bytes(&self, response: &ResponseInfo) -> LiveNavResult<Vec<u8>>;

    /// Whether the observed tab has been closed by the user.
    async fn is_closed(&self) -> bool;

    /// Release the browser. Flushes any traffic archive it records.
    async fn close(&self) -> LiveNavResult<()>;
}

/// Acquires a browser session according to a preference.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser, recording traffic to `har_path`.
    ///
    /// Implementations own the fallback chain between browser variants.
    async fn launch(
        &self,
        preference: BrowserPreference,
        har_path: &Path,
    ) -> LiveNavResult<Box<dyn BrowserSession>>;
}
