//! Core data types for a live capture session.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Browser-classified category of a network exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Other,
}

impl ResourceKind {
    /// Lowercase name, also used as the synthesized file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Document => "document",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
            ResourceKind::Image => "image",
            ResourceKind::Font => "font",
            ResourceKind::Media => "media",
            ResourceKind::Other => "other",
        }
    }

    /// Map a browser resource type name onto a kind.
    ///
    /// Anything the browser reports that is not one of the named kinds
    /// (xhr, fetch, websocket, manifest, ...) is `Other`.
    pub fn from_browser_type(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "document" => ResourceKind::Document,
            "stylesheet" => ResourceKind::Stylesheet,
            "script" => ResourceKind::Script,
            "image" => ResourceKind::Image,
            "font" => ResourceKind::Font,
            "media" => ResourceKind::Media,
            _ => ResourceKind::Other,
        }
    }

    /// Whether the content of this kind is scanned for technology signatures.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ResourceKind::Document | ResourceKind::Stylesheet | ResourceKind::Script
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage category: one subdirectory of the dump tree each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Html,
    Css,
    Js,
    Images,
    Fonts,
    Other,
    /// Rendered-markup snapshots taken after navigations.
    Pages,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Html,
        Category::Css,
        Category::Js,
        Category::Images,
        Category::Fonts,
        Category::Other,
        Category::Pages,
    ];

    /// Directory name under `dump/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Html => "html",
            Category::Css => "css",
            Category::Js => "js",
            Category::Images => "images",
            Category::Fonts => "fonts",
            Category::Other => "other",
            Category::Pages => "pages",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A record of one persisted resource. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub url: String,
    pub resource_kind: ResourceKind,
    pub stored_path: PathBuf,
    pub captured_at: DateTime<Local>,
}

impl CaptureEntry {
    /// Create an entry stamped with the current local time.
    pub fn new(url: impl Into<String>, resource_kind: ResourceKind, stored_path: PathBuf) -> Self {
        Self {
            url: url.into(),
            resource_kind,
            stored_path,
            captured_at: Local::now(),
        }
    }
}

/// Session-wide state, serialized into the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub start_time: DateTime<Local>,
    /// Top-level locations in first-seen order, unique by exact string.
    pub visited_locations: Vec<String>,
    pub total_captured: usize,
    pub browser_label: String,
}

impl SessionState {
    pub fn new(browser_label: impl Into<String>) -> Self {
        Self {
            start_time: Local::now(),
            visited_locations: Vec::new(),
            total_captured: 0,
            browser_label: browser_label.into(),
        }
    }
}

/// Which browser the operator asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserPreference {
    #[default]
    Chrome,
    Chromium,
    Firefox,
}

impl BrowserPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserPreference::Chrome => "chrome",
            BrowserPreference::Chromium => "chromium",
            BrowserPreference::Firefox => "firefox",
        }
    }
}

impl fmt::Display for BrowserPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserPreference {
    type Err = LiveNavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(BrowserPreference::Chrome),
            "chromium" => Ok(BrowserPreference::Chromium),
            "firefox" => Ok(BrowserPreference::Firefox),
            other => Err(LiveNavError::InvalidInput(format!(
                "unknown browser '{other}' (expected chrome, chromium or firefox)"
            ))),
        }
    }
}

/// Errors raised by the capture pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LiveNavError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type LiveNavResult<T> = Result<T, LiveNavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_from_browser_type() {
        assert_eq!(ResourceKind::from_browser_type("Document"), ResourceKind::Document);
        assert_eq!(ResourceKind::from_browser_type("stylesheet"), ResourceKind::Stylesheet);
        assert_eq!(ResourceKind::from_browser_type("Font"), ResourceKind::Font);
        assert_eq!(ResourceKind::from_browser_type("XHR"), ResourceKind::Other);
        assert_eq!(ResourceKind::from_browser_type("fetch"), ResourceKind::Other);
    }

    #[test]
    fn test_resource_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ResourceKind::Stylesheet).unwrap();
        assert_eq!(json, "\"stylesheet\"");
    }

    #[test]
    fn test_browser_preference_parse() {
        assert_eq!("Firefox".parse::<BrowserPreference>().unwrap(), BrowserPreference::Firefox);
        assert_eq!(" chrome ".parse::<BrowserPreference>().unwrap(), BrowserPreference::Chrome);
        assert!("safari".parse::<BrowserPreference>().is_err());
        assert_eq!(BrowserPreference::default(), BrowserPreference::Chrome);
    }

    #[test]
    fn test_category_dirs_are_distinct() {
        let mut names: Vec<&str> = Category::ALL.iter().map(|c| c.dir_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Category::ALL.len());
    }
}
