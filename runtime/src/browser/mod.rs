//! Browser acquisition for live capture sessions.
//!
//! [`ChromiumLauncher`] resolves the operator's preference into a concrete
//! executable and launches it as a visible window driven over CDP. Chrome
//! falls back to Chromium; Firefox has no CDP driver here and is served by
//! the Chromium chain as well.

pub mod chromium;
pub mod exchange;
pub mod har;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use livenav::{BrowserLauncher, BrowserPreference, BrowserSession, LiveNavError, LiveNavResult};
use tracing::{info, warn};

use crate::config::{CHROME_PATH_ENV, CHROMIUM_PATH_ENV};
use chromium::{ChromiumSession, LaunchOptions};

/// A concrete browser binary and the label it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCandidate {
    pub label: &'static str,
    pub executable: PathBuf,
}

/// Find a Google Chrome executable.
pub fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = env_path(CHROME_PATH_ENV) {
        return Some(path);
    }

    for name in ["google-chrome", "google-chrome-stable", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &["/opt/google/chrome/chrome", "/usr/bin/google-chrome"]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Find a Chromium executable.
pub fn find_chromium() -> Option<PathBuf> {
    if let Some(path) = env_path(CHROMIUM_PATH_ENV) {
        return Some(path);
    }

    // ~/.livenav/chromium/ holds a manually unpacked Chrome for Testing
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".livenav/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".livenav/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".livenav/chromium/chrome-linux64/chrome"),
                home.join(".livenav/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    for name in ["chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

fn env_path(var: &str) -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(var)?);
    path.exists().then_some(path)
}

/// Ordered launch attempts for a preference.
pub fn candidates(preference: BrowserPreference) -> Vec<BrowserCandidate> {
    let chrome = find_chrome().map(|executable| BrowserCandidate {
        label: "chrome",
        executable,
    });
    let chromium = find_chromium().map(|executable| BrowserCandidate {
        label: "chromium",
        executable,
    });
    fallback_order(preference, chrome, chromium)
}

fn fallback_order(
    preference: BrowserPreference,
    chrome: Option<BrowserCandidate>,
    chromium: Option<BrowserCandidate>,
) -> Vec<BrowserCandidate> {
    let order = match preference {
        BrowserPreference::Chrome => vec![chrome, chromium],
        BrowserPreference::Chromium | BrowserPreference::Firefox => vec![chromium, chrome],
    };
    let mut found: Vec<BrowserCandidate> = order.into_iter().flatten().collect();
    found.dedup_by(|a, b| a.executable == b.executable);
    found
}

/// Launches Chrome-family browsers with the fallback chain.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    pub options: LaunchOptions,
}

impl ChromiumLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        preference: BrowserPreference,
        har_path: &Path,
    ) -> LiveNavResult<Box<dyn BrowserSession>> {
        if preference == BrowserPreference::Firefox {
            warn!("firefox cannot be driven over CDP, using chromium instead");
        }

        let candidates = candidates(preference);
        if candidates.is_empty() {
            return Err(LiveNavError::Browser(format!(
                "no Chrome or Chromium executable found (set {CHROME_PATH_ENV} or {CHROMIUM_PATH_ENV})"
            )));
        }

        let mut last_error = None;
        for candidate in candidates {
            info!("launching {} ({})", candidate.label, candidate.executable.display());
            match ChromiumSession::launch(&candidate, &self.options, har_path).await {
                Ok(session) => return Ok(Box::new(session)),
                Err(e) => {
                    warn!("failed to launch {}: {e:#}", candidate.label);
                    last_error = Some(e);
                }
            }
        }

        Err(LiveNavError::Browser(match last_error {
            Some(e) => format!("{e:#}"),
            None => "no browser could be launched".to_string(),
        }))
    }
}
