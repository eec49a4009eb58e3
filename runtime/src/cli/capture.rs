//! The capture command: launch, monitor until closed or interrupted, report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use livenav::{run_session, BrowserPreference, FsWriter, SessionConfig};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::browser::chromium::LaunchOptions;
use crate::browser::ChromiumLauncher;
use crate::cli::output::{self, Styled};
use crate::config::{normalize_url, resolve_output_dir};

/// Parsed command-line options for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureArgs {
    pub url: String,
    pub browser: Option<String>,
    pub output: Option<PathBuf>,
    pub headless: bool,
}

/// Unknown names fall back to Chrome with a warning.
pub fn parse_browser(raw: Option<&str>) -> BrowserPreference {
    match raw {
        None => BrowserPreference::default(),
        Some(name) => name.parse().unwrap_or_else(|e| {
            warn!("{e}; using chrome");
            BrowserPreference::Chrome
        }),
    }
}

pub async fn run(args: CaptureArgs) -> Result<()> {
    let target = normalize_url(&args.url)?;
    let browser = parse_browser(args.browser.as_deref());
    let output_root = resolve_output_dir(args.output);

    let config = SessionConfig::new(target.clone(), output_root.clone()).with_browser(browser);
    let launcher = ChromiumLauncher::new(LaunchOptions {
        headless: args.headless,
        ..LaunchOptions::default()
    });

    let style = Styled::new();
    if !output::is_quiet() {
        println!("{}", output::instructions(&style, browser, &target));
    }
    info!("output directory: {}", output_root.display());

    // Register the handler before launching so an early Ctrl-C still finalizes.
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            let _ = stop_tx.send(());
        }
    });
    let stop = async move {
        // A dropped sender means the signal listener is gone, not a stop.
        if stop_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = run_session(config, &launcher, Arc::new(FsWriter), stop).await;
    signal.abort();

    let report = result.context("capture session failed")?;
    if !output::is_quiet() {
        println!();
        println!("{}", output::summary(&style, &report, &output_root));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_browser_defaults_to_chrome() {
        assert_eq!(parse_browser(None), BrowserPreference::Chrome);
        assert_eq!(parse_browser(Some("Chromium")), BrowserPreference::Chromium);
        assert_eq!(parse_browser(Some("firefox")), BrowserPreference::Firefox);
        assert_eq!(parse_browser(Some("safari")), BrowserPreference::Chrome);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_launch() {
        let args = CaptureArgs {
            url: "https://".to_string(),
            browser: None,
            output: Some(std::env::temp_dir().join("livenav-never-created")),
            headless: true,
        };
        assert!(run(args).await.is_err());
    }
}
