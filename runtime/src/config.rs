//! Environment variables and command-line value resolution.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;

/// Explicit Google Chrome executable.
pub const CHROME_PATH_ENV: &str = "LIVENAV_CHROME_PATH";
/// Explicit Chromium executable.
pub const CHROMIUM_PATH_ENV: &str = "LIVENAV_CHROMIUM_PATH";
/// Output root when `--output` is not given.
pub const OUTPUT_DIR_ENV: &str = "LIVENAV_OUTPUT_DIR";
pub const QUIET_ENV: &str = "LIVENAV_QUIET";
pub const NO_COLOR_ENV: &str = "LIVENAV_NO_COLOR";

pub const DEFAULT_OUTPUT_DIR: &str = "scraper_output";

/// Prepend `https://` when no scheme is given and check the result parses.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("target URL is empty");
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).with_context(|| format!("invalid URL: {raw}"))?;
    if parsed.host_str().is_none() {
        bail!("URL has no host: {raw}");
    }
    Ok(candidate)
}

/// Flag, then `LIVENAV_OUTPUT_DIR`, then `scraper_output`.
pub fn resolve_output_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var_os(OUTPUT_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

pub fn env_flag(var: &str) -> bool {
    std::env::var(var).map(|v| v == "1").unwrap_or(false)
}
