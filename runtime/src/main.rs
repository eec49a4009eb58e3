// Copyright 2026 livenav contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use livenav_runtime::cli::{self, capture::CaptureArgs};
use livenav_runtime::config::{NO_COLOR_ENV, QUIET_ENV};
use livenav_runtime::logging::init_logging;

#[derive(Parser)]
#[command(
    name = "livenav",
    about = "livenav: capture everything you browse in a live browser window",
    version,
    after_help = "Example: livenav https://example.com --browser chromium"
)]
struct Cli {
    /// Starting URL (https:// is added when no scheme is given)
    url: String,

    /// Browser to drive: chrome, chromium or firefox
    #[arg(long, short)]
    browser: Option<String>,

    /// Output directory (defaults to $LIVENAV_OUTPUT_DIR or ./scraper_output)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Suppress non-essential output
    #[arg(long, short)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so output helpers can check them
    if cli.quiet {
        std::env::set_var(QUIET_ENV, "1");
    }
    if cli.no_color {
        std::env::set_var(NO_COLOR_ENV, "1");
    }
    init_logging(cli.verbose, cli.quiet, cli::output::no_color());

    let result = cli::capture::run(CaptureArgs {
        url: cli.url,
        browser: cli.browser,
        output: cli.output,
        headless: cli.headless,
    })
    .await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
