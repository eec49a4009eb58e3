//! Tracing subscriber setup for the `livenav` binary.

use tracing_subscriber::EnvFilter;

/// Filter directives for the given verbosity flags.
///
/// `RUST_LOG` is honoured only when neither flag is set.
pub fn filter_directives(verbose: bool, quiet: bool) -> String {
    if verbose {
        "livenav=debug,livenav_runtime=debug".to_string()
    } else if quiet {
        "livenav=error,livenav_runtime=error".to_string()
    } else {
        std::env::var("RUST_LOG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "livenav=info,livenav_runtime=info".to_string())
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbose: bool, quiet: bool, no_color: bool) {
    let filter = EnvFilter::try_new(filter_directives(verbose, quiet))
        .unwrap_or_else(|_| EnvFilter::new("livenav=info,livenav_runtime=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_ansi(!no_color)
        .try_init();
}
