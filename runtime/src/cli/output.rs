//! User-facing terminal output: the instructions banner and the final summary.
//!
//! Live capture lines go through `tracing`; this module only prints what
//! the operator reads before and after a session.

use std::fmt::Write as _;
use std::path::Path;

use livenav::{BrowserPreference, FinalReport, OutputLayout};

use crate::config::{env_flag, NO_COLOR_ENV, QUIET_ENV};

const RULE_WIDTH: usize = 60;

pub fn is_quiet() -> bool {
    env_flag(QUIET_ENV)
}

pub fn no_color() -> bool {
    env_flag(NO_COLOR_ENV) || std::env::var_os("NO_COLOR").is_some()
}

/// ANSI styling that degrades to plain text under `--no-color`.
pub struct Styled {
    color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self { color: !no_color() }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "[OK]")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "[!!]")
    }
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Banner printed once the session is starting.
pub fn instructions(style: &Styled, browser: BrowserPreference, target: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "{}", style.bold("LIVE NAVIGATION CAPTURE"));
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "  Browser: {browser}");
    let _ = writeln!(out, "  Start:   {target}");
    let _ = writeln!(out, "  Browse freely in the browser window. Captured automatically:");
    for item in [
        "HTML, CSS, JavaScript",
        "Images and fonts",
        "API calls and dynamic resources",
        "Detected technologies (React, Angular, ...)",
    ] {
        let _ = writeln!(out, "    {} {item}", style.ok_sym());
    }
    let _ = writeln!(out, "  Close the window or press Ctrl+C to finish.");
    let _ = write!(out, "{}", rule());
    out
}

/// Summary printed after the report has been written.
pub fn summary(style: &Styled, report: &FinalReport, output_root: &Path) -> String {
    let session = &report.session;
    let elapsed = report.end_time - session.start_time;

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "{}", style.bold("SESSION SUMMARY"));
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(
        out,
        "  Duration:      {} -> {} ({}s)",
        session.start_time.format("%H:%M:%S"),
        report.end_time.format("%H:%M:%S"),
        elapsed.num_seconds().max(0)
    );
    let _ = writeln!(out, "  Pages visited: {}", session.visited_locations.len());
    let _ = writeln!(out, "  Resources:     {}", report.total_resources);
    for (kind, count) in &report.resources_by_kind {
        let _ = writeln!(out, "    {:<12} {count}", kind.as_str());
    }
    let _ = writeln!(out, "  Technologies:  {}", report.technologies_detected.len());
    for tech in &report.technologies_detected {
        let _ = writeln!(out, "    - {tech}");
    }
    let _ = writeln!(out, "  Browser:       {}", session.browser_label);
    if report.total_resources == 0 {
        let _ = writeln!(out, "  {} nothing was captured", style.warn_sym());
    }
    let _ = writeln!(out);
    let layout = OutputLayout::new(output_root);
    let _ = writeln!(out, "  Resources saved in: {}", layout.dump_dir().display());
    let _ = writeln!(out, "  Full report:        {}", layout.report_path().display());
    let _ = write!(out, "{}", rule());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use livenav::session::TechnologySource;
    use livenav::{CaptureEntry, ResourceKind, SessionState};
    use std::path::PathBuf;

    #[test]
    fn test_plain_style_has_no_escapes() {
        let style = Styled::plain();
        assert_eq!(style.ok_sym(), "[OK]");
        assert_eq!(style.bold("x"), "x");
    }

    #[test]
    fn test_instructions_mention_browser_and_target() {
        let text = instructions(&Styled::plain(), BrowserPreference::Chromium, "https://ex.com");
        assert!(text.contains("Browser: chromium"));
        assert!(text.contains("Start:   https://ex.com"));
        assert!(text.contains("Ctrl+C"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_summary_lists_counts_and_technologies() {
        let mut state = SessionState::new("chrome");
        state.visited_locations.push("https://ex.com/".to_string());
        let entries = vec![
            CaptureEntry::new("https://ex.com/app.js", ResourceKind::Script, PathBuf::from("a")),
            CaptureEntry::new("https://ex.com/b.js", ResourceKind::Script, PathBuf::from("b")),
        ];
        let technologies = [TechnologySource {
            name: "React".to_string(),
            first_url: "https://ex.com/app.js".to_string(),
        }];
        let report = FinalReport::build(&state, &entries, &technologies, chrono::Local::now());

        let text = summary(&Styled::plain(), &report, Path::new("out"));
        assert!(text.contains("Pages visited: 1"));
        assert!(text.contains("Resources:     2"));
        assert!(text.contains("script       2"));
        assert!(text.contains("- React"));
        assert!(text.contains("out/dump"));
        assert!(!text.contains("nothing was captured"));
    }
}
