//! Session aggregation.
//!
//! The [`SessionAggregator`] owns everything that handlers running on
//! independent tasks would otherwise race on: the capture sequence, the
//! visited-location list, the counters and the discovered-technology set.
//! It runs as a single actor task; every mutation arrives as a message
//! through a cloneable [`SessionHandle`], so updates are serialized in
//! arrival order and no lock is ever held across an await.

pub mod report;

use std::collections::HashSet;

use chrono::Local;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{now_timestamp, LiveNavEvent};
use crate::filter::{shorten_url, DEFAULT_URL_DISPLAY_LEN};
use crate::types::{CaptureEntry, LiveNavError, LiveNavResult, SessionState};

pub use report::{FinalReport, TechnologySource, REPORT_FILE_NAME};

enum SessionCommand {
    RecordCapture(CaptureEntry),
    RecordVisit {
        url: String,
        reply: Option<oneshot::Sender<bool>>,
    },
    ReportTechnology {
        name: String,
        source_url: String,
        reply: oneshot::Sender<bool>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Finalize {
        reply: oneshot::Sender<FinalReport>,
    },
}

/// Owner of all session-wide mutable state.
pub struct SessionAggregator {
    state: SessionState,
    entries: Vec<CaptureEntry>,
    technologies: Vec<TechnologySource>,
    known_technologies: HashSet<String>,
    events: broadcast::Sender<LiveNavEvent>,
    report: Option<FinalReport>,
}

impl SessionAggregator {
    pub fn new(browser_label: impl Into<String>, events: broadcast::Sender<LiveNavEvent>) -> Self {
        Self {
            state: SessionState::new(browser_label),
            entries: Vec::new(),
            technologies: Vec::new(),
            known_technologies: HashSet::new(),
            events,
            report: None,
        }
    }

    /// Append a capture entry and bump the counter.
    pub fn record_capture(&mut self, entry: CaptureEntry) {
        let _ = self.events.send(LiveNavEvent::ResourceCaptured {
            url: entry.url.clone(),
            resource_kind: entry.resource_kind,
            stored_path: entry.stored_path.display().to_string(),
            timestamp: entry.captured_at.to_rfc3339(),
        });
        self.entries.push(entry);
        self.state.total_captured += 1;
    }

    /// Record a visited location. Returns `true` the first time a URL is seen.
    pub fn record_visit(&mut self, url: &str) -> bool {
        let first_visit = !self.state.visited_locations.iter().any(|u| u == url);
        if first_visit {
            self.state.visited_locations.push(url.to_string());
        }
        let _ = self.events.send(LiveNavEvent::NavigationDetected {
            url: url.to_string(),
            first_visit,
            timestamp: now_timestamp(),
        });
        first_visit
    }

    /// Report a technology. Only the first report of a name is logged and kept.
    pub fn report_technology(&mut self, name: &str, source_url: &str) -> bool {
        if self.known_technologies.contains(name) {
            debug!("technology already known: {name}");
            return false;
        }

        self.known_technologies.insert(name.to_string());
        self.technologies.push(TechnologySource {
            name: name.to_string(),
            first_url: source_url.to_string(),
        });

        let short = shorten_url(source_url, DEFAULT_URL_DISPLAY_LEN);
        info!("TECHNOLOGY DETECTED: {name}");
        info!("   source: {short}");
        let _ = self.events.send(LiveNavEvent::TechnologyDetected {
            name: name.to_string(),
            source_url: short,
            timestamp: now_timestamp(),
        });
        true
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn entries(&self) -> &[CaptureEntry] {
        &self.entries
    }

    /// Build the final report. Later calls return the same report.
    pub fn final_report(&mut self) -> FinalReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        let report = FinalReport::build(&self.state, &self.entries, &self.technologies, Local::now());
        let _ = self.events.send(LiveNavEvent::SessionFinalized {
            total_resources: report.total_resources,
            technologies: report.technologies_detected.len(),
            pages_visited: report.session.visited_locations.len(),
            timestamp: report.end_time.to_rfc3339(),
        });
        self.report = Some(report.clone());
        report
    }

    /// Move the aggregator onto its own task.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::RecordCapture(entry) => self.record_capture(entry),
                SessionCommand::RecordVisit { url, reply } => {
                    let first_visit = self.record_visit(&url);
                    if let Some(reply) = reply {
                        let _ = reply.send(first_visit);
                    }
                }
                SessionCommand::ReportTechnology {
                    name,
                    source_url,
                    reply,
                } => {
                    let _ = reply.send(self.report_technology(&name, &source_url));
                }
                SessionCommand::State { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                SessionCommand::Finalize { reply } => {
                    let _ = reply.send(self.final_report());
                }
            }
        }
        debug!("session aggregator stopped");
    }
}

/// Cloneable handle to the aggregator task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn record_capture(&self, entry: CaptureEntry) -> LiveNavResult<()> {
        self.send(SessionCommand::RecordCapture(entry))
    }

    /// Returns `true` when the URL was not visited before.
    pub async fn record_visit(&self, url: &str) -> LiveNavResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::RecordVisit {
            url: url.to_string(),
            reply: Some(reply),
        })?;
        rx.await.map_err(closed)
    }

    /// Enqueue a visit without waiting for the reply. Visits from one
    /// caller are applied in the order they were enqueued.
    pub fn note_visit(&self, url: &str) -> LiveNavResult<()> {
        self.send(SessionCommand::RecordVisit {
            url: url.to_string(),
            reply: None,
        })
    }

    /// Returns `true` when the technology was not known before.
    pub async fn report_technology(&self, name: &str, source_url: &str) -> LiveNavResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ReportTechnology {
            name: name.to_string(),
            source_url: source_url.to_string(),
            reply,
        })?;
        rx.await.map_err(closed)
    }

    /// Snapshot of the current session state.
    pub async fn state(&self) -> LiveNavResult<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::State { reply })?;
        rx.await.map_err(closed)
    }

    pub async fn finalize(&self) -> LiveNavResult<FinalReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Finalize { reply })?;
        rx.await.map_err(closed)
    }

    fn send(&self, command: SessionCommand) -> LiveNavResult<()> {
        self.tx
            .send(command)
            .map_err(|_| LiveNavError::SessionClosed("aggregator task has stopped".to_string()))
    }
}

fn closed(_: oneshot::error::RecvError) -> LiveNavError {
    LiveNavError::SessionClosed("aggregator dropped the reply".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use std::path::PathBuf;

    fn aggregator() -> (SessionAggregator, broadcast::Receiver<LiveNavEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (SessionAggregator::new("chromium", tx), rx)
    }

    #[test]
    fn test_visits_are_unique_in_first_seen_order() {
        let (mut agg, _rx) = aggregator();
        assert!(agg.record_visit("https://ex.com/home"));
        assert!(agg.record_visit("https://ex.com/about"));
        assert!(!agg.record_visit("https://ex.com/home"));
        assert!(!agg.record_visit("https://ex.com/home"));
        assert_eq!(
            agg.state().visited_locations,
            vec!["https://ex.com/home", "https://ex.com/about"]
        );
    }

    #[test]
    fn test_technology_reported_once() {
        let (mut agg, mut rx) = aggregator();
        assert!(agg.report_technology("React", "https://ex.com/a.js"));
        for i in 0..5 {
            assert!(!agg.report_technology("React", &format!("https://ex.com/{i}.js")));
        }

        let report = agg.final_report();
        assert_eq!(report.technologies_detected, vec!["React"]);
        assert_eq!(report.technology_sources[0].first_url, "https://ex.com/a.js");

        let mut detections = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LiveNavEvent::TechnologyDetected { .. }) {
                detections += 1;
            }
        }
        assert_eq!(detections, 1);
    }

    #[test]
    fn test_capture_counter_matches_entries() {
        let (mut agg, _rx) = aggregator();
        agg.record_capture(CaptureEntry::new("https://ex.com/a.js", ResourceKind::Script, PathBuf::from("a.js")));
        agg.record_capture(CaptureEntry::new("https://ex.com/b.css", ResourceKind::Stylesheet, PathBuf::from("b.css")));
        assert_eq!(agg.state().total_captured, 2);
        assert_eq!(agg.entries().len(), 2);
        assert_eq!(agg.entries()[0].url, "https://ex.com/a.js");
    }

    #[test]
    fn test_final_report_built_once() {
        let (mut agg, _rx) = aggregator();
        let first = agg.final_report();
        agg.record_capture(CaptureEntry::new("https://ex.com/late.js", ResourceKind::Script, PathBuf::from("late.js")));
        let second = agg.final_report();
        assert_eq!(first, second);
        assert_eq!(second.total_resources, 0);
    }

    #[tokio::test]
    async fn test_handle_round_trip_through_actor() {
        let (tx, _rx) = broadcast::channel(64);
        let (handle, task) = SessionAggregator::new("chrome", tx).spawn();

        let mut joins = Vec::new();
        for i in 0..10 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move {
                handle
                    .record_capture(CaptureEntry::new(
                        format!("https://ex.com/{i}.js"),
                        ResourceKind::Script,
                        PathBuf::from(format!("{i}.js")),
                    ))
                    .unwrap();
                handle.report_technology("React", "https://ex.com/").await.unwrap()
            }));
        }
        let mut new_reports = 0;
        for join in joins {
            if join.await.unwrap() {
                new_reports += 1;
            }
        }
        assert_eq!(new_reports, 1);

        let report = handle.finalize().await.unwrap();
        assert_eq!(report.total_resources, 10);
        assert_eq!(report.session.total_captured, 10);
        assert_eq!(report.resources_by_kind[&ResourceKind::Script], 10);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_noted_visits_keep_enqueue_order() {
        let (tx, _rx) = broadcast::channel(512);
        let (handle, _task) = SessionAggregator::new("chrome", tx).spawn();

        let urls: Vec<String> = (0..100).map(|i| format!("https://ex.com/r{i}")).collect();
        for url in &urls {
            handle.note_visit(url).unwrap();
        }
        handle.note_visit(&urls[3]).unwrap();

        let state = handle.state().await.unwrap();
        assert_eq!(state.visited_locations, urls);
    }
}
