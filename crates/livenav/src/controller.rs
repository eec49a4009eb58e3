//! Session lifecycle: launch, initial navigation, monitoring and teardown.
//!
//! ```text
//! Idle → Launching → Navigating → Monitoring → Finalizing → Closed
//! ```
//!
//! Browser events are dispatched from one task; every response and every
//! navigation is handled on its own spawned task. Finalization runs whatever
//! ends monitoring: a closed page, the external stop signal, or a failure
//! of the monitoring task itself.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserEvent, BrowserLauncher, BrowserSession, ConsoleLevel, ResponseInfo};
use crate::classify::classify;
use crate::detect::TechnologyDetector;
use crate::events::{now_timestamp, EventBus, LiveNavEvent};
use crate::filter::{
    response_disposition, should_log_console, should_log_failed_request, should_skip_capture,
    should_skip_logging, shorten_url, ResponseDisposition, DEFAULT_URL_DISPLAY_LEN,
};
use crate::history::{spawn_recorder, HistoryLog};
use crate::navigation::NavigationTracker;
use crate::persist::{ArtifactWriter, OutputLayout, PersistOutcome, ResourcePersister};
use crate::session::{FinalReport, SessionAggregator, SessionHandle};
use crate::types::{BrowserPreference, LiveNavError, LiveNavResult};

/// Upper bound on the initial navigation.
pub const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the monitoring loop checks whether the page is still open.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// How long teardown waits for the history log to drain.
const HISTORY_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Idle,
    Launching,
    Navigating,
    Monitoring,
    Finalizing,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Launching => "launching",
            SessionPhase::Navigating => "navigating",
            SessionPhase::Monitoring => "monitoring",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::Closed => "closed",
        }
    }

    /// The only phase reachable from this one.
    pub fn next(&self) -> Option<SessionPhase> {
        match self {
            SessionPhase::Idle => Some(SessionPhase::Launching),
            SessionPhase::Launching => Some(SessionPhase::Navigating),
            SessionPhase::Navigating => Some(SessionPhase::Monitoring),
            SessionPhase::Monitoring => Some(SessionPhase::Finalizing),
            SessionPhase::Finalizing => Some(SessionPhase::Closed),
            SessionPhase::Closed => None,
        }
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: SessionPhase) -> LiveNavResult<()> {
        if self.next() != Some(to) {
            return Err(LiveNavError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target_url: String,
    pub browser: BrowserPreference,
    pub output_root: PathBuf,
    pub nav_timeout: Duration,
    pub idle_interval: Duration,
    /// Buffer size of the observation bus.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(target_url: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            target_url: target_url.into(),
            browser: BrowserPreference::default(),
            output_root: output_root.into(),
            nav_timeout: DEFAULT_NAV_TIMEOUT,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_browser(mut self, browser: BrowserPreference) -> Self {
        self.browser = browser;
        self
    }
}

/// Why monitoring ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    PageClosed,
    Stopped,
}

/// Runs one session through its phases.
pub struct SessionController {
    config: SessionConfig,
    phase: SessionPhase,
    phase_tx: watch::Sender<SessionPhase>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        Self {
            config,
            phase: SessionPhase::Idle,
            phase_tx,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Follow phase changes from another task.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    fn advance(&mut self, to: SessionPhase) -> LiveNavResult<()> {
        self.phase.advance(to)?;
        debug!("session phase: {to}");
        self.phase_tx.send_replace(to);
        Ok(())
    }

    /// Drive the session to completion and return its final report.
    ///
    /// Only failures before a browser is acquired are returned as errors;
    /// once monitoring has begun, the report is always produced.
    pub async fn run<F>(
        mut self,
        launcher: &dyn BrowserLauncher,
        writer: Arc<dyn ArtifactWriter>,
        stop: F,
    ) -> LiveNavResult<FinalReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.advance(SessionPhase::Launching)?;
        let layout = OutputLayout::new(&self.config.output_root);
        layout.create_all()?;

        let bus = EventBus::new(self.config.event_capacity);
        let recorder = match HistoryLog::open(&layout.history_path()) {
            Ok(log) => Some(spawn_recorder(bus.subscribe(), log)),
            Err(e) => {
                warn!("history log disabled: {e}");
                None
            }
        };

        let browser: Arc<dyn BrowserSession> = Arc::from(
            launcher
                .launch(self.config.browser, &layout.har_path())
                .await?,
        );
        info!("browser ready: {}", browser.label());

        let (session, aggregator) = SessionAggregator::new(browser.label(), bus.sender()).spawn();
        bus.emit(LiveNavEvent::SessionStarted {
            browser: browser.label().to_string(),
            target_url: self.config.target_url.clone(),
            timestamp: now_timestamp(),
        });

        let pipeline = Pipeline::new(browser.clone(), layout.clone(), writer.clone(), session.clone(), &bus);
        let dispatcher = tokio::spawn(dispatch(browser.subscribe(), pipeline));

        self.advance(SessionPhase::Navigating)?;
        let mut stop = Box::pin(stop);
        let mut stopped = false;
        info!("navigating to {}", self.config.target_url);
        tokio::select! {
            result = tokio::time::timeout(self.config.nav_timeout, browser.navigate(&self.config.target_url)) => {
                match result {
                    Ok(Ok(())) => debug!("initial navigation complete"),
                    Ok(Err(e)) => error!("initial navigation failed: {e}"),
                    Err(_) => error!(
                        "initial navigation timed out after {}s",
                        self.config.nav_timeout.as_secs()
                    ),
                }
            }
            _ = &mut stop => {
                stopped = true;
            }
        }

        self.advance(SessionPhase::Monitoring)?;
        if stopped {
            info!("stop requested during navigation");
        } else {
            let monitor = tokio::spawn(monitor(browser.clone(), self.config.idle_interval, stop));
            match monitor.await {
                Ok(MonitorExit::PageClosed) => info!("page closed, finishing session"),
                Ok(MonitorExit::Stopped) => info!("stop requested, finishing session"),
                Err(e) => error!("monitoring task failed: {e}"),
            }
        }

        self.advance(SessionPhase::Finalizing)?;
        dispatcher.abort();

        let report = self.finalize(&session, &layout, writer.as_ref(), browser.as_ref()).await;

        self.advance(SessionPhase::Closed)?;
        drop(session);
        drop(bus);
        if let Some(recorder) = recorder {
            let _ = tokio::time::timeout(HISTORY_DRAIN_TIMEOUT, recorder).await;
        }
        drop(aggregator);
        report
    }

    async fn finalize(
        &self,
        session: &SessionHandle,
        layout: &OutputLayout,
        writer: &dyn ArtifactWriter,
        browser: &dyn BrowserSession,
    ) -> LiveNavResult<FinalReport> {
        let report = session.finalize().await;

        if let Ok(report) = &report {
            let path = layout.report_path();
            match report.to_json_pretty() {
                Ok(json) => match writer.write(&path, json.as_bytes()).await {
                    Ok(()) => info!("report written to {}", path.display()),
                    Err(e) => error!("failed to write report {}: {e}", path.display()),
                },
                Err(e) => error!("failed to serialize report: {e}"),
            }
        }

        if let Err(e) = browser.close().await {
            warn!("failed to close browser: {e}");
        }
        report
    }
}

/// Run a capture session from launch to final report.
pub async fn run_session<F>(
    config: SessionConfig,
    launcher: &dyn BrowserLauncher,
    writer: Arc<dyn ArtifactWriter>,
    stop: F,
) -> LiveNavResult<FinalReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    SessionController::new(config).run(launcher, writer, stop).await
}

async fn monitor<F>(browser: Arc<dyn BrowserSession>, interval: Duration, stop: F) -> MonitorExit
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(stop);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = &mut stop => return MonitorExit::Stopped,
            _ = ticker.tick() => {
                if browser.is_closed().await {
                    return MonitorExit::PageClosed;
                }
            }
        }
    }
}

/// Everything a response or navigation handler needs.
struct Pipeline {
    browser: Arc<dyn BrowserSession>,
    persister: Arc<ResourcePersister>,
    detector: TechnologyDetector,
    tracker: NavigationTracker,
}

impl Pipeline {
    fn new(
        browser: Arc<dyn BrowserSession>,
        layout: OutputLayout,
        writer: Arc<dyn ArtifactWriter>,
        session: SessionHandle,
        bus: &EventBus,
    ) -> Arc<Self> {
        let persister = Arc::new(ResourcePersister::new(layout, writer, session.clone(), bus.sender()));
        let detector = TechnologyDetector::new(session.clone());
        let tracker = NavigationTracker::new(
            session,
            browser.clone(),
            persister.clone(),
            detector.clone(),
            bus.sender(),
        );
        Arc::new(Self {
            browser,
            persister,
            detector,
            tracker,
        })
    }

    async fn handle_response(&self, response: ResponseInfo) {
        let kind = response.resource_kind;
        let label = kind.as_str().to_uppercase();
        let short = shorten_url(&response.url, DEFAULT_URL_DISPLAY_LEN);

        match response_disposition(response.status) {
            ResponseDisposition::Capture => {}
            ResponseDisposition::Failed => {
                warn!("RESPONSE [{label}] {} ← {short}", response.status);
                return;
            }
            ResponseDisposition::Ignored => {
                debug!("ignoring status {} for {short}", response.status);
                return;
            }
        }

        if should_skip_capture(&response.url) {
            debug!("skipping tracking resource {short}");
            return;
        }
        info!("RESPONSE [{label}] {} ← {short}", response.status);

        let body = match self.browser.body_bytes(&response).await {
            Ok(body) => body,
            Err(e) => {
                error!("Error dumping {}: {e}", response.url);
                return;
            }
        };
        if body.is_empty() {
            debug!("empty body for {short}");
            return;
        }

        let classification = classify(&response.url, kind, &response.content_type());
        match self
            .persister
            .capture(&response.url, kind, &classification, &body)
            .await
        {
            PersistOutcome::Stored(_) => {
                self.detector.scan_textual(&response.url, &body, kind).await;
            }
            PersistOutcome::Failed { .. } => {}
        }
    }
}

async fn dispatch(mut events: broadcast::Receiver<BrowserEvent>, pipeline: Arc<Pipeline>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("browser event stream lagged, {skipped} events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            BrowserEvent::Request(request) => {
                if !should_skip_logging(request.resource_kind) {
                    info!(
                        "REQUEST [{}] → {}",
                        request.resource_kind.as_str().to_uppercase(),
                        shorten_url(&request.url, DEFAULT_URL_DISPLAY_LEN)
                    );
                }
            }
            BrowserEvent::Response(response) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.handle_response(response).await });
            }
            BrowserEvent::Navigated { is_main_frame, url } => {
                if pipeline.tracker.accept(is_main_frame, &url) {
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        pipeline.tracker.settle_and_snapshot(&url).await;
                    });
                }
            }
            BrowserEvent::Console { level, text } => {
                if should_log_console(level) {
                    match level {
                        ConsoleLevel::Error => error!("CONSOLE [{}]: {text}", level.as_str()),
                        _ => warn!("CONSOLE [{}]: {text}", level.as_str()),
                    }
                }
            }
            BrowserEvent::PageError { message } => error!("PAGE ERROR: {message}"),
            BrowserEvent::RequestFailed {
                url,
                resource_kind,
                error_text,
            } => {
                if should_log_failed_request(resource_kind) {
                    warn!(
                        "FAILED REQUEST: {} - {error_text}",
                        shorten_url(&url, DEFAULT_URL_DISPLAY_LEN)
                    );
                }
            }
        }
    }
    debug!("browser event stream ended");
}
