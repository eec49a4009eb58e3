//! End-to-end session tests driven by a scripted in-process browser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use livenav::{
    run_session, BrowserEvent, BrowserLauncher, BrowserPreference, BrowserSession, FinalReport,
    LiveNavError, LiveNavResult, MemoryWriter, OutputLayout, ResourceKind, ResponseInfo,
    SessionConfig, SessionController, SessionPhase,
};

#[derive(Clone)]
enum Step {
    Emit(BrowserEvent),
    Wait(Duration),
    ClosePage,
}

#[derive(Clone, Copy)]
enum NavigateBehavior {
    Succeed,
    Fail,
    Hang,
}

struct FakeBrowser {
    events: broadcast::Sender<BrowserEvent>,
    script: Vec<Step>,
    navigate: NavigateBehavior,
    bodies: HashMap<String, Vec<u8>>,
    markup: HashMap<String, String>,
    current_url: Mutex<String>,
    closed: AtomicBool,
    close_calls: Mutex<u32>,
}

impl FakeBrowser {
    fn new(script: Vec<Step>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            script,
            navigate: NavigateBehavior::Succeed,
            bodies: HashMap::new(),
            markup: HashMap::new(),
            current_url: Mutex::new(String::new()),
            closed: AtomicBool::new(false),
            close_calls: Mutex::new(0),
        }
    }

    fn body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    fn page(mut self, url: &str, html: &str) -> Self {
        self.markup.insert(url.to_string(), html.to_string());
        self
    }

    fn navigate_with(mut self, behavior: NavigateBehavior) -> Self {
        self.navigate = behavior;
        self
    }

    async fn play(self: Arc<Self>) {
        for step in self.script.clone() {
            match step {
                Step::Emit(event) => {
                    if let BrowserEvent::Navigated {
                        is_main_frame: true,
                        url,
                    } = &event
                    {
                        *self.current_url.lock().unwrap() = url.clone();
                    }
                    let _ = self.events.send(event);
                }
                Step::Wait(duration) => tokio::time::sleep(duration).await,
                Step::ClosePage => self.closed.store(true, Ordering::SeqCst),
            }
        }
    }
}

struct FakeHandle(Arc<FakeBrowser>);

#[async_trait]
impl BrowserSession for FakeHandle {
    fn label(&self) -> &str {
        "fake-chromium"
    }

    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.0.events.subscribe()
    }

    async fn navigate(&self, _url: &str) -> LiveNavResult<()> {
        tokio::spawn(self.0.clone().play());
        match self.0.navigate {
            NavigateBehavior::Succeed => Ok(()),
            NavigateBehavior::Fail => Err(LiveNavError::Navigation("net::ERR_NAME_NOT_RESOLVED".into())),
            NavigateBehavior::Hang => std::future::pending().await,
        }
    }

    async fn current_markup(&self) -> LiveNavResult<String> {
        let url = self.0.current_url.lock().unwrap().clone();
        Ok(self
            .0
            .markup
            .get(&url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn body_bytes(&self, response: &ResponseInfo) -> LiveNavResult<Vec<u8>> {
        Ok(self.0.bodies.get(&response.url).cloned().unwrap_or_default())
    }

    async fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> LiveNavResult<()> {
        *self.0.close_calls.lock().unwrap() += 1;
        Ok(())
    }
}

struct FakeLauncher {
    browser: Arc<FakeBrowser>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        _preference: BrowserPreference,
        _har_path: &Path,
    ) -> LiveNavResult<Box<dyn BrowserSession>> {
        Ok(Box::new(FakeHandle(self.browser.clone())))
    }
}

struct FailingLauncher;

#[async_trait]
impl BrowserLauncher for FailingLauncher {
    async fn launch(
        &self,
        preference: BrowserPreference,
        _har_path: &Path,
    ) -> LiveNavResult<Box<dyn BrowserSession>> {
        Err(LiveNavError::Browser(format!("no {preference} executable found")))
    }
}

fn response(url: &str, status: u16, kind: ResourceKind, content_type: &str) -> Step {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    Step::Emit(BrowserEvent::Response(ResponseInfo {
        request_id: url.to_string(),
        url: url.to_string(),
        status,
        resource_kind: kind,
        headers,
    }))
}

fn navigated(url: &str) -> Step {
    Step::Emit(BrowserEvent::Navigated {
        is_main_frame: true,
        url: url.to_string(),
    })
}

fn wait(secs: u64) -> Step {
    Step::Wait(Duration::from_secs(secs))
}

struct Run {
    report: FinalReport,
    writer: Arc<MemoryWriter>,
    layout: OutputLayout,
    browser: Arc<FakeBrowser>,
    _dir: tempfile::TempDir,
}

impl Run {
    fn stored(&self, relative: &str) -> Option<Vec<u8>> {
        self.writer.read(&self.layout.root().join(relative))
    }

    fn writes_to(&self, relative: &str) -> usize {
        let path: PathBuf = self.layout.root().join(relative);
        self.writer.write_log().iter().filter(|p| **p == path).count()
    }
}

/// Run a session against `browser`, stopping after `stop_after` seconds.
async fn run(browser: FakeBrowser, stop_after: u64) -> Run {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(browser);
    let launcher = FakeLauncher {
        browser: browser.clone(),
    };
    let writer = Arc::new(MemoryWriter::new());
    let config = SessionConfig::new("https://ex.com/", dir.path());

    let report = run_session(
        config,
        &launcher,
        writer.clone(),
        tokio::time::sleep(Duration::from_secs(stop_after)),
    )
    .await
    .unwrap();

    Run {
        report,
        writer,
        layout: OutputLayout::new(dir.path()),
        browser,
        _dir: dir,
    }
}

#[tokio::test(start_paused = true)]
async fn test_script_with_react_is_captured_and_fingerprinted() {
    let browser = FakeBrowser::new(vec![response(
        "https://ex.com/app.js",
        200,
        ResourceKind::Script,
        "application/javascript",
    )])
    .body("https://ex.com/app.js", b"function App(){return React.createElement('div')}");

    let run = run(browser, 10).await;

    assert_eq!(run.report.total_resources, 1);
    assert_eq!(run.report.technologies_detected, vec!["React"]);
    assert_eq!(run.report.resources_by_kind[&ResourceKind::Script], 1);
    assert!(run.stored("dump/js/app.js").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_non_200_tracking_and_empty_responses_are_not_captured() {
    let browser = FakeBrowser::new(vec![
        response("https://ex.com/a.js", 304, ResourceKind::Script, "application/javascript"),
        response("https://ex.com/b.js", 404, ResourceKind::Script, "application/javascript"),
        response("https://ex.com/c.js", 500, ResourceKind::Script, "application/javascript"),
        response(
            "https://www.googletagmanager.com/gtm.js?id=GTM-X",
            200,
            ResourceKind::Script,
            "application/javascript",
        ),
        response("https://ex.com/gtm-beacon", 200, ResourceKind::Other, "text/plain"),
        response("https://ex.com/empty.css", 200, ResourceKind::Stylesheet, "text/css"),
    ])
    .body("https://ex.com/a.js", b"jQuery")
    .body("https://ex.com/b.js", b"jQuery")
    .body("https://ex.com/c.js", b"jQuery")
    .body("https://www.googletagmanager.com/gtm.js?id=GTM-X", b"webpack")
    .body("https://ex.com/gtm-beacon", b"ok");

    let run = run(browser, 10).await;

    assert_eq!(run.report.total_resources, 0);
    assert!(run.report.technologies_detected.is_empty());
    assert!(run.report.resources_by_kind.is_empty());
    // only the report itself was written
    assert_eq!(run.writer.paths(), vec![run.layout.report_path()]);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_resources_are_classified_and_counted() {
    let browser = FakeBrowser::new(vec![
        response("https://ex.com/", 200, ResourceKind::Document, "text/html; charset=utf-8"),
        response("https://ex.com/static/main.css", 200, ResourceKind::Stylesheet, "text/css"),
        response("https://ex.com/img/logo", 200, ResourceKind::Image, "image/png"),
        response("https://ex.com/fonts/inter.woff2", 200, ResourceKind::Font, "font/woff2"),
        response("https://cdn.other.com/main.css", 200, ResourceKind::Stylesheet, "text/css"),
    ])
    .body("https://ex.com/", b"<html><body>hello</body></html>")
    .body("https://ex.com/static/main.css", b"@tailwind base;")
    .body("https://ex.com/img/logo", &[0x89, b'P', b'N', b'G'])
    .body("https://ex.com/fonts/inter.woff2", b"wOF2")
    .body("https://cdn.other.com/main.css", b"body{margin:0}");

    let run = run(browser, 10).await;

    let report = &run.report;
    assert_eq!(report.total_resources, 5);
    assert_eq!(report.session.total_captured, 5);
    assert_eq!(report.resources_by_kind.values().sum::<usize>(), 5);
    assert_eq!(report.resources_by_kind[&ResourceKind::Stylesheet], 2);
    assert_eq!(report.technologies_detected, vec!["Tailwind CSS"]);

    assert_eq!(run.stored("dump/fonts/inter.woff2").unwrap(), b"wOF2");
    let css_files: Vec<_> = run
        .writer
        .paths()
        .into_iter()
        .filter(|p| p.starts_with(run.layout.root().join("dump/css")))
        .collect();
    assert_eq!(css_files.len(), 2);
    assert!(css_files.contains(&run.layout.root().join("dump/css/main.css")));
    assert!(css_files.contains(&run.layout.root().join("dump/css/main-2.css")));

    let images: Vec<_> = run
        .writer
        .paths()
        .into_iter()
        .filter(|p| p.starts_with(run.layout.root().join("dump/images")))
        .collect();
    assert_eq!(images.len(), 1);
    assert!(images[0].to_string_lossy().ends_with(".image.png"));
}

#[tokio::test(start_paused = true)]
async fn test_route_changes_are_tracked_and_snapshotted() {
    let browser = FakeBrowser::new(vec![
        navigated("about:blank"),
        navigated("https://ex.com/home"),
        Step::Emit(BrowserEvent::Navigated {
            is_main_frame: false,
            url: "https://ads.example.net/frame".to_string(),
        }),
        wait(3),
        navigated("https://ex.com/about"),
        wait(3),
        navigated("https://ex.com/home"),
    ])
    .page(
        "https://ex.com/home",
        r#"<html><head><meta name="generator" content="Gatsby 5"></head><body><div data-reactroot></div></body></html>"#,
    )
    .page("https://ex.com/about", "<html><body><p>about</p></body></html>");

    let run = run(browser, 20).await;

    assert_eq!(
        run.report.session.visited_locations,
        vec!["https://ex.com/home", "https://ex.com/about"]
    );
    assert_eq!(run.writes_to("dump/pages/ex_com_home.html"), 2);
    assert_eq!(run.writes_to("dump/pages/ex_com_about.html"), 1);
    assert_eq!(run.writes_to("dump/pages/ads_example_net_frame.html"), 0);
    assert_eq!(
        run.report.technologies_detected,
        vec!["Generator: Gatsby 5", "React (data-reactroot)"]
    );
    // snapshots are not network captures
    assert_eq!(run.report.total_resources, 0);
}

#[tokio::test(start_paused = true)]
async fn test_report_is_written_as_json() {
    let browser = FakeBrowser::new(vec![response(
        "https://ex.com/app.js",
        200,
        ResourceKind::Script,
        "application/javascript",
    )])
    .body("https://ex.com/app.js", b"Vue.createApp({})");

    let run = run(browser, 5).await;

    let bytes = run.writer.read(&run.layout.report_path()).unwrap();
    let parsed: FinalReport = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed, run.report);
    assert_eq!(parsed.session.browser_label, "fake-chromium");
    assert_eq!(*run.browser.close_calls.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_still_monitors_until_page_closes() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(
        FakeBrowser::new(vec![
            response("https://ex.com/app.js", 200, ResourceKind::Script, "text/javascript"),
            wait(5),
            Step::ClosePage,
        ])
        .body("https://ex.com/app.js", b"console.log(1)")
        .navigate_with(NavigateBehavior::Fail),
    );
    let launcher = FakeLauncher {
        browser: browser.clone(),
    };
    let writer = Arc::new(MemoryWriter::new());

    let controller = SessionController::new(SessionConfig::new("https://ex.com/", dir.path()));
    let phase = controller.watch_phase();
    let report = controller
        .run(&launcher, writer.clone(), std::future::pending::<()>())
        .await
        .unwrap();

    assert_eq!(report.total_resources, 1);
    assert_eq!(*phase.borrow(), SessionPhase::Closed);
    assert!(writer.read(&OutputLayout::new(dir.path()).report_path()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_navigation_is_bounded() {
    let browser = FakeBrowser::new(vec![wait(45), Step::ClosePage]).navigate_with(NavigateBehavior::Hang);

    let start = tokio::time::Instant::now();
    let run = run(browser, 120).await;

    // 30s navigation timeout, then the page closes at 45s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(45));
    assert!(elapsed < Duration::from_secs(120));
    assert_eq!(run.report.total_resources, 0);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::new("https://ex.com/", dir.path()).with_browser(BrowserPreference::Firefox);

    let err = run_session(config, &FailingLauncher, Arc::new(MemoryWriter::new()), async {})
        .await
        .unwrap_err();
    assert!(matches!(err, LiveNavError::Browser(_)));
}

#[tokio::test(start_paused = true)]
async fn test_history_log_records_observations() {
    let browser = FakeBrowser::new(vec![response(
        "https://ex.com/app.js",
        200,
        ResourceKind::Script,
        "application/javascript",
    )])
    .body("https://ex.com/app.js", b"React");

    let run = run(browser, 5).await;

    let history = std::fs::read_to_string(run.layout.history_path()).unwrap();
    let kinds: Vec<String> = history
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds[0], "SessionStarted");
    assert!(kinds.contains(&"ResourceCaptured".to_string()));
    assert!(kinds.contains(&"TechnologyDetected".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_visit_order_survives_concurrent_handlers() {
    let urls: Vec<String> = (0..150).map(|i| format!("https://ex.com/r{i}")).collect();
    let mut script: Vec<Step> = urls.iter().map(|u| navigated(u)).collect();
    script.push(navigated("https://ex.com/r0"));
    for i in 0..50 {
        script.push(response(
            &format!("https://ex.com/static/c{i}.css"),
            200,
            ResourceKind::Stylesheet,
            "text/css",
        ));
    }

    let mut browser = FakeBrowser::new(script);
    for i in 0..50 {
        browser = browser.body(&format!("https://ex.com/static/c{i}.css"), b"body{margin:0}");
    }

    let run = run(browser, 4).await;

    assert_eq!(run.report.session.visited_locations, urls);
    assert_eq!(run.report.total_resources, 50);
    assert_eq!(run.report.resources_by_kind[&ResourceKind::Stylesheet], 50);
}
