//! Chromium browser session over the DevTools protocol, using chromiumoxide.
//!
//! One visible tab is opened at launch. Network, frame, console and
//! exception events from that tab are merged into a single stream and
//! translated into [`BrowserEvent`]s by an event pump task. Responses are
//! published when loading finishes, so their bodies are retrievable; see
//! [`super::exchange`] for how out-of-order listener delivery is handled.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType, Response,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, EventNavigatedWithinDocument,
};
use chromiumoxide::cdp::browser_protocol::target::{EventTargetDestroyed, TargetId};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page;
use futures::stream::{self, BoxStream, StreamExt};
use livenav::{
    BrowserEvent, BrowserSession, ConsoleLevel, LiveNavError, LiveNavResult, RequestInfo,
    ResourceKind, ResponseInfo,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::exchange::ExchangeTracker;
use super::har::{headers_from_json, HarRecorder, ResponseMeta};
use super::BrowserCandidate;

const EVENT_CAPACITY: usize = 1024;

/// How the browser window is launched.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1200,
            window_height: 800,
        }
    }
}

/// A launched Chromium-family browser with one observed tab.
pub struct ChromiumSession {
    label: String,
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    events: broadcast::Sender<BrowserEvent>,
    closed: Arc<AtomicBool>,
    har: Arc<Mutex<HarRecorder>>,
    har_path: PathBuf,
    pump: Mutex<Option<JoinHandle<()>>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumSession {
    /// Launch `candidate` and open the observed tab on `about:blank`.
    pub async fn launch(
        candidate: &BrowserCandidate,
        options: &LaunchOptions,
        har_path: &Path,
    ) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&candidate.executable)
            .window_size(options.window_width, options.window_height)
            .viewport(None)
            .arg("--start-maximized")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .with_context(|| format!("failed to launch {}", candidate.label))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_closed = Arc::clone(&closed);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
            handler_closed.store(true, Ordering::SeqCst);
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a tab")?;
        page.execute(EnableParams::default())
            .await
            .context("failed to enable network events")?;

        let stream = cdp_events(&browser, &page)
            .await
            .context("failed to subscribe to browser events")?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let har = Arc::new(Mutex::new(HarRecorder::new()));
        let pump = EventPump {
            page: page.clone(),
            target_id: page.target_id().clone(),
            events: events.clone(),
            har: Arc::clone(&har),
            closed: Arc::clone(&closed),
            exchanges: ExchangeTracker::new(),
        };
        let pump_task = tokio::spawn(pump.run(stream));

        info!("{} launched", candidate.label);
        Ok(Self {
            label: candidate.label.to_string(),
            browser: tokio::sync::Mutex::new(browser),
            page,
            events,
            closed,
            har,
            har_path: har_path.to_path_buf(),
            pump: Mutex::new(Some(pump_task)),
            handler: Mutex::new(Some(handler_task)),
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn label(&self) -> &str {
        &self.label
    }

    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    async fn navigate(&self, url: &str) -> LiveNavResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| LiveNavError::Navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn current_markup(&self) -> LiveNavResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| LiveNavError::Browser(format!("failed to read page markup: {e}")))
    }

    async fn body_bytes(&self, response: &ResponseInfo) -> LiveNavResult<Vec<u8>> {
        let params = GetResponseBodyParams::new(RequestId::new(response.request_id.clone()));
        let reply = self.page.execute(params).await.map_err(|e| {
            LiveNavError::Browser(format!("response body unavailable for {}: {e}", response.url))
        })?;

        let body = &reply.result;
        if body.base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| LiveNavError::Browser(format!("invalid base64 body for {}: {e}", response.url)))
        } else {
            Ok(body.body.clone().into_bytes())
        }
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> LiveNavResult<()> {
        if let Some(pump) = take(&self.pump) {
            pump.abort();
        }

        let har = self.har.lock().unwrap_or_else(|p| p.into_inner()).to_har();
        let entries = har.log.entries.len();
        match har.write_to(&self.har_path).await {
            Ok(()) => info!("HAR with {entries} entries written to {}", self.har_path.display()),
            Err(e) => warn!("{e:#}"),
        }

        {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                debug!("browser already gone: {e}");
            }
            if let Err(e) = browser.wait().await {
                debug!("waiting for browser exit: {e}");
            }
        }

        if let Some(handler) = take(&self.handler) {
            handler.abort();
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn take(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(|p| p.into_inner()).take()
}

enum CdpEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
    FrameNavigated(Arc<EventFrameNavigated>),
    WithinDocument(Arc<EventNavigatedWithinDocument>),
    Console(Arc<EventConsoleApiCalled>),
    Exception(Arc<EventExceptionThrown>),
    TargetDestroyed(Arc<EventTargetDestroyed>),
}

async fn cdp_events(browser: &Browser, page: &Page) -> Result<BoxStream<'static, CdpEvent>> {
    let streams: Vec<BoxStream<'static, CdpEvent>> = vec![
        page.event_listener::<EventRequestWillBeSent>()
            .await?
            .map(CdpEvent::Request)
            .boxed(),
        page.event_listener::<EventResponseReceived>()
            .await?
            .map(CdpEvent::Response)
            .boxed(),
        page.event_listener::<EventLoadingFinished>()
            .await?
            .map(CdpEvent::Finished)
            .boxed(),
        page.event_listener::<EventLoadingFailed>()
            .await?
            .map(CdpEvent::Failed)
            .boxed(),
        page.event_listener::<EventFrameNavigated>()
            .await?
            .map(CdpEvent::FrameNavigated)
            .boxed(),
        page.event_listener::<EventNavigatedWithinDocument>()
            .await?
            .map(CdpEvent::WithinDocument)
            .boxed(),
        page.event_listener::<EventConsoleApiCalled>()
            .await?
            .map(CdpEvent::Console)
            .boxed(),
        page.event_listener::<EventExceptionThrown>()
            .await?
            .map(CdpEvent::Exception)
            .boxed(),
        browser
            .event_listener::<EventTargetDestroyed>()
            .await?
            .map(CdpEvent::TargetDestroyed)
            .boxed(),
    ];
    Ok(stream::select_all(streams).boxed())
}

/// Translates raw CDP events into [`BrowserEvent`]s and feeds the HAR recorder.
struct EventPump {
    page: Page,
    target_id: TargetId,
    events: broadcast::Sender<BrowserEvent>,
    har: Arc<Mutex<HarRecorder>>,
    closed: Arc<AtomicBool>,
    exchanges: ExchangeTracker,
}

impl EventPump {
    async fn run(mut self, mut stream: BoxStream<'static, CdpEvent>) {
        while let Some(event) = stream.next().await {
            self.handle(event).await;
        }
        debug!("CDP event stream ended");
        self.closed.store(true, Ordering::SeqCst);
    }

    fn emit(&self, event: BrowserEvent) {
        let _ = self.events.send(event);
    }

    fn har(&self) -> std::sync::MutexGuard<'_, HarRecorder> {
        self.har.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn handle(&mut self, event: CdpEvent) {
        match event {
            CdpEvent::Request(e) => {
                let id = e.request_id.inner().clone();
                let kind = e
                    .r#type
                    .as_ref()
                    .map(resource_kind)
                    .unwrap_or(ResourceKind::Other);
                let type_name = e
                    .r#type
                    .as_ref()
                    .map(|t| format!("{t:?}"))
                    .unwrap_or_else(|| "Other".to_string());

                self.har().on_request(
                    &id,
                    &e.request.method,
                    &e.request.url,
                    headers_from_json(e.request.headers.inner()),
                    &type_name,
                    e.redirect_response.as_ref().map(response_meta),
                );
                let events = self.exchanges.on_request(RequestInfo {
                    request_id: id,
                    url: e.request.url.clone(),
                    method: e.request.method.clone(),
                    resource_kind: kind,
                });
                for event in events {
                    self.emit(event);
                }
            }
            CdpEvent::Response(e) => {
                let id = e.request_id.inner().clone();
                self.har().on_response(&id, response_meta(&e.response));
                let ready = self.exchanges.on_response(ResponseInfo {
                    request_id: id,
                    url: e.response.url.clone(),
                    status: u16::try_from(e.response.status).unwrap_or(0),
                    resource_kind: resource_kind(&e.r#type),
                    headers: headers_from_json(e.response.headers.inner())
                        .into_iter()
                        .map(|h| (h.name.to_ascii_lowercase(), h.value))
                        .collect(),
                });
                if let Some(event) = ready {
                    self.emit(event);
                }
            }
            CdpEvent::Finished(e) => {
                let id = e.request_id.inner();
                self.har().finish(id, e.encoded_data_length as i64, None);
                if let Some(event) = self.exchanges.on_finished(id) {
                    self.emit(event);
                }
            }
            CdpEvent::Failed(e) => {
                let id = e.request_id.inner();
                self.har().finish(id, 0, Some(e.error_text.clone()));
                if let Some(event) = self.exchanges.on_failed(id, &e.error_text) {
                    self.emit(event);
                }
            }
            CdpEvent::FrameNavigated(e) => {
                self.emit(BrowserEvent::Navigated {
                    is_main_frame: e.frame.parent_id.is_none(),
                    url: e.frame.url.clone(),
                });
            }
            CdpEvent::WithinDocument(e) => {
                let main_frame = self.page.mainframe().await.ok().flatten();
                self.emit(BrowserEvent::Navigated {
                    is_main_frame: main_frame.as_ref() == Some(&e.frame_id),
                    url: e.url.clone(),
                });
            }
            CdpEvent::Console(e) => {
                self.emit(BrowserEvent::Console {
                    level: console_level(&e.r#type),
                    text: console_text(&e),
                });
            }
            CdpEvent::Exception(e) => {
                let details = &e.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|x| x.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                self.emit(BrowserEvent::PageError { message });
            }
            CdpEvent::TargetDestroyed(e) => {
                if e.target_id == self.target_id {
                    info!("observed tab was closed");
                    self.closed.store(true, Ordering::SeqCst);
                }
            }
        }
    }
}

fn resource_kind(kind: &ResourceType) -> ResourceKind {
    match kind {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        _ => ResourceKind::Other,
    }
}

fn response_meta(response: &Response) -> ResponseMeta {
    ResponseMeta {
        status: u16::try_from(response.status).unwrap_or(0),
        status_text: response.status_text.clone(),
        protocol: response.protocol.clone().unwrap_or_default(),
        mime_type: response.mime_type.clone(),
        headers: headers_from_json(response.headers.inner()),
    }
}

fn console_level(kind: &ConsoleApiCalledType) -> ConsoleLevel {
    match kind {
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Log,
    }
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => arg.description.clone().unwrap_or_else(|| "<object>".to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
