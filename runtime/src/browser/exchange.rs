//! Request/response bookkeeping for the CDP event pump.
//!
//! chromiumoxide delivers each CDP event type on its own listener, so the
//! merged stream does not preserve wire order: `loadingFinished` can be read
//! before the `responseReceived` it completes, and `loadingFailed` before
//! its `requestWillBeSent`. [`ExchangeTracker`] accepts the pieces of an
//! exchange in any order and yields each [`BrowserEvent`] once enough of the
//! exchange is known.

use std::collections::{HashMap, HashSet};

use livenav::{BrowserEvent, RequestInfo, ResourceKind, ResponseInfo};

#[derive(Debug, Default)]
pub struct ExchangeTracker {
    /// In-flight requests: id → (url, kind).
    requests: HashMap<String, (String, ResourceKind)>,
    /// Responses waiting for loading to finish.
    responses: HashMap<String, ResponseInfo>,
    /// Loading finished before the response headers were read.
    finished_early: HashSet<String>,
    /// Loading failed before the request was read: id → error text.
    failed_early: HashMap<String, String>,
}

impl ExchangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(&mut self, request: RequestInfo) -> Vec<BrowserEvent> {
        let id = request.request_id.clone();
        let (url, kind) = (request.url.clone(), request.resource_kind);
        let mut out = vec![BrowserEvent::Request(request)];

        match self.failed_early.remove(&id) {
            Some(error_text) => out.push(BrowserEvent::RequestFailed {
                url,
                resource_kind: kind,
                error_text,
            }),
            None => {
                self.requests.insert(id, (url, kind));
            }
        }
        out
    }

    pub fn on_response(&mut self, response: ResponseInfo) -> Option<BrowserEvent> {
        let id = response.request_id.clone();
        if self.finished_early.remove(&id) {
            self.requests.remove(&id);
            return Some(BrowserEvent::Response(response));
        }
        self.responses.insert(id, response);
        None
    }

    pub fn on_finished(&mut self, request_id: &str) -> Option<BrowserEvent> {
        match self.responses.remove(request_id) {
            Some(response) => {
                self.requests.remove(request_id);
                Some(BrowserEvent::Response(response))
            }
            None => {
                self.finished_early.insert(request_id.to_string());
                None
            }
        }
    }

    /// A failure for an unseen request is held until the request arrives,
    /// so the failure is reported with its URL.
    pub fn on_failed(&mut self, request_id: &str, error_text: &str) -> Option<BrowserEvent> {
        self.responses.remove(request_id);
        self.finished_early.remove(request_id);
        match self.requests.remove(request_id) {
            Some((url, resource_kind)) => Some(BrowserEvent::RequestFailed {
                url,
                resource_kind,
                error_text: error_text.to_string(),
            }),
            None => {
                self.failed_early
                    .insert(request_id.to_string(), error_text.to_string());
                None
            }
        }
    }

    /// Exchanges still waiting on a missing piece.
    pub fn pending(&self) -> usize {
        self.responses.len() + self.finished_early.len() + self.failed_early.len()
    }
}
