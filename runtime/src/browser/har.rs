//! HTTP archive (HAR 1.2) recording for a browser session.
//!
//! Entries are opened when a request is sent, completed by the response
//! headers and closed when loading finishes or fails. Redirect hops are
//! completed by the next request carrying the same id. The archive is
//! serialized once, when the session closes.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har {
    pub log: HarLog,
}

impl Har {
    /// Serialize the archive to `path` as pretty JSON.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize HAR")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write HAR to {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: DateTime<Local>,
    /// Total elapsed time in milliseconds.
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
    pub timings: HarTimings,
    #[serde(rename = "_resourceType")]
    pub resource_type: String,
    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: Vec<HarHeader>,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    pub size: i64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarTimings {
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

/// Response headers as reported by the browser.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: u16,
    pub status_text: String,
    pub protocol: String,
    pub mime_type: String,
    pub headers: Vec<HarHeader>,
}

struct Pending {
    index: usize,
    started: Instant,
}

/// Accumulates HAR entries while the session runs.
pub struct HarRecorder {
    entries: Vec<HarEntry>,
    pending: HashMap<String, Pending>,
    /// Entry index of finished requests, for headers read after completion.
    finished: HashMap<String, usize>,
}

impl Default for HarRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarRecorder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: HashMap::new(),
            finished: HashMap::new(),
        }
    }

    /// A request was sent. `redirect` carries the response that caused it
    /// when the same request id is being redirected.
    pub fn on_request(
        &mut self,
        request_id: &str,
        method: &str,
        url: &str,
        headers: Vec<HarHeader>,
        resource_type: &str,
        redirect: Option<ResponseMeta>,
    ) {
        if let Some(meta) = redirect {
            let location = meta
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("location"))
                .map(|h| h.value.clone())
                .unwrap_or_else(|| url.to_string());
            self.on_response(request_id, meta);
            if let Some(entry) = self.pending_entry(request_id) {
                entry.response.redirect_url = location;
            }
            self.finish(request_id, 0, None);
        }

        self.entries.push(HarEntry {
            started_date_time: Local::now(),
            time: 0.0,
            request: HarRequest {
                method: method.to_string(),
                url: url.to_string(),
                http_version: String::new(),
                headers,
                headers_size: -1,
                body_size: -1,
            },
            response: HarResponse {
                headers_size: -1,
                body_size: -1,
                ..HarResponse::default()
            },
            timings: HarTimings::default(),
            resource_type: resource_type.to_string(),
            error: None,
        });
        self.pending.insert(
            request_id.to_string(),
            Pending {
                index: self.entries.len() - 1,
                started: Instant::now(),
            },
        );
    }

    pub fn on_response(&mut self, request_id: &str, meta: ResponseMeta) {
        let index = self
            .pending
            .get(request_id)
            .map(|p| p.index)
            .or_else(|| self.finished.get(request_id).copied());
        let Some(entry) = index.and_then(|i| self.entries.get_mut(i)) else {
            return;
        };
        entry.request.http_version = meta.protocol.clone();
        entry.response.status = meta.status;
        entry.response.status_text = meta.status_text;
        entry.response.http_version = meta.protocol;
        entry.response.headers = meta.headers;
        entry.response.content.mime_type = meta.mime_type;
    }

    /// Loading finished (`error` is `None`) or failed.
    pub fn finish(&mut self, request_id: &str, encoded_length: i64, error: Option<String>) {
        let Some(pending) = self.pending.remove(request_id) else {
            return;
        };
        self.finished.insert(request_id.to_string(), pending.index);
        let elapsed = pending.started.elapsed().as_secs_f64() * 1000.0;
        if let Some(entry) = self.entries.get_mut(pending.index) {
            entry.time = elapsed;
            entry.timings.wait = elapsed;
            entry.response.body_size = encoded_length;
            entry.response.content.size = encoded_length;
            entry.error = error;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The archive as recorded so far. Unfinished requests are included
    /// with whatever is known about them.
    pub fn to_har(&self) -> Har {
        Har {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: "livenav".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: self.entries.clone(),
            },
        }
    }

    fn pending_entry(&mut self, request_id: &str) -> Option<&mut HarEntry> {
        let index = self.pending.get(request_id)?.index;
        self.entries.get_mut(index)
    }
}

/// Flatten a CDP header object into HAR name/value pairs.
pub fn headers_from_json(value: &serde_json::Value) -> Vec<HarHeader> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        })
        .collect()
}
