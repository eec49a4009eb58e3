// Copyright 2026 livenav contributors
// SPDX-License-Identifier: Apache-2.0

//! Observation event bus.
//!
//! Every noteworthy thing the pipeline does (a resource stored, a technology
//! seen for the first time, a route change, a snapshot) is published as a
//! [`LiveNavEvent`] on a `tokio::sync::broadcast` channel. The history log is
//! one subscriber; embedders can add their own. With no subscribers, events
//! are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::ResourceKind;

/// Every observation the capture pipeline emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveNavEvent {
    // ── Session ───────────────────────────
    /// A monitoring session acquired its browser.
    SessionStarted {
        browser: String,
        target_url: String,
        timestamp: String,
    },
    /// The final report was produced.
    SessionFinalized {
        total_resources: usize,
        technologies: usize,
        pages_visited: usize,
        timestamp: String,
    },

    // ── Capture ───────────────────────────
    /// A network resource was written to disk.
    ResourceCaptured {
        url: String,
        resource_kind: ResourceKind,
        stored_path: String,
        timestamp: String,
    },
    /// Persisting a resource or snapshot failed.
    CaptureFailed {
        url: String,
        reason: String,
        timestamp: String,
    },

    // ── Detection ─────────────────────────
    /// A technology was seen for the first time this session.
    TechnologyDetected {
        name: String,
        source_url: String,
        timestamp: String,
    },

    // ── Navigation ────────────────────────
    /// The main frame moved to a new location.
    NavigationDetected {
        url: String,
        first_visit: bool,
        timestamp: String,
    },
    /// Rendered markup was saved after the settle delay.
    SnapshotCaptured {
        url: String,
        stored_path: String,
        timestamp: String,
    },
}

/// The observation bus for one session.
pub struct EventBus {
    sender: broadcast::Sender<LiveNavEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: LiveNavEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveNavEvent> {
        self.sender.subscribe()
    }

    /// A cheap sender handle for components that only emit.
    pub fn sender(&self) -> broadcast::Sender<LiveNavEvent> {
        self.sender.clone()
    }
}

/// RFC 3339 local timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = LiveNavEvent::TechnologyDetected {
            name: "React".to_string(),
            source_url: "https://ex.com/app.js".to_string(),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("TechnologyDetected"));
        assert!(json.contains("React"));

        let parsed: LiveNavEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(LiveNavEvent::SessionStarted {
            browser: "chromium".to_string(),
            target_url: "https://ex.com".to_string(),
            timestamp: now_timestamp(),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(LiveNavEvent::NavigationDetected {
            url: "https://ex.com/about".to_string(),
            first_visit: true,
            timestamp: "1".to_string(),
        });

        match rx.try_recv().unwrap() {
            LiveNavEvent::NavigationDetected { url, first_visit, .. } => {
                assert_eq!(url, "https://ex.com/about");
                assert!(first_visit);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }
}
