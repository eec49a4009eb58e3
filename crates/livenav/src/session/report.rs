//! Final session report.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::types::{CaptureEntry, LiveNavResult, ResourceKind, SessionState};

/// File name of the report under the output root.
pub const REPORT_FILE_NAME: &str = "session_report.json";

/// A technology and the first URL it was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologySource {
    pub name: String,
    pub first_url: String,
}

/// Write-once summary of a monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub session: SessionState,
    /// Technology names in first-detection order, each exactly once.
    pub technologies_detected: Vec<String>,
    pub technology_sources: Vec<TechnologySource>,
    pub total_resources: usize,
    pub end_time: DateTime<Local>,
    pub resources_by_kind: BTreeMap<ResourceKind, usize>,
}

impl FinalReport {
    /// Reduce the capture sequence and technology set into a report.
    pub fn build(
        state: &SessionState,
        entries: &[CaptureEntry],
        technologies: &[TechnologySource],
        end_time: DateTime<Local>,
    ) -> Self {
        let mut resources_by_kind: BTreeMap<ResourceKind, usize> = BTreeMap::new();
        for entry in entries {
            *resources_by_kind.entry(entry.resource_kind).or_insert(0) += 1;
        }

        Self {
            session: state.clone(),
            technologies_detected: technologies.iter().map(|t| t.name.clone()).collect(),
            technology_sources: technologies.to_vec(),
            total_resources: entries.len(),
            end_time,
            resources_by_kind,
        }
    }

    /// Pretty-printed JSON, UTF-8 preserved.
    pub fn to_json_pretty(&self) -> LiveNavResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
