//! Resource persistence.
//!
//! Classified bytes are written through an [`ArtifactWriter`] into the
//! category directories of an [`OutputLayout`] that is created eagerly at
//! startup. A successful network-resource write appends a capture entry to
//! the session; any failure is logged and reported as
//! [`PersistOutcome::Failed`], never raised.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::classify::Classification;
use crate::events::{now_timestamp, LiveNavEvent};
use crate::history::HISTORY_FILE_NAME;
use crate::session::{SessionHandle, REPORT_FILE_NAME};
use crate::types::{CaptureEntry, Category, LiveNavResult, ResourceKind};

/// Traffic archive recorded by the browser session.
pub const HAR_FILE_NAME: &str = "navigation_records.har";

/// The on-disk tree of one session.
///
/// ```text
/// <root>/
///   dump/{html,css,js,images,fonts,other,pages}/
///   logs/session_history.jsonl
///   navigation_records.har
///   session_report.json
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.root.join("dump")
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.dump_dir().join(category.dir_name())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn history_path(&self) -> PathBuf {
        self.logs_dir().join(HISTORY_FILE_NAME)
    }

    pub fn har_path(&self) -> PathBuf {
        self.root.join(HAR_FILE_NAME)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE_NAME)
    }

    /// Create every directory of the layout.
    pub fn create_all(&self) -> LiveNavResult<()> {
        for category in Category::ALL {
            std::fs::create_dir_all(self.category_dir(category))?;
        }
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// Scoped write primitive the persister goes through.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Write `bytes` to `path`, replacing any existing file.
    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// Writes to the local filesystem with `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWriter;

#[async_trait]
impl ArtifactWriter for FsWriter {
    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(path, bytes).await
    }
}

/// Keeps artifacts in memory and remembers every write, in order.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest content written to `path`.
    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }

    /// Every path currently holding content.
    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.files).keys().cloned().collect()
    }

    /// Every write performed, including overwrites.
    pub fn write_log(&self) -> Vec<PathBuf> {
        lock(&self.writes).clone()
    }
}

#[async_trait]
impl ArtifactWriter for MemoryWriter {
    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        lock(&self.files).insert(path.to_path_buf(), bytes.to_vec());
        lock(&self.writes).push(path.to_path_buf());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Result of one persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored(PathBuf),
    Failed { reason: String },
}

impl PersistOutcome {
    pub fn stored_path(&self) -> Option<&Path> {
        match self {
            PersistOutcome::Stored(path) => Some(path),
            PersistOutcome::Failed { .. } => None,
        }
    }
}

/// Writes classified resources and snapshots, recording captures in the session.
pub struct ResourcePersister {
    layout: OutputLayout,
    writer: Arc<dyn ArtifactWriter>,
    session: SessionHandle,
    events: broadcast::Sender<LiveNavEvent>,
    /// Resource paths handed out this session.
    claimed: Mutex<HashSet<PathBuf>>,
}

impl ResourcePersister {
    pub fn new(
        layout: OutputLayout,
        writer: Arc<dyn ArtifactWriter>,
        session: SessionHandle,
        events: broadcast::Sender<LiveNavEvent>,
    ) -> Self {
        Self {
            layout,
            writer,
            session,
            events,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Write bytes under a category directory. The path is used as given;
    /// an existing file with the same name is replaced.
    pub async fn persist(&self, category: Category, filename: &str, bytes: &[u8]) -> PersistOutcome {
        let path = self.layout.category_dir(category).join(filename);
        self.write(&path, bytes).await
    }

    /// Persist a network resource and append its capture entry.
    ///
    /// Two resources resolving to the same name in one session get distinct
    /// files: the later one receives a `-2`, `-3`, ... suffix before its
    /// extension. Callers drop empty bodies before getting here.
    pub async fn capture(
        &self,
        url: &str,
        kind: ResourceKind,
        classification: &Classification,
        bytes: &[u8],
    ) -> PersistOutcome {
        let path = self.claim(classification.category, &classification.filename);
        let outcome = self.write(&path, bytes).await;

        match &outcome {
            PersistOutcome::Stored(stored) => {
                if let Err(e) = self
                    .session
                    .record_capture(CaptureEntry::new(url, kind, stored.clone()))
                {
                    error!("failed to record capture of {url}: {e}");
                    return PersistOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
                info!("SAVED: {}", stored.display());
            }
            PersistOutcome::Failed { reason } => {
                error!("Error dumping {url}: {reason}");
                let _ = self.events.send(LiveNavEvent::CaptureFailed {
                    url: url.to_string(),
                    reason: reason.clone(),
                    timestamp: now_timestamp(),
                });
            }
        }
        outcome
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> PersistOutcome {
        match self.writer.write(path, bytes).await {
            Ok(()) => PersistOutcome::Stored(path.to_path_buf()),
            Err(e) => PersistOutcome::Failed {
                reason: format!("{}: {e}", path.display()),
            },
        }
    }

    fn claim(&self, category: Category, filename: &str) -> PathBuf {
        let dir = self.layout.category_dir(category);
        let mut claimed = lock(&self.claimed);

        let mut candidate = dir.join(filename);
        let mut n = 1;
        while claimed.contains(&candidate) {
            n += 1;
            candidate = dir.join(numbered(filename, n));
        }
        claimed.insert(candidate.clone());
        candidate
    }
}

/// `app.js` → `app-2.js`; `LICENSE` → `LICENSE-2`.
fn numbered(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{filename}-{n}"),
    }
}
