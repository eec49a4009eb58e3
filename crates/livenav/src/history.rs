//! Append-only JSONL history of every observation.
//!
//! - One [`LiveNavEvent`] per line
//! - Rotation when the file exceeds `MAX_LOG_SIZE` (100MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::events::LiveNavEvent;
use crate::types::LiveNavResult;

/// Maximum history log size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 5;

/// File name of the history log inside the logs directory.
pub const HISTORY_FILE_NAME: &str = "session_history.jsonl";

/// Append-only JSONL history log with rotation.
pub struct HistoryLog {
    file: File,
    path: PathBuf,
    /// Approximate current size (re-checked on rotation).
    current_size: u64,
}

impl HistoryLog {
    /// Open or create the history log file.
    pub fn open(path: &Path) -> LiveNavResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
        })
    }

    /// Append one event.
    pub fn log(&mut self, event: &LiveNavEvent) -> LiveNavResult<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotate: history.jsonl → history.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> LiveNavResult<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        // the shift above overwrote the oldest generation
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated log file: `x.jsonl.1`, `x.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(HISTORY_FILE_NAME)
    );
    base.with_file_name(name)
}

/// Drain the event bus into the history log until every sender is gone.
pub fn spawn_recorder(
    mut events: broadcast::Receiver<LiveNavEvent>,
    mut log: HistoryLog,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = log.log(&event) {
                        tracing::warn!("failed to append to history log {}: {e}", log.path().display());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("history log lagged, {skipped} observations dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
