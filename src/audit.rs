//! Append-only audit persistence for scored requests

use crate::types::PredictionRecord;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Append-only sink accepting one serialized record at a time.
///
/// Implementations serialize concurrent appends internally so interleaved
/// writes never corrupt or truncate a record.
pub trait AuditSink: Send + Sync {
    /// Append one record. Once this returns `Ok`, the record is durable.
    fn append(&self, record: &PredictionRecord) -> std::io::Result<()>;
}

/// JSONL file sink: one JSON object per line, appended in arrival order.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the audit log at `path` in append mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &PredictionRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;

        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("audit log lock poisoned: {e}")))?;
        writeln!(file, "{line}")?;
        file.flush()?;

        debug!(
            request_id = %record.request_id,
            path = %self.path.display(),
            "Appended prediction record"
        );

        Ok(())
    }
}
