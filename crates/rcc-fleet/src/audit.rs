//! Audit trail
//!
//! Every dispatched command produces one [`AuditRecord`]. Sinks are
//! fire-and-forget: [`AuditSink::record`] never blocks and never fails the
//! command that produced the record.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rcc_adapter::{CommandResult, RadioId, ResultCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::FleetError;

/// File name of the JSON Lines audit log
pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

/// Ties an audit record back to the request that caused it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One write-once audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub actor: String,
    pub action: String,
    pub radio_id: RadioId,
    pub parameters: Value,
    pub result_code: ResultCode,
    pub message: String,
}

impl AuditRecord {
    /// Build a record for a resolved command
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        radio_id: RadioId,
        parameters: Value,
        result: &CommandResult,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id,
            actor: actor.into(),
            action: action.into(),
            radio_id,
            parameters,
            result_code: result.code,
            message: result.message.clone(),
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Append-only JSON Lines audit file fed by a background writer
#[derive(Debug)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditRecord>,
    path: PathBuf,
}

impl AuditLog {
    /// Open (or create) `audit.jsonl` in `directory` and start the writer
    ///
    /// The writer finishes once every handle to the log is dropped; await
    /// the returned task to be sure queued records reached the file.
    pub async fn open(
        directory: &Path,
        queue_capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), FleetError> {
        tokio::fs::create_dir_all(directory).await?;
        let path = directory.join(AUDIT_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let writer = tokio::spawn(write_records(file, rx, path.clone()));
        debug!("Audit log open at {}", path.display());

        Ok((Self { tx, path }, writer))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for AuditLog {
    fn record(&self, record: AuditRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => warn!(
                "Audit queue full, dropped {} on {} ({})",
                record.action, record.radio_id, record.correlation_id
            ),
            Err(TrySendError::Closed(record)) => warn!(
                "Audit writer stopped, dropped {} on {} ({})",
                record.action, record.radio_id, record.correlation_id
            ),
        }
    }
}

async fn write_records(mut file: File, mut rx: mpsc::Receiver<AuditRecord>, path: PathBuf) {
    while let Some(record) = rx.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode audit record: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = file.write_all(&line).await {
            warn!("Failed to write {}: {}", path.display(), e);
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!("Failed to flush {}: {}", path.display(), e);
        }
    }
    debug!("Audit writer for {} stopped", path.display());
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records so far, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Records for one radio, oldest first
    pub fn for_radio(&self, radio_id: &RadioId) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| &r.radio_id == radio_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}
