//! Ingest pipeline: authenticated intake of producer-pushed NDJSON batches.
//!
//! Accepted records are appended to
//! `logs/ingest/<producerId>/<UTC-date>.ndjson` and picked up by an
//! incremental index pass. The producer identity always comes from the
//! server-side auth resolution; a payload cannot forge `producerId`.

use crate::indexer::{IndexMode, Indexer};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestAuthError {
    /// No producer mapping and no basic credentials configured at all.
    #[error("ingest endpoint is not configured")]
    Disabled,

    #[error("invalid or missing ingest credentials")]
    Unauthorized,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("indexing failed: {0}")]
    Index(#[from] crate::indexer::IndexError),
}

/// Resolve the producer id for a request.
///
/// Basic credentials win over bearer tokens; the username becomes the
/// producer id. Bearer tokens map through the configured
/// `token -> producerId` table.
pub fn resolve_producer(
    authorization: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
    producers: &HashMap<String, String>,
) -> Result<String, IngestAuthError> {
    let basic_configured = username.is_some() && password.is_some();
    if producers.is_empty() && !basic_configured {
        return Err(IngestAuthError::Disabled);
    }

    let Some(header) = authorization else {
        return Err(IngestAuthError::Unauthorized);
    };

    if basic_configured {
        if let Some(encoded) = header.strip_prefix("Basic ") {
            if let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) {
                if let Ok(text) = String::from_utf8(decoded) {
                    if let Some((user, pass)) = text.split_once(':') {
                        if Some(user) == username.as_deref() && Some(pass) == password.as_deref() {
                            return Ok(user.to_string());
                        }
                    }
                }
            }
        }
    }

    if let Some(token) = header.strip_prefix("Bearer ") {
        if let Some(producer) = producers.get(token.trim()) {
            return Ok(producer.clone());
        }
    }

    Err(IngestAuthError::Unauthorized)
}

/// Accepts a JSON array of records or an object with a `logs` array.
/// An empty body is an empty batch. Anything else is a validation error.
pub fn parse_payload(body: &[u8]) -> Result<Vec<serde_json::Value>, String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid JSON body: {}", e))?;

    match value {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut obj) => match obj.remove("logs") {
            Some(serde_json::Value::Array(items)) => Ok(items),
            _ => Err("expected a JSON array or an object with a \"logs\" array".to_string()),
        },
        _ => Err("expected a JSON array or an object with a \"logs\" array".to_string()),
    }
}

/// A normalized batch ready to append. `ingested_at` is shared by every
/// record of the batch.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub records: Vec<serde_json::Value>,
    pub accepted: u64,
    pub rejected: u64,
    pub ingested_at: String,
}

/// Copy each object element, overwrite `producerId` with the resolved
/// identity, and stamp `ingestedAt`. Non-object elements are rejected.
pub fn normalize_batch(
    elements: Vec<serde_json::Value>,
    producer_id: &str,
    now: DateTime<Utc>,
) -> NormalizedBatch {
    let ingested_at = mikroscope_core::to_canonical(now);
    let mut records = Vec::with_capacity(elements.len());
    let mut rejected = 0u64;

    for element in elements {
        let serde_json::Value::Object(mut obj) = element else {
            rejected += 1;
            continue;
        };
        obj.insert(
            "producerId".to_string(),
            serde_json::Value::String(producer_id.to_string()),
        );
        obj.insert(
            "ingestedAt".to_string(),
            serde_json::Value::String(ingested_at.clone()),
        );
        records.push(serde_json::Value::Object(obj));
    }

    NormalizedBatch {
        accepted: records.len() as u64,
        records,
        rejected,
        ingested_at,
    }
}

/// Append a batch as one write to the producer's daily shard.
pub fn append_batch(
    logs_root: &Path,
    producer_id: &str,
    records: &[serde_json::Value],
    now: DateTime<Utc>,
) -> std::io::Result<PathBuf> {
    let dir = logs_root.join("ingest").join(producer_id);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.ndjson", now.format("%Y-%m-%d")));

    let mut payload = String::new();
    for record in records {
        payload.push_str(&record.to_string());
        payload.push('\n');
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)?;
    file.write_all(payload.as_bytes())?;
    Ok(path)
}

/// Wire shape of an ingest response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub accepted: u64,
    pub rejected: u64,
    pub queued: bool,
    pub producer_id: String,
    pub received_at: String,
}

#[derive(Debug, Clone)]
struct PendingBatch {
    producer_id: String,
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: Vec<PendingBatch>,
    flushed_batches: u64,
    flushed_records: u64,
    last_error: Option<String>,
    last_flush_at: Option<String>,
}

/// Queue counters reported through `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending_batches: usize,
    pub pending_records: u64,
    pub draining: bool,
    pub flushed_batches: u64,
    pub flushed_records: u64,
    pub last_error: Option<String>,
    pub last_flush_at: Option<String>,
}

/// Asynchronous ingest queue: enqueued batches coalesce for `flush_ms`
/// and are written per producer in one flush, followed by a single
/// incremental index pass. A failed flush re-queues the unwritten batches.
pub struct IngestQueue {
    inner: Mutex<QueueInner>,
    draining: AtomicBool,
    flush_scheduled: AtomicBool,
    flush_ms: u64,
    logs_root: PathBuf,
    indexer: Arc<Indexer>,
    flush_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl IngestQueue {
    pub fn new(logs_root: PathBuf, indexer: Arc<Indexer>, flush_ms: u64) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            draining: AtomicBool::new(false),
            flush_scheduled: AtomicBool::new(false),
            flush_ms,
            logs_root,
            indexer,
            flush_task: Mutex::new(None),
        }
    }

    pub fn enqueue(self: &Arc<Self>, producer_id: String, records: Vec<serde_json::Value>) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.push(PendingBatch {
                producer_id,
                records,
            });
        }
        self.schedule_flush();
    }

    fn schedule_flush(self: &Arc<Self>) {
        if self
            .flush_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(queue.flush_ms)).await;
            queue.flush();
        });
        *self.flush_task.lock().unwrap() = Some(handle);
    }

    /// Drain the pending list once. Only one flush runs at a time; a
    /// concurrent attempt returns immediately and the running drain
    /// reschedules if work remains.
    pub fn flush(self: &Arc<Self>) {
        self.flush_scheduled.store(false, Ordering::SeqCst);
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let batches = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.pending)
        };

        if !batches.is_empty() {
            let merged = merge_by_producer(batches);
            let now = Utc::now();

            for (index, batch) in merged.iter().enumerate() {
                if let Err(e) =
                    append_batch(&self.logs_root, &batch.producer_id, &batch.records, now)
                {
                    tracing::warn!("ingest flush failed for {}: {}", batch.producer_id, e);
                    let mut inner = self.inner.lock().unwrap();
                    // Put the unwritten tail back ahead of anything that
                    // arrived while we were draining.
                    let mut requeue: Vec<PendingBatch> = merged[index..].to_vec();
                    requeue.append(&mut inner.pending);
                    inner.pending = requeue;
                    inner.last_error = Some(e.to_string());
                    drop(inner);
                    self.draining.store(false, Ordering::SeqCst);
                    self.schedule_flush();
                    return;
                }
                let mut inner = self.inner.lock().unwrap();
                inner.flushed_batches += 1;
                inner.flushed_records += batch.records.len() as u64;
            }

            if let Err(e) = self.indexer.run(IndexMode::Incremental) {
                tracing::warn!("post-flush indexing failed: {}", e);
                self.inner.lock().unwrap().last_error = Some(e.to_string());
            }
            self.inner.lock().unwrap().last_flush_at = Some(mikroscope_core::now_canonical());
        }

        self.draining.store(false, Ordering::SeqCst);
        let has_pending = !self.inner.lock().unwrap().pending.is_empty();
        if has_pending {
            self.schedule_flush();
        }
    }

    /// Shutdown path: cancel the coalescing timer, then flush whatever is
    /// pending. Errors are logged, never raised.
    pub fn drain_for_shutdown(self: &Arc<Self>) {
        if let Some(handle) = self.flush_task.lock().unwrap().take() {
            handle.abort();
        }
        self.flush();
    }

    pub fn snapshot(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            pending_batches: inner.pending.len(),
            pending_records: inner
                .pending
                .iter()
                .map(|b| b.records.len() as u64)
                .sum(),
            draining: self.draining.load(Ordering::SeqCst),
            flushed_batches: inner.flushed_batches,
            flushed_records: inner.flushed_records,
            last_error: inner.last_error.clone(),
            last_flush_at: inner.last_flush_at.clone(),
        }
    }
}

/// Merge batches of the same producer into one, preserving arrival order.
fn merge_by_producer(batches: Vec<PendingBatch>) -> Vec<PendingBatch> {
    let mut merged: Vec<PendingBatch> = Vec::new();
    for batch in batches {
        match merged
            .iter_mut()
            .find(|m| m.producer_id == batch.producer_id)
        {
            Some(existing) => existing.records.extend(batch.records),
            None => merged.push(batch),
        }
    }
    merged
}
