//! Incremental NDJSON indexer.
//!
//! Walks the logs root for `.ndjson` files and feeds parsed lines into the
//! index store. Incremental passes keep a per-file byte cursor so appended
//! lines are picked up without rereading, and detect rewrite-in-place
//! (truncation or same-size content swap) by size and mtime.

use crate::db::{IndexStore, StoreError};
use mikroscope_core::{normalize_record, scalar_fields};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
}

impl IndexMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// Per-file resume state, in-memory only. Dropped when the file disappears
/// between passes; the whole map is cleared by a manual reindex.
#[derive(Debug, Clone, Copy)]
struct FileCursor {
    byte_offset: u64,
    /// Size at checkpoint, kept for debugging; detection compares against
    /// `byte_offset`, which equals it after a clean pass.
    #[allow(dead_code)]
    size: u64,
    last_line: u64,
    mtime: Option<SystemTime>,
}

/// Counters for one indexing pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub files_scanned: u64,
    pub lines_scanned: u64,
    pub records_inserted: u64,
    pub records_skipped: u64,
    pub parse_errors: u64,
    pub started_at: String,
    pub finished_at: String,
    pub mode: String,
}

pub struct Indexer {
    store: Arc<IndexStore>,
    logs_root: PathBuf,
    cursors: Mutex<HashMap<PathBuf, FileCursor>>,
    in_flight: AtomicBool,
    last_report: Mutex<Option<IndexReport>>,
    last_error: Mutex<Option<String>>,
}

impl Indexer {
    pub fn new(store: Arc<IndexStore>, logs_root: PathBuf) -> Self {
        Self {
            store,
            logs_root,
            cursors: Mutex::new(HashMap::new()),
            in_flight: AtomicBool::new(false),
            last_report: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn logs_root(&self) -> &Path {
        &self.logs_root
    }

    /// Run one pass. Returns `Ok(None)` when a pass is already in flight;
    /// callers treat that as "nothing to do" rather than queueing.
    pub fn run(&self, mode: IndexMode) -> Result<Option<IndexReport>, IndexError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let result = self.run_locked(mode);
        self.in_flight.store(false, Ordering::SeqCst);

        match &result {
            Ok(report) => {
                *self.last_report.lock().unwrap() = Some(report.clone());
            }
            Err(e) => {
                *self.last_error.lock().unwrap() = Some(e.to_string());
            }
        }
        result.map(Some)
    }

    fn run_locked(&self, mode: IndexMode) -> Result<IndexReport, IndexError> {
        let started_at = mikroscope_core::now_canonical();
        let mut report = IndexReport {
            files_scanned: 0,
            lines_scanned: 0,
            records_inserted: 0,
            records_skipped: 0,
            parse_errors: 0,
            started_at,
            finished_at: String::new(),
            mode: mode.as_str().to_string(),
        };

        let files = collect_ndjson_files(&self.logs_root);
        let mut seen: Vec<PathBuf> = Vec::with_capacity(files.len());

        for path in files {
            report.files_scanned += 1;
            seen.push(path.clone());
            if let Err(e) = self.index_file(&path, mode, &mut report) {
                // One bad file must not stop the pass.
                tracing::warn!("indexing {} failed: {}", path.display(), e);
                *self.last_error.lock().unwrap() = Some(format!("{}: {}", path.display(), e));
            }
        }

        if mode == IndexMode::Incremental {
            let mut cursors = self.cursors.lock().unwrap();
            cursors.retain(|path, _| seen.contains(path));
        }

        report.finished_at = mikroscope_core::now_canonical();
        Ok(report)
    }

    fn index_file(
        &self,
        path: &Path,
        mode: IndexMode,
        report: &mut IndexReport,
    ) -> Result<(), IndexError> {
        let source_file = relative_source(&self.logs_root, path);
        let meta = std::fs::metadata(path)?;
        let size = meta.len();
        let mtime = meta.modified().ok();

        let (mut offset, mut line_no) = match mode {
            IndexMode::Full => (0u64, 0u64),
            IndexMode::Incremental => {
                let cursor = self.cursors.lock().unwrap().get(path).copied();
                match cursor {
                    None => (0, 0),
                    Some(c) => {
                        let rewritten = size < c.byte_offset
                            || (size == c.byte_offset && mtime != c.mtime);
                        if rewritten {
                            self.store.delete_entries_for_source_file(&source_file)?;
                            (0, 0)
                        } else {
                            (c.byte_offset, c.last_line)
                        }
                    }
                }
            }
        };

        if offset < size {
            let file = std::fs::File::open(path)?;
            let mut reader = BufReader::new(file);
            if offset > 0 {
                reader.seek(SeekFrom::Start(offset))?;
            }

            let mut buf: Vec<u8> = Vec::new();
            loop {
                buf.clear();
                let n = reader.read_until(b'\n', &mut buf)?;
                if n == 0 {
                    break;
                }
                offset += n as u64;
                line_no += 1;
                report.lines_scanned += 1;

                let line = String::from_utf8_lossy(&buf);
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                self.process_line(trimmed, &source_file, line_no, report)?;
            }
        }

        if mode == IndexMode::Incremental {
            self.cursors.lock().unwrap().insert(
                path.to_path_buf(),
                FileCursor {
                    byte_offset: offset,
                    size,
                    last_line: line_no,
                    mtime,
                },
            );
        }
        Ok(())
    }

    fn process_line(
        &self,
        line: &str,
        source_file: &str,
        line_no: u64,
        report: &mut IndexReport,
    ) -> Result<(), IndexError> {
        let record: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                report.parse_errors += 1;
                return Ok(());
            }
        };

        let Some(entry) = normalize_record(&record, source_file, line_no) else {
            report.parse_errors += 1;
            return Ok(());
        };

        let (entry_id, inserted) = self.store.upsert_entry(&entry)?;
        if inserted {
            report.records_inserted += 1;
            for (key, value) in scalar_fields(&record) {
                self.store.upsert_field(entry_id, &key, &value)?;
            }
        } else {
            report.records_skipped += 1;
        }
        Ok(())
    }

    /// Forget every file cursor. The manual reindex flow calls this after
    /// truncating the store so the following pass starts from offset 0.
    pub fn reset_incremental_state(&self) {
        self.cursors.lock().unwrap().clear();
    }

    /// Manual reindex: truncate the store, drop all cursors, and rescan
    /// from offset zero. The whole sequence holds the in-flight flag so a
    /// concurrent auto-ingest or post-flush pass can neither slip between
    /// the reset and the rescan nor lose rows mid-insert. Returns
    /// `Ok(None)` when another pass already holds the flag.
    pub fn try_reset_and_reindex(&self) -> Result<Option<(u64, u64, IndexReport)>, IndexError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let result: Result<(u64, u64, IndexReport), IndexError> = (|| {
            let (entries_deleted, fields_deleted) = self.store.reset()?;
            self.cursors.lock().unwrap().clear();
            let report = self.run_locked(IndexMode::Full)?;
            Ok((entries_deleted, fields_deleted, report))
        })();
        self.in_flight.store(false, Ordering::SeqCst);

        match &result {
            Ok((_, _, report)) => {
                *self.last_report.lock().unwrap() = Some(report.clone());
            }
            Err(e) => {
                *self.last_error.lock().unwrap() = Some(e.to_string());
            }
        }
        result.map(Some)
    }

    pub fn last_report(&self) -> Option<IndexReport> {
        self.last_report.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// All `.ndjson` files under `root`, sorted by path for deterministic
/// scans. A missing root yields an empty list, not an error.
pub fn collect_ndjson_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_into(root, &mut files);
    files.sort();
    files
}

fn collect_into(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, out);
        } else if path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase() == "ndjson")
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
}

/// Path relative to the logs root, forward-slash normalized.
pub fn relative_source(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
