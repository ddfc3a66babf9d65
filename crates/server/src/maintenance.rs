//! Retention maintenance: raw file pruning, audit backup, store prune,
//! and compaction.
//!
//! A pass takes an explicit `now` so horizons stay testable; the caller
//! runs one pass synchronously at startup and then on a timer.

use crate::db::IndexStore;
use crate::indexer::{collect_ndjson_files, relative_source};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mikroscope_core::is_audit_path;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const MIN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INTERVAL_MS: u64 = 21_600_000;

/// Retention knobs; a horizon of `0` days disables that class.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub log_retention_days: i64,
    pub log_audit_retention_days: i64,
    pub db_retention_days: i64,
    pub db_audit_retention_days: i64,
    pub audit_backup_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub files_deleted: u64,
    pub files_backed_up: u64,
    pub entries_pruned: u64,
    pub fields_pruned: u64,
    pub vacuumed: bool,
    pub ran_at: String,
    pub duration_ms: u64,
}

pub struct MaintenanceLoop {
    store: Arc<IndexStore>,
    logs_root: PathBuf,
    config: RetentionConfig,
    running: AtomicBool,
    last_report: Mutex<Option<MaintenanceReport>>,
    last_error: Mutex<Option<String>>,
}

fn horizon(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days > 0 {
        Some(now - ChronoDuration::days(days))
    } else {
        None
    }
}

impl MaintenanceLoop {
    pub fn new(store: Arc<IndexStore>, logs_root: PathBuf, config: RetentionConfig) -> Self {
        Self {
            store,
            logs_root,
            config,
            running: AtomicBool::new(false),
            last_report: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn last_report(&self) -> Option<MaintenanceReport> {
        self.last_report.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// One maintenance pass. Overlapping ticks are no-ops; any step error
    /// is recorded and the remaining steps still run.
    pub fn run_once(&self, now: DateTime<Utc>) -> Option<MaintenanceReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let report = self.run_locked(now);
        self.running.store(false, Ordering::SeqCst);
        *self.last_report.lock().unwrap() = Some(report.clone());
        Some(report)
    }

    fn run_locked(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let started = std::time::Instant::now();
        let mut report = MaintenanceReport {
            ran_at: mikroscope_core::to_canonical(now),
            ..MaintenanceReport::default()
        };

        let normal_file_cutoff = horizon(now, self.config.log_retention_days);
        let audit_file_cutoff = horizon(now, self.config.log_audit_retention_days);

        for path in collect_ndjson_files(&self.logs_root) {
            let rel = relative_source(&self.logs_root, &path);
            let is_audit = is_audit_path(&rel);
            let cutoff = if is_audit {
                audit_file_cutoff
            } else {
                normal_file_cutoff
            };
            let Some(cutoff) = cutoff else { continue };

            let expired = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => DateTime::<Utc>::from(mtime) < cutoff,
                Err(e) => {
                    *self.last_error.lock().unwrap() =
                        Some(format!("{}: {}", path.display(), e));
                    continue;
                }
            };
            if !expired {
                continue;
            }

            if is_audit {
                if let Some(backup_root) = &self.config.audit_backup_directory {
                    match backup_file(backup_root, &rel, &path) {
                        Ok(()) => report.files_backed_up += 1,
                        Err(e) => {
                            // Never delete an audit file whose backup failed
                            *self.last_error.lock().unwrap() =
                                Some(format!("backup of {} failed: {}", rel, e));
                            continue;
                        }
                    }
                }
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("retention removed {}", rel);
                    report.files_deleted += 1;
                }
                Err(e) => {
                    *self.last_error.lock().unwrap() = Some(format!("{}: {}", rel, e));
                }
            }
        }

        let normal_db_cutoff =
            horizon(now, self.config.db_retention_days).map(mikroscope_core::to_canonical);
        let audit_db_cutoff =
            horizon(now, self.config.db_audit_retention_days).map(mikroscope_core::to_canonical);
        match self
            .store
            .prune_by_retention(normal_db_cutoff.as_deref(), audit_db_cutoff.as_deref())
        {
            Ok(prune) => {
                report.entries_pruned = prune.entries_deleted;
                report.fields_pruned = prune.fields_deleted;
            }
            Err(e) => {
                *self.last_error.lock().unwrap() = Some(e.to_string());
            }
        }

        if report.files_deleted > 0 || report.entries_pruned > 0 {
            match self.store.vacuum() {
                Ok(()) => report.vacuumed = true,
                Err(e) => {
                    *self.last_error.lock().unwrap() = Some(e.to_string());
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }
}

fn backup_file(backup_root: &Path, rel: &str, path: &Path) -> std::io::Result<()> {
    let target = backup_root.join(rel);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(path, &target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mikroscope_core::{EntryFilter, NewEntry};
    use std::fs;
    use tempfile::tempdir;

    fn future(days: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(days)
    }

    fn store_with_entry(ts: &str, is_audit: bool) -> Arc<IndexStore> {
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        store
            .upsert_entry(&NewEntry {
                timestamp: ts.to_string(),
                level: "INFO".to_string(),
                event: "e".to_string(),
                message: String::new(),
                is_audit,
                data_json: "{}".to_string(),
                source_file: if is_audit { "audit/a.ndjson" } else { "a.ndjson" }.to_string(),
                line_number: 1,
            })
            .unwrap();
        store
    }

    fn config(
        log_days: i64,
        log_audit_days: i64,
        backup: Option<PathBuf>,
    ) -> RetentionConfig {
        RetentionConfig {
            log_retention_days: log_days,
            log_audit_retention_days: log_audit_days,
            db_retention_days: 0,
            db_audit_retention_days: 0,
            audit_backup_directory: backup,
        }
    }

    #[test]
    fn test_retention_separates_audit_horizon() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.ndjson"), "{}\n").unwrap();
        fs::create_dir_all(dir.path().join("audit")).unwrap();
        fs::write(dir.path().join("audit/trail.ndjson"), "{}\n").unwrap();

        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let maint = MaintenanceLoop::new(
            store,
            dir.path().to_path_buf(),
            config(1, 365, None),
        );

        // Two days in the future: normal horizon (1d) expires the plain
        // file, the audit horizon (365d) keeps the audit file.
        let report = maint.run_once(future(2)).unwrap();
        assert_eq!(report.files_deleted, 1);
        assert!(!dir.path().join("app.ndjson").exists());
        assert!(dir.path().join("audit/trail.ndjson").exists());
    }

    #[test]
    fn test_zero_days_disables_file_retention() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.ndjson"), "{}\n").unwrap();

        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let maint =
            MaintenanceLoop::new(store, dir.path().to_path_buf(), config(0, 0, None));

        let report = maint.run_once(future(400)).unwrap();
        assert_eq!(report.files_deleted, 0);
        assert!(dir.path().join("app.ndjson").exists());
        assert!(!report.vacuumed);
    }

    #[test]
    fn test_audit_backup_before_delete() {
        let dir = tempdir().unwrap();
        let backup = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("audit")).unwrap();
        fs::write(dir.path().join("audit/trail.ndjson"), "{\"event\":\"x\"}\n").unwrap();

        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let maint = MaintenanceLoop::new(
            store,
            dir.path().to_path_buf(),
            config(0, 1, Some(backup.path().to_path_buf())),
        );

        let report = maint.run_once(future(2)).unwrap();
        assert_eq!(report.files_backed_up, 1);
        assert_eq!(report.files_deleted, 1);
        assert!(!dir.path().join("audit/trail.ndjson").exists());
        let copied = backup.path().join("audit/trail.ndjson");
        assert_eq!(
            fs::read_to_string(copied).unwrap(),
            "{\"event\":\"x\"}\n"
        );
    }

    #[test]
    fn test_db_prune_and_vacuum() {
        let dir = tempdir().unwrap();
        let store = store_with_entry("2026-01-01T00:00:00.000Z", false);
        let maint = MaintenanceLoop::new(
            store.clone(),
            dir.path().to_path_buf(),
            RetentionConfig {
                log_retention_days: 0,
                log_audit_retention_days: 0,
                db_retention_days: 1,
                db_audit_retention_days: 0,
                audit_backup_directory: None,
            },
        );

        let report = maint.run_once(future(3650)).unwrap();
        assert_eq!(report.entries_pruned, 1);
        assert!(report.vacuumed);
        assert_eq!(store.count(&EntryFilter::default()).unwrap(), 0);
    }

    #[test]
    fn test_audit_entries_survive_normal_db_prune() {
        let dir = tempdir().unwrap();
        let store = store_with_entry("2026-01-01T00:00:00.000Z", true);
        let maint = MaintenanceLoop::new(
            store.clone(),
            dir.path().to_path_buf(),
            RetentionConfig {
                log_retention_days: 0,
                log_audit_retention_days: 0,
                db_retention_days: 1,
                db_audit_retention_days: 0,
                audit_backup_directory: None,
            },
        );

        let report = maint.run_once(future(3650)).unwrap();
        assert_eq!(report.entries_pruned, 0);
        assert_eq!(store.count(&EntryFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_overlapping_runs_are_noops() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let maint =
            MaintenanceLoop::new(store, dir.path().to_path_buf(), config(0, 0, None));

        maint.running.store(true, Ordering::SeqCst);
        assert!(maint.run_once(Utc::now()).is_none());
        maint.running.store(false, Ordering::SeqCst);
        assert!(maint.run_once(Utc::now()).is_some());
    }
}
