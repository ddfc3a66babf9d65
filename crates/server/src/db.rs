// Index store: SQLite-backed relational index over raw NDJSON files.
//
// The raw files remain the source of truth; everything here can be
// rebuilt from them with a full reindex.

use mikroscope_core::{EntryFilter, GroupBy, LogEntry, NewEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Hard page-size ceiling, enforced here in addition to the query layer.
pub const MAX_PAGE_LIMIT: u64 = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored record is not valid JSON: {0}")]
    CorruptRow(#[from] serde_json::Error),

    #[error("group_by=field requires a non-empty group field")]
    MissingGroupField,
}

/// One aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Bucket {
    pub key: String,
    pub count: i64,
}

/// Outcome of a retention prune.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub entries_deleted: u64,
    pub fields_deleted: u64,
}

/// Storage statistics surfaced through `/health` and `/api/logs/stats`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub entry_count: i64,
    pub field_count: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub approx_size_bytes: i64,
}

pub struct IndexStore {
    conn: Mutex<Connection>,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS log_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                event TEXT NOT NULL,
                message TEXT NOT NULL,
                is_audit INTEGER NOT NULL DEFAULT 0,
                data_json TEXT NOT NULL,
                source_file TEXT NOT NULL,
                line_number INTEGER NOT NULL,
                indexed_at TEXT NOT NULL,
                UNIQUE(source_file, line_number)
            );

            CREATE TABLE IF NOT EXISTS log_fields (
                entry_id INTEGER NOT NULL
                    REFERENCES log_entries(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value_text TEXT NOT NULL,
                UNIQUE(entry_id, key, value_text)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_timestamp
                ON log_entries(timestamp);
            CREATE INDEX IF NOT EXISTS idx_entries_level_timestamp
                ON log_entries(level, timestamp);
            CREATE INDEX IF NOT EXISTS idx_entries_event_timestamp
                ON log_entries(event, timestamp);
            CREATE INDEX IF NOT EXISTS idx_fields_key_value
                ON log_fields(key, value_text);
            CREATE INDEX IF NOT EXISTS idx_fields_entry_key
                ON log_fields(entry_id, key);
        "#,
        )?;

        // Older databases predate the audit flag; add it defaulted to 0 so
        // existing rows stay queryable while new inserts carry the real value.
        let has_is_audit = {
            let mut stmt = conn.prepare("PRAGMA table_info(log_entries)")?;
            let mut rows = stmt.query([])?;
            let mut found = false;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                if name == "is_audit" {
                    found = true;
                    break;
                }
            }
            found
        };
        if !has_is_audit {
            conn.execute_batch(
                "ALTER TABLE log_entries ADD COLUMN is_audit INTEGER NOT NULL DEFAULT 0",
            )?;
        }
        // Created after the migration check so it also exists on upgraded
        // databases.
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_entries_audit_timestamp
                 ON log_entries(is_audit, timestamp)",
        )?;

        Ok(())
    }

    /// Insert an entry unless `(source_file, line_number)` already exists.
    /// Returns the row id and whether a new row was created.
    pub fn upsert_entry(&self, entry: &NewEntry) -> Result<(i64, bool), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"INSERT INTO log_entries
               (timestamp, level, event, message, is_audit, data_json,
                source_file, line_number, indexed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT(source_file, line_number) DO NOTHING"#,
            params![
                entry.timestamp,
                entry.level,
                entry.event,
                entry.message,
                entry.is_audit as i64,
                entry.data_json,
                entry.source_file,
                entry.line_number as i64,
                mikroscope_core::now_canonical(),
            ],
        )?;

        if changed > 0 {
            return Ok((conn.last_insert_rowid(), true));
        }

        let id: i64 = conn.query_row(
            "SELECT id FROM log_entries WHERE source_file = ?1 AND line_number = ?2",
            params![entry.source_file, entry.line_number as i64],
            |row| row.get(0),
        )?;
        Ok((id, false))
    }

    pub fn upsert_field(
        &self,
        entry_id: i64,
        key: &str,
        value_text: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO log_fields (entry_id, key, value_text) VALUES (?1, ?2, ?3)",
            params![entry_id, key, value_text],
        )?;
        Ok(())
    }

    /// Drop every row derived from one source file. Used when the indexer
    /// detects a rewrite-in-place.
    pub fn delete_entries_for_source_file(
        &self,
        source_file: &str,
    ) -> Result<(u64, u64), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let fields = tx.execute(
            "DELETE FROM log_fields WHERE entry_id IN
                 (SELECT id FROM log_entries WHERE source_file = ?1)",
            params![source_file],
        )?;
        let entries = tx.execute(
            "DELETE FROM log_entries WHERE source_file = ?1",
            params![source_file],
        )?;
        tx.commit()?;
        Ok((entries as u64, fields as u64))
    }

    /// Cursor-paginated page in `(timestamp DESC, id DESC)` order. The
    /// cursor, when present, is the `(timestamp, id)` of the last row of
    /// the previous page. Fetches `limit + 1` rows to compute `has_more`.
    pub fn query_page(
        &self,
        filter: &EntryFilter,
        cursor: Option<(&str, i64)>,
        limit: u64,
    ) -> Result<(Vec<LogEntry>, bool), StoreError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT e.id, e.timestamp, e.level, e.event, e.message, e.is_audit,
                    e.data_json, e.source_file, e.line_number
             FROM log_entries e WHERE 1=1",
        );
        let mut args = filter_predicates(&mut sql, filter);

        if let Some((ts, id)) = cursor {
            sql.push_str(" AND (e.timestamp < ? OR (e.timestamp = ? AND e.id < ?))");
            args.push(Box::new(ts.to_string()));
            args.push(Box::new(ts.to_string()));
            args.push(Box::new(id));
        }

        sql.push_str(" ORDER BY e.timestamp DESC, e.id DESC LIMIT ?");
        args.push(Box::new((limit + 1) as i64));

        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(arg_refs.as_slice())?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }

        let has_more = entries.len() as u64 > limit;
        if has_more {
            entries.truncate(limit as usize);
        }
        Ok((entries, has_more))
    }

    pub fn count(&self, filter: &EntryFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from("SELECT COUNT(*) FROM log_entries e WHERE 1=1");
        let args = filter_predicates(&mut sql, filter);
        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, arg_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Grouped counts ordered by `count DESC, key ASC`. Entries without a
    /// value for the grouping key land in the `(missing)` bucket.
    pub fn aggregate(
        &self,
        filter: &EntryFilter,
        group_by: GroupBy,
        group_field: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Bucket>, StoreError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let conn = self.conn.lock().unwrap();

        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut sql = match group_by {
            GroupBy::Level => String::from(
                "SELECT e.level AS grp, COUNT(DISTINCT e.id) AS cnt
                 FROM log_entries e WHERE 1=1",
            ),
            GroupBy::Event => String::from(
                "SELECT e.event AS grp, COUNT(DISTINCT e.id) AS cnt
                 FROM log_entries e WHERE 1=1",
            ),
            GroupBy::Field => {
                let field = group_field
                    .filter(|f| !f.is_empty())
                    .ok_or(StoreError::MissingGroupField)?;
                args.push(Box::new(field.to_string()));
                String::from(
                    "SELECT COALESCE(f.value_text, '(missing)') AS grp,
                            COUNT(DISTINCT e.id) AS cnt
                     FROM log_entries e
                     LEFT JOIN log_fields f ON f.entry_id = e.id AND f.key = ?
                     WHERE 1=1",
                )
            }
            GroupBy::Correlation => String::from(
                "SELECT COALESCE(c.value_text, r.value_text, '(missing)') AS grp,
                        COUNT(DISTINCT e.id) AS cnt
                 FROM log_entries e
                 LEFT JOIN log_fields c ON c.entry_id = e.id AND c.key = 'correlationId'
                 LEFT JOIN log_fields r ON r.entry_id = e.id AND r.key = 'requestId'
                 WHERE 1=1",
            ),
        };

        args.extend(filter_predicates(&mut sql, filter));
        sql.push_str(" GROUP BY grp ORDER BY cnt DESC, grp ASC LIMIT ?");
        args.push(Box::new(limit as i64));

        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(arg_refs.as_slice())?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next()? {
            buckets.push(Bucket {
                key: row.get(0)?,
                count: row.get(1)?,
            });
        }
        Ok(buckets)
    }

    /// Delete rows older than the per-class cutoffs. A `None` cutoff
    /// disables that class. Field rows go first so entry deletion does not
    /// churn through the cascade.
    pub fn prune_by_retention(
        &self,
        normal_cutoff: Option<&str>,
        audit_cutoff: Option<&str>,
    ) -> Result<PruneReport, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut report = PruneReport::default();

        for (is_audit, cutoff) in [(0i64, normal_cutoff), (1i64, audit_cutoff)] {
            let Some(cutoff) = cutoff else { continue };
            let fields = tx.execute(
                "DELETE FROM log_fields WHERE entry_id IN
                     (SELECT id FROM log_entries WHERE is_audit = ?1 AND timestamp < ?2)",
                params![is_audit, cutoff],
            )?;
            let entries = tx.execute(
                "DELETE FROM log_entries WHERE is_audit = ?1 AND timestamp < ?2",
                params![is_audit, cutoff],
            )?;
            report.fields_deleted += fields as u64;
            report.entries_deleted += entries as u64;
        }

        tx.commit()?;
        Ok(report)
    }

    pub fn vacuum(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Full wipe; the manual reindex flow truncates before a full pass.
    pub fn reset(&self) -> Result<(u64, u64), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let fields = tx.execute("DELETE FROM log_fields", [])?;
        let entries = tx.execute("DELETE FROM log_entries", [])?;
        tx.commit()?;
        Ok((entries as u64, fields as u64))
    }

    pub fn get_stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().unwrap();
        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM log_entries", [], |r| r.get(0))?;
        let field_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM log_fields", [], |r| r.get(0))?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok(StoreStats {
            entry_count,
            field_count,
            page_count,
            page_size,
            approx_size_bytes: page_count * page_size,
        })
    }

    /// Newest entry timestamp, if any rows exist. Used by health reporting.
    pub fn latest_timestamp(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let ts: Option<String> = conn
            .query_row("SELECT MAX(timestamp) FROM log_entries", [], |r| r.get(0))
            .optional()?
            .flatten();
        Ok(ts)
    }
}

fn filter_predicates(sql: &mut String, filter: &EntryFilter) -> Vec<Box<dyn rusqlite::ToSql>> {
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(from) = &filter.from {
        sql.push_str(" AND e.timestamp >= ?");
        args.push(Box::new(from.clone()));
    }
    if let Some(to) = &filter.to {
        sql.push_str(" AND e.timestamp <= ?");
        args.push(Box::new(to.clone()));
    }
    if let Some(level) = &filter.level {
        sql.push_str(" AND e.level = ?");
        args.push(Box::new(level.to_uppercase()));
    }
    if let Some(audit) = filter.audit {
        sql.push_str(" AND e.is_audit = ?");
        args.push(Box::new(audit as i64));
    }
    if let Some(field) = &filter.field {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM log_fields m
                 WHERE m.entry_id = e.id AND m.key = ? AND m.value_text = ?)",
        );
        args.push(Box::new(field.key.clone()));
        args.push(Box::new(field.value.clone()));
    }

    args
}

fn row_to_entry(row: &rusqlite::Row) -> Result<LogEntry, StoreError> {
    let data_json: String = row.get(6)?;
    let is_audit: i64 = row.get(5)?;
    let line_number: i64 = row.get(8)?;
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        level: row.get(2)?,
        event: row.get(3)?,
        message: row.get(4)?,
        is_audit: is_audit != 0,
        data: serde_json::from_str(&data_json)?,
        source_file: row.get(7)?,
        line_number: line_number as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(ts: &str, level: &str, source: &str, line: u64) -> NewEntry {
        NewEntry {
            timestamp: ts.to_string(),
            level: level.to_string(),
            event: "test.event".to_string(),
            message: "m".to_string(),
            is_audit: false,
            data_json: json!({ "level": level }).to_string(),
            source_file: source.to_string(),
            line_number: line,
        }
    }

    #[test]
    fn test_upsert_idempotent() {
        let store = IndexStore::open_in_memory().unwrap();
        let e = entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1);

        let (id1, inserted1) = store.upsert_entry(&e).unwrap();
        let (id2, inserted2) = store.upsert_entry(&e).unwrap();

        assert!(inserted1);
        assert!(!inserted2);
        assert_eq!(id1, id2);
        assert_eq!(store.count(&EntryFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_field_upsert_idempotent() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();

        store.upsert_field(id, "userId", "42").unwrap();
        store.upsert_field(id, "userId", "42").unwrap();

        assert_eq!(store.get_stats().unwrap().field_count, 1);
    }

    #[test]
    fn test_query_order_and_cursor() {
        let store = IndexStore::open_in_memory().unwrap();
        for (i, ts) in [
            "2026-01-01T00:00:01.000Z",
            "2026-01-01T00:00:02.000Z",
            "2026-01-01T00:00:03.000Z",
        ]
        .iter()
        .enumerate()
        {
            store
                .upsert_entry(&entry(ts, "INFO", "a.ndjson", i as u64 + 1))
                .unwrap();
        }

        let (page, has_more) = store.query_page(&EntryFilter::default(), None, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].timestamp, "2026-01-01T00:00:03.000Z");
        assert_eq!(page[1].timestamp, "2026-01-01T00:00:02.000Z");

        let last = &page[1];
        let (page2, has_more2) = store
            .query_page(&EntryFilter::default(), Some((&last.timestamp, last.id)), 2)
            .unwrap();
        assert_eq!(page2.len(), 1);
        assert!(!has_more2);
        assert_eq!(page2[0].timestamp, "2026-01-01T00:00:01.000Z");
    }

    #[test]
    fn test_cursor_ties_break_on_id() {
        let store = IndexStore::open_in_memory().unwrap();
        let ts = "2026-01-01T00:00:00.000Z";
        for line in 1..=3u64 {
            store.upsert_entry(&entry(ts, "INFO", "a.ndjson", line)).unwrap();
        }

        let (page, _) = store.query_page(&EntryFilter::default(), None, 1).unwrap();
        let first_id = page[0].id;
        let (page2, _) = store
            .query_page(&EntryFilter::default(), Some((ts, first_id)), 10)
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert!(page2.iter().all(|e| e.id < first_id));
    }

    #[test]
    fn test_level_filter_case_insensitive() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "ERROR", "a.ndjson", 1))
            .unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "a.ndjson", 2))
            .unwrap();

        let filter = EntryFilter::default().level("error");
        assert_eq!(store.count(&filter).unwrap(), 1);
    }

    #[test]
    fn test_field_filter_joins() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id1, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();
        store.upsert_field(id1, "producerId", "frontend-web").unwrap();
        let (id2, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "a.ndjson", 2))
            .unwrap();
        store.upsert_field(id2, "producerId", "backend").unwrap();

        let filter = EntryFilter::default().field("producerId", "frontend-web");
        let (page, _) = store.query_page(&filter, None, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, id1);

        let filter = EntryFilter::default().field("producerId", "spoofed");
        assert_eq!(store.count(&filter).unwrap(), 0);
    }

    #[test]
    fn test_aggregate_by_level() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "ERROR", "a.ndjson", 1))
            .unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "a.ndjson", 2))
            .unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:02.000Z", "INFO", "a.ndjson", 3))
            .unwrap();

        let buckets = store
            .aggregate(&EntryFilter::default(), GroupBy::Level, None, 25)
            .unwrap();
        assert_eq!(
            buckets,
            vec![
                Bucket { key: "INFO".to_string(), count: 2 },
                Bucket { key: "ERROR".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_aggregate_by_field_with_missing_bucket() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id1, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();
        store.upsert_field(id1, "service", "api").unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "a.ndjson", 2))
            .unwrap();

        let buckets = store
            .aggregate(&EntryFilter::default(), GroupBy::Field, Some("service"), 25)
            .unwrap();
        assert!(buckets.contains(&Bucket { key: "api".to_string(), count: 1 }));
        assert!(buckets.contains(&Bucket { key: "(missing)".to_string(), count: 1 }));
    }

    #[test]
    fn test_aggregate_field_requires_group_field() {
        let store = IndexStore::open_in_memory().unwrap();
        let err = store
            .aggregate(&EntryFilter::default(), GroupBy::Field, None, 25)
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingGroupField));
    }

    #[test]
    fn test_aggregate_correlation_prefers_correlation_id() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id1, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();
        store.upsert_field(id1, "correlationId", "corr-1").unwrap();
        store.upsert_field(id1, "requestId", "req-1").unwrap();
        let (id2, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "a.ndjson", 2))
            .unwrap();
        store.upsert_field(id2, "requestId", "req-2").unwrap();

        let buckets = store
            .aggregate(&EntryFilter::default(), GroupBy::Correlation, None, 25)
            .unwrap();
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert!(keys.contains(&"corr-1"));
        assert!(keys.contains(&"req-2"));
        assert!(!keys.contains(&"req-1"));
    }

    #[test]
    fn test_delete_entries_for_source_file() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();
        store.upsert_field(id, "k", "v").unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:01.000Z", "INFO", "b.ndjson", 1))
            .unwrap();

        let (entries, fields) = store.delete_entries_for_source_file("a.ndjson").unwrap();
        assert_eq!(entries, 1);
        assert_eq!(fields, 1);
        assert_eq!(store.count(&EntryFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_prune_separates_audit_horizon() {
        let store = IndexStore::open_in_memory().unwrap();
        let mut audit = entry("2026-01-01T00:00:00.000Z", "INFO", "audit/a.ndjson", 1);
        audit.is_audit = true;
        store.upsert_entry(&audit).unwrap();
        store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "b.ndjson", 1))
            .unwrap();

        // Normal cutoff removes the plain entry, audit entry survives
        let report = store
            .prune_by_retention(Some("2026-02-01T00:00:00.000Z"), None)
            .unwrap();
        assert_eq!(report.entries_deleted, 1);

        let (page, _) = store.query_page(&EntryFilter::default(), None, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].is_audit);
    }

    #[test]
    fn test_reset_wipes_everything() {
        let store = IndexStore::open_in_memory().unwrap();
        let (id, _) = store
            .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", 1))
            .unwrap();
        store.upsert_field(id, "k", "v").unwrap();

        let (entries, fields) = store.reset().unwrap();
        assert_eq!((entries, fields), (1, 1));
        assert_eq!(store.count(&EntryFilter::default()).unwrap(), 0);
        assert_eq!(store.get_stats().unwrap().field_count, 0);
    }

    #[test]
    fn test_migration_adds_is_audit() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE log_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                event TEXT NOT NULL,
                message TEXT NOT NULL,
                data_json TEXT NOT NULL,
                source_file TEXT NOT NULL,
                line_number INTEGER NOT NULL,
                indexed_at TEXT NOT NULL,
                UNIQUE(source_file, line_number)
            );
            INSERT INTO log_entries
                (timestamp, level, event, message, data_json, source_file, line_number, indexed_at)
            VALUES ('2026-01-01T00:00:00.000Z', 'INFO', 'x', '', '{}', 'old.ndjson', 1,
                    '2026-01-01T00:00:00.000Z');"#,
        )
        .unwrap();

        let store = IndexStore { conn: Mutex::new(conn) };
        store.init_schema().unwrap();

        let (page, _) = store.query_page(&EntryFilter::default(), None, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert!(!page[0].is_audit);
    }

    #[test]
    fn test_limit_clamped_in_store() {
        let store = IndexStore::open_in_memory().unwrap();
        for line in 1..=5u64 {
            store
                .upsert_entry(&entry("2026-01-01T00:00:00.000Z", "INFO", "a.ndjson", line))
                .unwrap();
        }
        // limit 0 is raised to 1
        let (page, has_more) = store.query_page(&EntryFilter::default(), None, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert!(has_more);
    }
}
