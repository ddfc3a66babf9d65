//! Log entry model and NDJSON record normalization.
//!
//! Every record that enters the index goes through [`normalize_record`],
//! which fills defaults for missing fields and derives the audit flag.
//! Timestamps are canonicalized to RFC 3339 UTC so that lexicographic
//! ordering in the store matches instant ordering.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Fallback event name when a record carries neither `event` nor a usable
/// `message`.
pub const DEFAULT_EVENT: &str = "log.event";

/// A fully indexed record as returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub event: String,
    pub message: String,
    pub is_audit: bool,
    /// The full original JSON object, parsed back out of the store.
    pub data: serde_json::Value,
    pub source_file: String,
    pub line_number: u64,
}

/// Input for an entry upsert. `(source_file, line_number)` is the
/// idempotency key: re-indexing the same line is a no-op.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub timestamp: String,
    pub level: String,
    pub event: String,
    pub message: String,
    pub is_audit: bool,
    pub data_json: String,
    pub source_file: String,
    pub line_number: u64,
}

/// Canonical RFC 3339 UTC rendering used for all stored timestamps.
pub fn to_canonical(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current wall clock in canonical form.
pub fn now_canonical() -> String {
    to_canonical(Utc::now())
}

/// Normalize an arbitrary timestamp string to canonical UTC.
/// Returns `None` when the value is not parseable RFC 3339.
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| to_canonical(dt.with_timezone(&Utc)))
}

/// A record is an audit record when the file that carried it lives under
/// an `audit` path segment or has `audit` in its basename,
/// case-insensitively. An explicit flag in the record overrides this.
pub fn is_audit_path(relative_path: &str) -> bool {
    relative_path
        .split('/')
        .any(|segment| segment.to_ascii_lowercase().contains("audit"))
}

fn audit_flag_from_record(obj: &serde_json::Map<String, serde_json::Value>) -> Option<bool> {
    let value = obj.get("audit")?;
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Normalize one parsed NDJSON object into an entry input.
///
/// Defaults: missing/invalid `timestamp` takes the current wall clock;
/// `level` is upper-cased with `INFO` as fallback; `event` falls back to
/// `message`, then [`DEFAULT_EVENT`]; a non-string `message` is
/// JSON-serialized rather than dropped.
pub fn normalize_record(
    record: &serde_json::Value,
    source_file: &str,
    line_number: u64,
) -> Option<NewEntry> {
    let obj = record.as_object()?;

    let timestamp = obj
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(canonical_timestamp)
        .unwrap_or_else(now_canonical);

    let level = obj
        .get("level")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "INFO".to_string());

    let message = match obj.get("message") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    };

    let event = obj
        .get("event")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            if message.is_empty() {
                None
            } else {
                Some(message.clone())
            }
        })
        .unwrap_or_else(|| DEFAULT_EVENT.to_string());

    let is_audit = audit_flag_from_record(obj).unwrap_or_else(|| is_audit_path(source_file));

    Some(NewEntry {
        timestamp,
        level,
        event,
        message,
        is_audit,
        data_json: serde_json::to_string(record).unwrap_or_default(),
        source_file: source_file.to_string(),
        line_number,
    })
}

/// Top-level scalar fields of a record, stringified for the field index.
/// Objects and arrays are skipped; they stay available in `data_json`.
pub fn scalar_fields(record: &serde_json::Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Some(obj) = record.as_object() {
        for (key, value) in obj {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => "null".to_string(),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => continue,
            };
            out.push((key.clone(), text));
        }
    }
    out
}
