//! Query service: thin adapter over the index store.
//!
//! Owns limit clamping, the opaque pagination cursor, and group-by
//! validation so the store only ever sees well-formed requests.

use crate::db::{Bucket, IndexStore, StoreError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mikroscope_core::{EntryFilter, GroupBy, LogEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_AGGREGATE_LIMIT: u64 = 25;
pub const MAX_LIMIT: u64 = 1000;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown groupBy value: {0:?} (expected level, event, field, or correlation)")]
    InvalidGroupBy(String),

    #[error("groupBy=field requires a non-empty groupField")]
    MissingGroupField,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Base64url-of-JSON token carried between pages. Malformed tokens are
/// ignored and treated as "first page".
#[derive(Debug, Serialize, Deserialize)]
struct PageCursor {
    id: i64,
    timestamp: String,
}

fn decode_cursor(raw: &str) -> Option<PageCursor> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn encode_cursor(entry: &LogEntry) -> String {
    let cursor = PageCursor {
        id: entry.id,
        timestamp: entry.timestamp.clone(),
    };
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&cursor).unwrap_or_default())
}

/// One page of entries plus the continuation token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsPage {
    pub entries: Vec<LogEntry>,
    pub has_more: bool,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Aggregation result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub buckets: Vec<Bucket>,
    pub group_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_field: Option<String>,
}

pub struct QueryService {
    store: Arc<IndexStore>,
}

impl QueryService {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    pub fn query_page(
        &self,
        filter: &EntryFilter,
        limit: Option<u64>,
        cursor: Option<&str>,
    ) -> Result<LogsPage, QueryError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_LIMIT);
        let decoded = cursor.and_then(decode_cursor);

        let (entries, has_more) = self.store.query_page(
            filter,
            decoded.as_ref().map(|c| (c.timestamp.as_str(), c.id)),
            limit,
        )?;

        let next_cursor = if has_more {
            entries.last().map(encode_cursor)
        } else {
            None
        };

        Ok(LogsPage {
            entries,
            has_more,
            limit,
            next_cursor,
        })
    }

    pub fn aggregate(
        &self,
        filter: &EntryFilter,
        group_by: &str,
        group_field: Option<&str>,
        limit: Option<u64>,
    ) -> Result<AggregateResult, QueryError> {
        let group = GroupBy::parse(group_by)
            .ok_or_else(|| QueryError::InvalidGroupBy(group_by.to_string()))?;
        if group == GroupBy::Field && group_field.map_or(true, |f| f.is_empty()) {
            return Err(QueryError::MissingGroupField);
        }
        let limit = limit.unwrap_or(DEFAULT_AGGREGATE_LIMIT).clamp(1, MAX_LIMIT);

        let buckets = self.store.aggregate(filter, group, group_field, limit)?;
        Ok(AggregateResult {
            buckets,
            group_by: group.as_str().to_string(),
            group_field: if group == GroupBy::Field {
                group_field.map(str::to_string)
            } else {
                None
            },
        })
    }

    pub fn count(&self, filter: &EntryFilter) -> Result<i64, QueryError> {
        Ok(self.store.count(filter)?)
    }
}
