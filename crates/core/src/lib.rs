pub mod entry;
pub mod filter;

pub use entry::{
    canonical_timestamp, is_audit_path, normalize_record, now_canonical, scalar_fields,
    to_canonical, LogEntry, NewEntry, DEFAULT_EVENT,
};
pub use filter::{EntryFilter, FieldMatch, GroupBy};
