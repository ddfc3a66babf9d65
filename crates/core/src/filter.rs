//! Filter grammar shared by queries, counting, and aggregation.

use serde::{Deserialize, Serialize};

/// Exact-match predicate against one extracted scalar field. Only a single
/// field predicate is supported per query to bound plan complexity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub key: String,
    pub value: String,
}

/// Entry filter. Time bounds are inclusive and compared lexicographically
/// against canonical UTC timestamps; `level` is normalized to upper case.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub level: Option<String>,
    pub audit: Option<bool>,
    pub field: Option<FieldMatch>,
}

impl EntryFilter {
    pub fn level(mut self, level: &str) -> Self {
        self.level = Some(level.to_uppercase());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn audit(mut self, audit: bool) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field = Some(FieldMatch {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// Grouping dimension for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Level,
    Event,
    /// Group by one extracted field; requires a non-empty field name.
    Field,
    /// First non-null of `correlationId` then `requestId`.
    Correlation,
}

impl GroupBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "level" => Some(Self::Level),
            "event" => Some(Self::Event),
            "field" => Some(Self::Field),
            "correlation" => Some(Self::Correlation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Level => "level",
            Self::Event => "event",
            Self::Field => "field",
            Self::Correlation => "correlation",
        }
    }
}
