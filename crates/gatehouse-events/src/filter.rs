//! Query filters over the audit trail.
//!
//! A filter works like a cursor over the timeline. `start` is where the
//! cursor is placed and `order` is the direction it walks in:
//!
//! - [`Order::Asc`] keeps entries with `start <= time <= end`
//! - [`Order::Desc`] keeps entries with `end <= time <= start`
//!
//! Either bound may be absent. Matching entries are sorted in walk order
//! and only then truncated to `limit`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;

/// Sort order by entry timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Query parameters for searching the audit trail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Cursor position (inclusive)
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Far bound in the direction of travel (inclusive)
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: Order,
    /// Maximum results, 0 means unbounded
    #[serde(default)]
    pub limit: usize,
    /// Only entries whose `sid` property equals this
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Filter {
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Check if an entry is selected by the filter, ignoring the limit
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        let (lower, upper) = match self.order {
            Order::Asc => (self.start, self.end),
            Order::Desc => (self.end, self.start),
        };
        if lower.is_some_and(|lower| entry.time < lower) {
            return false;
        }
        if upper.is_some_and(|upper| entry.time > upper) {
            return false;
        }
        if let Some(ref sid) = self.session_id {
            if entry.session_id() != Some(sid.as_str()) {
                return false;
            }
        }
        true
    }

    /// Select, sort and truncate `entries`.
    ///
    /// The sort is stable, so entries sharing a timestamp keep the order in
    /// which they were supplied (insertion order for the backends).
    pub fn apply<'a, I>(&self, entries: I) -> Vec<AuditEntry>
    where
        I: IntoIterator<Item = &'a AuditEntry>,
    {
        let mut selected: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect();

        match self.order {
            Order::Asc => selected.sort_by(|a, b| a.time.cmp(&b.time)),
            Order::Desc => selected.sort_by(|a, b| b.time.cmp(&a.time)),
        }

        if self.limit > 0 {
            selected.truncate(self.limit);
        }
        selected
    }
}
