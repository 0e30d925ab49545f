//! Usage counters per category.
//!
//! Counts are read by the `db` strategy to push picks away from
//! frequently used identifiers. Persistence is best-effort: a failed write
//! is logged and retried on `flush`, it never fails a selection.

mod jsonl;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Category;
use crate::error::Result;

pub use jsonl::JsonlUsageStore;

/// One counter row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub count: u64,
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            count: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Counter table interface used by the engine and driver.
pub trait UsageCounter {
    /// Times `id` has been committed, 0 if never.
    fn count(&self, category: Category, id: &str) -> u64;

    /// Add one. Persistence failures are logged, not returned.
    fn increment(&mut self, category: Category, id: &str);

    /// Write any increments that could not be persisted yet.
    fn flush(&mut self) -> Result<()>;

    /// All records of a category, highest count first.
    fn ranked(&self, category: Category) -> Vec<UsageRecord>;
}

/// Sort records by count descending, then id.
pub fn rank(mut records: Vec<UsageRecord>) -> Vec<UsageRecord> {
    records.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    records
}

/// Non-durable counters, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryUsage {
    counts: HashMap<Category, HashMap<String, UsageRecord>>,
}

impl MemoryUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a count directly.
    pub fn set(&mut self, category: Category, id: &str, count: u64) {
        let record = self
            .counts
            .entry(category)
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| UsageRecord::new(id));
        record.count = count;
    }
}

impl UsageCounter for MemoryUsage {
    fn count(&self, category: Category, id: &str) -> u64 {
        self.counts
            .get(&category)
            .and_then(|c| c.get(id))
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn increment(&mut self, category: Category, id: &str) {
        let record = self
            .counts
            .entry(category)
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| UsageRecord::new(id));
        record.count += 1;
        record.updated_at = Utc::now();
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn ranked(&self, category: Category) -> Vec<UsageRecord> {
        rank(
            self.counts
                .get(&category)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default(),
        )
    }
}
