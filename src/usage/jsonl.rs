//! JSONL-based usage store with in-memory caching.
//!
//! One `<category>.jsonl` file per category. Each increment appends the
//! updated record as a new line; on open the lines are replayed and the last
//! line for an id wins. A torn trailing line from a crash is skipped and the
//! file is compacted so later appends start on a clean line.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{UsageCounter, UsageRecord, rank};
use crate::domain::Category;
use crate::error::{GenloopError, Result};

/// Compact a file once it holds this many lines per live record.
const COMPACT_RATIO: usize = 4;

/// JSONL-backed durable counters.
pub struct JsonlUsageStore {
    base_path: PathBuf,
    cache: HashMap<Category, HashMap<String, UsageRecord>>,
    lines: HashMap<Category, usize>,
    dirty: BTreeSet<(Category, String)>,
}

impl JsonlUsageStore {
    /// Open (or create) the store in `base_path` and replay every category file.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let mut store = Self {
            base_path,
            cache: HashMap::new(),
            lines: HashMap::new(),
            dirty: BTreeSet::new(),
        };
        for category in Category::ALL {
            store.load(category)?;
        }
        Ok(store)
    }

    /// Get the file path for a category.
    fn collection_path(&self, category: Category) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", category.as_str()))
    }

    fn load(&mut self, category: Category) -> Result<()> {
        let path = self.collection_path(category);
        let mut records = HashMap::new();
        let mut lines = 0usize;
        let mut skipped = 0usize;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<UsageRecord>(&line) {
                    Ok(record) => {
                        lines += 1;
                        records.insert(record.id.clone(), record);
                    }
                    Err(e) => {
                        skipped += 1;
                        log::warn!("Skipping bad line {} in {}: {}", lineno + 1, path.display(), e);
                    }
                }
            }
        }

        log::debug!("Loaded {} usage records for {}", records.len(), category);
        self.cache.insert(category, records);
        self.lines.insert(category, lines);

        // Appending after a torn tail would glue the next record onto it.
        if skipped > 0 {
            self.compact(category)?;
        }
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, category: Category, record: &UsageRecord) -> Result<()> {
        let path = self.collection_path(category);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    fn persist(&mut self, category: Category, id: &str) -> Result<()> {
        let record = self
            .cache
            .get(&category)
            .and_then(|c| c.get(id))
            .ok_or_else(|| GenloopError::Storage(format!("No usage record for {}/{}", category, id)))?;
        self.append_to_file(category, record)?;
        *self.lines.entry(category).or_default() += 1;
        Ok(())
    }

    /// Rewrite a category file with one line per record via temp file + rename.
    pub fn compact(&mut self, category: Category) -> Result<()> {
        let path = self.collection_path(category);
        let tmp = path.with_extension("jsonl.tmp");

        let mut records: Vec<&UsageRecord> = self.cache.get(&category).map(|c| c.values().collect()).unwrap_or_default();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        {
            let mut file = File::create(&tmp)?;
            for record in &records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        self.lines.insert(category, records.len());
        log::debug!("Compacted {} to {} records", path.display(), records.len());
        Ok(())
    }

    fn needs_compaction(&self, category: Category) -> bool {
        let live = self.cache.get(&category).map(HashMap::len).unwrap_or(0);
        let lines = self.lines.get(&category).copied().unwrap_or(0);
        live > 0 && lines > live * COMPACT_RATIO
    }

    /// Number of increments waiting to be written.
    pub fn pending(&self) -> usize {
        self.dirty.len()
    }
}

impl UsageCounter for JsonlUsageStore {
    fn count(&self, category: Category, id: &str) -> u64 {
        self.cache
            .get(&category)
            .and_then(|c| c.get(id))
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn increment(&mut self, category: Category, id: &str) {
        let record = self
            .cache
            .entry(category)
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| UsageRecord::new(id));
        record.count += 1;
        record.updated_at = Utc::now();

        if let Err(e) = self.persist(category, id) {
            log::error!("Failed to persist usage for {}/{}: {}", category, id, e);
            self.dirty.insert((category, id.to_string()));
        }
    }

    fn flush(&mut self) -> Result<()> {
        let pending: Vec<(Category, String)> = self.dirty.iter().cloned().collect();
        let mut first_error = None;
        for (category, id) in pending {
            match self.persist(category, &id) {
                Ok(()) => {
                    self.dirty.remove(&(category, id));
                }
                Err(e) => {
                    log::error!("Flush failed for {}/{}: {}", category, id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        for category in Category::ALL {
            if self.needs_compaction(category) {
                self.compact(category)?;
            }
        }
        Ok(())
    }

    fn ranked(&self, category: Category) -> Vec<UsageRecord> {
        rank(
            self.cache
                .get(&category)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (JsonlUsageStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlUsageStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_count_defaults_to_zero() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.count(Category::Checkpoint, "never"), 0);
    }

    #[test]
    fn test_increment_and_count() {
        let (mut store, _temp) = create_test_store();
        store.increment(Category::Etc, "glow");
        store.increment(Category::Etc, "glow");
        store.increment(Category::Character, "alice");

        assert_eq!(store.count(Category::Etc, "glow"), 2);
        assert_eq!(store.count(Category::Character, "alice"), 1);
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut store = JsonlUsageStore::open(temp_dir.path()).unwrap();
            store.increment(Category::Checkpoint, "base");
            store.increment(Category::Checkpoint, "base");
            store.increment(Category::Checkpoint, "alt");
        }

        {
            let store = JsonlUsageStore::open(temp_dir.path()).unwrap();
            assert_eq!(store.count(Category::Checkpoint, "base"), 2);
            assert_eq!(store.count(Category::Checkpoint, "alt"), 1);
        }
    }

    #[test]
    fn test_torn_trailing_line_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = JsonlUsageStore::open(temp_dir.path()).unwrap();
            store.increment(Category::Etc, "glow");
        }

        let path = temp_dir.path().join("etc.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":\"glow\",\"cou").unwrap();

        let store = JsonlUsageStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.count(Category::Etc, "glow"), 1);
    }

    #[test]
    fn test_increment_after_torn_line_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = JsonlUsageStore::open(temp_dir.path()).unwrap();
            store.increment(Category::Checkpoint, "base");
            store.increment(Category::Checkpoint, "base");
        }

        let path = temp_dir.path().join("checkpoint.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":\"base\",\"cou").unwrap();
        drop(file);

        {
            let mut store = JsonlUsageStore::open(temp_dir.path()).unwrap();
            assert_eq!(store.count(Category::Checkpoint, "base"), 2);
            store.increment(Category::Checkpoint, "base");
        }

        let store = JsonlUsageStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.count(Category::Checkpoint, "base"), 3);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().all(|line| serde_json::from_str::<UsageRecord>(line).is_ok()));
    }

    #[test]
    fn test_compact_keeps_counts() {
        let (mut store, temp) = create_test_store();
        for _ in 0..10 {
            store.increment(Category::Character, "alice");
        }
        store.increment(Category::Character, "bob");

        store.compact(Category::Character).unwrap();

        let content = fs::read_to_string(temp.path().join("character.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);

        let reopened = JsonlUsageStore::open(temp.path()).unwrap();
        assert_eq!(reopened.count(Category::Character, "alice"), 10);
        assert_eq!(reopened.count(Category::Character, "bob"), 1);
    }

    #[test]
    fn test_flush_compacts_long_logs() {
        let (mut store, temp) = create_test_store();
        for _ in 0..20 {
            store.increment(Category::Checkpoint, "base");
        }
        store.flush().unwrap();

        let content = fs::read_to_string(temp.path().join("checkpoint.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_failed_write_is_kept_for_flush() {
        let (mut store, temp) = create_test_store();
        let path = temp.path().join("etc.jsonl");
        fs::create_dir_all(&path).unwrap();

        store.increment(Category::Etc, "glow");
        assert_eq!(store.count(Category::Etc, "glow"), 1);
        assert_eq!(store.pending(), 1);
        assert!(store.flush().is_err());

        fs::remove_dir(&path).unwrap();
        store.flush().unwrap();
        assert_eq!(store.pending(), 0);

        let reopened = JsonlUsageStore::open(temp.path()).unwrap();
        assert_eq!(reopened.count(Category::Etc, "glow"), 1);
    }

    #[test]
    fn test_ranked() {
        let (mut store, _temp) = create_test_store();
        store.increment(Category::Etc, "a");
        store.increment(Category::Etc, "b");
        store.increment(Category::Etc, "b");

        let ranked = store.ranked(Category::Etc);
        assert_eq!(ranked[0].id, "b");
        assert_eq!(ranked[0].count, 2);
        assert_eq!(ranked[1].id, "a");
    }
}
