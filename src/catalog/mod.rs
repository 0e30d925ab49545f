//! Asset catalog: which model files exist on disk, per type.
//!
//! A `Catalog` is an immutable snapshot. Rescans build a new one that is
//! swapped in wholesale (see `crate::snapshot`).

mod scan;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::domain::Category;

pub use scan::{collect_files, scan};

/// Identifier -> absolute path.
pub type Entries = BTreeMap<String, PathBuf>;

/// Snapshot of checkpoint and lora files, keyed by lower-cased type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    checkpoints: HashMap<String, Entries>,
    loras: HashMap<String, BTreeMap<String, Entries>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_checkpoint(&mut self, type_key: &str, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.checkpoints
            .entry(type_key.to_lowercase())
            .or_default()
            .insert(id.into(), path.into());
    }

    pub fn insert_lora(&mut self, type_key: &str, bucket: &str, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.loras
            .entry(type_key.to_lowercase())
            .or_default()
            .entry(bucket.to_lowercase())
            .or_default()
            .insert(id.into(), path.into());
    }

    /// Files for a category/type. Lora categories need the sub-bucket.
    pub fn list(&self, category: Category, type_key: &str, bucket: Option<&str>) -> Option<&Entries> {
        let type_key = type_key.to_lowercase();
        match category {
            Category::Checkpoint => self.checkpoints.get(&type_key),
            Category::Character | Category::Etc => {
                let bucket = bucket?.to_lowercase();
                self.loras.get(&type_key)?.get(&bucket)
            }
        }
    }

    /// Path of a lora, looking in `preferred` first and then every other bucket.
    pub fn lora_path(&self, type_key: &str, id: &str, preferred: Option<&str>) -> Option<&Path> {
        let buckets = self.loras.get(&type_key.to_lowercase())?;
        preferred
            .and_then(|b| buckets.get(&b.to_lowercase()))
            .and_then(|entries| entries.get(id))
            .or_else(|| buckets.values().find_map(|entries| entries.get(id)))
            .map(PathBuf::as_path)
    }

    /// Every lora identifier of a type, across buckets.
    pub fn lora_ids(&self, type_key: &str) -> BTreeSet<&str> {
        self.loras
            .get(&type_key.to_lowercase())
            .map(|buckets| buckets.values().flat_map(|e| e.keys().map(String::as_str)).collect())
            .unwrap_or_default()
    }

    /// Every checkpoint identifier of a type.
    pub fn checkpoint_ids(&self, type_key: &str) -> BTreeSet<&str> {
        self.checkpoints
            .get(&type_key.to_lowercase())
            .map(|e| e.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sorted list of types present in either tree.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .checkpoints
            .keys()
            .chain(self.loras.keys())
            .map(String::as_str)
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Lora buckets of a type with their file counts.
    pub fn lora_buckets(&self, type_key: &str) -> Vec<(&str, usize)> {
        self.loras
            .get(&type_key.to_lowercase())
            .map(|b| b.iter().map(|(name, e)| (name.as_str(), e.len())).collect())
            .unwrap_or_default()
    }

    /// Total number of files in the snapshot.
    pub fn len(&self) -> usize {
        let checkpoints: usize = self.checkpoints.values().map(BTreeMap::len).sum();
        let loras: usize = self
            .loras
            .values()
            .flat_map(|b| b.values())
            .map(BTreeMap::len)
            .sum();
        checkpoints + loras
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
