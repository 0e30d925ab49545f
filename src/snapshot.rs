//! Catalog + metadata snapshot with atomic replacement.
//!
//! Readers clone the current `Arc<Snapshot>` and keep using it for the whole
//! selection call. A reload builds a complete new snapshot and swaps the
//! pointer, so a reader sees either the old or the new snapshot, never a mix.

use std::sync::{Arc, RwLock};

use crate::catalog::{self, Catalog};
use crate::config::GlobalConfig;
use crate::metadata::{self, MetadataStore};

/// Everything the selection engine reads from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub catalog: Catalog,
    pub metadata: MetadataStore,
}

impl Snapshot {
    pub fn new(catalog: Catalog, metadata: MetadataStore) -> Self {
        Self { catalog, metadata }
    }

    /// Scan the asset roots and load metadata filtered against the fresh catalog.
    pub fn build(config: &GlobalConfig) -> Self {
        let catalog = catalog::scan(config);
        let metadata = metadata::load(config, &catalog);
        Self { catalog, metadata }
    }

    /// Reload only metadata, reusing the current catalog.
    pub fn with_metadata(&self, config: &GlobalConfig) -> Self {
        let metadata = metadata::load(config, &self.catalog);
        Self {
            catalog: self.catalog.clone(),
            metadata,
        }
    }
}

/// Shared holder of the latest snapshot.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The latest snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot, returning the previous one.
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
