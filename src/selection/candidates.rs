//! Candidate sets: catalog files that also have a metadata entry.

use std::path::PathBuf;

use crate::catalog::Entries;
use crate::config::GlobalConfig;
use crate::domain::Category;
use crate::snapshot::Snapshot;

fn catalog_entries<'a>(snapshot: &'a Snapshot, config: &GlobalConfig, category: Category, type_key: &str) -> Option<&'a Entries> {
    let bucket = config.lora_bucket(category);
    snapshot.catalog.list(category, type_key, bucket.as_deref())
}

fn has_metadata(snapshot: &Snapshot, category: Category, type_key: &str) -> bool {
    snapshot
        .metadata
        .documents(category, type_key)
        .is_some_and(|docs| docs.values().any(|bucket| !bucket.is_empty()))
}

/// Sorted candidate identifiers for a category/type.
///
/// With `catalog_fallback`, a type that has no metadata at all for the
/// category yields every catalog file instead of nothing.
pub fn resolve(
    snapshot: &Snapshot,
    config: &GlobalConfig,
    category: Category,
    type_key: &str,
    catalog_fallback: bool,
) -> Vec<String> {
    let Some(entries) = catalog_entries(snapshot, config, category, type_key) else {
        return Vec::new();
    };

    if catalog_fallback && !has_metadata(snapshot, category, type_key) {
        log::debug!("No {} metadata for '{}', using catalog only", category, type_key);
        return entries.keys().cloned().collect();
    }

    entries
        .keys()
        .filter(|id| snapshot.metadata.contains(category, type_key, id))
        .cloned()
        .collect()
}

/// Catalog path of a picked identifier.
pub fn path_of(snapshot: &Snapshot, config: &GlobalConfig, category: Category, type_key: &str, id: &str) -> Option<PathBuf> {
    match category {
        Category::Checkpoint => catalog_entries(snapshot, config, category, type_key)?.get(id).cloned(),
        Category::Character | Category::Etc => {
            let bucket = config.lora_bucket(category);
            snapshot
                .catalog
                .lora_path(type_key, id, bucket.as_deref())
                .map(|p| p.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::metadata::{Entry, MetadataStore};

    fn create_test_snapshot() -> Snapshot {
        let mut catalog = Catalog::new();
        catalog.insert_checkpoint("il", "base", "/c/base.safetensors");
        catalog.insert_checkpoint("il", "orphan", "/c/orphan.safetensors");
        catalog.insert_lora("il", "char", "alice", "/l/char/alice.safetensors");
        catalog.insert_lora("il", "char", "bob", "/l/char/bob.safetensors");
        catalog.insert_lora("il", "etc", "glow", "/l/etc/glow.safetensors");

        let mut metadata = MetadataStore::new();
        metadata.insert_entry(Category::Checkpoint, "il", "main", "base", Entry::weighted(1.0));
        metadata.insert_entry(Category::Checkpoint, "il", "main", "ghost", Entry::weighted(1.0));
        metadata.insert_entry(Category::Character, "il", "chars", "alice", Entry::weighted(1.0));
        Snapshot::new(catalog, metadata)
    }

    #[test]
    fn test_intersection_of_catalog_and_metadata() {
        let snapshot = create_test_snapshot();
        let config = GlobalConfig::default();
        assert_eq!(resolve(&snapshot, &config, Category::Checkpoint, "il", false), vec!["base"]);
        assert_eq!(resolve(&snapshot, &config, Category::Character, "il", true), vec!["alice"]);
    }

    #[test]
    fn test_catalog_fallback_only_without_metadata() {
        let mut snapshot = create_test_snapshot();
        snapshot.metadata = MetadataStore::new();
        let config = GlobalConfig::default();

        assert!(resolve(&snapshot, &config, Category::Checkpoint, "il", false).is_empty());
        assert_eq!(
            resolve(&snapshot, &config, Category::Checkpoint, "il", true),
            vec!["base", "orphan"]
        );
        assert_eq!(resolve(&snapshot, &config, Category::Character, "il", true), vec!["alice", "bob"]);
    }

    #[test]
    fn test_unknown_type_is_empty() {
        let snapshot = create_test_snapshot();
        let config = GlobalConfig::default();
        assert!(resolve(&snapshot, &config, Category::Etc, "pony", true).is_empty());
    }

    #[test]
    fn test_path_of_prefers_category_bucket() {
        let mut snapshot = create_test_snapshot();
        snapshot.catalog.insert_lora("il", "etc", "alice", "/l/etc/alice.safetensors");
        let config = GlobalConfig::default();

        assert_eq!(
            path_of(&snapshot, &config, Category::Character, "il", "alice"),
            Some(PathBuf::from("/l/char/alice.safetensors"))
        );
        assert_eq!(
            path_of(&snapshot, &config, Category::Etc, "il", "alice"),
            Some(PathBuf::from("/l/etc/alice.safetensors"))
        );
        assert_eq!(path_of(&snapshot, &config, Category::Checkpoint, "il", "ghost"), None);
    }
}
