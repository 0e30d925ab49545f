//! Loads metadata YAML from `dataPath/<Type>/`.
//!
//! - `*.yml` directly in the type folder: named documents (file stem)
//! - `checkpoint/*.yml`: checkpoint buckets, keys filtered to catalog ids
//! - `lora/*.yml`: lora buckets, keys filtered to catalog ids

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::{Entry, MetadataStore};
use crate::catalog::Catalog;
use crate::config::GlobalConfig;
use crate::domain::Category;
use crate::error::Result;

fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files: Vec<PathBuf> = ["yml", "yaml"]
        .iter()
        .filter_map(|ext| glob::glob(&format!("{}/*.{}", base, ext)).ok())
        .flat_map(|paths| paths.filter_map(|r| r.ok()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok(value)
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// Load one bucket folder, keeping only keys present in `valid`.
fn load_buckets(store: &mut MetadataStore, category: Category, type_key: &str, dir: &Path, valid: &BTreeSet<&str>) {
    if !dir.is_dir() {
        return;
    }
    for path in yaml_files(dir) {
        let Some(bucket) = stem(&path) else { continue };
        let document = match read_yaml(&path) {
            Ok(Value::Mapping(map)) => map,
            Ok(Value::Null) => continue,
            Ok(_) => {
                log::warn!("Skipping {}: top level is not a mapping", path.display());
                continue;
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                continue;
            }
        };

        let mut kept = 0usize;
        for (key, props) in document {
            let Some(id) = key.as_str() else { continue };
            if valid.contains(id) {
                store.insert_entry(category, type_key, &bucket, id, Entry::new(props));
                kept += 1;
            }
        }
        log::debug!("{} bucket '{}' for '{}': {} entries", category, bucket, type_key, kept);
    }
}

/// Load metadata for every configured type.
pub fn load(config: &GlobalConfig, catalog: &Catalog) -> MetadataStore {
    let mut store = MetadataStore::new();

    let Some(data_root) = &config.data_path else {
        log::warn!("dataPath is not set, metadata is empty");
        return store;
    };

    for type_name in config.checkpoint_types.keys() {
        let type_dir = data_root.join(type_name);
        if !type_dir.is_dir() {
            log::warn!("Data type folder not found: {}", type_dir.display());
            continue;
        }
        let type_key = type_name.to_lowercase();

        for path in yaml_files(&type_dir) {
            let Some(name) = stem(&path) else { continue };
            match read_yaml(&path) {
                Ok(document) => store.insert_named(&type_key, name, document),
                Err(e) => log::warn!("Failed to load {}: {}", path.display(), e),
            }
        }

        let checkpoint_ids = catalog.checkpoint_ids(&type_key);
        load_buckets(
            &mut store,
            Category::Checkpoint,
            &type_key,
            &type_dir.join("checkpoint"),
            &checkpoint_ids,
        );

        let lora_ids = catalog.lora_ids(&type_key);
        load_buckets(&mut store, Category::Etc, &type_key, &type_dir.join("lora"), &lora_ids);

        if let Some((checkpoints, loras, named)) = store.summary(&type_key) {
            log::info!(
                "Metadata for '{}': {} checkpoint entries, {} lora entries, {} documents",
                type_key,
                checkpoints,
                loras,
                named
            );
        }
    }

    store
}
