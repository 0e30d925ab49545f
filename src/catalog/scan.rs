//! Directory scanner that builds a `Catalog` from the configured roots.

use std::fs;
use std::path::Path;

use super::{Catalog, Entries};
use crate::config::GlobalConfig;

/// Collect files with one of `extensions` directly inside `dir`.
///
/// Returns `{file_stem: path}`. Missing directories yield an empty map.
pub fn collect_files(dir: &Path, extensions: &[String]) -> Entries {
    let mut entries = Entries::new();
    if !dir.is_dir() {
        return entries;
    }

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    for ext in extensions {
        let pattern = format!("{}/*.{}", base, ext.trim_start_matches('.'));
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Bad extension pattern '{}': {}", pattern, e);
                continue;
            }
        };
        for path in paths.filter_map(|r| r.ok()).filter(|p| p.is_file()) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.insert(stem.to_string(), path.clone());
            }
        }
    }
    entries
}

/// Scan checkpoint and lora roots for every configured type.
///
/// Layout: `CheckpointPath/<Type>/*.ext` and `LoraPath/<Type>/<bucket>/*.ext`.
pub fn scan(config: &GlobalConfig) -> Catalog {
    let mut catalog = Catalog::new();

    if config.checkpoint_types.is_empty() {
        log::warn!("CheckpointTypes is empty, nothing to scan");
        return catalog;
    }

    for type_name in config.checkpoint_types.keys() {
        if let Some(root) = &config.checkpoint_path {
            let dir = root.join(type_name);
            if !dir.is_dir() {
                log::warn!("Checkpoint type folder not found: {}", dir.display());
            }
            for (id, path) in collect_files(&dir, &config.extension) {
                catalog.insert_checkpoint(type_name, id, path);
            }
        }

        if let Some(root) = &config.lora_path {
            let dir = root.join(type_name);
            let subdirs = match fs::read_dir(&dir) {
                Ok(read) => read,
                Err(e) => {
                    log::warn!("Lora type folder not readable {}: {}", dir.display(), e);
                    continue;
                }
            };
            for sub in subdirs.filter_map(|r| r.ok()).map(|e| e.path()).filter(|p| p.is_dir()) {
                let Some(bucket) = sub.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                for (id, path) in collect_files(&sub, &config.extension) {
                    catalog.insert_lora(type_name, &bucket, id, path);
                }
            }
        }
    }

    log::info!("Catalog scan complete: {} files", catalog.len());
    catalog
}
