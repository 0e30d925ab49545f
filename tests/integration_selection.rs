//! End-to-end selection integration tests
//!
//! Builds an asset tree on disk, loads it the way the binary does and runs
//! the engine, the driver and the usage store against it.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use genloop::catalog::Catalog;
use genloop::config::{ConfigSource, GlobalConfig};
use genloop::domain::{Category, Strategy};
use genloop::driver::{LogSubmitter, LoopDriver};
use genloop::metadata::{Entry, MetadataStore};
use genloop::selection::{SelectContext, SelectionEngine};
use genloop::snapshot::{Snapshot, SnapshotCell};
use genloop::usage::{JsonlUsageStore, MemoryUsage, UsageCounter};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Lay out models, loras, metadata and a config file under `root`.
fn create_test_tree(root: &Path) -> std::path::PathBuf {
    for id in ["base", "alt"] {
        write(&root.join("models/IL").join(format!("{}.safetensors", id)), "");
    }
    for id in ["alice", "bob"] {
        write(&root.join("loras/IL/Char").join(format!("{}.safetensors", id)), "");
    }
    for id in ["glow", "rim", "grain"] {
        write(&root.join("loras/IL/etc").join(format!("{}.safetensors", id)), "");
    }
    write(&root.join("models/IL/notes.txt"), "ignored");

    write(&root.join("data/IL/checkpoint/main.yml"), "base: {weight: 3}\nalt: {weight: 1}\n");
    write(&root.join("data/IL/lora/chars.yml"), "alice: {weight: 1}\nbob: {weight: 1}\n");
    write(
        &root.join("data/IL/lora/style.yml"),
        "glow: {weight: 5}\nrim: {weight: 1}\ngrain: {weight: bad}\n",
    );
    write(
        &root.join("data/IL/WeightYml.yml"),
        r#"
light:
  per: true
  perMax: 1
  dic:
    bright: {per: 1.0, loras: {glow: 1}, excludeGroups: [texture]}
texture:
  per: true
  dic:
    rough: {per: 1.0, loras: {grain: 1}}
finish:
  weight: true
  dic:
    soft: {weight: 1, ymls: [style]}
"#,
    );

    let config_file = root.join("genloop.yml");
    write(
        &config_file,
        r#"
CheckpointPath: models
LoraPath: loras
LoraCharPath: Char
dataPath: data
usagePath: usage
CheckpointTypes: {IL: 1}
CheckpointLoop: 2
CharLoop: 1
queueLoop: 2
sleep: 0
test: true
seed: 5
GetCheckpointKind: {weight: 1, cycle: 1}
GetCharKind: {random: 1, skip: 1}
GetLoraKind: {weightyml: 1}
"#,
    );
    config_file
}

/// Integration test: scan + metadata load + one selection per category
#[test]
fn test_tree_to_selection() -> eyre::Result<()> {
    let temp = TempDir::new()?;
    let config_file = create_test_tree(temp.path());
    let config = GlobalConfig::load_from_file(&config_file)?;
    let snapshot = Snapshot::build(&config);

    assert_eq!(snapshot.catalog.checkpoint_ids("il").len(), 2);
    assert!(snapshot.metadata.named("il", "WeightYml").is_some());

    let usage = MemoryUsage::new();
    let mut engine = SelectionEngine::new(config.seed);
    let ctx = SelectContext {
        snapshot: &snapshot,
        config: &config,
        usage: &usage,
        type_key: Some("il"),
    };

    for _ in 0..20 {
        let checkpoint = engine.select(Category::Checkpoint, &ctx)?.clone();
        assert_eq!(checkpoint.picks.len(), 1);
        assert!(checkpoint.picks[0].path.starts_with(temp.path().join("models/IL")));

        let character = engine.select(Category::Character, &ctx)?.clone();
        match character.strategy {
            Some(Strategy::Skip) => assert!(character.is_empty()),
            _ => assert!(character.picks[0].path.starts_with(temp.path().join("loras/IL/Char"))),
        }

        // light excludes texture: one lora from light, at most one from finish
        let etc = engine.select(Category::Etc, &ctx)?.clone();
        let ids: Vec<&str> = etc.ids().collect();
        assert_eq!(ids[0], "glow");
        assert!(ids.len() <= 2);
    }
    Ok(())
}

/// Integration test: a full test-mode run persists usage counts
#[test]
fn test_driver_run_persists_usage() -> eyre::Result<()> {
    let temp = TempDir::new()?;
    let config_file = create_test_tree(temp.path());

    let source = ConfigSource::load(Some(&config_file))?;
    let config = source.current().clone();
    let usage_dir = config.usage_dir();
    let snapshots = Arc::new(SnapshotCell::new(Snapshot::build(&config)));

    let mut driver = LoopDriver::new(
        source,
        snapshots,
        SelectionEngine::new(config.seed),
        JsonlUsageStore::open(&usage_dir)?,
        LogSubmitter,
    );
    let summary = driver.run()?;
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.submissions, 4);

    let reopened = JsonlUsageStore::open(&usage_dir)?;
    let checkpoint_total: u64 = reopened.ranked(Category::Checkpoint).iter().map(|r| r.count).sum();
    assert_eq!(checkpoint_total, 2);
    assert!(reopened.count(Category::Etc, "glow") >= 4);
    Ok(())
}

fn create_swap_snapshot(prefix: &str) -> Snapshot {
    let mut catalog = Catalog::new();
    let mut metadata = MetadataStore::new();
    for n in 0..3 {
        let id = format!("{}{}", prefix, n);
        catalog.insert_checkpoint("il", &id, format!("/{}/{}.safetensors", prefix, id));
        metadata.insert_entry(Category::Checkpoint, "il", "main", &id, Entry::weighted(1.0));
    }
    Snapshot::new(catalog, metadata)
}

/// Integration test: selections during concurrent snapshot swaps
#[test]
fn test_selection_during_snapshot_swaps() {
    let cell = Arc::new(SnapshotCell::new(create_swap_snapshot("a")));
    let done = Arc::new(AtomicBool::new(false));

    let swapper = {
        let cell = Arc::clone(&cell);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut flip = false;
            while !done.load(Ordering::Relaxed) {
                let prefix = if flip { "a" } else { "b" };
                cell.swap(create_swap_snapshot(prefix));
                flip = !flip;
                thread::yield_now();
            }
        })
    };

    let mut config = GlobalConfig::default();
    config.checkpoint_kinds.insert(Strategy::Weight, 1.0);
    config.checkpoint_kinds.insert(Strategy::Cycle, 1.0);
    let usage = MemoryUsage::new();
    let mut engine = SelectionEngine::new(Some(17));

    for _ in 0..1000 {
        let snapshot = cell.load();
        let ctx = SelectContext {
            snapshot: &snapshot,
            config: &config,
            usage: &usage,
            type_key: Some("il"),
        };
        let selection = engine.select(Category::Checkpoint, &ctx).unwrap();
        let pick = &selection.picks[0];

        // The pick and its path come from one snapshot, never a mix.
        let prefix = &pick.id[..1];
        assert!(prefix == "a" || prefix == "b");
        assert!(pick.path.starts_with(format!("/{}", prefix)));
        assert!(snapshot.catalog.checkpoint_ids("il").contains(pick.id.as_str()));
    }

    done.store(true, Ordering::Relaxed);
    swapper.join().unwrap();
}
