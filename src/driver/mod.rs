//! Nested generation loop.
//!
//! checkpoint (slowest) -> character -> etc lora (fastest). Config is
//! re-read before every inner iteration; when a live edit shrinks a loop
//! below the current index the rest of the batch is abandoned. Reload
//! events from the watcher are applied at the same safe point.

mod submit;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ConfigSource, GlobalConfig, NumberOrRange};
use crate::domain::Category;
use crate::error::Result;
use crate::selection::{SelectContext, SelectionEngine};
use crate::snapshot::{Snapshot, SnapshotCell};
use crate::usage::UsageCounter;
use crate::watcher::{PollWatcher, ReloadEvent};

pub use submit::{Batch, LogSubmitter, Submitter};

/// Granularity of the stop check while sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Minimum wait after a batch that could not start.
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Counters reported when the driver exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub submissions: usize,
    /// Batches cut short by a shrunken loop count
    pub aborted: usize,
    pub reloads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Nothing could be scheduled this batch
    Idle,
    Stop,
}

pub struct LoopDriver<U, S>
where
    U: UsageCounter,
    S: Submitter,
{
    source: ConfigSource,
    snapshots: Arc<SnapshotCell>,
    engine: SelectionEngine,
    usage: U,
    submitter: S,
    reloads: Option<Receiver<ReloadEvent>>,
    watcher: Option<PollWatcher>,
    stop: Arc<AtomicBool>,
}

impl<U, S> LoopDriver<U, S>
where
    U: UsageCounter,
    S: Submitter,
{
    pub fn new(source: ConfigSource, snapshots: Arc<SnapshotCell>, engine: SelectionEngine, usage: U, submitter: S) -> Self {
        Self {
            source,
            snapshots,
            engine,
            usage,
            submitter,
            reloads: None,
            watcher: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receive reload events, optionally owning the watcher that sends them.
    pub fn with_reloads(mut self, reloads: Receiver<ReloadEvent>, watcher: Option<PollWatcher>) -> Self {
        self.reloads = Some(reloads);
        self.watcher = watcher;
        self
    }

    /// Share an externally owned stop flag, e.g. one set by a signal handler.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn usage(&self) -> &U {
        &self.usage
    }

    pub fn engine(&self) -> &SelectionEngine {
        &self.engine
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run batches until stopped or, with `test` set, after one batch.
    ///
    /// Always stops the watcher and flushes usage before returning.
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        log::info!("Driver started");

        while !self.stopped() {
            summary.reloads += self.apply_reloads();
            self.source.refresh();

            let flow = self.run_batch(&mut summary);
            summary.batches += 1;
            if flow == Flow::Stop {
                break;
            }
            if self.source.current().test {
                log::info!("Test mode, stopping after one batch");
                break;
            }
            if flow == Flow::Idle && self.wait(IDLE_BACKOFF) == Flow::Stop {
                break;
            }
        }

        log::info!(
            "Driver finished: {} batches, {} submissions, {} aborted, {} reloads",
            summary.batches,
            summary.submissions,
            summary.aborted,
            summary.reloads
        );
        self.shutdown()?;
        Ok(summary)
    }

    fn run_batch(&mut self, summary: &mut RunSummary) -> Flow {
        let config = self.source.current().clone();
        let type_key = match self.engine.pick_type(&config.checkpoint_types) {
            Ok(type_key) => type_key,
            Err(e) => {
                log::warn!("Skipping batch: {}", e);
                return match self.pause(&config) {
                    Flow::Stop => Flow::Stop,
                    _ => Flow::Idle,
                };
            }
        };

        let outer = resolve_loop("CheckpointLoop", &config.checkpoint_loop, &mut self.engine);
        log::info!("Batch for '{}': {} checkpoint iterations", type_key, outer);

        for ci in 0..outer {
            self.select(Category::Checkpoint, &type_key);
            let middle = resolve_loop("CharLoop", &self.source.current().char_loop, &mut self.engine);

            for hi in 0..middle {
                self.select(Category::Character, &type_key);
                let inner = resolve_loop("queueLoop", &self.source.current().queue_loop, &mut self.engine);

                for qi in 0..inner {
                    if self.stopped() {
                        return Flow::Stop;
                    }
                    summary.reloads += self.apply_reloads();
                    let config = self.source.refresh().clone();
                    if exceeds_bounds(&config, [ci, hi, qi]) {
                        log::info!("Loop counts shrank, abandoning batch at {}/{}/{}", ci, hi, qi);
                        summary.aborted += 1;
                        return Flow::Continue;
                    }

                    self.select(Category::Etc, &type_key);
                    let batch = Batch::from_engine(&self.engine, &type_key, [ci, hi, qi]);
                    match self.submitter.submit(&batch) {
                        Ok(()) => summary.submissions += 1,
                        Err(e) => log::error!("Submission failed: {}", e),
                    }

                    if self.pause(&config) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
            }
        }
        Flow::Continue
    }

    /// Select one category and count the picks. Failures stay local to the category.
    fn select(&mut self, category: Category, type_key: &str) {
        let snapshot = self.snapshots.load();
        let ctx = SelectContext {
            snapshot: &snapshot,
            config: self.source.current(),
            usage: &self.usage,
            type_key: Some(type_key),
        };
        let outcome = self.engine.select(category, &ctx).map(|s| s.picks.len());

        match outcome {
            Ok(picks) => {
                self.engine.commit(category, &mut self.usage);
                log::debug!("{}: {} picks committed", category, picks);
            }
            Err(e) if e.is_noop() => log::warn!("{} unchanged: {}", category, e),
            Err(e) => log::error!("{} selection failed: {}", category, e),
        }
    }

    /// Drain pending reload events and swap in one rebuilt snapshot.
    fn apply_reloads(&mut self) -> usize {
        let Some(reloads) = &self.reloads else {
            return 0;
        };
        let events: HashSet<ReloadEvent> = reloads.try_iter().collect();
        if events.is_empty() {
            return 0;
        }

        if events.contains(&ReloadEvent::Config) {
            self.source.refresh();
        }
        let config = self.source.current();
        let next = if events.contains(&ReloadEvent::Catalog) || events.contains(&ReloadEvent::Config) {
            Snapshot::build(config)
        } else {
            self.snapshots.load().with_metadata(config)
        };
        log::info!("Reloaded snapshot ({} catalog files) for {:?}", next.catalog.len(), events);
        self.snapshots.swap(next);
        1
    }

    /// Sleep for the configured duration, waking early on stop.
    fn pause(&mut self, config: &GlobalConfig) -> Flow {
        let seconds = config.sleep.resolve_float(self.engine.rng()).unwrap_or_else(|e| {
            log::warn!("Invalid sleep value: {}", e);
            0.0
        });
        self.wait(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Sleep in slices so the stop flag is honoured promptly.
    fn wait(&self, duration: Duration) -> Flow {
        let deadline = Instant::now() + duration;
        loop {
            if self.stopped() {
                return Flow::Stop;
            }
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.usage.flush().inspect_err(|e| log::error!("Failed to flush usage counts: {}", e))
    }
}

fn resolve_loop(name: &str, value: &NumberOrRange, engine: &mut SelectionEngine) -> usize {
    value.resolve_count(engine.rng()).unwrap_or_else(|e| {
        log::warn!("Invalid {}: {}", name, e);
        0
    })
}

/// True when any index is at or past the freshly read loop maximum.
fn exceeds_bounds(config: &GlobalConfig, position: [usize; 3]) -> bool {
    [&config.checkpoint_loop, &config.char_loop, &config.queue_loop]
        .into_iter()
        .zip(position)
        .any(|(value, index)| value.upper_bound().is_ok_and(|max| index as i64 >= max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::domain::Strategy;
    use crate::metadata::{Entry, MetadataStore};
    use crate::usage::MemoryUsage;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSubmitter {
        batches: Vec<Batch>,
    }

    impl Submitter for RecordingSubmitter {
        fn submit(&mut self, batch: &Batch) -> Result<()> {
            self.batches.push(batch.clone());
            Ok(())
        }
    }

    fn create_test_config() -> GlobalConfig {
        let mut config = GlobalConfig::default();
        config.checkpoint_types.insert("IL".to_string(), 1.0);
        config.checkpoint_loop = NumberOrRange::Value(2.0);
        config.char_loop = NumberOrRange::Value(1.0);
        config.queue_loop = NumberOrRange::Value(3.0);
        config.sleep = NumberOrRange::Value(0.0);
        config.test = true;
        config.checkpoint_kinds.insert(Strategy::Cycle, 1.0);
        config.char_kinds.insert(Strategy::Random, 1.0);
        config.lora_kinds.insert(Strategy::Random, 1.0);
        config.lora.count = NumberOrRange::Value(2.0);
        config
    }

    fn create_test_snapshot() -> Snapshot {
        let mut catalog = Catalog::new();
        let mut metadata = MetadataStore::new();
        for id in ["a", "b"] {
            catalog.insert_checkpoint("il", id, format!("/c/{}.safetensors", id));
            metadata.insert_entry(Category::Checkpoint, "il", "main", id, Entry::weighted(1.0));
        }
        catalog.insert_lora("il", "char", "alice", "/l/char/alice.safetensors");
        catalog.insert_lora("il", "etc", "glow", "/l/etc/glow.safetensors");
        catalog.insert_lora("il", "etc", "rim", "/l/etc/rim.safetensors");
        metadata.insert_entry(Category::Character, "il", "chars", "alice", Entry::weighted(1.0));
        metadata.insert_entry(Category::Etc, "il", "style", "glow", Entry::weighted(1.0));
        metadata.insert_entry(Category::Etc, "il", "style", "rim", Entry::weighted(1.0));
        Snapshot::new(catalog, metadata)
    }

    fn create_test_driver(config: GlobalConfig, snapshot: Snapshot) -> LoopDriver<MemoryUsage, RecordingSubmitter> {
        LoopDriver::new(
            ConfigSource::fixed(config),
            Arc::new(SnapshotCell::new(snapshot)),
            SelectionEngine::new(Some(7)),
            MemoryUsage::new(),
            RecordingSubmitter::default(),
        )
    }

    #[test]
    fn test_single_batch_nesting() {
        let mut driver = create_test_driver(create_test_config(), create_test_snapshot());
        let summary = driver.run().unwrap();

        assert_eq!(summary.batches, 1);
        assert_eq!(summary.submissions, 6);
        let batches = &driver.submitter().batches;
        assert_eq!(batches[0].position, [0, 0, 0]);
        assert_eq!(batches[5].position, [1, 0, 2]);
        assert_ne!(batches[0].checkpoint, batches[5].checkpoint);
        assert!(batches.iter().all(|b| b.character.as_ref().is_some_and(|p| p.id == "alice")));

        let usage = driver.usage();
        assert_eq!(usage.count(Category::Checkpoint, "a"), 1);
        assert_eq!(usage.count(Category::Checkpoint, "b"), 1);
        assert_eq!(usage.count(Category::Character, "alice"), 2);
        let etc: u64 = ["glow", "rim"].iter().map(|id| usage.count(Category::Etc, id)).sum();
        assert!((6..=12).contains(&etc));
    }

    #[test]
    fn test_stop_flag_prevents_work() {
        let mut driver = create_test_driver(create_test_config(), create_test_snapshot());
        driver.stop_flag().store(true, Ordering::Relaxed);
        let summary = driver.run().unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_noop_category_does_not_stop_others() {
        let mut config = create_test_config();
        config.char_kinds.clear();
        let mut driver = create_test_driver(config, create_test_snapshot());
        let summary = driver.run().unwrap();

        assert_eq!(summary.submissions, 6);
        assert!(driver.submitter().batches.iter().all(|b| b.character.is_none()));
        assert!(driver.submitter().batches.iter().all(|b| b.checkpoint.is_some()));
    }

    #[test]
    fn test_missing_type_skips_batch() {
        let mut config = create_test_config();
        config.checkpoint_types.clear();
        let mut driver = create_test_driver(config, create_test_snapshot());
        let summary = driver.run().unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.submissions, 0);
    }

    #[test]
    fn test_missing_type_backs_off_between_batches() {
        let mut config = create_test_config();
        config.checkpoint_types.clear();
        config.test = false;
        let mut driver = create_test_driver(config, create_test_snapshot());

        let stop = driver.stop_flag();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            stop.store(true, Ordering::Relaxed);
        });
        let summary = driver.run().unwrap();
        stopper.join().unwrap();

        assert!(summary.batches <= 2, "spun {} batches", summary.batches);
        assert_eq!(summary.submissions, 0);
    }

    #[test]
    fn test_reload_event_swaps_snapshot() {
        let temp = TempDir::new().unwrap();
        let ckpt = temp.path().join("ckpt").join("IL");
        fs::create_dir_all(&ckpt).unwrap();
        fs::write(ckpt.join("fresh.safetensors"), b"x").unwrap();

        let mut config = create_test_config();
        config.checkpoint_path = Some(temp.path().join("ckpt"));
        config.checkpoint_loop = NumberOrRange::Value(1.0);
        config.queue_loop = NumberOrRange::Value(1.0);
        config.checkpoint_kinds.clear();
        config.checkpoint_kinds.insert(Strategy::Random, 1.0);

        let (tx, rx) = mpsc::channel();
        tx.send(ReloadEvent::Catalog).unwrap();
        let mut driver = create_test_driver(config, Snapshot::default()).with_reloads(rx, None);
        let summary = driver.run().unwrap();

        assert_eq!(summary.reloads, 1);
        let batch = &driver.submitter().batches[0];
        assert_eq!(batch.checkpoint.as_ref().map(|p| p.id.as_str()), Some("fresh"));
    }

    struct ShrinkingSubmitter {
        config_file: std::path::PathBuf,
        submitted: usize,
    }

    impl Submitter for ShrinkingSubmitter {
        fn submit(&mut self, _batch: &Batch) -> Result<()> {
            self.submitted += 1;
            if self.submitted == 1 {
                fs::write(&self.config_file, "CheckpointTypes: {IL: 1}\nqueueLoop: 1\nsleep: 0\ntest: true\n")?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_shrunken_loop_aborts_batch() {
        let temp = TempDir::new().unwrap();
        let config_file = temp.path().join("genloop.yml");
        fs::write(&config_file, "CheckpointTypes: {IL: 1}\nqueueLoop: 5\nsleep: 0\ntest: true\n").unwrap();

        let source = ConfigSource::load(Some(&config_file)).unwrap();
        let submitter = ShrinkingSubmitter {
            config_file,
            submitted: 0,
        };
        let mut driver = LoopDriver::new(
            source,
            Arc::new(SnapshotCell::new(create_test_snapshot())),
            SelectionEngine::new(Some(3)),
            MemoryUsage::new(),
            submitter,
        );
        let summary = driver.run().unwrap();

        assert_eq!(summary.aborted, 1);
        assert_eq!(driver.submitter().submitted, 1);
    }

    #[test]
    fn test_exceeds_bounds() {
        let config = create_test_config();
        assert!(!exceeds_bounds(&config, [1, 0, 2]));
        assert!(exceeds_bounds(&config, [2, 0, 0]));
        assert!(exceeds_bounds(&config, [0, 1, 0]));
        assert!(exceeds_bounds(&config, [0, 0, 3]));
    }
}
