//! Polling file watcher.
//!
//! Runs on its own thread, fingerprints the asset roots, the metadata root
//! and the config file every interval, and posts a `ReloadEvent` for each
//! target that changed. It never touches the snapshot itself; the driver
//! drains the channel between iterations and swaps in a rebuilt snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::config::GlobalConfig;

/// Granularity of the stop check while sleeping between polls.
const STOP_POLL: Duration = Duration::from_millis(50);

/// What needs reloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadEvent {
    /// Checkpoint or lora files were added, removed or touched
    Catalog,
    /// Metadata YAML changed
    Metadata,
    /// The config file changed
    Config,
}

/// Paths the watcher fingerprints.
#[derive(Debug, Clone, Default)]
pub struct WatchTargets {
    pub catalog: Vec<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl WatchTargets {
    pub fn from_config(config: &GlobalConfig, config_file: Option<&Path>) -> Self {
        Self {
            catalog: config
                .checkpoint_path
                .iter()
                .chain(config.lora_path.iter())
                .cloned()
                .collect(),
            metadata: config.data_path.clone(),
            config: config_file.map(Path::to_path_buf),
        }
    }
}

/// Hex SHA-256 over path, size and mtime of every file under `root`.
///
/// A missing root hashes like an empty one. A file root hashes just that file.
pub fn fingerprint(root: &Path) -> String {
    let mut files: Vec<PathBuf> = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
        glob::glob(&pattern)
            .map(|paths| paths.filter_map(|r| r.ok()).filter(|p| p.is_file()).collect())
            .unwrap_or_default()
    };
    files.sort();

    let mut hasher = Sha256::new();
    for path in &files {
        hasher.update(path.to_string_lossy().as_bytes());
        if let Ok(meta) = path.metadata() {
            hasher.update(meta.len().to_le_bytes());
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(mtime.to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Last seen fingerprint of each target.
#[derive(Debug, Default)]
struct Fingerprints {
    catalog: String,
    metadata: String,
    config: String,
}

impl Fingerprints {
    fn take(targets: &WatchTargets) -> Self {
        let catalog = targets
            .catalog
            .iter()
            .map(|root| fingerprint(root))
            .collect::<Vec<_>>()
            .join(":");
        Self {
            catalog,
            metadata: targets.metadata.as_deref().map(fingerprint).unwrap_or_default(),
            config: targets.config.as_deref().map(fingerprint).unwrap_or_default(),
        }
    }

    /// Events for every target whose fingerprint moved since the last call.
    fn changes(&mut self, targets: &WatchTargets) -> Vec<ReloadEvent> {
        let next = Self::take(targets);
        let mut events = Vec::new();
        if next.catalog != self.catalog {
            events.push(ReloadEvent::Catalog);
        }
        if next.metadata != self.metadata {
            events.push(ReloadEvent::Metadata);
        }
        if next.config != self.config {
            events.push(ReloadEvent::Config);
        }
        *self = next;
        events
    }
}

/// Background polling watcher.
pub struct PollWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollWatcher {
    /// Start polling. The first fingerprint is taken before this returns, so
    /// only later changes produce events.
    pub fn start(targets: WatchTargets, interval: Duration, tx: Sender<ReloadEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let mut seen = Fingerprints::take(&targets);
        log::debug!("Watcher baseline catalog={} metadata={}", short(&seen.catalog), short(&seen.metadata));

        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            log::info!("Watcher started, polling every {:?}", interval);
            'poll: while !flag.load(Ordering::Relaxed) {
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if flag.load(Ordering::Relaxed) {
                        break 'poll;
                    }
                    let step = STOP_POLL.min(interval - waited);
                    thread::sleep(step);
                    waited += step;
                }

                for event in seen.changes(&targets) {
                    log::info!("Change detected: {:?}", event);
                    if tx.send(event).is_err() {
                        log::debug!("Reload channel closed, watcher exiting");
                        break 'poll;
                    }
                }
            }
            log::info!("Watcher stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Watcher thread panicked");
            }
        }
    }
}

impl Drop for PollWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
