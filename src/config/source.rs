//! Live configuration source.
//!
//! The driver re-reads the config file every inner iteration so edits take
//! effect without a restart. A file that fails to parse keeps the last good
//! configuration in place.

use std::path::{Path, PathBuf};

use eyre::Result;

use super::GlobalConfig;

/// Holds the current configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    path: Option<PathBuf>,
    current: GlobalConfig,
    force_test: bool,
}

impl ConfigSource {
    /// Locate and load the configuration.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = GlobalConfig::locate(config_path);
        let current = GlobalConfig::load(path.as_ref())?;
        Ok(Self {
            path,
            current,
            force_test: false,
        })
    }

    /// A source that never changes.
    pub fn fixed(config: GlobalConfig) -> Self {
        Self {
            path: None,
            current: config,
            force_test: false,
        }
    }

    /// Keep `test` on across re-reads, for `run --test`.
    pub fn force_test(mut self) -> Self {
        self.force_test = true;
        self.current.test = true;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> &GlobalConfig {
        &self.current
    }

    /// Re-read the file. Failures are logged and the previous config is kept.
    pub fn refresh(&mut self) -> &GlobalConfig {
        if let Some(path) = &self.path {
            match GlobalConfig::load_from_file(path) {
                Ok(config) => {
                    self.current = config;
                    self.current.test |= self.force_test;
                }
                Err(e) => log::warn!("Keeping previous config, reload of {} failed: {:#}", path.display(), e),
            }
        }
        &self.current
    }
}
