//! Global configuration.
//!
//! Loaded from an explicit path, ./genloop.yml or ~/.config/genloop/genloop.yml.
//! Key names keep the casing of the generation-pipeline config they describe.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::range::NumberOrRange;
use crate::domain::{Category, Strategy};

/// Global configuration for Genloop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Root folder of checkpoint files, one sub-folder per type.
    #[serde(rename = "CheckpointPath")]
    pub checkpoint_path: Option<PathBuf>,

    /// Root folder of lora files, `<type>/<bucket>/` below it.
    #[serde(rename = "LoraPath")]
    pub lora_path: Option<PathBuf>,

    /// Lora sub-folder holding character loras.
    #[serde(rename = "LoraCharPath")]
    pub lora_char_path: String,

    /// Lora sub-folder holding etc loras.
    #[serde(rename = "LoraEtcPath")]
    pub lora_etc_path: String,

    /// Metadata root, one sub-folder per type.
    #[serde(rename = "dataPath")]
    pub data_path: Option<PathBuf>,

    /// Asset file extensions, without the dot.
    pub extension: Vec<String>,

    /// Types and their relative draw weight.
    #[serde(rename = "CheckpointTypes")]
    pub checkpoint_types: BTreeMap<String, f64>,

    #[serde(rename = "CheckpointLoop")]
    pub checkpoint_loop: NumberOrRange,

    #[serde(rename = "CharLoop")]
    pub char_loop: NumberOrRange,

    #[serde(rename = "queueLoop")]
    pub queue_loop: NumberOrRange,

    /// Seconds to wait after each submission.
    pub sleep: NumberOrRange,

    /// Stop after one outer batch.
    pub test: bool,

    /// Directory of the usage counter files.
    #[serde(rename = "usagePath")]
    pub usage_path: Option<PathBuf>,

    /// Poll interval of the file watcher.
    #[serde(rename = "watchIntervalMs")]
    pub watch_interval_ms: u64,

    /// Seed for the shared random source.
    pub seed: Option<u64>,

    #[serde(rename = "GetCheckpointKind")]
    pub checkpoint_kinds: BTreeMap<Strategy, f64>,

    #[serde(rename = "GetCharKind")]
    pub char_kinds: BTreeMap<Strategy, f64>,

    #[serde(rename = "GetLoraKind")]
    pub lora_kinds: BTreeMap<Strategy, f64>,

    #[serde(default = "CategoryParams::checkpoint")]
    pub checkpoint: CategoryParams,

    #[serde(rename = "char", default = "CategoryParams::character")]
    pub character: CategoryParams,

    #[serde(default = "CategoryParams::lora")]
    pub lora: CategoryParams,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            lora_path: None,
            lora_char_path: "char".to_string(),
            lora_etc_path: "etc".to_string(),
            data_path: None,
            extension: vec!["safetensors".to_string()],
            checkpoint_types: BTreeMap::new(),
            checkpoint_loop: NumberOrRange::Value(6.0),
            char_loop: NumberOrRange::Value(3.0),
            queue_loop: NumberOrRange::Value(3.0),
            sleep: NumberOrRange::Value(1.0),
            test: false,
            usage_path: None,
            watch_interval_ms: 2_000,
            seed: None,
            checkpoint_kinds: BTreeMap::new(),
            char_kinds: BTreeMap::new(),
            lora_kinds: BTreeMap::new(),
            checkpoint: CategoryParams::checkpoint(),
            character: CategoryParams::character(),
            lora: CategoryParams::lora(),
        }
    }
}

impl GlobalConfig {
    /// Find the config file to use.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./genloop.yml
    /// 3. ~/.config/genloop/genloop.yml
    pub fn locate(config_path: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.clone());
        }

        let project_name = env!("CARGO_PKG_NAME");
        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            return Some(project_config);
        }

        dirs::config_dir()
            .map(|dir| dir.join(project_name).join(format!("{}.yml", project_name)))
            .filter(|path| path.exists())
    }

    /// Load configuration with fallback chain, falling back to defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        match Self::locate(config_path) {
            Some(path) => Self::load_from_file(&path).context(format!("Failed to load config from {}", path.display())),
            None => {
                log::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse, resolve relative paths against the file's directory and validate.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;

        log::debug!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Make relative paths absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.checkpoint_path,
            &mut self.lora_path,
            &mut self.data_path,
            &mut self.usage_path,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_types.values().any(|w| !w.is_finite() || *w < 0.0) {
            eyre::bail!("CheckpointTypes weights must be >= 0");
        }
        for category in Category::ALL {
            if self.kinds(category).values().any(|w| !w.is_finite() || *w < 0.0) {
                eyre::bail!("strategy weights for {} must be >= 0", category);
            }
            self.params(category)
                .validate()
                .context(format!("invalid parameters for {}", category))?;
        }
        for (name, value) in [
            ("CheckpointLoop", &self.checkpoint_loop),
            ("CharLoop", &self.char_loop),
            ("queueLoop", &self.queue_loop),
            ("sleep", &self.sleep),
        ] {
            value.validate().context(format!("invalid {}", name))?;
        }
        Ok(())
    }

    /// Strategy probabilities for a category.
    pub fn kinds(&self, category: Category) -> &BTreeMap<Strategy, f64> {
        match category {
            Category::Checkpoint => &self.checkpoint_kinds,
            Category::Character => &self.char_kinds,
            Category::Etc => &self.lora_kinds,
        }
    }

    /// Strategy parameters for a category.
    pub fn params(&self, category: Category) -> &CategoryParams {
        match category {
            Category::Checkpoint => &self.checkpoint,
            Category::Character => &self.character,
            Category::Etc => &self.lora,
        }
    }

    /// Directory holding usage counters, defaulting to the local data dir.
    pub fn usage_dir(&self) -> PathBuf {
        self.usage_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("usage")
        })
    }

    /// Lower-cased name of the lora sub-bucket a category draws from.
    pub fn lora_bucket(&self, category: Category) -> Option<String> {
        match category {
            Category::Checkpoint => None,
            Category::Character => Some(self.lora_char_path.to_lowercase()),
            Category::Etc => Some(self.lora_etc_path.to_lowercase()),
        }
    }
}

/// Per-category strategy parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CategoryParams {
    /// Weight used when a metadata entry has no usable `weight`.
    #[serde(rename = "weightDefault")]
    pub weight_default: f64,

    /// `db` mode: starting weight before subtracting usage.
    #[serde(rename = "dbBase")]
    pub db_base: f64,

    /// `db` mode: lower clamp.
    #[serde(rename = "dbMin")]
    pub db_min: f64,

    /// `db` mode: upper clamp.
    #[serde(rename = "dbMax")]
    pub db_max: f64,

    /// Number of picks for multi-pick categories.
    pub count: NumberOrRange,

    /// Logical name of the WeightYml group document.
    #[serde(rename = "weightYml")]
    pub weight_yml: String,
}

impl Default for CategoryParams {
    fn default() -> Self {
        Self {
            weight_default: 100.0,
            db_base: 100.0,
            db_min: 1.0,
            db_max: 100.0,
            count: NumberOrRange::Value(1.0),
            weight_yml: "WeightYml".to_string(),
        }
    }
}

impl CategoryParams {
    pub fn checkpoint() -> Self {
        Self {
            weight_default: 150.0,
            ..Default::default()
        }
    }

    pub fn character() -> Self {
        Self::default()
    }

    pub fn lora() -> Self {
        Self {
            count: NumberOrRange::range(3.0, 6.0),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.weight_default.is_finite() || self.weight_default < 0.0 {
            eyre::bail!("weightDefault must be >= 0");
        }
        if self.db_min > self.db_max {
            eyre::bail!("dbMin ({}) must be <= dbMax ({})", self.db_min, self.db_max);
        }
        self.count.validate().map_err(|e| eyre::eyre!("count: {}", e))?;
        Ok(())
    }
}
