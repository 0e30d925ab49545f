//! Configuration system for Genloop.
//!
//! - `GlobalConfig`: typed view of the YAML config file
//! - `NumberOrRange`: literal-or-range values resolved per read
//! - `ConfigSource`: live re-read with last-good fallback

pub use self::global::{CategoryParams, GlobalConfig};
pub use self::range::NumberOrRange;
pub use self::source::ConfigSource;

mod global;
mod range;
mod source;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. ./genloop.yml in current directory
/// 3. ~/.config/genloop/genloop.yml
/// 4. Default values
pub fn load_config(explicit_path: Option<&std::path::PathBuf>) -> eyre::Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
