//! Genloop - weighted asset selection for batch image generation
//!
//! Each iteration of a nested loop picks one checkpoint, zero or one
//! character lora and any number of etc loras, using a per-category strategy
//! drawn at random from configured probabilities. Usage counts persist across
//! runs and feed back into the `db` strategy.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod metadata;
pub mod selection;
pub mod snapshot;
pub mod usage;
pub mod watcher;

pub use error::{GenloopError, Result};
