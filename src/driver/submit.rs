//! Submission seam.
//!
//! The downstream generation service is not part of this crate; a
//! `Submitter` receives each finished batch.

use serde::Serialize;

use crate::domain::{Category, Pick};
use crate::error::Result;
use crate::selection::SelectionEngine;

/// One unit of work handed to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub type_key: String,
    /// Checkpoint, character and lora loop indices
    pub position: [usize; 3],
    pub checkpoint: Option<Pick>,
    pub character: Option<Pick>,
    pub loras: Vec<Pick>,
}

impl Batch {
    /// Snapshot the engine's current selections.
    pub fn from_engine(engine: &SelectionEngine, type_key: &str, position: [usize; 3]) -> Self {
        let first = |category| engine.current(category).and_then(|s| s.picks.first().cloned());
        Self {
            type_key: type_key.to_string(),
            position,
            checkpoint: first(Category::Checkpoint),
            character: first(Category::Character),
            loras: engine
                .current(Category::Etc)
                .map(|s| s.picks.clone())
                .unwrap_or_default(),
        }
    }
}

pub trait Submitter {
    fn submit(&mut self, batch: &Batch) -> Result<()>;
}

/// Writes each batch to the log as JSON.
#[derive(Debug, Default)]
pub struct LogSubmitter;

impl Submitter for LogSubmitter {
    fn submit(&mut self, batch: &Batch) -> Result<()> {
        log::info!("Submit {}", serde_json::to_string(batch)?);
        Ok(())
    }
}
