//! Selection engine: strategy dispatch, sampling, cycle pools and the
//! WeightYml group resolver.

pub mod candidates;
mod cycle;
mod engine;
pub mod sampling;
mod weightyml;

pub use cycle::CyclePool;
pub use engine::{SelectContext, SelectionEngine};
pub use weightyml::{GroupDocument, Series, WeightGroup, WeightYmlResolver};
