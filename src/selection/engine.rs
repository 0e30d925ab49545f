//! Per-category strategy dispatch.
//!
//! `SelectionEngine` owns the long-lived selection state (the shared random
//! source, cycle pools and the current selection of each category). It
//! reads everything else through a `SelectContext` built by the caller for
//! each call, so a reloaded snapshot or config takes effect on the next call.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::candidates;
use super::cycle::CyclePool;
use super::sampling;
use super::weightyml::{GroupDocument, WeightYmlResolver};
use crate::config::{CategoryParams, GlobalConfig};
use crate::domain::{Category, Selection, Strategy};
use crate::error::{GenloopError, Result};
use crate::snapshot::Snapshot;
use crate::usage::UsageCounter;

/// Read-only inputs of one selection call.
pub struct SelectContext<'a> {
    pub snapshot: &'a Snapshot,
    pub config: &'a GlobalConfig,
    pub usage: &'a dyn UsageCounter,
    /// Active type, lower-cased
    pub type_key: Option<&'a str>,
}

pub struct SelectionEngine {
    rng: StdRng,
    cycles: CyclePool,
    current: HashMap<Category, Selection>,
}

impl SelectionEngine {
    /// Create an engine, seeded for reproducible runs or from the OS otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            cycles: CyclePool::new(),
            current: HashMap::new(),
        }
    }

    /// The shared random source, also used for loop counts and type picks.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// The latest successful selection for a category.
    pub fn current(&self, category: Category) -> Option<&Selection> {
        self.current.get(&category)
    }

    /// Draw the active type from `CheckpointTypes`, lower-cased.
    pub fn pick_type(&mut self, types: &BTreeMap<String, f64>) -> Result<String> {
        sampling::weighted_choice(&mut self.rng, types)
            .map(|t| t.to_lowercase())
            .ok_or(GenloopError::MissingType)
    }

    /// Select for one category.
    ///
    /// On success the result replaces the category's current selection. On
    /// error the previous selection is left untouched; `is_noop()` errors are
    /// expected configuration gaps.
    pub fn select(&mut self, category: Category, ctx: &SelectContext<'_>) -> Result<&Selection> {
        let selection = self.draw(category, ctx)?;
        log::debug!(
            "{} via {:?}: {:?}",
            category,
            selection.strategy,
            selection.ids().collect::<Vec<_>>()
        );
        self.current.insert(category, selection);
        Ok(&self.current[&category])
    }

    /// Count the current selection of a category once per picked id.
    pub fn commit<U>(&self, category: Category, usage: &mut U) -> usize
    where
        U: UsageCounter + ?Sized,
    {
        let Some(selection) = self.current.get(&category) else {
            return 0;
        };
        for id in selection.ids() {
            usage.increment(category, id);
        }
        selection.picks.len()
    }

    fn draw(&mut self, category: Category, ctx: &SelectContext<'_>) -> Result<Selection> {
        let strategy =
            draw_strategy(&mut self.rng, ctx.config.kinds(category)).ok_or(GenloopError::MissingStrategies(category))?;
        if !strategy.supports(category) {
            return Err(GenloopError::UnsupportedStrategy { category, strategy });
        }
        if strategy.is_empty_pick() {
            return Ok(Selection::empty(strategy));
        }

        let type_key = ctx.type_key.ok_or(GenloopError::MissingType)?;
        let catalog_fallback = matches!(strategy, Strategy::Random | Strategy::Cycle);
        let eligible = candidates::resolve(ctx.snapshot, ctx.config, category, type_key, catalog_fallback);
        if eligible.is_empty() {
            return Err(GenloopError::NoCandidates {
                category,
                type_key: type_key.to_string(),
            });
        }

        let params = ctx.config.params(category);
        let ids = match strategy {
            Strategy::Weight => {
                let count = pick_count(&mut self.rng, category, params)?;
                let live: HashSet<&str> = eligible.iter().map(String::as_str).collect();
                let weights =
                    ctx.snapshot
                        .metadata
                        .summed_weights(category, type_key, params.weight_default, |id| live.contains(id));
                weighted_or_uniform(&mut self.rng, &weights, &eligible, count)
            }
            Strategy::Random => {
                let count = pick_count(&mut self.rng, category, params)?;
                sampling::uniform_draws(&mut self.rng, &eligible, count)
            }
            Strategy::Db => {
                let count = pick_count(&mut self.rng, category, params)?;
                let weights = usage_weights(ctx.usage, category, params, &eligible);
                weighted_or_uniform(&mut self.rng, &weights, &eligible, count)
            }
            Strategy::Cycle => {
                let count = pick_count(&mut self.rng, category, params)?;
                self.cycles.pop(&mut self.rng, category, type_key, &eligible, count)
            }
            Strategy::WeightYml => {
                let document = ctx
                    .snapshot
                    .metadata
                    .named(type_key, &params.weight_yml)
                    .ok_or_else(|| GenloopError::MissingDocument(format!("{}/{}", type_key, params.weight_yml)))?;
                let document = GroupDocument::from_value(document)?;
                WeightYmlResolver::new(&ctx.snapshot.metadata, type_key, params.weight_default)
                    .resolve(&document, &mut self.rng)?
            }
            Strategy::Wildcard | Strategy::Skip => Vec::new(),
        };

        Ok(Selection::resolve(strategy, ids, |id| {
            candidates::path_of(ctx.snapshot, ctx.config, category, type_key, id)
        }))
    }
}

fn draw_strategy(rng: &mut StdRng, kinds: &BTreeMap<Strategy, f64>) -> Option<Strategy> {
    let strategies: Vec<Strategy> = kinds.keys().copied().collect();
    let weights: Vec<f64> = kinds.values().copied().collect();
    sampling::weighted_index(rng, &weights).map(|i| strategies[i])
}

/// Checkpoint and character always pick one; etc resolves its configured count.
fn pick_count(rng: &mut StdRng, category: Category, params: &CategoryParams) -> Result<usize> {
    if category.is_multi_pick() {
        params.count.resolve_count(rng)
    } else {
        Ok(1)
    }
}

/// `clamp(base - usage, min, max)` per candidate.
fn usage_weights(usage: &dyn UsageCounter, category: Category, params: &CategoryParams, candidates: &[String]) -> BTreeMap<String, f64> {
    candidates
        .iter()
        .map(|id| {
            let effective = (params.db_base - usage.count(category, id) as f64)
                .max(params.db_min)
                .min(params.db_max);
            (id.clone(), effective)
        })
        .collect()
}

/// Weighted draw, or a uniform one when every weight is zero.
fn weighted_or_uniform(rng: &mut StdRng, weights: &BTreeMap<String, f64>, candidates: &[String], count: usize) -> Vec<String> {
    let drawn = sampling::weighted_draws(rng, weights, count);
    if drawn.is_empty() && count > 0 {
        log::debug!("All weights are zero, drawing uniformly from {} candidates", candidates.len());
        return sampling::uniform_draws(rng, candidates, count);
    }
    drawn
}
