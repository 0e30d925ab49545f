//! Random draws over identifiers.
//!
//! Every draw takes the caller's random source so a seeded engine is
//! reproducible end to end. Weights that are negative or not finite count
//! as zero.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 { weight } else { 0.0 }
}

/// Index drawn proportionally to `weights`, or None when nothing has weight.
pub fn weighted_index<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let clean: Vec<f64> = weights.iter().copied().map(sanitize).collect();
    let dist = WeightedIndex::new(&clean).ok()?;
    Some(dist.sample(rng))
}

/// `k` keys drawn with replacement, proportional to weight.
///
/// Empty when the map is empty or every weight is zero.
pub fn weighted_draws<R: Rng + ?Sized>(rng: &mut R, weights: &BTreeMap<String, f64>, k: usize) -> Vec<String> {
    let keys: Vec<&String> = weights.keys().collect();
    let clean: Vec<f64> = weights.values().copied().map(sanitize).collect();
    let Ok(dist) = WeightedIndex::new(&clean) else {
        return Vec::new();
    };
    (0..k).map(|_| keys[dist.sample(rng)].clone()).collect()
}

/// A single key drawn proportionally to weight.
pub fn weighted_choice<R: Rng + ?Sized>(rng: &mut R, weights: &BTreeMap<String, f64>) -> Option<String> {
    weighted_draws(rng, weights, 1).pop()
}

/// `k` items drawn with replacement, uniformly.
pub fn uniform_draws<R: Rng + ?Sized>(rng: &mut R, items: &[String], k: usize) -> Vec<String> {
    if items.is_empty() {
        return Vec::new();
    }
    (0..k).map(|_| items[rng.random_range(0..items.len())].clone()).collect()
}

/// Exactly `min(k, len)` items without replacement, uniformly.
pub fn uniform_sample<R, T>(rng: &mut R, items: Vec<T>, k: usize) -> Vec<T>
where
    R: Rng + ?Sized,
{
    if k >= items.len() {
        return items;
    }
    let mut picked: Vec<usize> = rand::seq::index::sample(rng, items.len(), k).into_vec();
    picked.sort_unstable();
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| slots[i].take()).collect()
}
