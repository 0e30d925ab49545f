//! Anti-repetition pools.
//!
//! Each (category, type) keeps a queue of identifiers not yet used in the
//! current cycle. An empty queue is refilled with a fresh shuffle of the
//! candidates passed to that call. Candidates added mid-cycle wait for the
//! next refill; candidates removed mid-cycle are skipped when popped.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::domain::Category;

#[derive(Debug, Default)]
pub struct CyclePool {
    pools: HashMap<(Category, String), VecDeque<String>>,
}

impl CyclePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop `k` identifiers, refilling as often as needed.
    ///
    /// Returns fewer than `k` only when `candidates` is empty.
    pub fn pop<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        category: Category,
        type_key: &str,
        candidates: &[String],
        k: usize,
    ) -> Vec<String> {
        if candidates.is_empty() || k == 0 {
            return Vec::new();
        }
        let live: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        let pool = self.pools.entry((category, type_key.to_lowercase())).or_default();

        let mut popped = Vec::with_capacity(k);
        while popped.len() < k {
            match pool.pop_front() {
                Some(id) if live.contains(id.as_str()) => popped.push(id),
                Some(stale) => log::debug!("Cycle pool for {}/{} skipping removed '{}'", category, type_key, stale),
                None => {
                    let mut refill = candidates.to_vec();
                    refill.shuffle(rng);
                    log::debug!("Refilled cycle pool for {}/{} with {} ids", category, type_key, refill.len());
                    pool.extend(refill);
                }
            }
        }
        popped
    }

    /// Identifiers left in the current cycle.
    pub fn remaining(&self, category: Category, type_key: &str) -> usize {
        self.pools
            .get(&(category, type_key.to_lowercase()))
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_each_candidate_once_per_cycle() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pool = CyclePool::new();
        let candidates = ids(&["x", "y", "z"]);

        for _ in 0..5 {
            let mut cycle: Vec<String> = (0..3)
                .flat_map(|_| pool.pop(&mut rng, Category::Checkpoint, "il", &candidates, 1))
                .collect();
            cycle.sort();
            assert_eq!(cycle, candidates);
        }
    }

    #[test]
    fn test_pop_more_than_pool_refills() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut pool = CyclePool::new();
        let candidates = ids(&["a", "b"]);

        let first = pool.pop(&mut rng, Category::Etc, "il", &candidates, 1);
        let rest = pool.pop(&mut rng, Category::Etc, "il", &candidates, 5);
        assert_eq!(first.len(), 1);
        assert_eq!(rest.len(), 5);
        // The leftover from the first cycle comes out before the refill.
        assert_ne!(first[0], rest[0]);
    }

    #[test]
    fn test_empty_candidates_return_nothing() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut pool = CyclePool::new();
        assert!(pool.pop(&mut rng, Category::Character, "il", &[], 3).is_empty());
    }

    #[test]
    fn test_removed_candidate_is_never_returned() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut pool = CyclePool::new();
        pool.pop(&mut rng, Category::Checkpoint, "il", &ids(&["a", "b", "c", "d"]), 1);
        assert_eq!(pool.remaining(Category::Checkpoint, "il"), 3);

        let shrunk = ids(&["a"]);
        for _ in 0..10 {
            let got = pool.pop(&mut rng, Category::Checkpoint, "il", &shrunk, 1);
            assert_eq!(got, shrunk);
        }
    }

    #[test]
    fn test_pools_are_scoped_per_type() {
        let mut rng = StdRng::seed_from_u64(15);
        let mut pool = CyclePool::new();
        pool.pop(&mut rng, Category::Checkpoint, "IL", &ids(&["a", "b"]), 1);
        assert_eq!(pool.remaining(Category::Checkpoint, "il"), 1);
        assert_eq!(pool.remaining(Category::Checkpoint, "pony"), 0);
    }
}
