//! Executor selection strategies.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::models::{Executor, SelectStrategy};

/// Per-job counters for the round-robin strategies. Each job owns its own
/// pair; counters are never shared across jobs.
#[derive(Debug, Default)]
pub struct JobBalancers {
    round: AtomicU64,
    weight_round: AtomicU64,
}

impl JobBalancers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index into `candidates` picked by `strategy`; `None` for an empty set
    /// or for [`SelectStrategy::Sharding`], which fans out instead.
    pub fn select(&self, strategy: SelectStrategy, candidates: &[&Executor]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match strategy {
            SelectStrategy::Random => Some(random_index(candidates.len())),
            SelectStrategy::Round => {
                let round = self.round.fetch_add(1, Ordering::SeqCst) + 1;
                Some((round % candidates.len() as u64) as usize)
            }
            SelectStrategy::WeightRandom => {
                let pool = weighted_pool(candidates);
                if pool.is_empty() {
                    return Some(random_index(candidates.len()));
                }
                Some(pool[random_index(pool.len())])
            }
            SelectStrategy::WeightRound => {
                let pool = weighted_pool(candidates);
                if pool.is_empty() {
                    return Some(random_index(candidates.len()));
                }
                let round = self.weight_round.fetch_add(1, Ordering::SeqCst) + 1;
                Some(pool[(round % pool.len() as u64) as usize])
            }
            SelectStrategy::Sharding => None,
        }
    }
}

/// Uniform pick among `candidates` whose address is not in `excluded`.
pub fn random_excluding(candidates: &[&Executor], excluded: &[String]) -> Option<usize> {
    let remaining: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, e)| !excluded.contains(&e.address))
        .map(|(i, _)| i)
        .collect();
    if remaining.is_empty() {
        return None;
    }
    Some(remaining[random_index(remaining.len())])
}

fn random_index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}

/// Each candidate index repeated `weight` times.
fn weighted_pool(candidates: &[&Executor]) -> Vec<usize> {
    candidates
        .iter()
        .enumerate()
        .flat_map(|(i, e)| std::iter::repeat_n(i, e.weight as usize))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutorStatus;
    use proptest::prelude::*;

    fn executors(weights: &[u32]) -> Vec<Executor> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| Executor {
                address: format!("10.0.0.{}:9000", i + 1),
                weight: *w,
                status: ExecutorStatus::Online,
            })
            .collect()
    }

    fn counts(strategy: SelectStrategy, weights: &[u32], draws: usize) -> Vec<usize> {
        let owned = executors(weights);
        let candidates: Vec<&Executor> = owned.iter().collect();
        let balancers = JobBalancers::new();
        let mut counts = vec![0; weights.len()];
        for _ in 0..draws {
            counts[balancers.select(strategy, &candidates).unwrap()] += 1;
        }
        counts
    }

    #[test]
    fn test_round_visits_each_once_per_cycle() {
        let owned = executors(&[1, 1, 1, 1]);
        let candidates: Vec<&Executor> = owned.iter().collect();
        let balancers = JobBalancers::new();
        for _ in 0..5 {
            let mut cycle: Vec<usize> = (0..4)
                .map(|_| balancers.select(SelectStrategy::Round, &candidates).unwrap())
                .collect();
            cycle.sort();
            assert_eq!(cycle, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_weight_round_matches_weights_exactly_per_cycle() {
        assert_eq!(counts(SelectStrategy::WeightRound, &[1, 2, 3], 600), vec![100, 200, 300]);
    }

    #[test]
    fn test_weight_random_converges_to_weights() {
        let counts = counts(SelectStrategy::WeightRandom, &[1, 2, 3], 60_000);
        let expected = [10_000.0, 20_000.0, 30_000.0];
        for (count, expected) in counts.iter().zip(expected) {
            assert!((*count as f64 - expected).abs() / expected < 0.05, "{:?}", counts);
        }
    }

    #[test]
    fn test_zero_weights_fall_back_to_uniform() {
        let counts = counts(SelectStrategy::WeightRandom, &[0, 0], 100);
        assert_eq!(counts.iter().sum::<usize>(), 100);
    }

    #[test]
    fn test_counters_are_per_job() {
        let owned = executors(&[1, 1]);
        let candidates: Vec<&Executor> = owned.iter().collect();
        let a = JobBalancers::new();
        let b = JobBalancers::new();
        assert_eq!(a.select(SelectStrategy::Round, &candidates), Some(1));
        assert_eq!(a.select(SelectStrategy::Round, &candidates), Some(0));
        assert_eq!(b.select(SelectStrategy::Round, &candidates), Some(1));
    }

    #[test]
    fn test_empty_and_sharding_select_nothing() {
        let balancers = JobBalancers::new();
        assert_eq!(balancers.select(SelectStrategy::Random, &[]), None);
        let owned = executors(&[1]);
        let candidates: Vec<&Executor> = owned.iter().collect();
        assert_eq!(balancers.select(SelectStrategy::Sharding, &candidates), None);
    }

    #[test]
    fn test_random_excluding_skips_failed() {
        let owned = executors(&[1, 1, 1]);
        let candidates: Vec<&Executor> = owned.iter().collect();
        let excluded = vec![owned[0].address.clone(), owned[2].address.clone()];
        for _ in 0..20 {
            assert_eq!(random_excluding(&candidates, &excluded), Some(1));
        }
        let all: Vec<String> = owned.iter().map(|e| e.address.clone()).collect();
        assert_eq!(random_excluding(&candidates, &all), None);
    }

    proptest! {
        #[test]
        fn prop_selection_in_bounds(weights in proptest::collection::vec(0u32..5, 1..8), draws in 1usize..50) {
            let owned = executors(&weights);
            let candidates: Vec<&Executor> = owned.iter().collect();
            let balancers = JobBalancers::new();
            for strategy in [SelectStrategy::Random, SelectStrategy::Round, SelectStrategy::WeightRandom, SelectStrategy::WeightRound] {
                for _ in 0..draws {
                    let index = balancers.select(strategy, &candidates).unwrap();
                    prop_assert!(index < candidates.len());
                    if strategy == SelectStrategy::WeightRandom || strategy == SelectStrategy::WeightRound {
                        if weights.iter().any(|w| *w > 0) {
                            prop_assert!(weights[index] > 0);
                        }
                    }
                }
            }
        }
    }
}
