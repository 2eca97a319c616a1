//! Selection strategies for distributing lookups across live service instances

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy for choosing one instance among the live set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Uniform random choice over the live set
    Random,
    /// Round-robin: cycle through instances in order
    RoundRobin,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::Random
    }
}

/// Selector applying a configured strategy to a slice of candidates
pub struct Selector {
    strategy: SelectionStrategy,
    round_robin_counter: AtomicUsize,
}

impl Selector {
    /// Create a new selector with the specified strategy
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    /// Select one candidate, or None if the slice is empty
    pub fn select<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }

        match self.strategy {
            SelectionStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..candidates.len());
                candidates.get(idx)
            }
            SelectionStrategy::RoundRobin => {
                let current = self.round_robin_counter.fetch_add(1, Ordering::SeqCst);
                candidates.get(current % candidates.len())
            }
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(SelectionStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_from_empty_returns_none() {
        let selector = Selector::new(SelectionStrategy::Random);
        let empty: Vec<u16> = vec![];
        assert!(selector.select(&empty).is_none());
    }

    #[test]
    fn test_random_select_stays_within_candidates() {
        let selector = Selector::new(SelectionStrategy::Random);
        let candidates = vec![3001u16, 3002, 3003];
        for _ in 0..50 {
            let chosen = selector.select(&candidates).unwrap();
            assert!(candidates.contains(chosen));
        }
    }

    #[test]
    fn test_random_select_single_candidate() {
        let selector = Selector::new(SelectionStrategy::Random);
        let candidates = vec!["only"];
        assert_eq!(selector.select(&candidates), Some(&"only"));
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let selector = Selector::new(SelectionStrategy::RoundRobin);
        let candidates = vec![1, 2, 3];
        assert_eq!(selector.select(&candidates), Some(&1));
        assert_eq!(selector.select(&candidates), Some(&2));
        assert_eq!(selector.select(&candidates), Some(&3));
        assert_eq!(selector.select(&candidates), Some(&1));
    }
}
