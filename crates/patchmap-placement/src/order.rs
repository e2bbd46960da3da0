//! Deterministic orderings shared by all strategies.
//!
//! Every comparator here is a strict weak ordering whose ties fall back to
//! the original index, so that every process sorts identically.

use std::cmp::Reverse;

use patchmap_core::Rank;

/// Item indices sorted heaviest first; equal weights keep index order.
pub fn descending_by_weight(weights: &[u64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by_key(|&i| (Reverse(weights[i]), i));
    order
}

/// Natural rank order `0..workers`, used when no load metrics exist.
pub fn identity_order(workers: usize) -> Vec<Rank> {
    (0..workers).collect()
}

/// Pair groups with workers: the heaviest group goes to `worker_order[0]`
/// (the least-loaded worker), the next heaviest to `worker_order[1]`, and
/// so on. Returns the worker for each group.
///
/// `group_weights.len()` must equal `worker_order.len()`.
pub fn pair_by_load(group_weights: &[u64], worker_order: &[Rank]) -> Vec<Rank> {
    debug_assert_eq!(group_weights.len(), worker_order.len());
    let ranked = descending_by_weight(group_weights);
    let mut owner = vec![0; group_weights.len()];
    for (slot, &group) in ranked.iter().enumerate() {
        owner[group] = worker_order[slot];
    }
    owner
}

/// Sum of item weights per group.
pub fn group_volumes(groups: &[Vec<usize>], weights: &[u64]) -> Vec<u64> {
    groups
        .iter()
        .map(|g| g.iter().map(|&i| weights[i]).sum())
        .collect()
}

/// `sum / (n * max)`. An all-zero (or empty) load is perfectly balanced.
pub fn efficiency(volumes: &[u64]) -> f64 {
    let max = volumes.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return 1.0;
    }
    let sum: u64 = volumes.iter().sum();
    sum as f64 / (volumes.len() as f64 * max as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_breaks_ties_by_index() {
        let order = descending_by_weight(&[3, 7, 3, 7, 1]);
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn heaviest_group_goes_to_first_worker() {
        // Worker 2 is least loaded, then 0, then 1.
        let owners = pair_by_load(&[5, 20, 10], &[2, 0, 1]);
        assert_eq!(owners, vec![1, 2, 0]);
    }

    #[test]
    fn pairing_ties_follow_group_index() {
        let owners = pair_by_load(&[4, 4], &[1, 0]);
        assert_eq!(owners, vec![1, 0]);
    }

    #[test]
    fn efficiency_of_balanced_and_skewed_loads() {
        assert_eq!(efficiency(&[21, 21]), 1.0);
        assert_eq!(efficiency(&[30, 10]), 40.0 / 60.0);
        assert_eq!(efficiency(&[0, 0, 0]), 1.0);
        assert_eq!(efficiency(&[]), 1.0);
    }

    #[test]
    fn volumes_sum_members() {
        let groups = vec![vec![0, 2], vec![1], vec![]];
        assert_eq!(group_volumes(&groups, &[1, 10, 100]), vec![101, 10, 0]);
    }
}
