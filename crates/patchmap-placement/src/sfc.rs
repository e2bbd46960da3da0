//! Space-filling-curve placement.
//!
//! Items are put in Morton (Z-order) sequence by their anchors, and the
//! sequence is cut into one contiguous run per worker. Spatially close
//! patches end up on the same worker, which keeps ghost-cell exchange
//! local.
//!
//! The Morton comparison walks bit planes from coarse to fine: at plane
//! `i` both coordinates are divided by `2^i`, and the axes are compared
//! from the highest to the lowest. The coarsest plane is the smallest `M`
//! with `2^M > max_coordinate`.

use std::cmp::Ordering;

use tracing::debug;

use patchmap_core::{IntVect, Rank, SPACE_DIM, Strategy};

use crate::knapsack::{KnapsackOptions, knapsack_placement};
use crate::order::{group_volumes, pair_by_load};
use crate::plan::Placement;
use crate::round_robin::round_robin;

/// Smallest power `m` with `2^m > max component over all anchors`.
pub fn max_power(anchors: &[IntVect]) -> u32 {
    let max = anchors.iter().map(IntVect::max_component).max().unwrap_or(0);
    let mut m = 0;
    while m < 62 && (1i64 << m) <= max {
        m += 1;
    }
    m
}

/// Morton order of two coordinates at resolution `2^power`.
pub fn morton_cmp(lhs: &IntVect, rhs: &IntVect, power: u32) -> Ordering {
    for plane in (0..power).rev() {
        let n = 1i64 << plane;
        for axis in (0..SPACE_DIM).rev() {
            match (lhs[axis] / n).cmp(&(rhs[axis] / n)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
    }
    Ordering::Equal
}

/// Indices of `anchors` in Morton order. Equal keys keep index order.
pub fn morton_order(anchors: &[IntVect]) -> Vec<usize> {
    let power = max_power(anchors);
    let mut order: Vec<usize> = (0..anchors.len()).collect();
    order.sort_by(|&a, &b| morton_cmp(&anchors[a], &anchors[b], power).then(a.cmp(&b)));
    order
}

/// Cut `sequence` into `nruns` contiguous runs.
///
/// Run `i` takes items until its volume reaches `target(i)`; the last run
/// takes whatever is left. When the running average of closed runs has
/// overshot the target and the run holds more than one item, its last
/// item is handed back to the next run.
pub fn split_runs(
    sequence: &[usize],
    weights: &[u64],
    nruns: usize,
    target: impl Fn(usize) -> f64,
) -> Vec<Vec<usize>> {
    let mut runs = vec![Vec::new(); nruns];
    let mut k = 0;
    let mut total = 0.0;

    for (i, run) in runs.iter_mut().enumerate() {
        let goal = target(i);
        let last = i + 1 == nruns;
        let mut count = 0;
        let mut volume = 0.0;

        while k < sequence.len() && (last || volume < goal) {
            volume += weights[sequence[k]] as f64;
            run.push(sequence[k]);
            count += 1;
            k += 1;
        }

        total += volume;
        if total / (i + 1) as f64 > goal && count > 1 && k < sequence.len() {
            k -= 1;
            run.pop();
            total -= weights[sequence[k]] as f64;
        }
    }

    debug_assert_eq!(runs.iter().map(Vec::len).sum::<usize>(), sequence.len());
    runs
}

/// Tuning for the SFC strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SfcOptions {
    /// Fall back to knapsack when `items < sfc_threshold * workers`.
    pub sfc_threshold: usize,
    /// Used by the knapsack fallback.
    pub knapsack: KnapsackOptions,
}

/// SFC placement over `worker_order.len()` workers.
///
/// Runs are paired with workers heaviest run to least-loaded worker.
pub fn sfc_placement(
    weights: &[u64],
    anchors: &[IntVect],
    worker_order: &[Rank],
    opts: &SfcOptions,
) -> Placement {
    let workers = worker_order.len();
    if weights.len() <= workers {
        return round_robin(weights, worker_order);
    }
    if weights.len() < opts.sfc_threshold.saturating_mul(workers) {
        debug!(
            items = weights.len(),
            workers,
            sfc_threshold = opts.sfc_threshold,
            "too few items for SFC; using knapsack"
        );
        return knapsack_placement(weights, worker_order, &opts.knapsack);
    }

    let sequence = morton_order(anchors);
    let total: u64 = weights.iter().sum();
    let per_worker = total as f64 / workers as f64;
    let runs = split_runs(&sequence, weights, workers, |_| per_worker);

    let run_owner = pair_by_load(&group_volumes(&runs, weights), worker_order);
    let mut owners = vec![0; weights.len()];
    for (run, owner) in runs.iter().zip(run_owner) {
        for &item in run {
            owners[item] = owner;
        }
    }
    Placement::new(owners, weights, workers, Strategy::SpaceFillingCurve)
}
