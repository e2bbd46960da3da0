//! Proximity-aware SFC placement.
//!
//! A two-pass strategy:
//! 1. Run knapsack to learn how much volume each worker should end up with.
//! 2. Walk the Morton-ordered items again and cut one contiguous run per
//!    worker, sized to those volumes, but hand run `i` to the rank at
//!    position `i` of the proximity order. Consecutive runs are spatial
//!    neighbours, and consecutive proximity positions are topological
//!    neighbours, so halo traffic stays on nearby nodes.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use patchmap_core::{IntVect, Rank, Strategy};

use crate::knapsack::{KnapsackOptions, knapsack_placement};
use crate::plan::Placement;
use crate::round_robin::round_robin;
use crate::sfc::{morton_order, split_runs};

/// Inputs to [`proximity_placement`].
#[derive(Debug, Clone, Copy)]
pub struct ProximityInput<'a> {
    pub weights: &'a [u64],
    pub anchors: &'a [IntVect],
    /// Least-loaded-first permutation of the workers.
    pub worker_order: &'a [Rank],
    /// Rank at each proximity position; `None` where the topology is unknown.
    pub proximity: &'a [Option<Rank>],
    /// Cells currently resident on each rank.
    pub resident_cells: &'a [u64],
    /// Experimental: size runs from rescaled resident load instead of the
    /// knapsack pass.
    pub blend_resident_load: bool,
    pub knapsack: KnapsackOptions,
}

/// Result of [`proximity_placement`], with the intermediate quantities
/// kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityPlacement {
    pub placement: Placement,
    /// Volume target per worker used to size the runs.
    pub targets: Vec<f64>,
    /// Resident cells rescaled to the total of the new items.
    pub scaled_resident: Vec<u64>,
    /// Worker receiving each run.
    pub run_owners: Vec<Rank>,
}

/// Map run positions to workers through the proximity order.
///
/// Unknown entries stand for their own position. If the result is not a
/// permutation of `0..workers` the identity is used instead.
pub fn resolve_run_owners(proximity: &[Option<Rank>], workers: usize) -> Vec<Rank> {
    if proximity.len() != workers {
        if !proximity.is_empty() {
            warn!(
                proximity = proximity.len(),
                workers,
                "proximity order does not match worker count; using identity"
            );
        }
        return (0..workers).collect();
    }

    let owners: Vec<Rank> = proximity
        .iter()
        .enumerate()
        .map(|(i, p)| match p {
            Some(rank) if *rank < workers => *rank,
            _ => i,
        })
        .collect();

    let distinct: BTreeSet<Rank> = owners.iter().copied().collect();
    if distinct.len() != workers {
        warn!(workers, "proximity order is not a permutation; using identity");
        return (0..workers).collect();
    }
    owners
}

fn rescale(resident: &[u64], workers: usize, total_new: u64) -> Vec<u64> {
    let resident: Vec<u64> = (0..workers)
        .map(|w| resident.get(w).copied().unwrap_or(0))
        .collect();
    let total_resident: u64 = resident.iter().sum();
    let scale = if total_resident > 0 {
        total_new as f64 / total_resident as f64
    } else {
        1.0
    };
    resident.iter().map(|&c| (scale * c as f64) as u64).collect()
}

pub fn proximity_placement(input: &ProximityInput<'_>) -> ProximityPlacement {
    let weights = input.weights;
    let workers = input.worker_order.len();
    if weights.len() <= workers || workers < 2 {
        let placement = round_robin(weights, input.worker_order);
        return ProximityPlacement {
            targets: placement.volumes.iter().map(|&v| v as f64).collect(),
            scaled_resident: vec![0; workers],
            run_owners: (0..workers).collect(),
            placement,
        };
    }

    let total_new: u64 = weights.iter().sum();
    let per_worker = total_new as f64 / workers as f64;
    let scaled_resident = rescale(input.resident_cells, workers, total_new);
    let resident_known = scaled_resident.iter().any(|&c| c > 0);

    let targets: Vec<f64> = if input.blend_resident_load && resident_known {
        scaled_resident
            .iter()
            .map(|&c| (2.0 * per_worker - c as f64).max(0.0))
            .collect()
    } else {
        let first_pass = knapsack_placement(weights, input.worker_order, &input.knapsack);
        first_pass.volumes.iter().map(|&v| v as f64).collect()
    };

    let run_owners = resolve_run_owners(input.proximity, workers);
    let sequence = morton_order(input.anchors);
    // Run i is sized for the worker that receives it, not for worker i.
    let runs = split_runs(&sequence, weights, workers, |i| targets[run_owners[i]]);

    let mut owners = vec![0; weights.len()];
    for (run, &owner) in runs.iter().zip(&run_owners) {
        for &item in run {
            owners[item] = owner;
        }
    }

    let placement = Placement::new(owners, weights, workers, Strategy::ProximityFillingCurve);
    debug!(
        workers,
        per_worker,
        efficiency = placement.efficiency,
        "proximity placement finished"
    );
    ProximityPlacement {
        placement,
        targets,
        scaled_resident,
        run_owners,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::identity_order;

    fn line(n: i64) -> Vec<IntVect> {
        (0..n).map(|i| IntVect::new(i, 0, 0)).collect()
    }

    fn input<'a>(
        weights: &'a [u64],
        anchors: &'a [IntVect],
        order: &'a [Rank],
        proximity: &'a [Option<Rank>],
    ) -> ProximityInput<'a> {
        ProximityInput {
            weights,
            anchors,
            worker_order: order,
            proximity,
            resident_cells: &[],
            blend_resident_load: false,
            knapsack: KnapsackOptions::default(),
        }
    }

    #[test]
    fn runs_follow_proximity_order() {
        let anchors = line(8);
        let weights = [1u64; 8];
        let order = identity_order(4);
        let proximity = [Some(2), Some(0), Some(3), Some(1)];
        let out = proximity_placement(&input(&weights, &anchors, &order, &proximity));

        assert_eq!(out.run_owners, vec![2, 0, 3, 1]);
        assert_eq!(out.placement.owners, vec![2, 2, 0, 0, 3, 3, 1, 1]);
        assert_eq!(out.placement.strategy, Strategy::ProximityFillingCurve);
        assert_eq!(out.placement.volumes, vec![2, 2, 2, 2]);
    }

    #[test]
    fn targets_come_from_knapsack_volumes() {
        let anchors = line(6);
        let weights = [6u64, 1, 1, 1, 1, 2];
        let order = identity_order(2);
        let out = proximity_placement(&input(&weights, &anchors, &order, &[]));

        let mut targets = out.targets.clone();
        targets.sort_by(f64::total_cmp);
        assert_eq!(targets, vec![6.0, 6.0]);
        assert_eq!(out.placement.volumes.iter().sum::<u64>(), 12);
    }

    #[test]
    fn unknown_positions_stand_for_themselves() {
        assert_eq!(resolve_run_owners(&[Some(1), Some(0), None], 3), vec![1, 0, 2]);
        assert_eq!(resolve_run_owners(&[None, None], 2), vec![0, 1]);
        // Position 0 falls back to 0, which collides with the explicit 0.
        assert_eq!(resolve_run_owners(&[None, Some(0), Some(2)], 3), vec![0, 1, 2]);
    }

    #[test]
    fn mismatched_or_broken_order_is_identity() {
        assert_eq!(resolve_run_owners(&[Some(1), Some(0)], 3), vec![0, 1, 2]);
        assert_eq!(resolve_run_owners(&[Some(1), Some(1), Some(0)], 3), vec![0, 1, 2]);
        assert_eq!(resolve_run_owners(&[Some(7), Some(0), Some(1)], 3), vec![0, 1, 2]);
    }

    #[test]
    fn resident_cells_are_rescaled() {
        let anchors = line(4);
        let weights = [2u64, 2, 2, 2];
        let order = identity_order(2);
        let resident = [30u64, 10];
        let mut inp = input(&weights, &anchors, &order, &[]);
        inp.resident_cells = &resident;
        let out = proximity_placement(&inp);
        assert_eq!(out.scaled_resident, vec![6, 2]);
    }

    #[test]
    fn blending_favours_lightly_loaded_workers() {
        let anchors = line(8);
        let weights = [1u64; 8];
        let order = identity_order(2);
        let resident = [6u64, 2];
        let mut inp = input(&weights, &anchors, &order, &[]);
        inp.resident_cells = &resident;
        inp.blend_resident_load = true;
        let out = proximity_placement(&inp);

        // per_worker = 4, scaled resident = [6, 2] -> targets [2, 6]
        assert_eq!(out.targets, vec![2.0, 6.0]);
        assert_eq!(out.placement.volumes, vec![2, 6]);
    }

    #[test]
    fn few_items_fall_back_to_round_robin() {
        let anchors = line(2);
        let order = identity_order(3);
        let out = proximity_placement(&input(&[5, 5], &anchors, &order, &[]));
        assert_eq!(out.placement.strategy, Strategy::RoundRobin);
    }
}
