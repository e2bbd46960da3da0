//! Multi-way knapsack (bin-packing) placement.
//!
//! Greedy worst-fit packing followed by a swap-based local search:
//!
//! ```text
//! sort items heaviest first
//! for each item: put it in the currently lightest bin
//! efficiency = total / (bins * max_bin)
//!
//! while efficiency <= threshold:
//!     for item a in heaviest bin, for item b in any other bin:
//!         if swapping a and b leaves both bins strictly lighter
//!         than the heaviest bin was: swap, re-sort, restart
//!     no swap found: stop
//! ```
//!
//! Each accepted swap strictly lowers the sorted multiset of bin weights,
//! so the search terminates without an iteration cap. It stops at a local
//! optimum, not a global one.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use patchmap_core::config::DEFAULT_EFFICIENCY;
use patchmap_core::{Rank, Strategy};

use crate::order::{descending_by_weight, efficiency, pair_by_load};
use crate::plan::Placement;
use crate::round_robin::round_robin;

/// Tuning for the refinement pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnapsackOptions {
    /// Refinement stops once efficiency exceeds this.
    pub max_efficiency: f64,
    /// Run the swap refinement at all.
    pub refine: bool,
}

impl Default for KnapsackOptions {
    fn default() -> Self {
        Self {
            max_efficiency: DEFAULT_EFFICIENCY,
            refine: true,
        }
    }
}

/// One bin: the items it holds (in insertion order) and their total weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    /// Creation order, used to break weight ties.
    pub id: usize,
    pub items: Vec<usize>,
    pub weight: u64,
}

/// Result of [`knapsack`]. Bins are sorted heaviest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub bins: Vec<Bin>,
    /// Efficiency straight after greedy packing.
    pub initial_efficiency: f64,
    /// Efficiency after refinement.
    pub efficiency: f64,
    /// Accepted swaps.
    pub swaps: usize,
    /// Efficiency after each accepted swap.
    pub history: Vec<f64>,
    /// Heaviest bin weight after each accepted swap.
    pub max_weights: Vec<u64>,
}

impl Packing {
    pub fn max_weight(&self) -> u64 {
        self.bins.first().map(|b| b.weight).unwrap_or(0)
    }

    pub fn bin_weights(&self) -> Vec<u64> {
        self.bins.iter().map(|b| b.weight).collect()
    }
}

fn sort_bins(bins: &mut [Bin]) {
    bins.sort_by_key(|b| (Reverse(b.weight), b.id));
}

fn bins_efficiency(bins: &[Bin]) -> f64 {
    let weights: Vec<u64> = bins.iter().map(|b| b.weight).collect();
    efficiency(&weights)
}

/// Pack `weights` into `nbins` bins.
pub fn knapsack(weights: &[u64], nbins: usize, opts: &KnapsackOptions) -> Packing {
    let mut bins: Vec<Bin> = (0..nbins)
        .map(|id| Bin {
            id,
            items: Vec::new(),
            weight: 0,
        })
        .collect();

    // Lightest bin on top; equal weights pick the lowest id.
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = (0..nbins).map(|id| Reverse((0, id))).collect();
    for item in descending_by_weight(weights) {
        let Some(Reverse((weight, id))) = heap.pop() else {
            break;
        };
        bins[id].items.push(item);
        bins[id].weight = weight + weights[item];
        heap.push(Reverse((bins[id].weight, id)));
    }

    sort_bins(&mut bins);
    let initial_efficiency = bins_efficiency(&bins);
    let mut packing = Packing {
        bins,
        initial_efficiency,
        efficiency: initial_efficiency,
        swaps: 0,
        history: Vec::new(),
        max_weights: Vec::new(),
    };

    if opts.refine {
        refine(&mut packing, weights, opts.max_efficiency);
    }
    packing
}

/// First improving swap between the heaviest bin and any other bin:
/// `(position in top bin, other bin, position in other bin)`.
fn find_swap(bins: &[Bin], weights: &[u64]) -> Option<(usize, usize, usize)> {
    let top = &bins[0];
    for (a, &item) in top.items.iter().enumerate() {
        let wi = weights[item];
        for (b, other) in bins.iter().enumerate().skip(1) {
            for (c, &candidate) in other.items.iter().enumerate() {
                let wo = weights[candidate];
                let top_after = top.weight - wi + wo;
                let other_after = other.weight - wo + wi;
                if top_after < top.weight && other_after < top.weight {
                    return Some((a, b, c));
                }
            }
        }
    }
    None
}

fn refine(packing: &mut Packing, weights: &[u64], max_efficiency: f64) {
    while packing.efficiency <= max_efficiency {
        let Some((a, b, c)) = find_swap(&packing.bins, weights) else {
            break;
        };

        let item = packing.bins[0].items.remove(a);
        let other = packing.bins[b].items.remove(c);
        packing.bins[0].items.push(other);
        packing.bins[0].weight = packing.bins[0].weight - weights[item] + weights[other];
        packing.bins[b].items.push(item);
        packing.bins[b].weight = packing.bins[b].weight - weights[other] + weights[item];

        sort_bins(&mut packing.bins);
        packing.efficiency = bins_efficiency(&packing.bins);
        packing.swaps += 1;
        packing.history.push(packing.efficiency);
        packing.max_weights.push(packing.max_weight());
    }
    debug!(
        swaps = packing.swaps,
        initial = packing.initial_efficiency,
        efficiency = packing.efficiency,
        "knapsack refinement finished"
    );
}

/// Knapsack placement over `worker_order.len()` workers.
///
/// Degrades to [`round_robin`] when there are no more items than workers,
/// or fewer than two workers.
pub fn knapsack_placement(weights: &[u64], worker_order: &[Rank], opts: &KnapsackOptions) -> Placement {
    let workers = worker_order.len();
    if weights.len() <= workers || workers < 2 {
        return round_robin(weights, worker_order);
    }

    let packing = knapsack(weights, workers, opts);
    // Bins are already heaviest first; pair them with the least-loaded workers.
    let bin_owner = pair_by_load(&packing.bin_weights(), worker_order);
    let mut owners = vec![0; weights.len()];
    for (bin, owner) in packing.bins.iter().zip(bin_owner) {
        for &item in &bin.items {
            owners[item] = owner;
        }
    }
    Placement::new(owners, weights, workers, Strategy::Knapsack)
}
