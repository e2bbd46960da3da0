//! Round-robin placement.
//!
//! Items go out heaviest first, cycling over workers from least to most
//! loaded. When there are fewer items than workers (the common case on
//! coarse levels) the heaviest patches land on the emptiest processes.

use patchmap_core::{Rank, Strategy};

use crate::order::descending_by_weight;
use crate::plan::Placement;

/// Assign the i-th heaviest item to `worker_order[i % workers]`.
///
/// `worker_order` is a permutation of `0..workers`, least loaded first.
pub fn round_robin(weights: &[u64], worker_order: &[Rank]) -> Placement {
    let workers = worker_order.len();
    let mut owners = vec![0; weights.len()];
    for (i, item) in descending_by_weight(weights).into_iter().enumerate() {
        owners[item] = worker_order[i % workers];
    }
    Placement::new(owners, weights, workers, Strategy::RoundRobin)
}
