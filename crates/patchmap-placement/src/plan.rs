//! The common result of every partitioning strategy.

use serde::Serialize;

use patchmap_core::{Rank, Strategy};

use crate::order::efficiency;

/// An owner per item plus the balance it achieves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    /// `owners[i]` is the worker that receives item `i`.
    pub owners: Vec<Rank>,
    /// The strategy that actually ran, after any fallback.
    pub strategy: Strategy,
    /// Total item weight per worker.
    pub volumes: Vec<u64>,
    /// `total / (workers * max_volume)`.
    pub efficiency: f64,
}

impl Placement {
    pub fn new(owners: Vec<Rank>, weights: &[u64], workers: usize, strategy: Strategy) -> Self {
        let mut volumes = vec![0u64; workers];
        for (item, &owner) in owners.iter().enumerate() {
            volumes[owner] += weights[item];
        }
        let efficiency = efficiency(&volumes);
        Self {
            owners,
            strategy,
            volumes,
            efficiency,
        }
    }

    pub fn workers(&self) -> usize {
        self.volumes.len()
    }

    /// Largest per-worker volume.
    pub fn max_volume(&self) -> u64 {
        self.volumes.iter().copied().max().unwrap_or(0)
    }

    /// Items owned by `worker`, in index order.
    pub fn items_of(&self, worker: Rank) -> Vec<usize> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == worker)
            .map(|(i, _)| i)
            .collect()
    }
}
