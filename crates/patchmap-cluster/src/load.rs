//! Group-wide resource usage.
//!
//! Each process publishes how many bytes and cells it currently holds.
//! A [`LoadSnapshot`] is one all-gather of those counters; it is never
//! cached, since resident load changes between calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use patchmap_core::Rank;

use crate::collective::Collective;
use crate::error::{ClusterError, ClusterResult};

/// Resource counters of one process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUsage {
    pub bytes: u64,
    pub cells: u64,
}

impl LocalUsage {
    pub fn new(bytes: u64, cells: u64) -> Self {
        Self { bytes, cells }
    }
}

/// Usage of every rank, indexed by rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSnapshot {
    usage: Vec<LocalUsage>,
}

impl LoadSnapshot {
    pub fn zeros(ranks: usize) -> Self {
        Self {
            usage: vec![LocalUsage::default(); ranks],
        }
    }

    pub fn from_usage(usage: Vec<LocalUsage>) -> Self {
        Self { usage }
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }

    pub fn usage(&self) -> &[LocalUsage] {
        &self.usage
    }

    /// Usage of `rank`; ranks outside the group hold nothing.
    pub fn of(&self, rank: Rank) -> LocalUsage {
        self.usage.get(rank).copied().unwrap_or_default()
    }

    pub fn bytes(&self) -> Vec<u64> {
        self.usage.iter().map(|u| u.bytes).collect()
    }

    /// Cells per rank for the first `workers` ranks, zero-padded.
    pub fn cells(&self, workers: usize) -> Vec<u64> {
        (0..workers).map(|r| self.of(r).cells).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.usage.iter().map(|u| u.bytes).sum()
    }

    pub fn total_cells(&self) -> u64 {
        self.usage.iter().map(|u| u.cells).sum()
    }

    /// Average bytes per resident cell, or 0 with no cells.
    pub fn bytes_per_cell(&self) -> f64 {
        match self.total_cells() {
            0 => 0.0,
            cells => self.total_bytes() as f64 / cells as f64,
        }
    }

    /// Workers `0..workers` ordered least loaded first. Ties keep rank order.
    pub fn worker_order(&self, workers: usize) -> Vec<Rank> {
        let mut order: Vec<Rank> = (0..workers).collect();
        order.sort_by_key(|&r| (self.of(r).bytes, r));
        order
    }
}

fn to_wire(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_wire(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

/// Publishes this process's counters and gathers everyone else's.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadAggregator {
    local: LocalUsage,
}

impl LoadAggregator {
    pub fn new(local: LocalUsage) -> Self {
        Self { local }
    }

    pub fn local(&self) -> LocalUsage {
        self.local
    }

    pub fn set_local(&mut self, local: LocalUsage) {
        self.local = local;
    }

    /// Current usage across the group.
    ///
    /// Group-synchronizing: one all-gather. Without real collectives the
    /// snapshot is all zeros.
    pub fn current_usage(&self, comm: &dyn Collective) -> ClusterResult<LoadSnapshot> {
        if !comm.is_available() {
            return Ok(LoadSnapshot::zeros(comm.size()));
        }

        let flat = comm.all_gather(&[to_wire(self.local.bytes), to_wire(self.local.cells)])?;
        if flat.len() != 2 * comm.size() {
            return Err(ClusterError::LengthMismatch {
                rank: comm.rank(),
                expected: 2 * comm.size(),
                found: flat.len(),
            });
        }
        let usage: Vec<LocalUsage> = flat
            .chunks_exact(2)
            .map(|pair| LocalUsage::new(from_wire(pair[0]), from_wire(pair[1])))
            .collect();

        let snapshot = LoadSnapshot::from_usage(usage);
        debug!(
            rank = comm.rank(),
            total_bytes = snapshot.total_bytes(),
            total_cells = snapshot.total_cells(),
            "gathered load snapshot"
        );
        Ok(snapshot)
    }
}
