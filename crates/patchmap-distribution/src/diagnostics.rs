//! Load and placement reports. Side channel only: nothing here feeds back
//! into an assignment.

use serde::Serialize;
use tracing::info;

use patchmap_cluster::{ClusterResult, Collective, LocalUsage};
use patchmap_core::Strategy;
use patchmap_placement::{Placement, ProximityPlacement};

/// Outcome of the most recent cache miss.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementReport {
    /// Strategy the manager was asked to run.
    pub requested: Strategy,
    /// Strategy that actually ran, after fallbacks.
    pub strategy: Strategy,
    pub items: usize,
    pub workers: usize,
    pub efficiency: f64,
    pub volumes: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scaled_resident: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<f64>,
}

impl PlacementReport {
    pub fn new(requested: Strategy, placement: &Placement) -> Self {
        Self {
            requested,
            strategy: placement.strategy,
            items: placement.owners.len(),
            workers: placement.workers(),
            efficiency: placement.efficiency,
            volumes: placement.volumes.clone(),
            scaled_resident: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn with_proximity(requested: Strategy, result: &ProximityPlacement) -> Self {
        Self {
            scaled_resident: result.scaled_resident.clone(),
            targets: result.targets.clone(),
            ..Self::new(requested, &result.placement)
        }
    }
}

/// Resident bytes of every rank, collected on the IO rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub bytes: Vec<u64>,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    /// `max / mean`; 1.0 when nothing is resident.
    pub imbalance: f64,
}

impl LoadReport {
    pub fn from_bytes(bytes: Vec<u64>) -> Self {
        let min = bytes.iter().copied().min().unwrap_or(0);
        let max = bytes.iter().copied().max().unwrap_or(0);
        let mean = if bytes.is_empty() {
            0.0
        } else {
            bytes.iter().sum::<u64>() as f64 / bytes.len() as f64
        };
        let imbalance = if mean > 0.0 { max as f64 / mean } else { 1.0 };
        Self {
            bytes,
            min,
            max,
            mean,
            imbalance,
        }
    }
}

/// Gather every rank's resident bytes on the IO rank.
///
/// Group-synchronizing: one gather. Returns `Some` on the IO rank only.
pub fn gather_load_report(comm: &dyn Collective, local: LocalUsage) -> ClusterResult<Option<LoadReport>> {
    let mine = i64::try_from(local.bytes).unwrap_or(i64::MAX);
    let Some(all) = comm.gather(&[mine], comm.io_rank())? else {
        return Ok(None);
    };
    let report = LoadReport::from_bytes(all.into_iter().map(|b| u64::try_from(b).unwrap_or(0)).collect());
    info!(
        ranks = report.bytes.len(),
        min = report.min,
        max = report.max,
        imbalance = report.imbalance,
        "resident load"
    );
    Ok(Some(report))
}
