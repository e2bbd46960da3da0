//! Distribution manager: strategy dispatch over a shared cache.
//!
//! One manager per process, owned by the caller. `define` looks the
//! problem up by shape and only computes an assignment on a miss:
//!
//! - `workers == 1`: everything on rank 0, nothing cached, no collectives
//! - cache hit: the shared map, after checking its sentinel and owners
//! - cache miss: one load all-gather, then the active strategy; the first
//!   proximity miss also builds the topology directory
//!
//! Every rank must issue the same `define` calls in the same order, since
//! a miss synchronizes the whole group.

use std::sync::Arc;

use tracing::{debug, info, warn};

use patchmap_cluster::{Collective, LoadAggregator, LoadSnapshot, LocalUsage, SingleProcess, TopologyDirectory};
use patchmap_core::{DistributionConfig, IntVect, Rank, Strategy, WorkItem};
use patchmap_placement::{
    KnapsackOptions, Placement, ProximityInput, SfcOptions, knapsack_placement, proximity_placement,
    round_robin, sfc_placement,
};

use crate::cache::{AssignmentCache, CacheStat};
use crate::diagnostics::{LoadReport, PlacementReport, gather_load_report};
use crate::error::{DistributionError, DistributionResult};
use crate::mapping::{DistributionMapping, ProcessorMap};

/// Per-process distribution context.
pub struct DistributionManager {
    comm: Box<dyn Collective>,
    config: DistributionConfig,
    strategy: Strategy,
    cache: AssignmentCache,
    load: LoadAggregator,
    /// Built on the first proximity miss, then kept.
    topology: Option<TopologyDirectory>,
    last_report: Option<PlacementReport>,
}

impl DistributionManager {
    pub fn new(config: DistributionConfig, comm: impl Collective + 'static) -> Self {
        let config = config.normalized();
        let strategy = config.strategy();
        debug!(
            rank = comm.rank(),
            size = comm.size(),
            %strategy,
            efficiency = config.efficiency,
            sfc_threshold = config.sfc_threshold,
            "distribution manager created"
        );
        Self {
            comm: Box::new(comm),
            config,
            strategy,
            cache: AssignmentCache::new(),
            load: LoadAggregator::default(),
            topology: None,
            last_report: None,
        }
    }

    /// A manager for a process with no group.
    pub fn single_process(config: DistributionConfig) -> Self {
        Self::new(config, SingleProcess::new())
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    pub fn group_size(&self) -> usize {
        self.comm.size()
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Affects later misses only; cached maps stay as they are.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        if strategy != self.strategy {
            debug!(from = %self.strategy, to = %strategy, "strategy changed");
        }
        self.strategy = strategy;
    }

    /// Parse and apply a strategy name. An unknown name keeps the current
    /// strategy and is reported as a non-fatal error.
    pub fn set_strategy_by_name(&mut self, name: &str) -> DistributionResult<()> {
        match name.parse::<Strategy>() {
            Ok(strategy) => {
                self.set_strategy(strategy);
                Ok(())
            }
            Err(_) => {
                warn!(name, keeping = %self.strategy, "unknown distribution strategy");
                Err(DistributionError::UnknownStrategy(name.to_string()))
            }
        }
    }

    /// Counters this process publishes to the load aggregator.
    pub fn set_local_usage(&mut self, usage: LocalUsage) {
        self.load.set_local(usage);
    }

    pub fn local_usage(&self) -> LocalUsage {
        self.load.local()
    }

    /// Report of the most recent miss.
    pub fn last_report(&self) -> Option<&PlacementReport> {
        self.last_report.as_ref()
    }

    pub fn topology(&self) -> Option<&TopologyDirectory> {
        self.topology.as_ref()
    }

    /// Assign `items` (in index order) to `workers` workers.
    pub fn define(&mut self, items: &[WorkItem], workers: usize) -> DistributionResult<DistributionMapping> {
        let weights: Vec<u64> = items.iter().map(|it| it.weight).collect();
        let anchors: Vec<IntVect> = items.iter().map(|it| it.anchor).collect();
        self.define_weighted(&weights, &anchors, workers)
    }

    /// Assign items given as parallel weight and anchor arrays.
    ///
    /// `anchors` may be empty for strategies that do not read them.
    pub fn define_weighted(
        &mut self,
        weights: &[u64],
        anchors: &[IntVect],
        workers: usize,
    ) -> DistributionResult<DistributionMapping> {
        if workers == 0 {
            return Err(DistributionError::NoWorkers);
        }
        if weights.is_empty() {
            return Err(DistributionError::NoItems);
        }
        if self.strategy.uses_anchors() && anchors.len() != weights.len() {
            return Err(DistributionError::LengthMismatch {
                weights: weights.len(),
                anchors: anchors.len(),
            });
        }

        let rank = self.rank();
        if workers == 1 {
            return Ok(DistributionMapping::new(ProcessorMap::new(vec![0; weights.len()], rank)));
        }

        let key = weights.len() + 1;
        if let Some(cached) = self.cache.get(key) {
            if cached.sentinel() != rank {
                return Err(DistributionError::ForeignAssignment {
                    expected: rank,
                    found: cached.sentinel(),
                });
            }
            // The key is the item count alone; the owners must still fit this call.
            if cached.len() != weights.len() {
                return Err(DistributionError::InvalidAssignment(format!(
                    "cached map holds {} owners for {} items",
                    cached.len(),
                    weights.len()
                )));
            }
            cached.validate(workers)?;
            debug!(items = weights.len(), "assignment cache hit");
            return Ok(DistributionMapping::from_arc(cached));
        }

        // Group-synchronizing: one all-gather on every miss.
        let snapshot = self.load.current_usage(self.comm.as_ref())?;
        let (placement, report) = self.run_strategy(weights, anchors, workers, &snapshot)?;

        let map = ProcessorMap::new(placement.owners, rank);
        if map.len() != weights.len() {
            return Err(DistributionError::InvalidAssignment(format!(
                "{} owners for {} items",
                map.len(),
                weights.len()
            )));
        }
        map.validate(workers)?;

        let map = Arc::new(map);
        self.cache.insert(Arc::clone(&map))?;
        self.log_report(&report);
        self.last_report = Some(report);
        Ok(DistributionMapping::from_arc(map))
    }

    fn run_strategy(
        &mut self,
        weights: &[u64],
        anchors: &[IntVect],
        workers: usize,
        snapshot: &LoadSnapshot,
    ) -> DistributionResult<(Placement, PlacementReport)> {
        let order = snapshot.worker_order(workers);
        let knapsack = KnapsackOptions {
            max_efficiency: self.config.efficiency,
            refine: true,
        };
        let requested = self.strategy;

        let placement = match requested {
            Strategy::RoundRobin => round_robin(weights, &order),
            Strategy::Knapsack => knapsack_placement(weights, &order, &knapsack),
            Strategy::SpaceFillingCurve => {
                let opts = SfcOptions {
                    sfc_threshold: self.config.sfc_threshold,
                    knapsack,
                };
                sfc_placement(weights, anchors, &order, &opts)
            }
            Strategy::ProximityFillingCurve => {
                let directory = self.topology_directory()?;
                let proximity = if directory.group_size() == workers {
                    directory.proximity_for(workers)
                } else {
                    debug!(
                        workers,
                        ranks = directory.group_size(),
                        "worker count differs from group size; runs keep rank order"
                    );
                    Vec::new()
                };
                let resident = snapshot.cells(workers);
                let result = proximity_placement(&ProximityInput {
                    weights,
                    anchors,
                    worker_order: &order,
                    proximity: &proximity,
                    resident_cells: &resident,
                    blend_resident_load: self.config.proximity.blend_resident_load,
                    knapsack,
                });
                let report = PlacementReport::with_proximity(requested, &result);
                return Ok((result.placement, report));
            }
        };

        let report = PlacementReport::new(requested, &placement);
        Ok((placement, report))
    }

    /// Group-synchronizing on first use: see [`TopologyDirectory::build`].
    fn topology_directory(&mut self) -> DistributionResult<&TopologyDirectory> {
        let directory = match self.topology.take() {
            Some(directory) => directory,
            None => {
                let source = self.config.proximity.topology_file.as_deref();
                TopologyDirectory::build(self.comm.as_ref(), source)?
            }
        };
        Ok(self.topology.insert(directory))
    }

    fn log_report(&self, report: &PlacementReport) {
        if self.config.verbose && self.comm.is_io_rank() {
            info!(
                requested = %report.requested,
                strategy = %report.strategy,
                items = report.items,
                workers = report.workers,
                efficiency = report.efficiency,
                "assignment computed"
            );
        } else {
            debug!(
                strategy = %report.strategy,
                items = report.items,
                workers = report.workers,
                efficiency = report.efficiency,
                "assignment computed"
            );
        }
    }

    /// Wrap an explicit processor map whose last entry is the sentinel.
    ///
    /// With `put_in_cache` and more than one process it is cached; a map of
    /// an already cached length is a collision, and every owner must be a
    /// rank of the group.
    pub fn adopt(&mut self, pmap: Vec<Rank>, put_in_cache: bool) -> DistributionResult<DistributionMapping> {
        let map = Arc::new(ProcessorMap::from_entries(pmap)?);
        if put_in_cache && self.group_size() > 1 {
            map.validate(self.group_size())?;
            self.cache.insert(Arc::clone(&map))?;
        }
        Ok(DistributionMapping::from_arc(map))
    }

    /// Evict maps that only the cache still holds. Returns the number
    /// evicted.
    pub fn flush_cache(&mut self) -> usize {
        for stat in self.cache.stats() {
            debug!(refs = stat.refs, items = stat.items, "cache entry");
        }
        self.cache.flush()
    }

    pub fn cache_stats(&self) -> Vec<CacheStat> {
        self.cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resident bytes of every rank, on the IO rank.
    ///
    /// Group-synchronizing: one gather.
    pub fn load_report(&self) -> DistributionResult<Option<LoadReport>> {
        Ok(gather_load_report(self.comm.as_ref(), self.load.local())?)
    }
}

impl std::fmt::Debug for DistributionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionManager")
            .field("rank", &self.rank())
            .field("size", &self.group_size())
            .field("strategy", &self.strategy)
            .field("cached", &self.cache.len())
            .finish()
    }
}
