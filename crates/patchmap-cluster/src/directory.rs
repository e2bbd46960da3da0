//! Rank / node / coordinate directory and the proximity order.
//!
//! # Construction
//!
//! ```text
//! all ranks   all_gather(node_id)            -> rank -> node
//! IO rank     read TopologyGrid               -> node -> coord
//!             Morton-walk the grid cells      -> proximity order
//! IO rank     broadcast(proximity order)
//! IO rank     broadcast(node -> coord table)
//! ```
//!
//! The proximity order lists ranks so that neighbours in the list sit on
//! neighbouring nodes. Without a usable description it is the identity.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use patchmap_core::{IntVect, NodeId, Rank, SPACE_DIM};
use patchmap_placement::morton_order;

use crate::collective::Collective;
use crate::error::ClusterResult;
use crate::topology::TopologyGrid;

/// Immutable once built; every rank holds an identical copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDirectory {
    rank_node: Vec<NodeId>,
    node_ranks: BTreeMap<NodeId, Vec<Rank>>,
    node_coord: BTreeMap<NodeId, IntVect>,
    coord_nodes: BTreeMap<IntVect, Vec<NodeId>>,
    proximity: Vec<Rank>,
    position: Vec<Option<usize>>,
    bounds: Option<(IntVect, IntVect)>,
}

fn node_ranks(rank_node: &[NodeId]) -> BTreeMap<NodeId, Vec<Rank>> {
    let mut out: BTreeMap<NodeId, Vec<Rank>> = BTreeMap::new();
    for (rank, &node) in rank_node.iter().enumerate() {
        out.entry(node).or_default().push(rank);
    }
    out
}

fn is_permutation(order: &[Rank], size: usize) -> bool {
    if order.len() != size {
        return false;
    }
    let mut seen = vec![false; size];
    for &r in order {
        if r >= size || seen[r] {
            return false;
        }
        seen[r] = true;
    }
    true
}

/// Walk the grid cells in Morton order and list the ranks found there.
///
/// Returns `None` unless every rank of the group appears exactly once.
pub fn proximity_order(grid: &TopologyGrid, rank_node: &[NodeId]) -> Option<Vec<Rank>> {
    let ranks_of = node_ranks(rank_node);
    let by_coord = grid.nodes_by_coord();

    let cells: Vec<IntVect> = grid.cells().collect();
    let shifted: Vec<IntVect> = cells
        .iter()
        .map(|c| {
            let mut s = *c;
            for axis in 0..SPACE_DIM {
                s[axis] -= grid.lo[axis];
            }
            s
        })
        .collect();

    let mut order = Vec::with_capacity(rank_node.len());
    for idx in morton_order(&shifted) {
        let Some(nodes) = by_coord.get(&cells[idx]) else {
            continue;
        };
        for node in nodes {
            if let Some(ranks) = ranks_of.get(node) {
                order.extend_from_slice(ranks);
            }
        }
    }

    if is_permutation(&order, rank_node.len()) {
        Some(order)
    } else {
        warn!(
            listed = order.len(),
            ranks = rank_node.len(),
            "topology does not place every rank exactly once; using identity proximity order"
        );
        None
    }
}

impl TopologyDirectory {
    /// Directory without topology: identity proximity order, no coordinates.
    pub fn identity(rank_node: Vec<NodeId>) -> Self {
        let proximity = (0..rank_node.len()).collect();
        Self::from_parts(rank_node, proximity, BTreeMap::new(), None)
    }

    /// Build locally from a known node table and optional grid.
    pub fn from_grid(rank_node: Vec<NodeId>, grid: Option<&TopologyGrid>) -> Self {
        let Some(grid) = grid else {
            return Self::identity(rank_node);
        };
        let proximity = proximity_order(grid, &rank_node).unwrap_or_else(|| (0..rank_node.len()).collect());
        Self::from_parts(rank_node, proximity, grid.node_coords(), Some((grid.lo, grid.hi)))
    }

    fn from_parts(
        rank_node: Vec<NodeId>,
        proximity: Vec<Rank>,
        node_coord: BTreeMap<NodeId, IntVect>,
        bounds: Option<(IntVect, IntVect)>,
    ) -> Self {
        let mut position = vec![None; rank_node.len()];
        for (i, &rank) in proximity.iter().enumerate() {
            if let Some(slot) = position.get_mut(rank) {
                *slot = Some(i);
            }
        }
        let mut coord_nodes: BTreeMap<IntVect, Vec<NodeId>> = BTreeMap::new();
        for (&node, &coord) in &node_coord {
            coord_nodes.entry(coord).or_default().push(node);
        }
        Self {
            node_ranks: node_ranks(&rank_node),
            rank_node,
            node_coord,
            coord_nodes,
            proximity,
            position,
            bounds,
        }
    }

    /// Build the directory across the group.
    ///
    /// Group-synchronizing: one all-gather and two broadcasts rooted at
    /// the IO rank. Only the IO rank reads `source`; a missing or
    /// unreadable description degrades to the identity order.
    pub fn build(comm: &dyn Collective, source: Option<&Path>) -> ClusterResult<Self> {
        let rank_node = comm.all_gather(&[comm.node_id()])?;

        let (mut proximity, mut table) = if comm.is_io_rank() {
            let grid = match source {
                Some(path) => match TopologyGrid::from_file(path) {
                    Ok(grid) => Some(grid),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot load topology; using identity proximity order");
                        None
                    }
                },
                None => {
                    warn!("no topology description; using identity proximity order");
                    None
                }
            };
            let local = Self::from_grid(rank_node.clone(), grid.as_ref());
            (local.encode_proximity(), local.encode_table())
        } else {
            (Vec::new(), Vec::new())
        };

        comm.broadcast(&mut proximity, comm.io_rank())?;
        comm.broadcast(&mut table, comm.io_rank())?;

        let directory = Self::decode(rank_node, &proximity, &table);
        if comm.is_io_rank() {
            info!(
                ranks = directory.group_size(),
                nodes = directory.node_ranks.len(),
                located = directory.node_coord.len(),
                "topology directory built"
            );
        }
        Ok(directory)
    }

    fn encode_proximity(&self) -> Vec<i64> {
        self.proximity.iter().map(|&r| r as i64).collect()
    }

    /// `[lo; hi; (node, x, y, z)*]`, empty without topology.
    fn encode_table(&self) -> Vec<i64> {
        let Some((lo, hi)) = self.bounds else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(2 * SPACE_DIM + 4 * self.node_coord.len());
        out.extend_from_slice(&lo.0);
        out.extend_from_slice(&hi.0);
        for (&node, coord) in &self.node_coord {
            out.push(node);
            out.extend_from_slice(&coord.0);
        }
        out
    }

    fn decode(rank_node: Vec<NodeId>, proximity: &[i64], table: &[i64]) -> Self {
        let size = rank_node.len();
        let order: Vec<Rank> = proximity.iter().filter_map(|&r| usize::try_from(r).ok()).collect();
        let order = if is_permutation(&order, size) {
            order
        } else {
            warn!(received = proximity.len(), ranks = size, "bad proximity broadcast; using identity");
            (0..size).collect()
        };

        let header = 2 * SPACE_DIM;
        if table.len() < header || (table.len() - header) % 4 != 0 {
            if !table.is_empty() {
                warn!(values = table.len(), "malformed node table broadcast; ignoring coordinates");
            }
            return Self::from_parts(rank_node, order, BTreeMap::new(), None);
        }
        let lo = IntVect::from_slice(&table[..SPACE_DIM]);
        let hi = IntVect::from_slice(&table[SPACE_DIM..header]);
        let node_coord = table[header..]
            .chunks_exact(4)
            .map(|rec| (rec[0], IntVect::from_slice(&rec[1..])))
            .collect();
        Self::from_parts(rank_node, order, node_coord, Some((lo, hi)))
    }

    pub fn group_size(&self) -> usize {
        self.rank_node.len()
    }

    /// Whether a topology description was loaded.
    pub fn has_topology(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn node_of_rank(&self, rank: Rank) -> Option<NodeId> {
        let node = self.rank_node.get(rank).copied();
        if node.is_none() {
            debug!(rank, "rank not in directory");
        }
        node
    }

    pub fn ranks_of_node(&self, node: NodeId) -> Option<&[Rank]> {
        let ranks = self.node_ranks.get(&node).map(Vec::as_slice);
        if ranks.is_none() {
            debug!(node, "node runs no ranks");
        }
        ranks
    }

    pub fn coord_of_node(&self, node: NodeId) -> Option<IntVect> {
        let coord = self.node_coord.get(&node).copied();
        if coord.is_none() {
            debug!(node, "node has no topology coordinate");
        }
        coord
    }

    pub fn nodes_at(&self, coord: IntVect) -> Option<&[NodeId]> {
        let nodes = self.coord_nodes.get(&coord).map(Vec::as_slice);
        if nodes.is_none() {
            debug!(%coord, "no nodes at coordinate");
        }
        nodes
    }

    pub fn coord_of_rank(&self, rank: Rank) -> Option<IntVect> {
        self.node_of_rank(rank).and_then(|node| self.coord_of_node(node))
    }

    /// Ranks running on any node at `coord`, ascending.
    pub fn ranks_at(&self, coord: IntVect) -> Vec<Rank> {
        let mut ranks: Vec<Rank> = self
            .nodes_at(coord)
            .unwrap_or_default()
            .iter()
            .filter_map(|&node| self.node_ranks.get(&node))
            .flatten()
            .copied()
            .collect();
        ranks.sort_unstable();
        ranks
    }

    pub fn proximity_order(&self) -> &[Rank] {
        &self.proximity
    }

    /// Rank at position `i` of the proximity order.
    pub fn proximity_rank(&self, i: usize) -> Option<Rank> {
        let rank = self.proximity.get(i).copied();
        if rank.is_none() {
            debug!(position = i, ranks = self.proximity.len(), "proximity position out of range");
        }
        rank
    }

    /// Position of `rank` in the proximity order.
    pub fn proximity_position(&self, rank: Rank) -> Option<usize> {
        let pos = self.position.get(rank).copied().flatten();
        if pos.is_none() {
            debug!(rank, "rank has no proximity position");
        }
        pos
    }

    /// Proximity positions `0..workers`, `None` past the end of the group.
    pub fn proximity_for(&self, workers: usize) -> Vec<Option<Rank>> {
        if workers > self.proximity.len() {
            warn!(
                workers,
                ranks = self.proximity.len(),
                "more workers than ranks in the proximity order"
            );
        }
        (0..workers).map(|i| self.proximity.get(i).copied()).collect()
    }

    /// Torus hop count between two coordinates of the loaded topology.
    pub fn hops(&self, from: IntVect, to: IntVect) -> Option<i64> {
        let (lo, hi) = self.bounds?;
        let mut total = 0;
        for axis in 0..SPACE_DIM {
            let extent = hi[axis] - lo[axis] + 1;
            let d = (from[axis] - to[axis]).abs();
            total += d.min(extent - d).max(0);
        }
        Some(total)
    }

    /// Hops between the nodes of two ranks.
    pub fn rank_hops(&self, from: Rank, to: Rank) -> Option<i64> {
        let a = self.coord_of_rank(from)?;
        let b = self.coord_of_rank(to)?;
        self.hops(a, b)
    }
}
