//! Machine topology description.
//!
//! A JSON document placing physical nodes on a lattice:
//!
//! ```json
//! { "lo": [0, 0, 0], "hi": [1, 1, 0], "slots": [[10, 11, 12, -1]] }
//! ```
//!
//! Each entry of `slots` covers every cell of the box `lo..=hi` in
//! x-fastest order. Non-negative values are node ids; negative values
//! mark empty cells. Several slots model several nodes per cell.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use patchmap_core::{IntVect, NodeId, SPACE_DIM};

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyGrid {
    pub lo: IntVect,
    pub hi: IntVect,
    pub slots: Vec<Vec<NodeId>>,
}

impl TopologyGrid {
    pub fn from_file(path: &Path) -> ClusterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ClusterError::TopologyIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> ClusterResult<Self> {
        let grid: TopologyGrid = serde_json::from_str(json)?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if !self.lo.all_le(&self.hi) {
            return Err(ClusterError::TopologyFormat(format!(
                "lo {} is not below hi {}",
                self.lo, self.hi
            )));
        }
        let cells = self.cell_count();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.len() != cells {
                return Err(ClusterError::TopologyFormat(format!(
                    "slot {i} has {} entries, the box has {cells} cells",
                    slot.len()
                )));
            }
        }
        Ok(())
    }

    /// Cells along each axis.
    pub fn extent(&self) -> IntVect {
        let mut e = IntVect::ZERO;
        for axis in 0..SPACE_DIM {
            e[axis] = self.hi[axis] - self.lo[axis] + 1;
        }
        e
    }

    pub fn cell_count(&self) -> usize {
        self.extent().0.iter().map(|&n| n.max(0) as usize).product()
    }

    /// Every cell of the box, x fastest.
    pub fn cells(&self) -> impl Iterator<Item = IntVect> + '_ {
        let e = self.extent();
        (0..e[2]).flat_map(move |z| {
            (0..e[1]).flat_map(move |y| {
                (0..e[0]).map(move |x| IntVect::new(self.lo[0] + x, self.lo[1] + y, self.lo[2] + z))
            })
        })
    }

    /// Coordinate of every node. A node listed twice keeps its last cell.
    pub fn node_coords(&self) -> BTreeMap<NodeId, IntVect> {
        let mut out = BTreeMap::new();
        for slot in &self.slots {
            for (cell, &node) in self.cells().zip(slot) {
                if node >= 0 {
                    out.insert(node, cell);
                }
            }
        }
        out
    }

    /// Nodes in every occupied cell, in slot order.
    pub fn nodes_by_coord(&self) -> BTreeMap<IntVect, Vec<NodeId>> {
        let mut out: BTreeMap<IntVect, Vec<NodeId>> = BTreeMap::new();
        for slot in &self.slots {
            for (cell, &node) in self.cells().zip(slot) {
                if node >= 0 {
                    out.entry(cell).or_default().push(node);
                }
            }
        }
        out
    }
}
