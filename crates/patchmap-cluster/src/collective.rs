//! The collective-communication seam.
//!
//! Payloads are flat `i64` buffers. Callers encode their own records into
//! them; nothing here knows about loads or topology.

use patchmap_core::{NodeId, Rank};

use crate::error::{ClusterError, ClusterResult};

/// Group communication for one rank of an SPMD process group.
///
/// Every method except the accessors is a barrier across the group: each
/// rank must call it, in the same order, the same number of times.
pub trait Collective: Send + Sync {
    fn rank(&self) -> Rank;

    fn size(&self) -> usize;

    /// The rank that reads external inputs and roots broadcasts.
    fn io_rank(&self) -> Rank {
        0
    }

    /// Whether real inter-process collectives back this group.
    fn is_available(&self) -> bool;

    /// Physical node this rank runs on.
    fn node_id(&self) -> NodeId {
        self.rank() as NodeId
    }

    /// Concatenate every rank's `data` in rank order. All ranks must send
    /// the same number of values.
    fn all_gather(&self, data: &[i64]) -> ClusterResult<Vec<i64>>;

    /// Replace `data` on every rank with the root's `data`.
    fn broadcast(&self, data: &mut Vec<i64>, root: Rank) -> ClusterResult<()>;

    /// Concatenate every rank's `data` on `root`. Other ranks get `None`.
    fn gather(&self, data: &[i64], root: Rank) -> ClusterResult<Option<Vec<i64>>>;

    fn is_io_rank(&self) -> bool {
        self.rank() == self.io_rank()
    }
}

/// A group of one, used when no process group exists.
#[derive(Debug, Clone, Default)]
pub struct SingleProcess {
    node_id: NodeId,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_id(node_id: NodeId) -> Self {
        Self { node_id }
    }

    fn check_root(root: Rank) -> ClusterResult<()> {
        if root != 0 {
            return Err(ClusterError::RootOutOfRange { root, size: 1 });
        }
        Ok(())
    }
}

impl Collective for SingleProcess {
    fn rank(&self) -> Rank {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_available(&self) -> bool {
        false
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn all_gather(&self, data: &[i64]) -> ClusterResult<Vec<i64>> {
        Ok(data.to_vec())
    }

    fn broadcast(&self, _data: &mut Vec<i64>, root: Rank) -> ClusterResult<()> {
        Self::check_root(root)
    }

    fn gather(&self, data: &[i64], root: Rank) -> ClusterResult<Option<Vec<i64>>> {
        Self::check_root(root)?;
        Ok(Some(data.to_vec()))
    }
}
