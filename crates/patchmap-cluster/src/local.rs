//! In-process process group.
//!
//! `LocalGroup` runs N ranks as N threads of one process. Ranks exchange
//! data through a shared mailbox with one slot per rank, and every
//! collective is bracketed by two waits on a shared barrier:
//!
//! ```text
//! post own slot -> barrier -> read slots -> barrier
//! ```
//!
//! The second wait keeps a fast rank from overwriting its slot for the
//! next collective while a slow rank is still reading the current one.

use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread;

use tracing::trace;

use patchmap_core::{NodeId, Rank};

use crate::collective::Collective;
use crate::error::{ClusterError, ClusterResult};

struct Mailbox {
    slots: Mutex<Vec<Vec<i64>>>,
    barrier: Barrier,
}

/// One rank's handle on an in-process group.
pub struct LocalGroup {
    rank: Rank,
    size: usize,
    node_id: NodeId,
    io_rank: Rank,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroup")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl LocalGroup {
    /// Handles for a group of `size` ranks, each on its own node.
    pub fn new(size: usize) -> Vec<LocalGroup> {
        let node_ids: Vec<NodeId> = (0..size).map(|r| r as NodeId).collect();
        Self::with_node_ids(&node_ids)
    }

    /// Handles for a group with one rank per entry of `node_ids`.
    /// Several ranks may share a node.
    pub fn with_node_ids(node_ids: &[NodeId]) -> Vec<LocalGroup> {
        let size = node_ids.len();
        let mailbox = Arc::new(Mailbox {
            slots: Mutex::new(vec![Vec::new(); size]),
            barrier: Barrier::new(size),
        });
        node_ids
            .iter()
            .enumerate()
            .map(|(rank, &node_id)| LocalGroup {
                rank,
                size,
                node_id,
                io_rank: 0,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Move the IO rank. Every handle of the group must agree.
    pub fn with_io_rank(mut self, io_rank: Rank) -> Self {
        self.io_rank = io_rank;
        self
    }

    fn slots(&self) -> ClusterResult<MutexGuard<'_, Vec<Vec<i64>>>> {
        self.mailbox
            .slots
            .lock()
            .map_err(|_| ClusterError::Poisoned(format!("mailbox lock poisoned on rank {}", self.rank)))
    }

    fn post(&self, data: &[i64]) -> ClusterResult<()> {
        let mut slots = self.slots()?;
        slots[self.rank] = data.to_vec();
        Ok(())
    }

    fn check_root(&self, root: Rank) -> ClusterResult<()> {
        if root >= self.size {
            return Err(ClusterError::RootOutOfRange { root, size: self.size });
        }
        Ok(())
    }

    fn wait(&self) {
        self.mailbox.barrier.wait();
    }
}

fn concat(slots: &[Vec<i64>]) -> ClusterResult<Vec<i64>> {
    let expected = slots.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(expected * slots.len());
    for (rank, slot) in slots.iter().enumerate() {
        if slot.len() != expected {
            return Err(ClusterError::LengthMismatch {
                rank,
                expected,
                found: slot.len(),
            });
        }
        out.extend_from_slice(slot);
    }
    Ok(out)
}

impl Collective for LocalGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn io_rank(&self) -> Rank {
        self.io_rank
    }

    fn is_available(&self) -> bool {
        true
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn all_gather(&self, data: &[i64]) -> ClusterResult<Vec<i64>> {
        self.post(data)?;
        self.wait();
        let result = concat(&self.slots()?);
        self.wait();
        trace!(rank = self.rank, values = data.len(), "all_gather");
        result
    }

    fn broadcast(&self, data: &mut Vec<i64>, root: Rank) -> ClusterResult<()> {
        self.check_root(root)?;
        if self.rank == root {
            self.post(data)?;
        }
        self.wait();
        if self.rank != root {
            *data = self.slots()?[root].clone();
        }
        self.wait();
        trace!(rank = self.rank, root, values = data.len(), "broadcast");
        Ok(())
    }

    fn gather(&self, data: &[i64], root: Rank) -> ClusterResult<Option<Vec<i64>>> {
        self.check_root(root)?;
        self.post(data)?;
        self.wait();
        let result = if self.rank == root {
            concat(&self.slots()?).map(Some)
        } else {
            Ok(None)
        };
        self.wait();
        result
    }
}

/// Run `f` once per member, each on its own thread, and collect the
/// results in rank order.
///
/// A panicking rank leaves the others blocked at the next barrier, so `f`
/// should not panic while the group is still communicating.
pub fn run_group<T, F>(members: Vec<LocalGroup>, f: F) -> ClusterResult<Vec<T>>
where
    T: Send,
    F: Fn(LocalGroup) -> T + Sync,
{
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| scope.spawn(move || f(member)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .map_err(|_| ClusterError::Poisoned(format!("rank {rank} panicked")))
            })
            .collect()
    })
}
