//! patchmap-cluster: process-group services for the distribution core.
//!
//! Every process of an SPMD group runs the same assignment code. The few
//! facts that differ per process (resident load, physical node) are
//! exchanged through a small set of collectives behind the [`Collective`]
//! trait.
//!
//! # Architecture
//!
//! ```text
//! Collective (trait)
//!   ├── SingleProcess   rank 0 of 1, no real collectives
//!   └── LocalGroup      N ranks on N threads, shared mailbox + barrier
//!
//! LoadAggregator        all-gather of (bytes, cells) -> LoadSnapshot
//! TopologyDirectory     all-gather of node ids, IO rank reads the
//!                       TopologyGrid and broadcasts the proximity order
//! ```
//!
//! Every call that takes a `&dyn Collective` synchronizes the whole group:
//! all ranks must make the same calls in the same order.

pub mod collective;
pub mod directory;
pub mod error;
pub mod load;
pub mod local;
pub mod topology;

pub use collective::{Collective, SingleProcess};
pub use directory::TopologyDirectory;
pub use error::{ClusterError, ClusterResult};
pub use load::{LoadAggregator, LoadSnapshot, LocalUsage};
pub use local::{LocalGroup, run_group};
pub use topology::TopologyGrid;
