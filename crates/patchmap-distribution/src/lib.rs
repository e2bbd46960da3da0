//! patchmap-distribution: who owns which grid patch.
//!
//! A [`DistributionManager`] turns a list of weighted, anchored work items
//! into a [`DistributionMapping`] (owner rank per item) using one of four
//! strategies, and remembers the result per problem shape so that a
//! recurring grid count costs nothing.
//!
//! # Architecture
//!
//! ```text
//! DistributionManager
//!   ├── Strategy (RoundRobin | Knapsack | SFC | PFC)
//!   ├── AssignmentCache (len -> Arc<ProcessorMap>)
//!   ├── LoadAggregator (all-gather of resident bytes and cells)
//!   └── TopologyDirectory (built on the first PFC miss)
//! ```

pub mod cache;
pub mod diagnostics;
pub mod error;
pub mod manager;
pub mod mapping;

pub use cache::{AssignmentCache, CacheStat};
pub use diagnostics::{LoadReport, PlacementReport, gather_load_report};
pub use error::{DistributionError, DistributionResult};
pub use manager::DistributionManager;
pub use mapping::{DistributionMapping, ProcessorMap};
