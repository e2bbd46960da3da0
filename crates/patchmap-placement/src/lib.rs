//! patchmap partitioning algorithms: round-robin, knapsack, SFC and proximity.
//!
//! Every function in this crate is pure and deterministic: identical
//! inputs produce identical owner arrays on every process. Load and
//! topology information arrive as plain slices (a least-loaded-first
//! worker order, a proximity order); gathering them is the caller's job.
//!
//! # Components
//!
//! - **`order`**: Stable orderings and bin-to-worker pairing
//! - **`round_robin`**: Heaviest-first cycling over least-loaded workers
//! - **`knapsack`**: Greedy worst-fit packing with swap refinement
//! - **`sfc`**: Morton ordering and contiguous run splitting
//! - **`proximity`**: Knapsack-sized SFC runs laid out along the machine topology
//! - **`plan`**: The common [`Placement`] result

pub mod knapsack;
pub mod order;
pub mod plan;
pub mod proximity;
pub mod round_robin;
pub mod sfc;

pub use knapsack::{Bin, KnapsackOptions, Packing, knapsack, knapsack_placement};
pub use order::{descending_by_weight, efficiency, identity_order, pair_by_load};
pub use plan::Placement;
pub use proximity::{ProximityInput, ProximityPlacement, proximity_placement, resolve_run_owners};
pub use round_robin::round_robin;
pub use sfc::{SfcOptions, max_power, morton_cmp, morton_order, sfc_placement, split_runs};
