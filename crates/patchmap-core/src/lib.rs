//! patchmap-core: shared types and configuration for the distribution core.
//!
//! Everything here is plain data: work items and their anchors, the
//! closed set of partitioning strategies, and the `[distribution]` TOML
//! table. No collectives are issued from this crate.

pub mod config;
pub mod strategy;
pub mod types;

pub use config::{DistributionConfig, ProximityConfig};
pub use strategy::{Strategy, StrategyParseError};
pub use types::*;
