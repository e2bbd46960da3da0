//! Distribution error types.

use thiserror::Error;

use patchmap_cluster::ClusterError;
use patchmap_core::Rank;

/// Errors raised while building or looking up processor maps.
///
/// Fatal variants mean the ownership map can no longer be trusted; a
/// caller should stop the simulation rather than continue.
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("a processor map of length {len} is already cached")]
    CacheCollision { len: usize },

    #[error("cached processor map belongs to rank {found}, caller is rank {expected}")]
    ForeignAssignment { expected: Rank, found: Rank },

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("no work items to distribute")]
    NoItems,

    #[error("worker count must be at least one")]
    NoWorkers,

    #[error("{weights} weights but {anchors} anchors")]
    LengthMismatch { weights: usize, anchors: usize },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("collective failed: {0}")]
    Cluster(#[from] ClusterError),
}

impl DistributionError {
    /// Whether the group can no longer agree on data ownership.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CacheCollision { .. } | Self::ForeignAssignment { .. } | Self::InvalidAssignment(_) | Self::Cluster(_)
        )
    }
}

pub type DistributionResult<T> = Result<T, DistributionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(DistributionError::CacheCollision { len: 5 }.is_fatal());
        assert!(DistributionError::InvalidAssignment("owner 9".into()).is_fatal());
        assert!(DistributionError::Cluster(ClusterError::Poisoned("x".into())).is_fatal());
        assert!(!DistributionError::NoItems.is_fatal());
        assert!(!DistributionError::UnknownStrategy("zigzag".into()).is_fatal());
        assert!(!DistributionError::LengthMismatch { weights: 3, anchors: 2 }.is_fatal());
    }

    #[test]
    fn messages_name_the_problem() {
        let e = DistributionError::ForeignAssignment { expected: 1, found: 0 };
        assert_eq!(e.to_string(), "cached processor map belongs to rank 0, caller is rank 1");
    }
}
