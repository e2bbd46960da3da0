//! Cluster error types.

use std::path::PathBuf;

use thiserror::Error;

use patchmap_core::Rank;

/// Errors raised by collectives and topology loading.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("process group poisoned: {0}")]
    Poisoned(String),

    #[error("root rank {root} out of range for a group of {size}")]
    RootOutOfRange { root: Rank, size: usize },

    #[error("collective contributions differ in length: rank {rank} sent {found}, expected {expected}")]
    LengthMismatch {
        rank: Rank,
        expected: usize,
        found: usize,
    },

    #[error("failed to read topology description {}: {source}", path.display())]
    TopologyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid topology description: {0}")]
    TopologyFormat(String),

    #[error("topology JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
