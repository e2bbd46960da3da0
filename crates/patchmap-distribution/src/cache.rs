//! Process-local cache of processor maps, keyed by map length (`N + 1`).
//!
//! The key is only the problem shape: a second map of an already cached
//! length is a collision, never a replacement.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{DistributionError, DistributionResult};
use crate::mapping::ProcessorMap;

/// One cache entry as seen by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStat {
    /// Live handles, the cache's own included.
    pub refs: usize,
    /// Items in the map, sentinel excluded.
    pub items: usize,
}

#[derive(Debug, Default)]
pub struct AssignmentCache {
    entries: BTreeMap<usize, Arc<ProcessorMap>>,
}

impl AssignmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, len: usize) -> Option<Arc<ProcessorMap>> {
        self.entries.get(&len).cloned()
    }

    /// Cache `map` under its full length.
    pub fn insert(&mut self, map: Arc<ProcessorMap>) -> DistributionResult<()> {
        let len = map.as_slice().len();
        if self.entries.contains_key(&len) {
            return Err(DistributionError::CacheCollision { len });
        }
        self.entries.insert(len, map);
        Ok(())
    }

    /// Drop entries that nobody outside the cache still holds. Returns the
    /// number evicted.
    pub fn flush(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, map| Arc::strong_count(map) > 1);
        let evicted = before - self.entries.len();
        debug!(evicted, kept = self.entries.len(), "flushed assignment cache");
        evicted
    }

    pub fn stats(&self) -> Vec<CacheStat> {
        self.entries
            .values()
            .map(|map| CacheStat {
                refs: Arc::strong_count(map),
                items: map.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
