//! Processor maps and the shared handle callers hold.
//!
//! A [`ProcessorMap`] is `N` owner ranks followed by one sentinel: the rank
//! of the process that built or retrieved it. [`DistributionMapping`] wraps
//! it in an `Arc` so the cache and every caller share one copy.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use patchmap_core::Rank;

use crate::error::{DistributionError, DistributionResult};

/// Owner per item plus a trailing sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorMap {
    entries: Vec<Rank>,
}

impl ProcessorMap {
    pub fn new(mut owners: Vec<Rank>, sentinel: Rank) -> Self {
        owners.push(sentinel);
        Self { entries: owners }
    }

    /// Wrap a full sequence whose last entry is already the sentinel.
    pub fn from_entries(entries: Vec<Rank>) -> DistributionResult<Self> {
        if entries.is_empty() {
            return Err(DistributionError::InvalidAssignment(
                "processor map has no sentinel".to_string(),
            ));
        }
        Ok(Self { entries })
    }

    /// Item count, sentinel excluded.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owners(&self) -> &[Rank] {
        &self.entries[..self.len()]
    }

    pub fn sentinel(&self) -> Rank {
        self.entries[self.len()]
    }

    /// The full sequence, sentinel included.
    pub fn as_slice(&self) -> &[Rank] {
        &self.entries
    }

    /// Check that every owner lies in `0..workers`.
    pub fn validate(&self, workers: usize) -> DistributionResult<()> {
        if let Some((item, &owner)) = self.owners().iter().enumerate().find(|(_, o)| **o >= workers) {
            return Err(DistributionError::InvalidAssignment(format!(
                "item {item} assigned to rank {owner}, only {workers} workers"
            )));
        }
        Ok(())
    }
}

/// Shared, immutable view of a processor map.
#[derive(Debug, Clone)]
pub struct DistributionMapping {
    map: Arc<ProcessorMap>,
}

impl DistributionMapping {
    pub fn new(map: ProcessorMap) -> Self {
        Self { map: Arc::new(map) }
    }

    pub fn from_arc(map: Arc<ProcessorMap>) -> Self {
        Self { map }
    }

    /// A mapping of `a`'s items followed by `b`'s, owned by `my_rank`.
    pub fn concat(a: &DistributionMapping, b: &DistributionMapping, my_rank: Rank) -> Self {
        let owners = a.owners().iter().chain(b.owners()).copied().collect();
        Self::new(ProcessorMap::new(owners, my_rank))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Owner of item `i`. Panics if `i` is out of range, like slice indexing.
    pub fn owner(&self, i: usize) -> Rank {
        self.map.owners()[i]
    }

    pub fn owners(&self) -> &[Rank] {
        self.map.owners()
    }

    pub fn sentinel(&self) -> Rank {
        self.map.sentinel()
    }

    /// The full processor map, sentinel included.
    pub fn processor_map(&self) -> &[Rank] {
        self.map.as_slice()
    }

    pub fn shared(&self) -> &Arc<ProcessorMap> {
        &self.map
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &DistributionMapping) -> bool {
        Arc::ptr_eq(&self.map, &other.map)
    }

    /// Handles alive on this map, the cache's included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.map)
    }

    /// SHA-256 of the owner array, sentinel excluded. Equal on every rank
    /// that computed the same assignment.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for &owner in self.owners() {
            hasher.update((owner as u64).to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Total weight per worker under this mapping.
    pub fn worker_loads(&self, weights: &[u64], workers: usize) -> Vec<u64> {
        let mut loads = vec![0u64; workers];
        for (&owner, &w) in self.owners().iter().zip(weights) {
            if let Some(slot) = loads.get_mut(owner) {
                *slot += w;
            }
        }
        loads
    }
}

impl PartialEq for DistributionMapping {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.map.as_slice() == other.map.as_slice()
    }
}

impl Eq for DistributionMapping {}

impl Index<usize> for DistributionMapping {
    type Output = Rank;

    fn index(&self, i: usize) -> &Rank {
        &self.map.owners()[i]
    }
}

impl fmt::Display for DistributionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, owner) in self.owners().iter().enumerate() {
            writeln!(f, "{i} = {owner}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(owners: &[Rank], sentinel: Rank) -> DistributionMapping {
        DistributionMapping::new(ProcessorMap::new(owners.to_vec(), sentinel))
    }

    #[test]
    fn sentinel_trails_the_owners() {
        let m = mapping(&[1, 0, 1], 3);
        assert_eq!(m.len(), 3);
        assert_eq!(m.owners(), &[1, 0, 1]);
        assert_eq!(m.sentinel(), 3);
        assert_eq!(m.processor_map(), &[1, 0, 1, 3]);
        assert_eq!(m[2], 1);
        assert_eq!(m.owner(1), 0);
    }

    #[test]
    fn dump_omits_sentinel() {
        let m = mapping(&[2, 0], 1);
        assert_eq!(m.to_string(), "0 = 2\n1 = 0\n");
    }

    #[test]
    fn equality_by_identity_or_content() {
        let a = mapping(&[0, 1], 0);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_eq!(a.ref_count(), 2);

        assert_eq!(a, mapping(&[0, 1], 0));
        assert_ne!(a, mapping(&[0, 1], 1));
        assert_ne!(a, mapping(&[1, 0], 0));
    }

    #[test]
    fn fingerprint_ignores_sentinel() {
        let a = mapping(&[0, 1, 1], 0);
        let b = mapping(&[0, 1, 1], 1);
        let c = mapping(&[1, 1, 0], 0);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn concat_appends_items() {
        let a = mapping(&[0, 1], 0);
        let b = mapping(&[1], 0);
        let c = DistributionMapping::concat(&a, &b, 2);
        assert_eq!(c.processor_map(), &[0, 1, 1, 2]);
    }

    #[test]
    fn loads_sum_weights_per_worker() {
        let m = mapping(&[1, 0, 1], 0);
        assert_eq!(m.worker_loads(&[5, 3, 2], 2), vec![3, 7]);
    }

    #[test]
    fn validation_catches_out_of_range_owner() {
        let map = ProcessorMap::new(vec![0, 4, 1], 0);
        assert!(map.validate(5).is_ok());
        let err = map.validate(3).unwrap_err();
        assert!(err.is_fatal());
        assert!(ProcessorMap::from_entries(Vec::new()).is_err());
    }
}
