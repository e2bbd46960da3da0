//! Shared types used across patchmap crates.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Number of spatial dimensions carried by an [`IntVect`].
///
/// Lower-dimensional problems leave the trailing axes at zero, which does
/// not change the Morton order of the populated axes.
pub const SPACE_DIM: usize = 3;

/// Rank of a worker process within its process group.
pub type Rank = usize;

/// Identifier of a physical node (a host slot in the machine topology).
pub type NodeId = i64;

/// Integer lattice coordinate, the lower corner of a grid patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntVect(pub [i64; SPACE_DIM]);

impl IntVect {
    pub const ZERO: IntVect = IntVect([0; SPACE_DIM]);

    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        IntVect([x, y, z])
    }

    /// Build from up to `SPACE_DIM` leading components, padding with zero.
    pub fn from_slice(coords: &[i64]) -> Self {
        let mut iv = [0; SPACE_DIM];
        for (dst, src) in iv.iter_mut().zip(coords) {
            *dst = *src;
        }
        IntVect(iv)
    }

    /// Largest component.
    pub fn max_component(&self) -> i64 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// Componentwise `self <= other`.
    pub fn all_le(&self, other: &IntVect) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }

    pub fn as_array(&self) -> [i64; SPACE_DIM] {
        self.0
    }
}

impl Index<usize> for IntVect {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}

impl IndexMut<usize> for IntVect {
    fn index_mut(&mut self, axis: usize) -> &mut i64 {
        &mut self.0[axis]
    }
}

impl From<[i64; SPACE_DIM]> for IntVect {
    fn from(v: [i64; SPACE_DIM]) -> Self {
        IntVect(v)
    }
}

impl fmt::Display for IntVect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.0[0], self.0[1], self.0[2])
    }
}

/// A weighted, spatially anchored unit of assignable load.
///
/// `index` records the item's position in the caller's ordered input. The
/// distribution code works on slice position: it breaks ties and picks the
/// owner slot, so callers pass items sorted by `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: usize,
    /// Nonnegative cost proxy, e.g. a cell or byte count.
    pub weight: u64,
    /// Lower-corner coordinate. Only the space-filling-curve strategies read it.
    pub anchor: IntVect,
}

impl WorkItem {
    pub fn new(index: usize, weight: u64, anchor: IntVect) -> Self {
        Self { index, weight, anchor }
    }
}

/// On-disk form of a work item, without the positional index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub weight: u64,
    #[serde(default)]
    pub anchor: IntVect,
}

/// Attach positional indices to a list of item specs.
pub fn index_items(specs: &[ItemSpec]) -> Vec<WorkItem> {
    specs
        .iter()
        .enumerate()
        .map(|(i, s)| WorkItem::new(i, s.weight, s.anchor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_pads_with_zero() {
        assert_eq!(IntVect::from_slice(&[4, 7]), IntVect::new(4, 7, 0));
        assert_eq!(IntVect::from_slice(&[1, 2, 3, 9]), IntVect::new(1, 2, 3));
    }

    #[test]
    fn max_component_and_all_le() {
        let a = IntVect::new(3, -1, 8);
        assert_eq!(a.max_component(), 8);
        assert!(IntVect::new(0, -2, 8).all_le(&a));
        assert!(!IntVect::new(4, 0, 0).all_le(&a));
    }

    #[test]
    fn item_spec_defaults_anchor() {
        let specs: Vec<ItemSpec> = toml::from_str::<Wrapper>("items = [{ weight = 5 }]")
            .unwrap()
            .items;
        let items = index_items(&specs);
        assert_eq!(items[0], WorkItem::new(0, 5, IntVect::ZERO));
    }

    #[derive(Deserialize)]
    struct Wrapper {
        items: Vec<ItemSpec>,
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(IntVect::new(1, 2, 3).to_string(), "(1,2,3)");
    }
}
