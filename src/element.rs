use std::sync::atomic::{AtomicI32, Ordering};

use nalgebra::Vector3;

/// Bin index of an element that no node currently holds.
pub const UNINDEXED: i32 = -1;

/// The capabilities an element needs to take part in an [`Octree`](crate::Octree).
///
/// Elements are shared with their real owner through an `Arc`, so the cached bin index is written
/// through `&self`. Only the octree calls [`set_bin_index`](OctreeElement::set_bin_index).
pub trait OctreeElement {
    /// Representative location used to place the element.
    fn position_group(&self) -> Vector3<f32>;

    /// Bounding radius used for placement decisions.
    fn bin_radius(&self) -> f32;

    /// Slot of this element in its node's element list, or [`UNINDEXED`].
    fn bin_index(&self) -> i32;

    fn set_bin_index(&self, index: i32);
}

/// Atomic storage for a bin index, starting out as [`UNINDEXED`].
#[derive(Debug)]
pub struct BinIndex(AtomicI32);

impl BinIndex {
    pub fn new() -> Self {
        Self(AtomicI32::new(UNINDEXED))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, index: i32) {
        self.0.store(index, Ordering::Relaxed);
    }

    pub fn is_indexed(&self) -> bool {
        self.get() != UNINDEXED
    }
}

impl Default for BinIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BinIndex {
    /// A clone is a different element as far as the octree is concerned, so it starts unindexed.
    fn clone(&self) -> Self {
        Self::new()
    }
}
