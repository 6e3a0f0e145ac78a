// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend trait for spatial indexing implementations.

use alloc::vec::Vec;

use crate::types::Aabb2D;
use core::fmt::Debug;

/// Spatial backend abstraction used by [`FatTreeGeneric`](crate::FatTreeGeneric).
///
/// Backends only ever see the fattened boxes. Slots are dense indices owned by the tree.
pub trait Backend<T: Copy + PartialOrd + Debug> {
    /// Reserve room for `additional` more slots.
    fn reserve(&mut self, additional: usize);

    /// Insert a new slot into the spatial structure.
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>);

    /// Replace an existing slot's AABB.
    fn update(&mut self, slot: usize, aabb: Aabb2D<T>);

    /// Remove a slot from the spatial structure.
    fn remove(&mut self, slot: usize);

    /// Clear all spatial structures.
    fn clear(&mut self);

    /// Append to `out` every slot whose AABB intersects the rectangle (touching included).
    fn query_rect(&self, rect: Aabb2D<T>, out: &mut Vec<usize>);
}
