// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the scene: entity identifiers, flags, and local transforms.

use kurbo::{Affine, Point};

/// Identifier for an entity in the scene.
///
/// This is a small, copyable handle that stays stable across updates but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On spawn, a fresh slot is allocated with generation `1`.
/// - On despawn, the slot is freed; any existing `EntityId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `EntityId`.
///
/// The derived ordering (slot first, then generation) is total and is what ordered maps keyed by
/// entity iterate by, which keeps downstream processing deterministic.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) u32, pub(crate) u32);

impl EntityId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    /// Slot index of this entity. Stable for the entity's lifetime; reused after despawn.
    pub const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

bitflags::bitflags! {
    /// Entity role and state flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntityFlags: u8 {
        /// Entity is a map: the root of a top-level simulation space.
        const MAP          = 0b0000_0001;
        /// Entity is a grid: an independently moving sub-space with its own frame.
        const GRID         = 0b0000_0010;
        /// Entity sits directly inside a container (its parent).
        const IN_CONTAINER = 0b0000_0100;
    }
}

/// Local pose of an entity relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalTransform {
    /// Position in the parent's frame.
    pub position: Point,
    /// Rotation in radians, counter-clockwise.
    pub rotation: f64,
}

impl LocalTransform {
    /// Identity pose.
    pub const IDENTITY: Self = Self {
        position: Point::ORIGIN,
        rotation: 0.0,
    };

    /// Pose at `(x, y)` without rotation.
    pub const fn at(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            rotation: 0.0,
        }
    }

    /// The same pose, rotated to `rotation`.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Affine mapping local coordinates into the parent's frame (rotate, then translate).
    pub fn affine(&self) -> Affine {
        Affine::translate(self.position.to_vec2()) * Affine::rotate(self.rotation)
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
