// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bodies and fixtures.

use strata_scene::EntityId;

use crate::proxy::ProxyId;
use crate::shape::Shape;

/// How a body moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyKind {
    /// Never moves under simulation. Lives in static trees; never paired with another static.
    Static,
    /// Moved by the caller, not by forces.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

impl BodyKind {
    /// Whether this kind lives in the static tree.
    pub fn is_static(self) -> bool {
        self == Self::Static
    }
}

/// Per-entity body state the broad phase needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    /// Body kind.
    pub kind: BodyKind,
    /// Whether the body takes part in collision at all. Non-collidable bodies are tracked as
    /// sundries.
    pub can_collide: bool,
    /// Whether the body is awake. Sleeping bodies keep their proxies but skip simulation work.
    pub awake: bool,
}

impl Body {
    /// A collidable, awake body of `kind`.
    pub fn new(kind: BodyKind) -> Self {
        Self {
            kind,
            can_collide: true,
            awake: true,
        }
    }
}

/// Layer/mask filter.
///
/// Two fixtures may collide when either one's layer intersects the other's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionFilter {
    /// Layers this fixture is on.
    pub layer: u32,
    /// Layers this fixture collides with.
    pub mask: u32,
}

impl CollisionFilter {
    /// Filter that collides with nothing.
    pub const NONE: Self = Self { layer: 0, mask: 0 };

    /// Whether fixtures with these filters may collide.
    pub fn should_collide(&self, other: &Self) -> bool {
        (self.layer & other.mask) != 0 || (other.layer & self.mask) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self { layer: 1, mask: 1 }
    }
}

/// Identifies one fixture: its body entity and its index within that body's fixture list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixtureRef {
    /// Owning body entity.
    pub entity: EntityId,
    /// Index into the body's fixtures.
    pub index: u32,
}

/// A collision shape attached to a body.
#[derive(Clone, Debug)]
pub struct Fixture {
    /// Shape in the body's local frame.
    pub shape: Shape,
    /// Collision filter.
    pub filter: CollisionFilter,
    /// Whether contacts from this fixture produce a physical response.
    pub hard: bool,
    pub(crate) proxies: Vec<ProxyId>,
}

impl Fixture {
    /// A hard fixture with the default filter.
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            filter: CollisionFilter::default(),
            hard: true,
            proxies: Vec::new(),
        }
    }

    /// Builder: set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Builder: set hardness.
    #[must_use]
    pub fn with_hard(mut self, hard: bool) -> Self {
        self.hard = hard;
        self
    }

    /// Proxies currently registered for this fixture, one per shape child.
    pub fn proxies(&self) -> &[ProxyId] {
        &self.proxies
    }
}

/// All fixtures of one body, indexed by [`FixtureRef::index`].
pub type FixtureSet = Vec<Fixture>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_symmetric_either_way() {
        let walls = CollisionFilter {
            layer: 0b01,
            mask: 0b00,
        };
        let mobs = CollisionFilter {
            layer: 0b10,
            mask: 0b01,
        };
        let ghosts = CollisionFilter {
            layer: 0b100,
            mask: 0b100,
        };
        assert!(walls.should_collide(&mobs));
        assert!(mobs.should_collide(&walls));
        assert!(!walls.should_collide(&walls));
        assert!(!ghosts.should_collide(&mobs));
        assert!(!CollisionFilter::NONE.should_collide(&CollisionFilter::default()));
    }
}
