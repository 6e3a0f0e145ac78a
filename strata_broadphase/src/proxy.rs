// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Proxies: tree entries for one child shape of one fixture.

use strata_index::{Aabb2D, Key};
use strata_scene::EntityId;

use crate::body::FixtureRef;

/// Generational handle of a proxy.
///
/// Ordering follows allocation slots, which is what move buffers and pair buffers iterate by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u32, u32);

impl ProxyId {
    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Which tree of a partition holds a proxy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeKind {
    /// Kinematic and dynamic bodies.
    Dynamic,
    /// Static bodies.
    Static,
}

impl TreeKind {
    /// The tree bodies of this staticness live in.
    pub fn for_static(is_static: bool) -> Self {
        if is_static { Self::Static } else { Self::Dynamic }
    }
}

/// Spatial-index entry for one child shape of one fixture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proxy {
    /// Owning fixture.
    pub fixture: FixtureRef,
    /// Child index within the fixture's shape.
    pub child: u32,
    /// Owner of the partition the proxy lives in.
    pub partition: EntityId,
    /// Tree within that partition.
    pub tree: TreeKind,
    /// Key within that tree.
    pub key: Key,
    /// Tight box in the partition's local frame.
    pub aabb: Aabb2D<f64>,
}

/// Slot arena of proxies.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProxyArena {
    slots: Vec<Option<Proxy>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl ProxyArena {
    /// Allocate a slot and build its proxy from the id it will have.
    pub(crate) fn alloc_with(&mut self, build: impl FnOnce(ProxyId) -> Proxy) -> ProxyId {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generations[idx] = self.generations[idx].saturating_add(1);
            idx
        } else {
            self.slots.push(None);
            self.generations.push(1);
            self.slots.len() - 1
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "ProxyId uses 32-bit indices by design."
        )]
        let id = ProxyId(idx as u32, self.generations[idx]);
        self.slots[idx] = Some(build(id));
        id
    }

    pub(crate) fn free(&mut self, id: ProxyId) -> Option<Proxy> {
        self.get(id)?;
        self.free_list.push(id.idx());
        self.slots[id.idx()].take()
    }

    pub(crate) fn get(&self, id: ProxyId) -> Option<&Proxy> {
        if self.generations.get(id.idx()) != Some(&id.1) {
            return None;
        }
        self.slots[id.idx()].as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ProxyId) -> Option<&mut Proxy> {
        if self.generations.get(id.idx()) != Some(&id.1) {
            return None;
        }
        self.slots[id.idx()].as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }
}
