// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core scene implementation: slots, hierarchy edits, transforms, containment.

use alloc::vec::Vec;
use kurbo::{Affine, Point};

use crate::types::{EntityFlags, EntityId, LocalTransform};

/// Depth past which ancestor walks stop.
///
/// Re-parenting refuses to create cycles, so a walk this deep means the hierarchy is corrupt.
pub const MAX_DEPTH: usize = 4096;

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// Entity hierarchy with local transforms.
///
/// Entities live in an id-indexed slot array; each slot records its parent, its children (in
/// attachment order), its local pose, and its flags.
pub struct Scene {
    nodes: Vec<Option<Node>>, // slots
    generations: Vec<u32>,    // last generation per slot (persists across frees)
    free_list: Vec<usize>,
}

impl core::fmt::Debug for Scene {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Scene")
            .field("slots_total", &total)
            .field("entities_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct Node {
    generation: u32,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    local: LocalTransform,
    flags: EntityFlags,
}

/// Iterator over the strict ancestors of an entity, nearest first.
///
/// Returned by [`Scene::ancestors`].
#[derive(Clone, Debug)]
pub struct Ancestors<'a> {
    scene: &'a Scene,
    next: Option<EntityId>,
    depth: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let id = self.next?;
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.next = None;
            return None;
        }
        self.next = self.scene.parent(id);
        Some(id)
    }
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Spawn an entity under `parent` (or as a root if `None` or if `parent` is stale).
    pub fn spawn(&mut self, parent: Option<EntityId>, local: LocalTransform) -> EntityId {
        let node = |generation| Node {
            generation,
            parent: None,
            children: Vec::new(),
            local,
            flags: EntityFlags::empty(),
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(node(generation));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "EntityId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(node(generation)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "EntityId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        let id = EntityId::new(idx, generation);
        if let Some(p) = parent
            && self.is_alive(p)
        {
            self.link_parent(id, p);
        }
        id
    }

    /// Despawn an entity and its whole subtree.
    ///
    /// Returns the removed ids in pre-order (the entity first).
    pub fn despawn(&mut self, id: EntityId) -> Vec<EntityId> {
        if !self.is_alive(id) {
            return Vec::new();
        }
        let removed = self.subtree(id);
        self.unlink_parent(id);
        for e in &removed {
            self.nodes[e.idx()] = None;
            self.free_list.push(e.idx());
        }
        removed
    }

    /// The entity and all of its descendants, in pre-order.
    pub fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        if self.is_alive(id) {
            stack.push(id);
        }
        while let Some(e) = stack.pop() {
            out.push(e);
            stack.extend(self.children(e).iter().rev().copied());
        }
        out
    }

    /// Returns true if `id` refers to a live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Whether the scene has no live entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "EntityId uses 32-bit indices by design."
            )]
            n.as_ref().map(|n| EntityId::new(i as u32, n.generation))
        })
    }

    /// Parent of `id`, if any.
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.node(id)?.parent
    }

    /// Children of `id` in attachment order. Empty for stale ids.
    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Local pose of `id`.
    pub fn local(&self, id: EntityId) -> Option<LocalTransform> {
        self.node(id).map(|n| n.local)
    }

    /// Flags of `id`. Empty for stale ids.
    pub fn flags(&self, id: EntityId) -> EntityFlags {
        self.node(id).map_or(EntityFlags::empty(), |n| n.flags)
    }

    /// Set or clear `flags` on `id`.
    pub fn set_flags(&mut self, id: EntityId, flags: EntityFlags, value: bool) {
        if let Some(n) = self.node_mut(id) {
            n.flags.set(flags, value);
        }
    }

    /// Update the local position. Returns false for stale ids.
    pub fn set_local_position(&mut self, id: EntityId, position: Point) -> bool {
        self.node_mut(id).map(|n| n.local.position = position).is_some()
    }

    /// Update the local rotation (radians). Returns false for stale ids.
    pub fn set_local_rotation(&mut self, id: EntityId, rotation: f64) -> bool {
        self.node_mut(id).map(|n| n.local.rotation = rotation).is_some()
    }

    /// Replace the local pose. Returns false for stale ids.
    pub fn set_local_transform(&mut self, id: EntityId, local: LocalTransform) -> bool {
        self.node_mut(id).map(|n| n.local = local).is_some()
    }

    /// Reparent `id` under `new_parent` (or detach it if `None`), keeping its local pose.
    ///
    /// Returns false, changing nothing, if either id is stale or if the move would create a
    /// cycle.
    pub fn set_parent(&mut self, id: EntityId, new_parent: Option<EntityId>) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        if let Some(p) = new_parent
            && (!self.is_alive(p) || p == id || self.is_ancestor_of(id, p))
        {
            return false;
        }
        self.unlink_parent(id);
        if let Some(p) = new_parent {
            self.link_parent(id, p);
        }
        true
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: EntityId, id: EntityId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: EntityId) -> Ancestors<'_> {
        Ancestors {
            scene: self,
            next: self.parent(id),
            depth: 0,
        }
    }

    /// Affine from `id`'s local frame to world space.
    pub fn world_affine(&self, id: EntityId) -> Affine {
        self.relative_affine(id, None)
    }

    /// World position of `id`'s origin.
    pub fn world_position(&self, id: EntityId) -> Point {
        self.world_affine(id) * Point::ORIGIN
    }

    /// World rotation of `id` (sum of the rotations along its chain).
    pub fn world_rotation(&self, id: EntityId) -> f64 {
        let own = self.local(id).map_or(0.0, |l| l.rotation);
        own + self
            .ancestors(id)
            .filter_map(|a| self.local(a))
            .map(|l| l.rotation)
            .sum::<f64>()
    }

    /// Affine from `id`'s local frame into `frame`'s local frame (world space if `None`).
    ///
    /// When `frame` is an ancestor only the locals between the two are composed; otherwise the
    /// result goes through world space.
    pub fn relative_affine(&self, id: EntityId, frame: Option<EntityId>) -> Affine {
        if Some(id) == frame {
            return Affine::IDENTITY;
        }
        let mut acc = self.local(id).map_or(Affine::IDENTITY, |l| l.affine());
        for a in self.ancestors(id) {
            if Some(a) == frame {
                return acc;
            }
            if let Some(l) = self.local(a) {
                acc = l.affine() * acc;
            }
        }
        match frame {
            Some(f) => self.world_affine(f).inverse() * acc,
            None => acc,
        }
    }

    /// Whether `id` sits directly inside a container.
    pub fn is_contained(&self, id: EntityId) -> bool {
        self.flags(id).contains(EntityFlags::IN_CONTAINER)
    }

    /// The outer-most container holding any strict ancestor of `id`.
    ///
    /// An entity whose ancestor is contained is hidden inside that container; its bounds are the
    /// container's bounds.
    pub fn outermost_container(&self, id: EntityId) -> Option<EntityId> {
        let mut outer = None;
        for a in self.ancestors(id) {
            if self.is_contained(a) {
                outer = self.parent(a);
            }
        }
        outer
    }

    /// The entity whose pose stands in for `id`: its outer-most container if an ancestor is
    /// contained, `id` itself otherwise.
    pub fn mover(&self, id: EntityId) -> EntityId {
        self.outermost_container(id).unwrap_or(id)
    }

    /// Place `id` directly inside `container`.
    ///
    /// The entity is re-parented under the container at the identity pose and flagged
    /// [`EntityFlags::IN_CONTAINER`]. Returns false, changing nothing, if either id is stale,
    /// if `id` is already contained, or if `container` lies within `id`'s subtree.
    pub fn insert_into_container(&mut self, id: EntityId, container: EntityId) -> bool {
        if self.is_contained(id) || !self.set_parent(id, Some(container)) {
            return false;
        }
        if let Some(n) = self.node_mut(id) {
            n.local = LocalTransform::IDENTITY;
            n.flags.insert(EntityFlags::IN_CONTAINER);
        }
        true
    }

    /// Take `id` out of its container, dropping it at the container's pose in the container's
    /// parent frame. Returns the container, or `None` if `id` was not contained.
    pub fn remove_from_container(&mut self, id: EntityId) -> Option<EntityId> {
        if !self.is_contained(id) {
            return None;
        }
        let container = self.parent(id)?;
        let pose = self.local(container)?;
        let outer = self.parent(container);
        self.unlink_parent(id);
        if let Some(p) = outer {
            self.link_parent(id, p);
        }
        if let Some(n) = self.node_mut(id) {
            n.local = pose;
            n.flags.remove(EntityFlags::IN_CONTAINER);
        }
        Some(container)
    }

    // --- internals ---

    fn node(&self, id: EntityId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    fn node_mut(&mut self, id: EntityId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn link_parent(&mut self, id: EntityId, parent: EntityId) {
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
        }
    }

    fn unlink_parent(&mut self, id: EntityId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }
}
