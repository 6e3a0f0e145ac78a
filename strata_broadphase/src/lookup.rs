// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lookup maintenance: keeping registrations in step with lifecycle changes.
//!
//! World edits push [`LookupEvent`]s onto a FIFO queue. The queue is drained in order at a
//! phase boundary ([`Simulation::flush_lookup`](crate::Simulation::flush_lookup), which also
//! runs at the start of every step), so the index never observes half-applied edits and the
//! processing order is deterministic.

use strata_scene::EntityId;
use tracing::trace;

use crate::body::BodyKind;
use crate::broadphase::{Broadphase, WorldMut};
use crate::partition::PartitionKind;

/// A lifecycle change the broad phase must react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupEvent {
    /// The entity was created.
    Initialized(EntityId),
    /// The entity's local pose changed.
    Moved(EntityId),
    /// The entity was given a new parent outside of container transitions.
    Reparented {
        /// Affected entity.
        entity: EntityId,
        /// Parent before the change.
        old_parent: Option<EntityId>,
        /// Parent after the change.
        new_parent: Option<EntityId>,
    },
    /// The entity was placed in a container.
    ContainerInserted {
        /// Affected entity.
        entity: EntityId,
        /// The container.
        container: EntityId,
    },
    /// The entity was taken out of a container.
    ContainerRemoved {
        /// Affected entity.
        entity: EntityId,
        /// The container it left.
        container: EntityId,
    },
    /// The body's collidable flag changed.
    CollisionChanged {
        /// Affected body.
        entity: EntityId,
        /// New flag.
        can_collide: bool,
    },
    /// The body's kind changed.
    BodyKindChanged {
        /// Affected body.
        entity: EntityId,
        /// Kind before the change.
        old: BodyKind,
        /// Kind after the change.
        new: BodyKind,
    },
}

impl Broadphase {
    pub(crate) fn push_event(&mut self, event: LookupEvent) {
        self.events.push_back(event);
    }

    /// Drain the event queue in order.
    pub(crate) fn flush_events(&mut self, w: &mut WorldMut<'_>) {
        self.resolver.clear();
        while let Some(event) = self.events.pop_front() {
            self.apply(w, event);
        }
    }

    fn apply(&mut self, w: &mut WorldMut<'_>, event: LookupEvent) {
        trace!(?event, "lookup event");
        match event {
            LookupEvent::Initialized(e) => {
                if !w.scene.is_alive(e) || w.scene.is_contained(e) {
                    return;
                }
                // Partition owners register only their own fixtures, which `sync` handles.
                let mover = w.scene.mover(e);
                self.sync(w, e, mover);
            }
            LookupEvent::Moved(e) => {
                if !w.scene.is_alive(e) {
                    return;
                }
                if let Some(p) = self.partitions.get(&e) {
                    if p.kind() == PartitionKind::Grid {
                        self.moved_partitions.insert(e);
                    }
                    return;
                }
                if w.scene.is_contained(e) {
                    return;
                }
                self.sync_subtree(w, e);
            }
            LookupEvent::Reparented { entity, .. } => {
                self.resolver.clear();
                if !w.scene.is_alive(entity) {
                    return;
                }
                if let Some(p) = self.partitions.get(&entity) {
                    if p.kind() == PartitionKind::Grid {
                        self.moved_partitions.insert(entity);
                    }
                    return;
                }
                if w.scene.is_contained(entity) {
                    return;
                }
                // Partition unchanged: the frame changed, so bounds are refreshed in place.
                // Partition changed: the subtree leaves its old partition for the new one.
                self.sync_subtree(w, entity);
            }
            LookupEvent::ContainerInserted { entity, .. }
            | LookupEvent::ContainerRemoved { entity, .. } => {
                self.resolver.clear();
                if w.scene.is_alive(entity) {
                    self.sync_subtree(w, entity);
                }
            }
            LookupEvent::CollisionChanged { entity, .. } => {
                if w.scene.is_alive(entity) {
                    let mover = w.scene.mover(entity);
                    self.sync(w, entity, mover);
                }
            }
            LookupEvent::BodyKindChanged { entity, old, new } => {
                if !w.scene.is_alive(entity) || old.is_static() == new.is_static() {
                    return;
                }
                if self.registrations.contains_key(&entity) {
                    self.switch_static(w, entity, new.is_static());
                } else {
                    let mover = w.scene.mover(entity);
                    self.sync(w, entity, mover);
                }
            }
        }
    }
}
