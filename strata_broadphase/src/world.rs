// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The simulation facade: hierarchy, bodies, fixtures, and the broad phase behind one API.
//!
//! Hierarchy and body edits take effect on the scene and the component stores at once, and
//! queue a [`LookupEvent`] for the broad phase. Queued events are applied by
//! [`Simulation::flush_lookup`], which [`Simulation::step`] calls before pairing.
//!
//! A few operations need the index to be current before they can act, and flush first:
//! adding bodies and fixtures, despawning, and area queries.

use kurbo::{Point, Rect};
use strata_scene::{ComponentStore, EntityFlags, EntityId, LocalTransform, Scene};
use tracing::debug;

use crate::body::{Body, BodyKind, CollisionFilter, Fixture, FixtureRef, FixtureSet};
use crate::broadphase::{Broadphase, WorldMut, fixture};
use crate::config::BroadphaseConfig;
use crate::contacts::ContactManager;
use crate::error::BroadphaseError;
use crate::lookup::LookupEvent;
use crate::pairs::PassStats;
use crate::partition::PartitionKind;

/// Owns a scene, its bodies and fixtures, and the broad phase indexing them.
#[derive(Debug)]
pub struct Simulation {
    scene: Scene,
    bodies: ComponentStore<Body>,
    fixtures: ComponentStore<FixtureSet>,
    broadphase: Broadphase,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// Create an empty simulation with the default configuration.
    pub fn new() -> Self {
        Self::from_config(BroadphaseConfig::default())
    }

    /// Create an empty simulation with `config`, after validating it.
    pub fn with_config(config: BroadphaseConfig) -> Result<Self, BroadphaseError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: BroadphaseConfig) -> Self {
        Self {
            scene: Scene::new(),
            bodies: ComponentStore::new(),
            fixtures: ComponentStore::new(),
            broadphase: Broadphase::new(config),
        }
    }

    fn split(&mut self) -> (&mut Broadphase, WorldMut<'_>) {
        (
            &mut self.broadphase,
            WorldMut {
                scene: &self.scene,
                bodies: &mut self.bodies,
                fixtures: &mut self.fixtures,
            },
        )
    }

    fn check_alive(&self, e: EntityId) -> Result<(), BroadphaseError> {
        if self.scene.is_alive(e) {
            Ok(())
        } else {
            Err(BroadphaseError::UnknownEntity(e))
        }
    }

    fn check_map(&self, map: EntityId) -> Result<(), BroadphaseError> {
        self.check_alive(map)?;
        match self.broadphase.partition(map) {
            Some(p) if p.kind() == PartitionKind::Map => Ok(()),
            _ => Err(BroadphaseError::NoMap(map)),
        }
    }

    // --- accessors ---

    /// The entity hierarchy.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The broad phase, for inspection.
    pub fn broadphase(&self) -> &Broadphase {
        &self.broadphase
    }

    /// Active configuration.
    pub fn config(&self) -> &BroadphaseConfig {
        self.broadphase.config()
    }

    /// Body of `e`, if it has one.
    pub fn body(&self, e: EntityId) -> Option<&Body> {
        self.bodies.get(e)
    }

    /// Fixtures of `e`, in [`FixtureRef::index`] order.
    pub fn fixtures(&self, e: EntityId) -> &[Fixture] {
        self.fixtures.get(e).map_or(&[], Vec::as_slice)
    }

    /// The fixture `r` names.
    pub fn fixture(&self, r: FixtureRef) -> Option<&Fixture> {
        fixture(&self.fixtures, r)
    }

    // --- hierarchy ---

    /// Spawn a root entity that owns a map partition.
    pub fn spawn_map(&mut self, local: LocalTransform) -> EntityId {
        let map = self.scene.spawn(None, local);
        self.scene.set_flags(map, EntityFlags::MAP, true);
        self.broadphase.create_partition(map, PartitionKind::Map);
        self.broadphase.push_event(LookupEvent::Initialized(map));
        debug!(?map, "spawned map");
        map
    }

    /// Spawn an entity under `parent` that owns a grid partition.
    ///
    /// A new grid counts as moved, so its first pair pass sweeps whatever it was placed over.
    pub fn spawn_grid(
        &mut self,
        parent: EntityId,
        local: LocalTransform,
    ) -> Result<EntityId, BroadphaseError> {
        self.check_alive(parent)?;
        if self.broadphase.map_of(&self.scene, parent).is_none() {
            return Err(BroadphaseError::NoMap(parent));
        }
        let grid = self.scene.spawn(Some(parent), local);
        self.scene.set_flags(grid, EntityFlags::GRID, true);
        self.broadphase.create_partition(grid, PartitionKind::Grid);
        self.broadphase.moved_partitions.insert(grid);
        self.broadphase.push_event(LookupEvent::Initialized(grid));
        debug!(?grid, ?parent, "spawned grid");
        Ok(grid)
    }

    /// Spawn a plain entity under `parent`, or detached.
    pub fn spawn(
        &mut self,
        parent: Option<EntityId>,
        local: LocalTransform,
    ) -> Result<EntityId, BroadphaseError> {
        if let Some(p) = parent {
            self.check_alive(p)?;
        }
        let e = self.scene.spawn(parent, local);
        self.broadphase.push_event(LookupEvent::Initialized(e));
        Ok(e)
    }

    /// Despawn `e` and its subtree. Returns the removed ids in pre-order.
    ///
    /// The broad phase forgets the subtree at once, move buffers included, and any partition
    /// it owned is dropped.
    pub fn despawn(&mut self, e: EntityId) -> Result<Vec<EntityId>, BroadphaseError> {
        self.check_alive(e)?;
        self.flush_lookup();
        let subtree = self.scene.subtree(e);
        let (bp, mut w) = self.split();
        bp.despawn(&mut w, &subtree);
        let removed = self.scene.despawn(e);
        for id in &removed {
            self.bodies.remove(*id);
            self.fixtures.remove(*id);
        }
        debug!(entity = ?e, count = removed.len(), "despawned");
        Ok(removed)
    }

    /// Set `e`'s position relative to its parent.
    pub fn set_local_position(
        &mut self,
        e: EntityId,
        position: Point,
    ) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        self.scene.set_local_position(e, position);
        self.broadphase.push_event(LookupEvent::Moved(e));
        Ok(())
    }

    /// Set `e`'s rotation relative to its parent, in radians.
    pub fn set_local_rotation(&mut self, e: EntityId, rotation: f64) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        self.scene.set_local_rotation(e, rotation);
        self.broadphase.push_event(LookupEvent::Moved(e));
        Ok(())
    }

    /// Set `e`'s whole local pose.
    pub fn set_local_transform(
        &mut self,
        e: EntityId,
        local: LocalTransform,
    ) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        self.scene.set_local_transform(e, local);
        self.broadphase.push_event(LookupEvent::Moved(e));
        Ok(())
    }

    /// Re-parent `e` under `parent` (or detach it), keeping its local pose.
    ///
    /// Contained entities move through [`remove_from_container`](Self::remove_from_container)
    /// instead.
    pub fn set_parent(
        &mut self,
        e: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        if let Some(p) = parent {
            self.check_alive(p)?;
        }
        if self.scene.is_contained(e) {
            return Err(BroadphaseError::Contained(e));
        }
        let old_parent = self.scene.parent(e);
        if old_parent == parent {
            return Ok(());
        }
        if !self.scene.set_parent(e, parent) {
            return Err(BroadphaseError::Cycle(e));
        }
        self.broadphase.push_event(LookupEvent::Reparented {
            entity: e,
            old_parent,
            new_parent: parent,
        });
        Ok(())
    }

    /// Put `e` inside `container`. It leaves the index; its descendants take the container's
    /// bounds.
    pub fn insert_into_container(
        &mut self,
        e: EntityId,
        container: EntityId,
    ) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        self.check_alive(container)?;
        if self.scene.is_contained(e) {
            return Err(BroadphaseError::Contained(e));
        }
        if !self.scene.insert_into_container(e, container) {
            return Err(BroadphaseError::Cycle(e));
        }
        self.broadphase
            .push_event(LookupEvent::ContainerInserted { entity: e, container });
        Ok(())
    }

    /// Take `e` out of its container, dropping it at the container's pose. Returns the
    /// container.
    pub fn remove_from_container(&mut self, e: EntityId) -> Result<EntityId, BroadphaseError> {
        self.check_alive(e)?;
        let container = self
            .scene
            .remove_from_container(e)
            .ok_or(BroadphaseError::NotContained(e))?;
        self.broadphase
            .push_event(LookupEvent::ContainerRemoved { entity: e, container });
        Ok(container)
    }

    // --- bodies and fixtures ---

    /// Re-register `e` from scratch after its body or fixture list changed.
    fn reregister(&mut self, e: EntityId) {
        let mover = self.scene.mover(e);
        let (bp, mut w) = self.split();
        bp.resolver.clear();
        bp.deregister(&mut w, e);
        bp.register(&mut w, e, mover);
    }

    /// Give `e` a body.
    pub fn add_body(&mut self, e: EntityId, body: Body) -> Result<(), BroadphaseError> {
        self.check_alive(e)?;
        if self.bodies.contains(e) {
            return Err(BroadphaseError::AlreadyABody(e));
        }
        self.flush_lookup();
        self.bodies.insert(e, body);
        self.reregister(e);
        Ok(())
    }

    /// Attach a fixture to `e`. The entity must live under a map.
    pub fn add_fixture(
        &mut self,
        e: EntityId,
        mut fixture: Fixture,
    ) -> Result<FixtureRef, BroadphaseError> {
        self.check_alive(e)?;
        if self.broadphase.map_of(&self.scene, e).is_none() {
            return Err(BroadphaseError::NoMap(e));
        }
        self.flush_lookup();
        fixture.proxies.clear();
        let index = match self.fixtures.get_mut(e) {
            Some(set) => {
                set.push(fixture);
                set.len() - 1
            }
            None => {
                self.fixtures.insert(e, vec![fixture]);
                0
            }
        };
        self.reregister(e);
        // Descendants riding inside `e` take its bounds, and a partition owner's bounds grew.
        if !self.scene.children(e).is_empty() || self.broadphase.partition(e).is_some() {
            self.broadphase.push_event(LookupEvent::Moved(e));
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "fixture counts are far below u32::MAX."
        )]
        let index = index as u32;
        Ok(FixtureRef { entity: e, index })
    }

    fn body_mut(&mut self, e: EntityId) -> Result<&mut Body, BroadphaseError> {
        self.check_alive(e)?;
        self.bodies
            .get_mut(e)
            .ok_or(BroadphaseError::NotABody(e))
    }

    /// Turn collision on or off for `e`'s body. Non-collidable bodies move to sundries.
    pub fn set_can_collide(&mut self, e: EntityId, can_collide: bool) -> Result<(), BroadphaseError> {
        let body = self.body_mut(e)?;
        if body.can_collide != can_collide {
            body.can_collide = can_collide;
            self.broadphase
                .push_event(LookupEvent::CollisionChanged { entity: e, can_collide });
        }
        Ok(())
    }

    /// Change the kind of `e`'s body.
    pub fn set_body_kind(&mut self, e: EntityId, kind: BodyKind) -> Result<(), BroadphaseError> {
        let body = self.body_mut(e)?;
        let old = body.kind;
        if old != kind {
            body.kind = kind;
            self.broadphase.push_event(LookupEvent::BodyKindChanged {
                entity: e,
                old,
                new: kind,
            });
        }
        Ok(())
    }

    /// Put `e`'s body to sleep or wake it.
    pub fn set_awake(&mut self, e: EntityId, awake: bool) -> Result<(), BroadphaseError> {
        self.body_mut(e)?.awake = awake;
        Ok(())
    }

    /// Replace a fixture's filter. The fixture is touched so its pairs are re-evaluated.
    pub fn set_filter(
        &mut self,
        r: FixtureRef,
        filter: CollisionFilter,
    ) -> Result<(), BroadphaseError> {
        let f = self
            .fixtures
            .get_mut(r.entity)
            .and_then(|set| set.get_mut(r.index as usize))
            .ok_or(BroadphaseError::NoSuchFixture(r))?;
        f.filter = filter;
        self.touch_fixture(r)
    }

    /// Put every proxy of a fixture in its map's move buffer.
    pub fn touch_fixture(&mut self, r: FixtureRef) -> Result<(), BroadphaseError> {
        if fixture(&self.fixtures, r).is_none() {
            return Err(BroadphaseError::NoSuchFixture(r));
        }
        let (bp, w) = self.split();
        bp.touch_fixture(&w, r);
        Ok(())
    }

    // --- phases ---

    /// Apply every queued lookup event, in order.
    pub fn flush_lookup(&mut self) {
        if self.broadphase.events.is_empty() {
            return;
        }
        let (bp, mut w) = self.split();
        bp.flush_events(&mut w);
    }

    /// Flush lookup events, then run a pair pass over every map.
    pub fn step<C: ContactManager + ?Sized>(&mut self, contacts: &mut C) -> PassStats {
        self.flush_lookup();
        let maps: Vec<EntityId> = self
            .broadphase
            .partitions()
            .filter(|p| p.kind() == PartitionKind::Map)
            .map(|p| p.owner())
            .collect();
        let mut stats = PassStats::default();
        for map in maps {
            let (bp, mut w) = self.split();
            stats += bp.find_new_contacts(&mut w, map, contacts);
        }
        stats
    }

    /// Flush lookup events, then run a pair pass over `map` alone.
    pub fn find_new_contacts<C: ContactManager + ?Sized>(
        &mut self,
        map: EntityId,
        contacts: &mut C,
    ) -> Result<PassStats, BroadphaseError> {
        self.check_map(map)?;
        self.flush_lookup();
        let (bp, mut w) = self.split();
        Ok(bp.find_new_contacts(&mut w, map, contacts))
    }

    /// Validate and apply a new configuration. Margins apply to later structural updates.
    pub fn set_config(&mut self, config: BroadphaseConfig) -> Result<(), BroadphaseError> {
        config.validate()?;
        self.broadphase.set_config(config);
        debug!(?config, "configuration replaced");
        Ok(())
    }

    /// Entities on `map` whose registered bounds intersect `rect` (world space), sundries
    /// included. Flushes lookup events first.
    pub fn entities_intersecting(
        &mut self,
        map: EntityId,
        rect: Rect,
    ) -> Result<Vec<EntityId>, BroadphaseError> {
        self.check_map(map)?;
        self.flush_lookup();
        Ok(self.broadphase.entities_intersecting(&self.scene, map, rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{ContactSet, PairOrigin};
    use crate::error::ConfigError;
    use crate::partition::Placement;
    use crate::proxy::TreeKind;
    use crate::shape::Shape;
    use strata_index::Aabb2D;

    fn body_at(sim: &mut Simulation, parent: EntityId, x: f64, y: f64, kind: BodyKind) -> EntityId {
        let e = sim.spawn(Some(parent), LocalTransform::at(x, y)).unwrap();
        sim.add_body(e, Body::new(kind)).unwrap();
        sim.add_fixture(e, Fixture::new(Shape::square(0.5))).unwrap();
        e
    }

    fn fx(e: EntityId) -> FixtureRef {
        FixtureRef { entity: e, index: 0 }
    }

    fn proxy_box(sim: &Simulation, e: EntityId) -> Aabb2D<f64> {
        let id = sim.fixtures(e)[0].proxies()[0];
        sim.broadphase().proxy(id).unwrap().aabb
    }

    fn tree_len(sim: &Simulation, owner: EntityId, tree: TreeKind) -> usize {
        sim.broadphase().partition(owner).unwrap().tree(tree).len()
    }

    #[test]
    fn direct_overlap_pairs_once() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 0.5, 0.5, BodyKind::Dynamic);

        let mut contacts = ContactSet::new();
        let stats = sim.step(&mut contacts);
        assert_eq!(stats.pairs, 1);
        assert_eq!(contacts.len(), 1);
        assert!(contacts.contains_fixtures(fx(a), fx(b)));
        assert_eq!(
            contacts.get((fx(b), 0), (fx(a), 0)).unwrap().origin,
            PairOrigin::Generic
        );
    }

    #[test]
    fn touching_edges_never_pair() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 1.0, 0.0, BodyKind::Dynamic);
        let c = body_at(&mut sim, map, 0.0, 0.99, BodyKind::Dynamic);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(!contacts.contains_fixtures(fx(a), fx(b)));
        assert!(contacts.contains_fixtures(fx(a), fx(c)));
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn static_pairs_are_never_generated() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        body_at(&mut sim, map, 0.0, 0.0, BodyKind::Static);
        body_at(&mut sim, map, 0.2, 0.0, BodyKind::Static);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.is_empty());
    }

    #[test]
    fn touched_pairs_refresh_without_duplicating() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 0.5, 0.0, BodyKind::Kinematic);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        // Nothing moved: an empty pass.
        assert_eq!(sim.step(&mut contacts).pairs, 0);

        sim.touch_fixture(fx(a)).unwrap();
        assert_eq!(sim.step(&mut contacts).pairs, 1);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts.get((fx(a), 0), (fx(b), 0)).unwrap().refreshes, 1);
    }

    #[test]
    fn small_moves_do_not_restructure() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        sim.step(&mut ContactSet::new());
        let before = sim.broadphase().partition(map).unwrap().mutations();

        sim.set_local_position(a, Point::new(0.03125, 0.0)).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().partition(map).unwrap().mutations(), before);
        let id = sim.fixtures(a)[0].proxies()[0];
        assert!(sim.broadphase().in_move_buffer(map, id));
        assert_eq!(proxy_box(&sim, a), Aabb2D::new(-0.46875, -0.5, 0.53125, 0.5));

        sim.set_local_position(a, Point::new(3.0, 0.0)).unwrap();
        sim.flush_lookup();
        assert!(sim.broadphase().partition(map).unwrap().mutations() > before);
    }

    #[test]
    fn registrations_follow_the_hierarchy() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::at(20.0, 0.0)).unwrap();
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, grid, 1.0, 0.0, BodyKind::Dynamic);
        let c = body_at(&mut sim, b, 0.0, 1.0, BodyKind::Dynamic);

        let check = |sim: &Simulation| {
            for e in sim.scene().iter() {
                if !sim.body(e).is_some_and(|b| b.can_collide) || sim.broadphase().partition(e).is_some() {
                    continue;
                }
                let expected = core::iter::once(e)
                    .chain(sim.scene().ancestors(e))
                    .find(|x| {
                        sim.scene()
                            .flags(*x)
                            .intersects(EntityFlags::MAP | EntityFlags::GRID)
                    });
                let reg = sim.broadphase().registration(e);
                assert_eq!(reg.map(|r| r.partition), expected, "{e:?}");
                for f in sim.fixtures(e) {
                    for id in f.proxies() {
                        assert_eq!(Some(sim.broadphase().proxy(*id).unwrap().partition), expected);
                    }
                }
            }
        };

        sim.flush_lookup();
        check(&sim);

        sim.set_parent(a, Some(grid)).unwrap();
        sim.set_parent(b, Some(map)).unwrap();
        sim.flush_lookup();
        check(&sim);
        assert_eq!(tree_len(&sim, grid, TreeKind::Dynamic), 1);
        assert_eq!(tree_len(&sim, map, TreeKind::Dynamic), 2);
        // `c` rode along with `b` into the map's frame.
        assert_eq!(proxy_box(&sim, c), Aabb2D::new(0.5, 0.5, 1.5, 1.5));

        sim.set_parent(b, None).unwrap();
        sim.flush_lookup();
        check(&sim);
        assert_eq!(sim.broadphase().registration(c), None);
    }

    #[test]
    fn container_round_trip() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let crate_ = sim.spawn(Some(map), LocalTransform::at(5.0, 0.0)).unwrap();
        sim.add_body(crate_, Body::new(BodyKind::Dynamic)).unwrap();
        sim.add_fixture(crate_, Fixture::new(Shape::square(1.0))).unwrap();
        let e = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let child = body_at(&mut sim, e, 0.25, 0.0, BodyKind::Dynamic);
        sim.flush_lookup();
        assert_eq!(sim.broadphase().proxy_count(), 3);

        sim.insert_into_container(e, crate_).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().registration(e), None);
        assert!(sim.fixtures(e)[0].proxies().is_empty());
        // The child stays indexed, standing in with the crate's bounds.
        assert_eq!(proxy_box(&sim, child), Aabb2D::new(4.0, -1.0, 6.0, 1.0));
        assert_eq!(
            sim.set_parent(e, Some(map)),
            Err(BroadphaseError::Contained(e))
        );

        assert_eq!(sim.remove_from_container(e), Ok(crate_));
        sim.flush_lookup();
        assert_eq!(proxy_box(&sim, e), Aabb2D::new(4.5, -0.5, 5.5, 0.5));
        assert_eq!(proxy_box(&sim, child), Aabb2D::new(4.75, -0.5, 5.75, 0.5));
        assert_eq!(sim.broadphase().proxy_count(), 3);
    }

    #[test]
    fn moving_grid_sweeps_stationary_bodies() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        sim.add_body(grid, Body::new(BodyKind::Kinematic)).unwrap();
        sim.add_fixture(grid, Fixture::new(Shape::square(0.5))).unwrap();
        let b = body_at(&mut sim, map, 10.0, 0.0, BodyKind::Dynamic);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.is_empty());

        sim.set_local_position(grid, Point::new(10.0, 0.0)).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().moved_partitions().collect::<Vec<_>>(), [grid]);
        let stats = sim.step(&mut contacts);
        assert_eq!(stats.swept, 1);
        assert!(contacts.contains_fixtures(fx(grid), fx(b)));
        assert_eq!(sim.broadphase().moved_partitions().count(), 0);
    }

    #[test]
    fn grid_sweep_wakes_sleeping_bodies() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        sim.add_body(grid, Body::new(BodyKind::Kinematic)).unwrap();
        sim.add_fixture(grid, Fixture::new(Shape::square(0.5))).unwrap();
        let b = body_at(&mut sim, map, 10.0, 0.0, BodyKind::Dynamic);
        let far = body_at(&mut sim, map, 10.0, 5.0, BodyKind::Dynamic);
        sim.step(&mut ContactSet::new());
        sim.set_awake(b, false).unwrap();
        sim.set_awake(far, false).unwrap();

        sim.set_local_position(grid, Point::new(10.0, 0.0)).unwrap();
        let mut contacts = ContactSet::new();
        let stats = sim.step(&mut contacts);
        assert!(contacts.contains_fixtures(fx(grid), fx(b)));
        assert!(sim.body(b).unwrap().awake);
        assert_eq!(stats.woken, 1);
        // Out of reach of the grid: still asleep.
        assert!(!sim.body(far).unwrap().awake);
    }

    #[test]
    fn soft_fixtures_do_not_wake() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        sim.add_body(grid, Body::new(BodyKind::Kinematic)).unwrap();
        sim.add_fixture(grid, Fixture::new(Shape::square(0.5)).with_hard(false))
            .unwrap();
        let b = body_at(&mut sim, map, 10.0, 0.0, BodyKind::Dynamic);
        sim.step(&mut ContactSet::new());
        sim.set_awake(b, false).unwrap();

        sim.set_local_position(grid, Point::new(10.0, 0.0)).unwrap();
        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.contains_fixtures(fx(grid), fx(b)));
        assert!(!sim.body(b).unwrap().awake);
    }

    #[test]
    fn bodies_inside_grids_pair_with_map_bodies() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::at(4.0, 0.0)).unwrap();
        let on_grid = body_at(&mut sim, grid, -1.0, 0.0, BodyKind::Dynamic);
        let on_map = body_at(&mut sim, map, 3.25, 0.0, BodyKind::Dynamic);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.contains_fixtures(fx(on_grid), fx(on_map)));
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn kind_switch_moves_between_trees() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        sim.flush_lookup();
        assert_eq!(tree_len(&sim, map, TreeKind::Dynamic), 1);

        sim.set_body_kind(a, BodyKind::Static).unwrap();
        sim.flush_lookup();
        assert_eq!(tree_len(&sim, map, TreeKind::Dynamic), 0);
        assert_eq!(tree_len(&sim, map, TreeKind::Static), 1);
        let id = sim.fixtures(a)[0].proxies()[0];
        assert_eq!(sim.broadphase().proxy(id).unwrap().tree, TreeKind::Static);

        sim.set_body_kind(a, BodyKind::Kinematic).unwrap();
        sim.set_body_kind(a, BodyKind::Dynamic).unwrap();
        sim.flush_lookup();
        assert_eq!(tree_len(&sim, map, TreeKind::Dynamic), 1);
        assert_eq!(tree_len(&sim, map, TreeKind::Static), 0);
    }

    #[test]
    fn non_collidable_bodies_become_sundries() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let marker = sim.spawn(Some(map), LocalTransform::at(2.0, 0.0)).unwrap();

        sim.set_can_collide(a, false).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().proxy_count(), 0);
        assert_eq!(
            sim.broadphase().registration(a).map(|r| r.placement),
            Some(Placement::Sundries { is_static: false })
        );
        assert_eq!(
            sim.broadphase().registration(marker).map(|r| r.placement),
            Some(Placement::Sundries { is_static: true })
        );
        let partition = sim.broadphase().partition(map).unwrap();
        assert_eq!(
            partition.sundries(false).get(&a),
            Some(&Aabb2D::new(-0.5, -0.5, 0.5, 0.5))
        );
        assert_eq!(
            partition.sundries(true).get(&marker),
            Some(&Aabb2D::point(2.0, 0.0))
        );

        let hits = sim
            .entities_intersecting(map, Rect::new(-1.0, -1.0, 2.5, 1.0))
            .unwrap();
        assert_eq!(hits, [a, marker]);

        sim.set_can_collide(a, true).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().proxy_count(), 1);
        assert!(sim.broadphase().partition(map).unwrap().sundries(false).is_empty());
    }

    #[test]
    fn grids_pair_through_the_chunk_scanner() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let g1 = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        let g2 = sim.spawn_grid(map, LocalTransform::at(3.0, 0.0)).unwrap();
        // One grid's fixture sits in its dynamic tree, the other's in its static tree.
        for (g, kind) in [(g1, BodyKind::Dynamic), (g2, BodyKind::Static)] {
            sim.add_body(g, Body::new(kind)).unwrap();
            sim.add_fixture(g, Fixture::new(Shape::square(0.5))).unwrap();
        }
        assert_eq!(tree_len(&sim, g1, TreeKind::Dynamic), 1);
        assert_eq!(tree_len(&sim, g2, TreeKind::Static), 1);
        let mut contacts = ContactSet::new();
        assert_eq!(sim.step(&mut contacts).grid_pairs, 0);

        sim.set_local_position(g2, Point::new(0.5, 0.0)).unwrap();
        let stats = sim.step(&mut contacts);
        assert_eq!(stats.grid_pairs, 1);
        assert_eq!(stats.pairs, 0);
        assert_eq!(
            contacts.get((fx(g1), 0), (fx(g2), 0)).unwrap().origin,
            PairOrigin::Grid
        );
    }

    #[test]
    fn dynamic_grid_pairs_with_static_bodies_it_drives_onto() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        sim.add_body(grid, Body::new(BodyKind::Dynamic)).unwrap();
        sim.add_fixture(grid, Fixture::new(Shape::square(0.5))).unwrap();
        let wall = body_at(&mut sim, map, 10.0, 0.0, BodyKind::Static);
        sim.flush_lookup();
        let id = sim.fixtures(grid)[0].proxies()[0];
        assert_eq!(sim.broadphase().proxy(id).unwrap().tree, TreeKind::Dynamic);
        assert_eq!(tree_len(&sim, grid, TreeKind::Static), 0);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.is_empty());

        sim.set_local_position(grid, Point::new(10.0, 0.0)).unwrap();
        let stats = sim.step(&mut contacts);
        assert_eq!(stats.swept, 1);
        assert!(contacts.contains_fixtures(fx(grid), fx(wall)));

        // The owner's fixtures follow its kind like any other body's.
        sim.set_body_kind(grid, BodyKind::Static).unwrap();
        sim.flush_lookup();
        assert_eq!(tree_len(&sim, grid, TreeKind::Dynamic), 0);
        assert_eq!(tree_len(&sim, grid, TreeKind::Static), 1);
        assert_eq!(sim.broadphase().proxy(id).unwrap().tree, TreeKind::Static);
        assert_eq!(
            sim.broadphase().registration(grid).map(|r| r.placement),
            Some(Placement::Own { collidable: true })
        );
    }

    #[test]
    fn chain_fixtures_get_a_proxy_per_edge() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let wall = sim.spawn(Some(map), LocalTransform::IDENTITY).unwrap();
        sim.add_body(wall, Body::new(BodyKind::Static)).unwrap();
        let chain = Shape::Chain(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 2.0),
            Point::new(8.0, 0.0),
            Point::new(12.0, 2.0),
        ]);
        sim.add_fixture(wall, Fixture::new(chain)).unwrap();
        let ball = body_at(&mut sim, map, 6.0, 1.0, BodyKind::Dynamic);
        sim.flush_lookup();

        let proxies = sim.fixtures(wall)[0].proxies().to_vec();
        assert_eq!(proxies.len(), 3);
        assert_eq!(tree_len(&sim, map, TreeKind::Static), 3);
        let children: Vec<u32> = proxies
            .iter()
            .map(|id| sim.broadphase().proxy(*id).unwrap().child)
            .collect();
        assert_eq!(children, [0, 1, 2]);
        assert_eq!(
            sim.broadphase().proxy(proxies[1]).unwrap().aabb,
            Aabb2D::new(4.0, 0.0, 8.0, 2.0)
        );

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert_eq!(contacts.len(), 1);
        assert!(contacts.get((fx(ball), 0), (fx(wall), 1)).is_some());
        assert!(contacts.get((fx(ball), 0), (fx(wall), 0)).is_none());

        sim.set_can_collide(wall, false).unwrap();
        sim.flush_lookup();
        assert!(sim.fixtures(wall)[0].proxies().is_empty());
        assert_eq!(tree_len(&sim, map, TreeKind::Static), 0);
        assert!(proxies.iter().all(|id| sim.broadphase().proxy(*id).is_none()));
        assert_eq!(sim.broadphase().proxy_count(), 1);
    }

    #[test]
    fn buffered_proxies_without_a_partition_are_skipped() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::at(20.0, 0.0)).unwrap();
        let rider = body_at(&mut sim, grid, 0.0, 0.0, BodyKind::Dynamic);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 0.5, 0.0, BodyKind::Dynamic);
        sim.flush_lookup();
        let orphan = sim.fixtures(rider)[0].proxies()[0];
        assert!(sim.broadphase().in_move_buffer(map, orphan));

        // The grid's record vanishes while its rider's proxy is still buffered.
        sim.broadphase.partitions.remove(&grid);
        let mut contacts = ContactSet::new();
        let stats = sim.step(&mut contacts);
        assert_eq!(stats.buffered, 2);
        assert!(contacts.contains_fixtures(fx(a), fx(b)));
        assert!(!contacts.touches(rider));
        assert_eq!(sim.broadphase().move_buffer(map).count(), 0);
    }

    #[test]
    fn dropping_a_populated_partition_frees_its_proxies() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::at(20.0, 0.0)).unwrap();
        let rider = body_at(&mut sim, grid, 0.0, 0.0, BodyKind::Dynamic);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 0.5, 0.0, BodyKind::Dynamic);
        sim.flush_lookup();
        let orphan = sim.fixtures(rider)[0].proxies()[0];

        let (bp, mut w) = sim.split();
        bp.drop_partition(&mut w, grid);
        assert!(sim.broadphase().partition(grid).is_none());
        assert!(sim.broadphase().proxy(orphan).is_none());
        assert!(sim.fixtures(rider)[0].proxies().is_empty());
        assert_eq!(sim.broadphase().registration(rider), None);
        assert!(!sim.broadphase().in_move_buffer(map, orphan));
        assert_eq!(sim.broadphase().moved_partitions().count(), 0);

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert_eq!(contacts.len(), 1);
        assert!(contacts.contains_fixtures(fx(a), fx(b)));
    }

    #[test]
    fn despawn_purges_the_index() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let grid = sim.spawn_grid(map, LocalTransform::IDENTITY).unwrap();
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, grid, 0.0, 0.0, BodyKind::Dynamic);
        sim.flush_lookup();
        let id = sim.fixtures(a)[0].proxies()[0];
        assert!(sim.broadphase().in_move_buffer(map, id));

        assert_eq!(sim.despawn(a), Ok(vec![a]));
        assert!(!sim.broadphase().in_move_buffer(map, id));
        assert!(sim.broadphase().proxy(id).is_none());
        assert_eq!(sim.broadphase().registration(a), None);
        assert_eq!(sim.body(a), None);

        assert_eq!(sim.despawn(grid), Ok(vec![grid, b]));
        assert!(sim.broadphase().partition(grid).is_none());
        assert_eq!(sim.broadphase().proxy_count(), 0);
        assert_eq!(sim.broadphase().move_buffer(map).count(), 0);
        assert_eq!(sim.despawn(a), Err(BroadphaseError::UnknownEntity(a)));
    }

    #[test]
    fn filters_gate_pairs_and_touch_proxies() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let b = body_at(&mut sim, map, 0.5, 0.0, BodyKind::Dynamic);
        sim.set_filter(fx(a), CollisionFilter::NONE).unwrap();

        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        assert!(contacts.is_empty());

        sim.set_filter(fx(a), CollisionFilter { layer: 2, mask: 1 })
            .unwrap();
        let id = sim.fixtures(a)[0].proxies()[0];
        assert!(sim.broadphase().in_move_buffer(map, id));
        sim.step(&mut contacts);
        assert!(contacts.contains_fixtures(fx(a), fx(b)));

        let missing = FixtureRef { entity: a, index: 3 };
        assert_eq!(
            sim.touch_fixture(missing),
            Err(BroadphaseError::NoSuchFixture(missing))
        );
    }

    #[test]
    fn config_is_validated_and_applied() {
        let bad = BroadphaseConfig {
            fat_margin: -1.0,
            ..BroadphaseConfig::default()
        };
        assert_eq!(
            Simulation::with_config(bad).err(),
            Some(BroadphaseError::Config(ConfigError::InvalidMargin {
                name: "fat_margin",
                value: -1.0,
            }))
        );

        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        sim.set_config(BroadphaseConfig {
            fat_margin: 1.0,
            ..BroadphaseConfig::default()
        })
        .unwrap();
        assert_eq!(sim.config().fat_margin, 1.0);
        let tree = sim.broadphase().partition(map).unwrap().tree(TreeKind::Dynamic);
        assert_eq!(tree.margin(), 1.0);

        // Escapes the old fat box, re-fattened with the new margin.
        sim.set_local_position(a, Point::new(2.0, 0.0)).unwrap();
        sim.flush_lookup();
        let before = sim.broadphase().partition(map).unwrap().mutations();
        sim.set_local_position(a, Point::new(2.5, 0.0)).unwrap();
        sim.flush_lookup();
        assert_eq!(sim.broadphase().partition(map).unwrap().mutations(), before);
    }

    #[test]
    fn invalid_operations_are_rejected() {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let loose = sim.spawn(None, LocalTransform::IDENTITY).unwrap();
        assert_eq!(
            sim.add_fixture(loose, Fixture::new(Shape::square(1.0))),
            Err(BroadphaseError::NoMap(loose))
        );
        assert_eq!(
            sim.spawn_grid(loose, LocalTransform::IDENTITY),
            Err(BroadphaseError::NoMap(loose))
        );
        assert_eq!(
            sim.entities_intersecting(loose, Rect::new(0.0, 0.0, 1.0, 1.0)),
            Err(BroadphaseError::NoMap(loose))
        );

        let a = body_at(&mut sim, map, 0.0, 0.0, BodyKind::Dynamic);
        let child = sim.spawn(Some(a), LocalTransform::IDENTITY).unwrap();
        assert_eq!(
            sim.add_body(a, Body::new(BodyKind::Static)),
            Err(BroadphaseError::AlreadyABody(a))
        );
        assert_eq!(
            sim.set_body_kind(child, BodyKind::Static),
            Err(BroadphaseError::NotABody(child))
        );
        assert_eq!(sim.set_parent(a, Some(child)), Err(BroadphaseError::Cycle(a)));
        assert_eq!(
            sim.insert_into_container(a, child),
            Err(BroadphaseError::Cycle(a))
        );
        assert_eq!(
            sim.remove_from_container(a),
            Err(BroadphaseError::NotContained(a))
        );
    }
}
