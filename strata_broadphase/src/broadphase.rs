// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad-phase state: partitions, proxies, registrations, and move buffers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use kurbo::Rect;
use strata_index::Aabb2D;
use strata_scene::{ComponentStore, EntityId, Scene};
use tracing::{error, trace};

use crate::aabb::{entity_aabb, proxy_aabb, rect_to_aabb, transform_aabb};
use crate::body::{Body, Fixture, FixtureRef, FixtureSet};
use crate::config::BroadphaseConfig;
use crate::lookup::LookupEvent;
use crate::partition::{Partition, PartitionKind, Placement, Registration};
use crate::pool::PairBufferPool;
use crate::proxy::{Proxy, ProxyArena, ProxyId, TreeKind};
use crate::resolver::PartitionResolver;

/// Mutable view of the components the broad phase reads and writes.
pub(crate) struct WorldMut<'a> {
    pub(crate) scene: &'a Scene,
    pub(crate) bodies: &'a mut ComponentStore<Body>,
    pub(crate) fixtures: &'a mut ComponentStore<FixtureSet>,
}

pub(crate) fn fixture(fixtures: &ComponentStore<FixtureSet>, r: FixtureRef) -> Option<&Fixture> {
    fixtures.get(r.entity)?.get(r.index as usize)
}

/// Spatial index of every map: partitions and their trees, proxies, registrations, move
/// buffers, and the pending lookup events.
#[derive(Debug)]
pub struct Broadphase {
    pub(crate) config: BroadphaseConfig,
    pub(crate) partitions: BTreeMap<EntityId, Partition>,
    pub(crate) proxies: ProxyArena,
    pub(crate) registrations: BTreeMap<EntityId, Registration>,
    pub(crate) move_buffers: BTreeMap<EntityId, BTreeMap<ProxyId, Aabb2D<f64>>>,
    pub(crate) moved_partitions: BTreeSet<EntityId>,
    pub(crate) resolver: PartitionResolver,
    pub(crate) pool: PairBufferPool,
    pub(crate) events: VecDeque<LookupEvent>,
}

impl Broadphase {
    pub(crate) fn new(config: BroadphaseConfig) -> Self {
        Self {
            config,
            partitions: BTreeMap::new(),
            proxies: ProxyArena::default(),
            registrations: BTreeMap::new(),
            move_buffers: BTreeMap::new(),
            moved_partitions: BTreeSet::new(),
            resolver: PartitionResolver::default(),
            pool: PairBufferPool::default(),
            events: VecDeque::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &BroadphaseConfig {
        &self.config
    }

    /// Partition owned by `owner`.
    pub fn partition(&self, owner: EntityId) -> Option<&Partition> {
        self.partitions.get(&owner)
    }

    /// Every partition, by owner.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Where `e` is registered, if anywhere.
    pub fn registration(&self, e: EntityId) -> Option<Registration> {
        self.registrations.get(&e).copied()
    }

    /// Proxy data for `id`.
    pub fn proxy(&self, id: ProxyId) -> Option<&Proxy> {
        self.proxies.get(id)
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Proxies waiting in `map`'s move buffer, with the world box recorded when last touched.
    pub fn move_buffer(&self, map: EntityId) -> impl Iterator<Item = (ProxyId, Aabb2D<f64>)> + '_ {
        self.move_buffers
            .get(&map)
            .into_iter()
            .flat_map(|b| b.iter().map(|(id, aabb)| (*id, *aabb)))
    }

    /// Whether `proxy` waits in `map`'s move buffer.
    pub fn in_move_buffer(&self, map: EntityId, proxy: ProxyId) -> bool {
        self.move_buffers
            .get(&map)
            .is_some_and(|b| b.contains_key(&proxy))
    }

    /// Grids that moved since the last pair pass over their map.
    pub fn moved_partitions(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.moved_partitions.iter().copied()
    }

    /// Number of lookup events waiting to be processed.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    // --- partitions ---

    pub(crate) fn create_partition(&mut self, owner: EntityId, kind: PartitionKind) {
        self.partitions
            .insert(owner, Partition::new(owner, kind, &self.config));
        self.resolver.clear();
    }

    /// Drop the partition owned by `owner`, freeing any proxy still inside it.
    pub(crate) fn drop_partition(&mut self, w: &mut WorldMut<'_>, owner: EntityId) {
        let Some(partition) = self.partitions.remove(&owner) else {
            return;
        };
        let leftover: Vec<ProxyId> = partition.proxy_ids().collect();
        if !leftover.is_empty() {
            error!(partition = ?owner, count = leftover.len(), "dropping partition with live proxies");
        }
        for id in leftover {
            if let Some(proxy) = self.proxies.free(id)
                && let Some(set) = w.fixtures.get_mut(proxy.fixture.entity)
                && let Some(f) = set.get_mut(proxy.fixture.index as usize)
            {
                f.proxies.retain(|p| *p != id);
            }
            self.purge_move_buffers(id);
        }
        self.registrations.retain(|_, r| r.partition != owner);
        self.move_buffers.remove(&owner);
        self.moved_partitions.remove(&owner);
        self.resolver.clear();
    }

    pub(crate) fn set_config(&mut self, config: BroadphaseConfig) {
        for p in self.partitions.values_mut() {
            p.set_margin(config.fat_margin);
        }
        self.config = config;
    }

    /// Nearest partition owner at or above `e`.
    pub(crate) fn resolve(&mut self, scene: &Scene, e: EntityId) -> Option<EntityId> {
        self.resolver.resolve(scene, &self.partitions, e)
    }

    /// The map whose space `e` lives in: the nearest map at or above it.
    pub(crate) fn map_of(&self, scene: &Scene, e: EntityId) -> Option<EntityId> {
        core::iter::once(e).chain(scene.ancestors(e)).find(|a| {
            self.partitions
                .get(a)
                .is_some_and(|p| p.kind() == PartitionKind::Map)
        })
    }

    // --- registration ---

    fn desired_placement(
        &self,
        bodies: &ComponentStore<Body>,
        e: EntityId,
        partition: EntityId,
    ) -> Placement {
        let body = bodies.get(e);
        let collidable = body.is_some_and(|b| b.can_collide);
        if partition == e {
            Placement::Own { collidable }
        } else if collidable {
            Placement::Trees
        } else {
            Placement::Sundries {
                is_static: body.is_none_or(|b| b.kind.is_static()),
            }
        }
    }

    /// Register `e` in its effective partition, using `mover`'s pose for its bounds.
    ///
    /// Contained and detached entities are not registered.
    pub(crate) fn register(&mut self, w: &mut WorldMut<'_>, e: EntityId, mover: EntityId) {
        debug_assert!(
            !self.registrations.contains_key(&e),
            "entity {e:?} registered twice"
        );
        if !w.scene.is_alive(e) || w.scene.is_contained(e) {
            return;
        }
        let Some(partition) = self.resolve(w.scene, e) else {
            trace!(entity = ?e, "no partition; left unregistered");
            return;
        };
        let placement = self.desired_placement(w.bodies, e, partition);
        match placement {
            Placement::Trees => {
                let is_static = w.bodies.get(e).is_some_and(|b| b.kind.is_static());
                self.add_proxies(w, e, mover, partition, TreeKind::for_static(is_static));
            }
            Placement::Own { collidable: true } => {
                let is_static = w.bodies.get(e).is_some_and(|b| b.kind.is_static());
                self.add_proxies(w, e, e, partition, TreeKind::for_static(is_static));
            }
            Placement::Own { collidable: false } => {}
            Placement::Sundries { is_static } => {
                let aabb = entity_aabb(w.scene, w.fixtures, mover, partition);
                if let Some(p) = self.partitions.get_mut(&partition) {
                    p.sundries_mut(is_static).insert(e, aabb);
                }
            }
        }
        trace!(entity = ?e, partition = ?partition, ?placement, "registered");
        self.registrations
            .insert(e, Registration { partition, placement });
    }

    /// Remove `e` from the partition it was registered in.
    pub(crate) fn deregister(&mut self, w: &mut WorldMut<'_>, e: EntityId) {
        let Some(reg) = self.registrations.remove(&e) else {
            return;
        };
        match reg.placement {
            Placement::Trees | Placement::Own { .. } => self.remove_proxies(w, e),
            Placement::Sundries { is_static } => match self.partitions.get_mut(&reg.partition) {
                Some(p) => {
                    p.sundries_mut(is_static).remove(&e);
                }
                None => error!(entity = ?e, partition = ?reg.partition, "registered partition is gone"),
            },
        }
        trace!(entity = ?e, partition = ?reg.partition, "deregistered");
    }

    /// Bring `e`'s registration in line with the current hierarchy: refresh its bounds in place
    /// if it still belongs where it is registered, move it otherwise.
    pub(crate) fn sync(&mut self, w: &mut WorldMut<'_>, e: EntityId, mover: EntityId) {
        let desired = if w.scene.is_alive(e) && !w.scene.is_contained(e) {
            self.resolve(w.scene, e)
                .map(|p| (p, self.desired_placement(w.bodies, e, p)))
        } else {
            None
        };
        let current = self
            .registrations
            .get(&e)
            .map(|r| (r.partition, r.placement));
        if desired.is_some() && desired == current {
            self.refresh(w, e, mover);
        } else {
            self.deregister(w, e);
            if desired.is_some() {
                self.register(w, e, mover);
            }
        }
    }

    /// Sync `root` and its descendants.
    ///
    /// The walk uses an explicit stack. Each item carries the outer-most container above it, if
    /// any: a contained entity is dropped from the index and its descendants take that
    /// container's bounds. Partition owners met below `root` are recorded as moved and not
    /// descended into, since their contents are relative to them.
    pub(crate) fn sync_subtree(&mut self, w: &mut WorldMut<'_>, root: EntityId) {
        let mut stack = vec![(root, w.scene.outermost_container(root))];
        while let Some((e, within)) = stack.pop() {
            if e != root && self.partitions.contains_key(&e) {
                if self.partitions.get(&e).is_some_and(|p| p.kind() == PartitionKind::Grid) {
                    self.moved_partitions.insert(e);
                }
                continue;
            }
            let inner = if w.scene.is_contained(e) {
                self.deregister(w, e);
                within.or_else(|| w.scene.parent(e))
            } else {
                self.sync(w, e, within.unwrap_or(e));
                within
            };
            stack.extend(w.scene.children(e).iter().rev().map(|c| (*c, inner)));
        }
    }

    /// Recompute `e`'s bounds in place and buffer every proxy it touched.
    ///
    /// The trees only restructure for boxes that escaped their fattened entry.
    fn refresh(&mut self, w: &mut WorldMut<'_>, e: EntityId, mover: EntityId) {
        let Some(reg) = self.registrations.get(&e).copied() else {
            return;
        };
        match reg.placement {
            Placement::Trees | Placement::Own { collidable: true } => {
                let mover = if matches!(reg.placement, Placement::Own { .. }) { e } else { mover };
                let Some(set) = w.fixtures.get(e) else {
                    return;
                };
                let mut updates = Vec::new();
                for id in set.iter().flat_map(|f| f.proxies.iter().copied()) {
                    let Some(proxy) = self.proxies.get(id) else {
                        continue;
                    };
                    let (index, child) = (proxy.fixture.index as usize, proxy.child as usize);
                    if let Some(aabb) =
                        proxy_aabb(w.scene, w.fixtures, e, mover, index, child, reg.partition)
                    {
                        updates.push((id, aabb));
                    }
                }
                for (id, aabb) in updates {
                    self.move_proxy(w.scene, id, aabb);
                }
            }
            Placement::Own { collidable: false } => {}
            Placement::Sundries { is_static } => {
                let aabb = entity_aabb(w.scene, w.fixtures, mover, reg.partition);
                match self.partitions.get_mut(&reg.partition) {
                    Some(p) => {
                        p.sundries_mut(is_static).insert(e, aabb);
                    }
                    None => error!(entity = ?e, partition = ?reg.partition, "registered partition is gone"),
                }
            }
        }
    }

    fn move_proxy(&mut self, scene: &Scene, id: ProxyId, aabb: Aabb2D<f64>) {
        let Some(proxy) = self.proxies.get_mut(id) else {
            return;
        };
        proxy.aabb = aabb;
        let (partition, tree, key) = (proxy.partition, proxy.tree, proxy.key);
        let Some(p) = self.partitions.get_mut(&partition) else {
            error!(proxy = ?id, partition = ?partition, "proxy partition is gone");
            return;
        };
        if p.tree_mut(tree).move_proxy(key, aabb) {
            trace!(proxy = ?id, "re-fattened");
        }
        self.buffer_move(scene, id);
    }

    fn add_proxies(
        &mut self,
        w: &mut WorldMut<'_>,
        e: EntityId,
        mover: EntityId,
        partition: EntityId,
        tree: TreeKind,
    ) {
        let Some(set) = w.fixtures.get(e) else {
            return;
        };
        let mut boxes = Vec::with_capacity(set.len());
        for (index, f) in set.iter().enumerate() {
            debug_assert!(
                f.proxies.is_empty(),
                "fixture {index} of {e:?} already has proxies"
            );
            let children: Vec<_> = (0..f.shape.child_count())
                .filter_map(|child| {
                    proxy_aabb(w.scene, w.fixtures, e, mover, index, child, partition)
                        .map(|aabb| (child, aabb))
                })
                .collect();
            boxes.push(children);
        }
        let Some(p) = self.partitions.get_mut(&partition) else {
            error!(entity = ?e, partition = ?partition, "resolved partition is gone");
            return;
        };
        let mut created = Vec::new();
        if let Some(set) = w.fixtures.get_mut(e) {
            for ((index, f), children) in set.iter_mut().enumerate().zip(boxes) {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "fixture and child counts are far below u32::MAX."
                )]
                let fixture = FixtureRef {
                    entity: e,
                    index: index as u32,
                };
                for (child, aabb) in children {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "fixture and child counts are far below u32::MAX."
                    )]
                    let child = child as u32;
                    let id = self.proxies.alloc_with(|id| Proxy {
                        fixture,
                        child,
                        partition,
                        tree,
                        key: p.tree_mut(tree).add(aabb, id),
                        aabb,
                    });
                    f.proxies.push(id);
                    created.push(id);
                }
            }
        }
        for id in created {
            self.buffer_move(w.scene, id);
        }
    }

    fn remove_proxies(&mut self, w: &mut WorldMut<'_>, e: EntityId) {
        let Some(set) = w.fixtures.get_mut(e) else {
            return;
        };
        for f in set.iter_mut() {
            for id in f.proxies.drain(..) {
                self.destroy_proxy(id);
            }
        }
    }

    fn destroy_proxy(&mut self, id: ProxyId) {
        let Some(proxy) = self.proxies.free(id) else {
            return;
        };
        match self.partitions.get_mut(&proxy.partition) {
            Some(p) => {
                p.tree_mut(proxy.tree).remove(proxy.key);
            }
            None => error!(proxy = ?id, partition = ?proxy.partition, "proxy partition is gone"),
        }
        self.purge_move_buffers(id);
    }

    fn purge_move_buffers(&mut self, id: ProxyId) {
        for buffer in self.move_buffers.values_mut() {
            buffer.remove(&id);
        }
    }

    /// Move every proxy of a registered body between its partition's dynamic and static trees
    /// (or its sundries between the two maps) after a static/non-static kind switch.
    ///
    /// A partition owner's own fixtures switch trees inside its own partition.
    pub(crate) fn switch_static(&mut self, w: &mut WorldMut<'_>, e: EntityId, is_static: bool) {
        let Some(reg) = self.registrations.get(&e).copied() else {
            return;
        };
        match reg.placement {
            Placement::Trees | Placement::Own { collidable: true } => {
                let target = TreeKind::for_static(is_static);
                let ids: Vec<ProxyId> = w
                    .fixtures
                    .get(e)
                    .map(|set| set.iter().flat_map(|f| f.proxies.iter().copied()).collect())
                    .unwrap_or_default();
                let Some(p) = self.partitions.get_mut(&reg.partition) else {
                    error!(entity = ?e, partition = ?reg.partition, "registered partition is gone");
                    return;
                };
                for id in &ids {
                    let Some(proxy) = self.proxies.get_mut(*id) else {
                        continue;
                    };
                    if proxy.tree == target {
                        continue;
                    }
                    p.tree_mut(proxy.tree).remove(proxy.key);
                    proxy.key = p.tree_mut(target).add(proxy.aabb, *id);
                    proxy.tree = target;
                }
                for id in ids {
                    self.buffer_move(w.scene, id);
                }
            }
            Placement::Sundries { is_static: was } if was != is_static => {
                if let Some(p) = self.partitions.get_mut(&reg.partition)
                    && let Some(aabb) = p.sundries_mut(was).remove(&e)
                {
                    p.sundries_mut(is_static).insert(e, aabb);
                }
                self.registrations.insert(
                    e,
                    Registration {
                        partition: reg.partition,
                        placement: Placement::Sundries { is_static },
                    },
                );
            }
            Placement::Sundries { .. } | Placement::Own { collidable: false } => {}
        }
        trace!(entity = ?e, is_static, "switched tree");
    }

    /// Put `id` in its map's move buffer with its current world box.
    pub(crate) fn buffer_move(&mut self, scene: &Scene, id: ProxyId) {
        let Some(proxy) = self.proxies.get(id) else {
            return;
        };
        let Some(map) = self.map_of(scene, proxy.partition) else {
            trace!(proxy = ?id, "partition is not on a map; move not buffered");
            return;
        };
        let world = transform_aabb(scene.world_affine(proxy.partition), proxy.aabb);
        self.move_buffers.entry(map).or_default().insert(id, world);
    }

    /// Buffer every proxy of a fixture, so its pairs are re-evaluated next pass.
    pub(crate) fn touch_fixture(&mut self, w: &WorldMut<'_>, r: FixtureRef) {
        let Some(f) = fixture(w.fixtures, r) else {
            return;
        };
        for id in f.proxies.clone() {
            self.buffer_move(w.scene, id);
        }
    }

    /// Deregister a despawning subtree (given in pre-order) and drop the partitions it owns.
    pub(crate) fn despawn(&mut self, w: &mut WorldMut<'_>, subtree: &[EntityId]) {
        for e in subtree {
            self.deregister(w, *e);
        }
        for e in subtree {
            if self.partitions.contains_key(e) {
                self.drop_partition(w, *e);
            }
        }
        self.resolver.clear();
    }

    // --- area queries ---

    /// Entities registered on `map` (in its own partition or in any of its grids) whose bounds
    /// intersect `rect`, given in world space. Sundries are included.
    pub(crate) fn entities_intersecting(
        &self,
        scene: &Scene,
        map: EntityId,
        rect: Rect,
    ) -> Vec<EntityId> {
        let query = rect_to_aabb(rect);
        let mut out = BTreeSet::new();
        for p in self.partitions.values() {
            let owner = p.owner();
            let on_map = match p.kind() {
                PartitionKind::Map => owner == map,
                PartitionKind::Grid => self.map_of(scene, owner) == Some(map),
            };
            if !on_map {
                continue;
            }
            let local = transform_aabb(scene.world_affine(owner).inverse(), query);
            for tree in [TreeKind::Dynamic, TreeKind::Static] {
                for (_, id) in p.tree(tree).query(local, false) {
                    if let Some(proxy) = self.proxies.get(id) {
                        out.insert(proxy.fixture.entity);
                    }
                }
            }
            for is_static in [true, false] {
                out.extend(
                    p.sundries(is_static)
                        .iter()
                        .filter(|(_, aabb)| aabb.intersects(&local))
                        .map(|(e, _)| *e),
                );
            }
        }
        out.into_iter().collect()
    }
}
