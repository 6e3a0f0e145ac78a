// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pair finder: turns a map's move buffer into candidate pairs.
//!
//! One pass over a map runs five steps:
//!
//! 1. Grid sweep. Every grid that moved probes the map's trees with its enlarged world bounds;
//!    proxies it passes over join the move buffer and are marked swept.
//! 2. Grid against grid. Pairs of grids, at least one of them moved, whose enlarged bounds
//!    intersect are handed to the chunk scanner, which registers hits directly.
//! 3. Generic query. Each buffered proxy probes the map and every grid whose enlarged bounds
//!    reach it. Dynamic trees are always queried, static trees only for non-static sources.
//!    Candidates are rejected when they are the source itself, share its body, fail the filter,
//!    were already recorded, or do not overlap it with positive area.
//! 4. Commit. Pairs of hard fixtures with a swept side wake both bodies first; then every pair
//!    is registered.
//! 5. Finalization. Pooled sets go back to the pool and the map's buffers are cleared.
//!
//! The pair set does not depend on the order proxies sit in the move buffer: every rejection
//! test is symmetric, and pairs are keyed by their lower proxy id.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use kurbo::Affine;
use strata_index::Aabb2D;
use strata_scene::EntityId;
use tracing::{debug, debug_span, error};

use crate::aabb::transform_aabb;
use crate::broadphase::{Broadphase, WorldMut, fixture};
use crate::contacts::{ContactManager, PairOrigin};
use crate::grid_scan;
use crate::partition::PartitionKind;
use crate::proxy::{ProxyId, TreeKind};

/// Counters from one pair pass over one map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Proxies processed by the generic query, swept ones included.
    pub buffered: usize,
    /// Proxies added by the grid sweep.
    pub swept: usize,
    /// Pairs registered by the generic query.
    pub pairs: usize,
    /// Pairs registered by the grid scanner.
    pub grid_pairs: usize,
    /// Bodies woken because a moving grid brought them into contact.
    pub woken: usize,
}

impl core::ops::AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        self.buffered += rhs.buffered;
        self.swept += rhs.swept;
        self.pairs += rhs.pairs;
        self.grid_pairs += rhs.grid_pairs;
        self.woken += rhs.woken;
    }
}

/// A grid partition on the pass's map, with its frame and enlarged world bounds.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GridFrame {
    pub(crate) owner: EntityId,
    pub(crate) affine: Affine,
    pub(crate) bounds: Aabb2D<f64>,
    pub(crate) moved: bool,
}

impl Broadphase {
    fn grid_frames(&self, w: &WorldMut<'_>, map: EntityId, margin: f64) -> Vec<GridFrame> {
        self.partitions
            .values()
            .filter(|p| p.kind() == PartitionKind::Grid)
            .filter(|p| self.map_of(w.scene, p.owner()) == Some(map))
            .map(|p| {
                let owner = p.owner();
                let affine = w.scene.world_affine(owner);
                let local = p.local_bounds().unwrap_or(Aabb2D::point(0.0, 0.0));
                GridFrame {
                    owner,
                    affine,
                    bounds: transform_aabb(affine, local).grow(margin),
                    moved: self.moved_partitions.contains(&owner),
                }
            })
            .collect()
    }

    /// Run one pair pass over `map`, registering every new candidate pair with `contacts`.
    pub(crate) fn find_new_contacts<C: ContactManager + ?Sized>(
        &mut self,
        w: &mut WorldMut<'_>,
        map: EntityId,
        contacts: &mut C,
    ) -> PassStats {
        let span = debug_span!("find_new_contacts", ?map);
        let _enter = span.enter();
        self.resolver.clear();
        let mut stats = PassStats::default();

        if !self.partitions.contains_key(&map) {
            error!(?map, "pair pass on an entity without a partition");
            return stats;
        }
        let margin = self.config.pair_margin;
        let map_affine = w.scene.world_affine(map);
        let grids = self.grid_frames(w, map, margin);
        let mut buffer = self.move_buffers.remove(&map).unwrap_or_default();
        let mut swept = BTreeSet::new();

        // 1. Grid sweep.
        if let Some(map_partition) = self.partitions.get(&map) {
            for g in grids.iter().filter(|g| g.moved) {
                let local = transform_aabb(map_affine.inverse(), g.bounds);
                for tree in [TreeKind::Dynamic, TreeKind::Static] {
                    for (_, id) in map_partition.tree(tree).query(local, true) {
                        let Some(proxy) = self.proxies.get(id) else {
                            continue;
                        };
                        if let Entry::Vacant(slot) = buffer.entry(id) {
                            slot.insert(transform_aabb(map_affine, proxy.aabb));
                            swept.insert(id);
                        }
                    }
                }
            }
        }
        stats.swept = swept.len();

        // 2. Grid against grid.
        for (i, a) in grids.iter().enumerate() {
            for b in &grids[i + 1..] {
                if (a.moved || b.moved) && a.bounds.intersects(&b.bounds) {
                    stats.grid_pairs += grid_scan::scan(self, w.fixtures, a, b, contacts);
                }
            }
        }

        // 3. Generic query.
        let mut pending: BTreeMap<ProxyId, BTreeSet<ProxyId>> = BTreeMap::new();
        for (&id, world) in &mut buffer {
            let Some(proxy) = self.proxies.get(id).copied() else {
                continue;
            };
            let body = w.bodies.get(proxy.fixture.entity);
            debug_assert!(
                body.is_some(),
                "buffered proxy {id:?} has no body; deregistration missed it"
            );
            let Some(body) = body else {
                continue;
            };
            if !self.partitions.contains_key(&proxy.partition) {
                error!(proxy = ?id, partition = ?proxy.partition, "buffered proxy has no partition; skipped");
                continue;
            }
            let Some(source) = fixture(w.fixtures, proxy.fixture) else {
                continue;
            };
            *world = transform_aabb(w.scene.world_affine(proxy.partition), proxy.aabb);
            let query = world.grow(margin);
            stats.buffered += 1;

            let trees: &[TreeKind] = if body.kind.is_static() {
                &[TreeKind::Dynamic]
            } else {
                &[TreeKind::Dynamic, TreeKind::Static]
            };
            let candidates = core::iter::once((map, map_affine)).chain(
                grids
                    .iter()
                    .filter(|g| g.bounds.intersects(&query))
                    .map(|g| (g.owner, g.affine)),
            );
            let mut found = Vec::new();
            for (owner, affine) in candidates {
                let Some(partition) = self.partitions.get(&owner) else {
                    continue;
                };
                let local = transform_aabb(affine.inverse(), query);
                for &tree in trees {
                    for (_, other) in partition.tree(tree).query(local, true) {
                        if other == id {
                            continue;
                        }
                        let Some(candidate) = self.proxies.get(other) else {
                            continue;
                        };
                        if candidate.fixture.entity == proxy.fixture.entity {
                            continue;
                        }
                        let (lo, hi) = if id < other { (id, other) } else { (other, id) };
                        if pending.get(&lo).is_some_and(|s| s.contains(&hi)) {
                            continue;
                        }
                        let Some(target) = fixture(w.fixtures, candidate.fixture) else {
                            continue;
                        };
                        if !source.filter.should_collide(&target.filter) {
                            continue;
                        }
                        if !world.overlaps(&transform_aabb(affine, candidate.aabb)) {
                            continue;
                        }
                        found.push((lo, hi));
                    }
                }
            }
            for (lo, hi) in found {
                pending
                    .entry(lo)
                    .or_insert_with(|| self.pool.take())
                    .insert(hi);
            }
        }

        // 4. Commit.
        for (a, set) in &pending {
            for b in set {
                let (Some(pa), Some(pb)) = (self.proxies.get(*a), self.proxies.get(*b)) else {
                    continue;
                };
                let hard = fixture(w.fixtures, pa.fixture).is_some_and(|f| f.hard)
                    && fixture(w.fixtures, pb.fixture).is_some_and(|f| f.hard);
                if hard && (swept.contains(a) || swept.contains(b)) {
                    for e in [pa.fixture.entity, pb.fixture.entity] {
                        if let Some(body) = w.bodies.get_mut(e)
                            && !body.awake
                        {
                            body.awake = true;
                            stats.woken += 1;
                        }
                    }
                }
                contacts.register_pair(pa.fixture, pa.child, pb.fixture, pb.child, PairOrigin::Generic);
                stats.pairs += 1;
            }
        }

        // 5. Finalization.
        for set in pending.into_values() {
            self.pool.give(set);
        }
        self.pool.assert_drained();
        buffer.clear();
        self.move_buffers.insert(map, buffer);
        for g in &grids {
            self.moved_partitions.remove(&g.owner);
        }
        debug!(
            buffered = stats.buffered,
            swept = stats.swept,
            pairs = stats.pairs,
            grid_pairs = stats.grid_pairs,
            woken = stats.woken,
            pooled = self.pool.outstanding(),
            "pair pass finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use proptest::prelude::*;
    use strata_scene::{EntityId, LocalTransform};

    use crate::body::{Body, BodyKind, Fixture};
    use crate::contacts::ContactSet;
    use crate::shape::Shape;
    use crate::world::Simulation;

    type BoxAt = (f64, f64, f64);

    fn kind_of(i: usize) -> BodyKind {
        if i % 3 == 0 { BodyKind::Static } else { BodyKind::Dynamic }
    }

    /// Spawn the boxes in `order` and return the pairs found, by box index.
    fn pairs_for(boxes: &[BoxAt], order: &[usize]) -> BTreeSet<(usize, usize)> {
        let mut sim = Simulation::new();
        let map = sim.spawn_map(LocalTransform::IDENTITY);
        let mut index: BTreeMap<EntityId, usize> = BTreeMap::new();
        for &i in order {
            let (x, y, half) = boxes[i];
            let e = sim.spawn(Some(map), LocalTransform::at(x, y)).unwrap();
            sim.add_body(e, Body::new(kind_of(i))).unwrap();
            sim.add_fixture(e, Fixture::new(Shape::square(half))).unwrap();
            index.insert(e, i);
        }
        let mut contacts = ContactSet::new();
        sim.step(&mut contacts);
        contacts
            .iter()
            .map(|(((a, _), (b, _)), _)| {
                let (i, j) = (index[&a.entity], index[&b.entity]);
                (i.min(j), i.max(j))
            })
            .collect()
    }

    fn brute_force(boxes: &[BoxAt]) -> BTreeSet<(usize, usize)> {
        let mut out = BTreeSet::new();
        for (i, &(xi, yi, hi)) in boxes.iter().enumerate() {
            for (j, &(xj, yj, hj)) in boxes.iter().enumerate().skip(i + 1) {
                if kind_of(i).is_static() && kind_of(j).is_static() {
                    continue;
                }
                let overlap = xi - hi < xj + hj
                    && xj - hj < xi + hi
                    && yi - hi < yj + hj
                    && yj - hj < yi + hi;
                if overlap {
                    out.insert((i, j));
                }
            }
        }
        out
    }

    fn boxes_and_order() -> impl Strategy<Value = (Vec<BoxAt>, Vec<usize>)> {
        prop::collection::vec((-4.0_f64..4.0, -4.0_f64..4.0, 0.25_f64..1.5), 2..12).prop_flat_map(
            |boxes| {
                let order: Vec<usize> = (0..boxes.len()).collect();
                (Just(boxes), Just(order).prop_shuffle())
            },
        )
    }

    proptest! {
        #[test]
        fn pair_set_ignores_move_buffer_order((boxes, order) in boxes_and_order()) {
            let in_order: Vec<usize> = (0..boxes.len()).collect();
            let expected = pairs_for(&boxes, &in_order);
            prop_assert_eq!(&pairs_for(&boxes, &order), &expected);
            prop_assert_eq!(&brute_force(&boxes), &expected);
        }
    }
}
