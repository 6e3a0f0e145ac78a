// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid against grid: chunked overlap of two grids' own fixtures.
//!
//! Each grid's fixtures are bucketed into square chunks of [`CHUNK_SIZE`] in the grid's local
//! frame. Chunks of the first grid are carried into the second grid's frame and culled against
//! its chunks before any fixture pair is looked at.

use std::collections::BTreeMap;

use strata_index::Aabb2D;
use strata_scene::{ComponentStore, EntityId};

use crate::aabb::transform_aabb;
use crate::body::FixtureSet;
use crate::broadphase::{Broadphase, fixture};
use crate::contacts::{ContactManager, PairOrigin};
use crate::pairs::GridFrame;
use crate::proxy::{ProxyId, TreeKind};

/// Edge length of a grid chunk, in grid-local units.
pub const CHUNK_SIZE: f64 = 8.0;

#[derive(Debug)]
struct Chunk {
    bounds: Aabb2D<f64>,
    members: Vec<(ProxyId, Aabb2D<f64>)>,
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "chunk coordinates of any sane grid fit in i32; `as` saturates otherwise."
)]
fn chunk_of(aabb: &Aabb2D<f64>) -> (i32, i32) {
    let (cx, cy) = aabb.center();
    (
        (cx / CHUNK_SIZE).floor() as i32,
        (cy / CHUNK_SIZE).floor() as i32,
    )
}

fn chunks(bp: &Broadphase, grid: EntityId) -> BTreeMap<(i32, i32), Chunk> {
    let mut out: BTreeMap<(i32, i32), Chunk> = BTreeMap::new();
    let Some(partition) = bp.partitions.get(&grid) else {
        return out;
    };
    // The owner's fixtures sit in whichever tree matches its body kind.
    for tree in [TreeKind::Dynamic, TreeKind::Static] {
        for (_, aabb, id) in partition.tree(tree).iter() {
            if bp.proxies.get(id).is_none_or(|p| p.fixture.entity != grid) {
                continue;
            }
            out.entry(chunk_of(&aabb))
                .and_modify(|c| {
                    c.bounds = c.bounds.union(&aabb);
                    c.members.push((id, aabb));
                })
                .or_insert_with(|| Chunk {
                    bounds: aabb,
                    members: vec![(id, aabb)],
                });
        }
    }
    out
}

/// Register every overlapping pair of `a`'s and `b`'s own fixtures. Returns how many pairs were
/// registered.
pub(crate) fn scan<C: ContactManager + ?Sized>(
    bp: &Broadphase,
    fixtures: &ComponentStore<FixtureSet>,
    a: &GridFrame,
    b: &GridFrame,
    contacts: &mut C,
) -> usize {
    let chunks_a = chunks(bp, a.owner);
    if chunks_a.is_empty() {
        return 0;
    }
    let chunks_b = chunks(bp, b.owner);
    let a_to_b = b.affine.inverse() * a.affine;
    let mut count = 0;
    for ca in chunks_a.values() {
        let in_b = transform_aabb(a_to_b, ca.bounds);
        for cb in chunks_b.values().filter(|cb| cb.bounds.intersects(&in_b)) {
            for (pa, box_a) in &ca.members {
                let world_a = transform_aabb(a.affine, *box_a);
                for (pb, box_b) in &cb.members {
                    if !world_a.overlaps(&transform_aabb(b.affine, *box_b)) {
                        continue;
                    }
                    let (Some(proxy_a), Some(proxy_b)) = (bp.proxies.get(*pa), bp.proxies.get(*pb))
                    else {
                        continue;
                    };
                    let (Some(fa), Some(fb)) = (
                        fixture(fixtures, proxy_a.fixture),
                        fixture(fixtures, proxy_b.fixture),
                    ) else {
                        continue;
                    };
                    if !fa.filter.should_collide(&fb.filter) {
                        continue;
                    }
                    contacts.register_pair(
                        proxy_a.fixture,
                        proxy_a.child,
                        proxy_b.fixture,
                        proxy_b.child,
                        PairOrigin::Grid,
                    );
                    count += 1;
                }
            }
        }
    }
    count
}
