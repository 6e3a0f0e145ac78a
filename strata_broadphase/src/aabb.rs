// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds of entities and proxies in a partition's frame.

use kurbo::{Affine, Point, Rect};
use strata_index::Aabb2D;
use strata_scene::{ComponentStore, EntityId, Scene, transform_rect_bbox};

use crate::body::FixtureSet;

pub(crate) fn rect_to_aabb(r: Rect) -> Aabb2D<f64> {
    Aabb2D::new(r.x0, r.y0, r.x1, r.y1)
}

pub(crate) fn aabb_to_rect(a: Aabb2D<f64>) -> Rect {
    Rect::new(a.min_x, a.min_y, a.max_x, a.max_y)
}

/// Bounds of `aabb` after mapping it through `affine`.
pub(crate) fn transform_aabb(affine: Affine, aabb: Aabb2D<f64>) -> Aabb2D<f64> {
    rect_to_aabb(transform_rect_bbox(affine, aabb_to_rect(aabb)))
}

/// Bounds of `mover` in `frame`: the union of its fixture boxes, or a point box at its origin
/// when it has no shape.
pub(crate) fn entity_aabb(
    scene: &Scene,
    fixtures: &ComponentStore<FixtureSet>,
    mover: EntityId,
    frame: EntityId,
) -> Aabb2D<f64> {
    let affine = scene.relative_affine(mover, Some(frame));
    fixtures
        .get(mover)
        .and_then(|set| {
            set.iter()
                .filter_map(|f| f.shape.aabb(affine))
                .reduce(|a, b| a.union(b))
        })
        .map_or_else(
            || {
                let p = affine * Point::ORIGIN;
                Aabb2D::point(p.x, p.y)
            },
            rect_to_aabb,
        )
}

/// Bounds of child `child` of fixture `index` of `entity`, in `frame`.
///
/// When `mover` differs from `entity` the entity rides inside a container and the container's
/// bounds stand in for it.
pub(crate) fn proxy_aabb(
    scene: &Scene,
    fixtures: &ComponentStore<FixtureSet>,
    entity: EntityId,
    mover: EntityId,
    index: usize,
    child: usize,
    frame: EntityId,
) -> Option<Aabb2D<f64>> {
    if mover != entity {
        return Some(entity_aabb(scene, fixtures, mover, frame));
    }
    let fixture = fixtures.get(entity)?.get(index)?;
    let affine = scene.relative_affine(entity, Some(frame));
    fixture.shape.child_aabb(child, affine).map(rect_to_aabb)
}
