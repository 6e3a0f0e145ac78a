// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collision shapes and their per-child bounds.

use kurbo::{Affine, Point, Rect};
use strata_scene::transform_rect_bbox;

/// A collision shape in its body's local frame.
///
/// Most shapes have a single child. A [`Shape::Chain`] has one child per edge, and each child
/// gets its own proxy so long chains do not produce one huge box.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Axis-aligned rectangle.
    Rect(Rect),
    /// Circle.
    Circle {
        /// Center.
        center: Point,
        /// Radius.
        radius: f64,
    },
    /// Convex polygon. An empty point list has no children.
    Polygon(Vec<Point>),
    /// Open chain of edges between consecutive points.
    Chain(Vec<Point>),
}

impl Shape {
    /// Square of half-extent `half` centered on the origin.
    pub fn square(half: f64) -> Self {
        Self::Rect(Rect::new(-half, -half, half, half))
    }

    /// Number of child sub-shapes, which is also the number of proxies the shape needs.
    pub fn child_count(&self) -> usize {
        match self {
            Self::Rect(_) | Self::Circle { .. } => 1,
            Self::Polygon(points) => usize::from(!points.is_empty()),
            Self::Chain(points) => points.len().saturating_sub(1),
        }
    }

    /// Bounds of child `child` after mapping the shape through `affine`.
    ///
    /// Returns `None` for an out-of-range child.
    pub fn child_aabb(&self, child: usize, affine: Affine) -> Option<Rect> {
        if child >= self.child_count() {
            return None;
        }
        Some(match self {
            Self::Rect(r) => transform_rect_bbox(affine, *r),
            Self::Circle { center, radius } => {
                // Rigid transforms keep the radius.
                let c = affine * *center;
                Rect::new(c.x - radius, c.y - radius, c.x + radius, c.y + radius)
            }
            Self::Polygon(points) => points_bbox(affine, points),
            Self::Chain(points) => points_bbox(affine, &points[child..=child + 1]),
        })
    }

    /// Union of every child's bounds under `affine`, or `None` for a shape with no children.
    pub fn aabb(&self, affine: Affine) -> Option<Rect> {
        (0..self.child_count())
            .filter_map(|i| self.child_aabb(i, affine))
            .reduce(|a, b| a.union(b))
    }
}

fn points_bbox(affine: Affine, points: &[Point]) -> Rect {
    let mut it = points.iter().map(|p| affine * *p);
    let Some(first) = it.next() else {
        return Rect::from_origin_size(affine * Point::ORIGIN, (0.0, 0.0));
    };
    it.fold(Rect::from_points(first, first), |r, p| r.union_pt(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::FRAC_PI_2;
    use kurbo::Vec2;

    #[test]
    fn chain_has_one_child_per_edge() {
        let chain = Shape::Chain(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
        ]);
        assert_eq!(chain.child_count(), 2);
        assert_eq!(
            chain.child_aabb(1, Affine::IDENTITY),
            Some(Rect::new(4.0, 0.0, 4.0, 3.0))
        );
        assert_eq!(chain.child_aabb(2, Affine::IDENTITY), None);
        assert_eq!(chain.aabb(Affine::IDENTITY), Some(Rect::new(0.0, 0.0, 4.0, 3.0)));
        assert_eq!(Shape::Chain(vec![Point::ORIGIN]).child_count(), 0);
    }

    #[test]
    fn circle_ignores_rotation() {
        let c = Shape::Circle {
            center: Point::new(1.0, 0.0),
            radius: 0.5,
        };
        let a = Affine::translate(Vec2::new(10.0, 0.0)) * Affine::rotate(FRAC_PI_2);
        let r = c.child_aabb(0, a).unwrap();
        assert!((r.center() - Point::new(10.0, 1.0)).hypot() < 1e-9);
        assert!((r.width() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn polygon_uses_transformed_points() {
        let tri = Shape::Polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(0.0, 1.0),
        ]);
        let r = tri.child_aabb(0, Affine::rotate(FRAC_PI_2)).unwrap();
        assert!((r.width() - 1.0).abs() < 1e-9, "{r:?}");
        assert!((r.height() - 2.0).abs() < 1e-9, "{r:?}");
        assert_eq!(Shape::Polygon(Vec::new()).child_count(), 0);
    }
}
