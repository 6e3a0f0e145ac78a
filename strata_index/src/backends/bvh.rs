// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary bounding hierarchy backend generic over scalar `T: Scalar`.

use alloc::vec;
use alloc::vec::Vec;

use crate::backend::Backend;
use crate::types::{Aabb2D, Scalar, ScalarAcc, area, union_aabb};
use core::fmt::Debug;

/// Default number of items a leaf holds before it is split.
const DEFAULT_MAX_LEAF: usize = 8;

/// Default number of node slots the arena grows by when it runs out.
const DEFAULT_GROWTH: usize = 64;

/// A BVH backend using SAH-like splits.
///
/// Nodes live in an arena. Nodes released by removals are recycled, so a tree under constant
/// churn stays bounded by its peak population rather than by the number of updates.
pub struct Bvh<T: Scalar> {
    max_leaf: usize,
    root: Option<NodeIdx>,
    pool: Pool<T>,
    slots: Vec<Option<Aabb2D<T>>>,
}

enum Kind<T: Scalar> {
    Leaf(Vec<(usize, Aabb2D<T>)>),
    Internal { left: NodeIdx, right: NodeIdx },
}

struct Node<T: Scalar> {
    bbox: Aabb2D<T>,
    kind: Kind<T>,
}

impl<T: Scalar> Node<T> {
    fn empty_leaf() -> Self {
        Self {
            bbox: Aabb2D::new(T::zero(), T::zero(), T::zero(), T::zero()),
            kind: Kind::Leaf(Vec::new()),
        }
    }

    fn is_empty_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf(ref v) if v.is_empty())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(usize);

impl NodeIdx {
    const fn new(i: usize) -> Self {
        Self(i)
    }

    const fn get(self) -> usize {
        self.0
    }
}

/// Node arena with a free list and a fixed growth increment.
struct Pool<T: Scalar> {
    arena: Vec<Node<T>>,
    free: Vec<usize>,
    growth: usize,
}

impl<T: Scalar> Pool<T> {
    fn alloc(&mut self, node: Node<T>) -> usize {
        if let Some(i) = self.free.pop() {
            self.arena[i] = node;
            return i;
        }
        if self.arena.len() == self.arena.capacity() {
            self.arena.reserve_exact(self.growth.max(1));
        }
        self.arena.push(node);
        self.arena.len() - 1
    }

    fn release(&mut self, i: usize) {
        self.arena[i] = Node::empty_leaf();
        self.free.push(i);
    }

    fn live(&self) -> usize {
        self.arena.len() - self.free.len()
    }
}

impl<T: Scalar> Default for Bvh<T> {
    fn default() -> Self {
        Self::with_capacity(0, DEFAULT_GROWTH)
    }
}

type BvhItem<TS> = (usize, Aabb2D<TS>);
type BvhItems<TS> = Vec<BvhItem<TS>>;
type BvhBestSplit<TS> = Option<(ScalarAcc<TS>, usize, usize)>;

impl<T: Scalar> Bvh<T> {
    /// Create a BVH with room for `capacity` items that grows its node arena by `growth`
    /// nodes at a time.
    pub fn with_capacity(capacity: usize, growth: usize) -> Self {
        // A binary hierarchy over n leaves has at most 2n - 1 nodes; leaves hold several items.
        let nodes = capacity.div_ceil(DEFAULT_MAX_LEAF / 2).saturating_mul(2);
        Self {
            max_leaf: DEFAULT_MAX_LEAF,
            root: None,
            pool: Pool {
                arena: Vec::with_capacity(nodes),
                free: Vec::new(),
                growth,
            },
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Number of arena nodes currently in use.
    pub fn node_count(&self) -> usize {
        self.pool.live()
    }

    fn ensure_slot(&mut self, slot: usize, bbox: Aabb2D<T>) {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(bbox);
    }

    fn bbox_items(items: &[BvhItem<T>]) -> Aabb2D<T> {
        let mut it = items.iter();
        if let Some((_, b)) = it.next() {
            it.fold(*b, |acc, (_, bb)| union_aabb(acc, *bb))
        } else {
            Aabb2D::new(T::zero(), T::zero(), T::zero(), T::zero())
        }
    }

    fn centroid(axis: usize, b: &Aabb2D<T>) -> T {
        if axis == 0 {
            T::mid(b.min_x, b.max_x)
        } else {
            T::mid(b.min_y, b.max_y)
        }
    }

    /// SAH-like split: sort along an axis, precompute prefix/suffix AABBs, and
    /// choose `k` that minimizes `area(LB_k) * k + area(RB_k) * (n - k)`.
    fn split_sah(mut items: BvhItems<T>, max_leaf: usize) -> (BvhItems<T>, BvhItems<T>) {
        let n = items.len();
        let min_children = (max_leaf / 2).max(1).min(n / 2).max(1);
        let mut best: BvhBestSplit<T> = None;
        for axis in 0..2 {
            items.sort_by(|a, b| {
                Self::centroid(axis, &a.1)
                    .partial_cmp(&Self::centroid(axis, &b.1))
                    .unwrap_or(core::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });

            let mut prefix: Vec<Aabb2D<T>> = Vec::with_capacity(n);
            for (_, bb) in &items {
                let next = prefix.last().map_or(*bb, |prev| union_aabb(*prev, *bb));
                prefix.push(next);
            }
            let mut suffix: Vec<Aabb2D<T>> = vec![items[n - 1].1; n];
            for i in (0..n - 1).rev() {
                suffix[i] = union_aabb(items[i].1, suffix[i + 1]);
            }

            for k in min_children..=(n - min_children) {
                let cost = area(&prefix[k - 1]) * T::acc_from_usize(k)
                    + area(&suffix[k]) * T::acc_from_usize(n - k);
                if best.as_ref().is_none_or(|(bc, _, _)| cost < *bc) {
                    best = Some((cost, axis, k));
                }
            }
        }
        let (axis, k) = best.map_or((1, n / 2), |(_, axis, k)| (axis, k));
        if axis == 0 {
            // The last pass sorted along y; restore the winning order.
            items.sort_by(|a, b| {
                Self::centroid(0, &a.1)
                    .partial_cmp(&Self::centroid(0, &b.1))
                    .unwrap_or(core::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
        }
        let right = items.split_off(k);
        (items, right)
    }

    fn insert_node(pool: &mut Pool<T>, node_idx: usize, slot: usize, bbox: Aabb2D<T>, max_leaf: usize) {
        let kind = core::mem::replace(&mut pool.arena[node_idx].kind, Kind::Leaf(Vec::new()));
        match kind {
            Kind::Leaf(mut items) => {
                let mut node_bbox = if items.is_empty() {
                    bbox
                } else {
                    union_aabb(pool.arena[node_idx].bbox, bbox)
                };
                items.push((slot, bbox));
                let new_kind = if items.len() > max_leaf {
                    let (l, r) = Self::split_sah(items, max_leaf);
                    let l_bbox = Self::bbox_items(&l);
                    let r_bbox = Self::bbox_items(&r);
                    let l_idx = pool.alloc(Node {
                        bbox: l_bbox,
                        kind: Kind::Leaf(l),
                    });
                    let r_idx = pool.alloc(Node {
                        bbox: r_bbox,
                        kind: Kind::Leaf(r),
                    });
                    node_bbox = union_aabb(l_bbox, r_bbox);
                    Kind::Internal {
                        left: NodeIdx::new(l_idx),
                        right: NodeIdx::new(r_idx),
                    }
                } else {
                    Kind::Leaf(items)
                };
                pool.arena[node_idx].kind = new_kind;
                pool.arena[node_idx].bbox = node_bbox;
            }
            Kind::Internal { left, right } => {
                let lb = pool.arena[left.get()].bbox;
                let rb = pool.arena[right.get()].bbox;
                let cost_l = area(&union_aabb(lb, bbox)) - area(&lb);
                let cost_r = area(&union_aabb(rb, bbox)) - area(&rb);
                if cost_l <= cost_r {
                    Self::insert_node(pool, left.get(), slot, bbox, max_leaf);
                } else {
                    Self::insert_node(pool, right.get(), slot, bbox, max_leaf);
                }
                let node_bbox = union_aabb(pool.arena[left.get()].bbox, pool.arena[right.get()].bbox);
                pool.arena[node_idx].kind = Kind::Internal { left, right };
                pool.arena[node_idx].bbox = node_bbox;
            }
        }
    }

    fn remove_node(pool: &mut Pool<T>, node_idx: usize, slot: usize, old: &Aabb2D<T>) -> bool {
        if !pool.arena[node_idx].bbox.intersects(old) {
            return false;
        }
        let kind = core::mem::replace(&mut pool.arena[node_idx].kind, Kind::Leaf(Vec::new()));
        let (new_kind, new_bbox, removed) = match kind {
            Kind::Leaf(mut items) => {
                let before = items.len();
                items.retain(|(s, _)| *s != slot);
                let removed = items.len() != before;
                let bbox = Self::bbox_items(&items);
                (Kind::Leaf(items), bbox, removed)
            }
            Kind::Internal { left, right } => {
                let removed = Self::remove_node(pool, left.get(), slot, old)
                    || Self::remove_node(pool, right.get(), slot, old);
                let left_empty = pool.arena[left.get()].is_empty_leaf();
                let right_empty = pool.arena[right.get()].is_empty_leaf();
                if removed && (left_empty || right_empty) {
                    // Collapse: the surviving child (if any) takes this node's place.
                    let survivor = if left_empty { right } else { left };
                    let kind = core::mem::replace(
                        &mut pool.arena[survivor.get()].kind,
                        Kind::Leaf(Vec::new()),
                    );
                    let bbox = pool.arena[survivor.get()].bbox;
                    pool.release(left.get());
                    pool.release(right.get());
                    (kind, bbox, true)
                } else {
                    let bbox = union_aabb(pool.arena[left.get()].bbox, pool.arena[right.get()].bbox);
                    (Kind::Internal { left, right }, bbox, removed)
                }
            }
        };
        pool.arena[node_idx].kind = new_kind;
        pool.arena[node_idx].bbox = new_bbox;
        removed
    }
}

impl<T: Scalar> Backend<T> for Bvh<T> {
    fn reserve(&mut self, additional: usize) {
        self.slots.reserve_exact(additional);
    }

    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>) {
        self.ensure_slot(slot, aabb);
        match self.root {
            None => {
                let idx = self.pool.alloc(Node {
                    bbox: aabb,
                    kind: Kind::Leaf(vec![(slot, aabb)]),
                });
                self.root = Some(NodeIdx::new(idx));
            }
            Some(root_idx) => {
                Self::insert_node(&mut self.pool, root_idx.get(), slot, aabb, self.max_leaf);
            }
        }
    }

    fn update(&mut self, slot: usize, aabb: Aabb2D<T>) {
        self.remove(slot);
        self.insert(slot, aabb);
    }

    fn remove(&mut self, slot: usize) {
        if let Some(old) = self.slots.get(slot).and_then(|x| *x)
            && let Some(root_idx) = self.root
        {
            let _ = Self::remove_node(&mut self.pool, root_idx.get(), slot, &old);
            self.slots[slot] = None;
        }
    }

    fn clear(&mut self) {
        self.root = None;
        self.pool.arena.clear();
        self.pool.free.clear();
        self.slots.clear();
    }

    fn query_rect(&self, rect: Aabb2D<T>, out: &mut Vec<usize>) {
        let Some(root_idx) = self.root else {
            return;
        };
        let mut stack = vec![root_idx];
        while let Some(i) = stack.pop() {
            let n = &self.pool.arena[i.get()];
            if !n.bbox.intersects(&rect) {
                continue;
            }
            match &n.kind {
                Kind::Leaf(items) => {
                    out.extend(
                        items
                            .iter()
                            .filter(|(_, b)| b.intersects(&rect))
                            .map(|(s, _)| *s),
                    );
                }
                Kind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
    }
}

impl<T: Scalar> Debug for Bvh<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let alive = self.slots.iter().filter(|e| e.is_some()).count();
        f.debug_struct("Bvh")
            .field("max_leaf", &self.max_leaf)
            .field("arena_nodes", &self.pool.arena.len())
            .field("free_nodes", &self.pool.free.len())
            .field("alive", &alive)
            .field("has_root", &self.root.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(b: &Bvh<f64>, r: Aabb2D<f64>) -> Vec<usize> {
        let mut out = Vec::new();
        b.query_rect(r, &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn update_moves_slot() {
        let mut b: Bvh<f64> = Bvh::default();
        b.insert(0, Aabb2D::new(0.0, 0.0, 10.0, 10.0));
        b.insert(1, Aabb2D::new(12.0, 0.0, 22.0, 10.0));
        b.update(0, Aabb2D::new(100.0, 100.0, 110.0, 110.0));

        assert!(hits(&b, Aabb2D::point(5.0, 5.0)).is_empty());
        assert_eq!(hits(&b, Aabb2D::point(105.0, 105.0)), vec![0]);
        assert_eq!(hits(&b, Aabb2D::point(15.0, 5.0)), vec![1]);
    }

    #[test]
    fn split_then_updates_on_internal() {
        let mut b: Bvh<f64> = Bvh::default();
        let n = 12_usize;
        let mut current: Vec<Aabb2D<f64>> = Vec::with_capacity(n);
        for i in 0..n {
            let x0 = (i as f64) * 20.0;
            let a = Aabb2D::new(x0, 0.0, x0 + 10.0, 10.0);
            current.push(a);
            b.insert(i, a);
        }
        let root = b.root.map(NodeIdx::get);
        assert!(
            matches!(root.map(|r| &b.pool.arena[r].kind), Some(Kind::Internal { .. })),
            "exceeding max_leaf must split the root"
        );

        for &i in &[0_usize, 5, 9] {
            let new_bb = Aabb2D::new(1000.0 + i as f64 * 5.0, 1000.0, 1002.0 + i as f64 * 5.0, 1010.0);
            b.update(i, new_bb);
            current[i] = new_bb;
        }

        for (i, bb) in current.iter().enumerate() {
            let (mx, my) = bb.center();
            assert_eq!(hits(&b, Aabb2D::point(mx, my)), vec![i], "midpoint lookup must return the slot itself");
        }
    }

    #[test]
    fn churn_recycles_nodes() {
        let mut b: Bvh<f64> = Bvh::with_capacity(32, 4);
        for i in 0..32 {
            let x = i as f64 * 3.0;
            b.insert(i, Aabb2D::new(x, 0.0, x + 1.0, 1.0));
        }
        let baseline = b.node_count();
        for round in 0..50 {
            for i in 0..32 {
                let x = i as f64 * 3.0 + if round % 2 == 0 { 500.0 } else { 0.0 };
                b.update(i, Aabb2D::new(x, 0.0, x + 1.0, 1.0));
            }
        }
        assert_eq!(hits(&b, Aabb2D::new(-1.0, -1.0, 1000.0, 2.0)).len(), 32);
        assert!(b.node_count() <= baseline * 4, "live nodes must stay bounded under churn");
    }

    #[test]
    fn removing_everything_leaves_empty_queries() {
        let mut b: Bvh<f64> = Bvh::default();
        for i in 0..20 {
            let x = i as f64;
            b.insert(i, Aabb2D::new(x, x, x + 0.5, x + 0.5));
        }
        for i in 0..20 {
            b.remove(i);
        }
        assert!(hits(&b, Aabb2D::new(-100.0, -100.0, 100.0, 100.0)).is_empty());
        b.insert(3, Aabb2D::new(50.0, 50.0, 51.0, 51.0));
        assert_eq!(hits(&b, Aabb2D::point(50.5, 50.5)), vec![3]);
        assert!(hits(&b, Aabb2D::point(0.0, 0.0)).is_empty());
    }
}
