// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fattened AABB tree: stable keys over a pluggable backend, with movement hysteresis.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::backends::bvh::Bvh;
use crate::types::{Aabb2D, Scalar};

/// Generational handle for tree entries.
///
/// On removal the slot is freed; reusing it bumps the generation, so a stale `Key` never
/// aliases a newer entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u32, u32);

impl Key {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Tree keys are intentionally 32-bit."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Entry<T, P> {
    generation: u32,
    tight: Aabb2D<T>,
    fat: Aabb2D<T>,
    payload: P,
}

/// A dynamic AABB tree that stores every box enlarged by a margin.
///
/// Small movements that stay inside the stored (fat) box are absorbed without touching the
/// backend. Only when a box escapes its fat box is it re-fattened and re-inserted, which is
/// counted as a structural mutation (see [`FatTreeGeneric::mutations`]).
pub struct FatTreeGeneric<T: Scalar, P: Copy + Debug, B: Backend<T>> {
    entries: Vec<Option<Entry<T, P>>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    backend: B,
    margin: T,
    growth: usize,
    len: usize,
    mutations: u64,
}

impl<T, P, B> Debug for FatTreeGeneric<T, P, B>
where
    T: Scalar,
    P: Copy + Debug,
    B: Backend<T> + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FatTree")
            .field("len", &self.len)
            .field("slots", &self.entries.len())
            .field("margin", &self.margin)
            .field("mutations", &self.mutations)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<T, P, B> FatTreeGeneric<T, P, B>
where
    T: Scalar,
    P: Copy + Debug,
    B: Backend<T> + Default,
{
    /// Create an empty tree with the given fattening margin.
    pub fn new(margin: T) -> Self {
        Self::with_backend(margin, B::default(), 0, 64)
    }
}

impl<T, P, B> FatTreeGeneric<T, P, B>
where
    T: Scalar,
    P: Copy + Debug,
    B: Backend<T>,
{
    /// Create a tree over an explicit backend, with room for `capacity` entries, growing by
    /// `growth` entries whenever it runs out.
    pub fn with_backend(margin: T, mut backend: B, capacity: usize, growth: usize) -> Self {
        backend.reserve(capacity);
        Self {
            entries: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            backend,
            margin,
            growth: growth.max(1),
            len: 0,
            mutations: 0,
        }
    }

    /// The fattening margin applied on the next structural update.
    pub fn margin(&self) -> T {
        self.margin
    }

    /// Change the fattening margin.
    ///
    /// Existing fat boxes are kept; the new margin applies to entries inserted or re-fattened
    /// from now on.
    pub fn set_margin(&mut self, margin: T) {
        self.margin = margin;
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of structural updates (insertions, removals, re-fattenings) performed so far.
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Insert `aabb` with `payload`, returning a stable key.
    pub fn add(&mut self, aabb: Aabb2D<T>, payload: P) -> Key {
        let fat = aabb.grow(self.margin);
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generations[idx] = self.generations[idx].saturating_add(1);
            idx
        } else {
            if self.entries.len() == self.entries.capacity() {
                self.entries.reserve_exact(self.growth);
                self.generations.reserve_exact(self.growth);
                self.backend.reserve(self.growth);
            }
            self.entries.push(None);
            self.generations.push(1);
            self.entries.len() - 1
        };
        let generation = self.generations[idx];
        self.entries[idx] = Some(Entry {
            generation,
            tight: aabb,
            fat,
            payload,
        });
        self.backend.insert(idx, fat);
        self.len += 1;
        self.mutations += 1;
        Key::new(idx, generation)
    }

    /// Remove an entry, returning its payload. Stale keys are ignored.
    pub fn remove(&mut self, key: Key) -> Option<P> {
        let payload = self.entry(key)?.payload;
        self.entries[key.idx()] = None;
        self.backend.remove(key.idx());
        self.free_list.push(key.idx());
        self.len -= 1;
        self.mutations += 1;
        Some(payload)
    }

    /// Move an entry to `aabb`.
    ///
    /// Returns `true` when the new box escaped the stored fat box and the entry had to be
    /// re-fattened and re-inserted. Returns `false` when the move was absorbed by the margin
    /// (or the key is stale); no structural change happens in that case.
    pub fn move_proxy(&mut self, key: Key, aabb: Aabb2D<T>) -> bool {
        let margin = self.margin;
        let Some(e) = self.entry_mut(key) else {
            return false;
        };
        e.tight = aabb;
        if e.fat.contains(&aabb) {
            return false;
        }
        e.fat = aabb.grow(margin);
        let fat = e.fat;
        self.backend.update(key.idx(), fat);
        self.mutations += 1;
        true
    }

    /// Query entries near `rect`, in ascending slot order.
    ///
    /// With `approximate` set, every entry whose fat box intersects `rect` is returned; this may
    /// include entries whose tight box does not. Otherwise results are narrowed to entries whose
    /// tight box intersects `rect`. Touching boxes count as intersecting in both modes.
    pub fn query(&self, rect: Aabb2D<T>, approximate: bool) -> impl Iterator<Item = (Key, P)> + '_ {
        let mut slots = Vec::new();
        self.backend.query_rect(rect, &mut slots);
        slots.sort_unstable();
        slots.into_iter().filter_map(move |i| {
            let e = self.entries.get(i)?.as_ref()?;
            if !approximate && !e.tight.intersects(&rect) {
                return None;
            }
            Some((Key::new(i, e.generation), e.payload))
        })
    }

    /// Payload stored under `key`.
    pub fn get(&self, key: Key) -> Option<P> {
        self.entry(key).map(|e| e.payload)
    }

    /// The box last passed to [`add`](Self::add) or [`move_proxy`](Self::move_proxy).
    pub fn tight_aabb(&self, key: Key) -> Option<Aabb2D<T>> {
        self.entry(key).map(|e| e.tight)
    }

    /// The fattened box the backend currently indexes.
    pub fn fat_aabb(&self, key: Key) -> Option<Aabb2D<T>> {
        self.entry(key).map(|e| e.fat)
    }

    /// Iterate live entries in slot order as `(key, tight box, payload)`.
    pub fn iter(&self) -> impl Iterator<Item = (Key, Aabb2D<T>, P)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (Key::new(i, e.generation), e.tight, e.payload)))
    }

    /// Remove every entry. Outstanding keys become stale.
    pub fn clear(&mut self) {
        for (i, e) in self.entries.iter_mut().enumerate() {
            if e.take().is_some() {
                self.free_list.push(i);
            }
        }
        self.backend.clear();
        self.len = 0;
        self.mutations += 1;
    }

    fn entry(&self, key: Key) -> Option<&Entry<T, P>> {
        let e = self.entries.get(key.idx())?.as_ref()?;
        (e.generation == key.1).then_some(e)
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry<T, P>> {
        let e = self.entries.get_mut(key.idx())?.as_mut()?;
        if e.generation != key.1 {
            return None;
        }
        Some(e)
    }
}

/// Fattened tree over the default BVH backend.
pub type FatTree<T, P> = FatTreeGeneric<T, P, Bvh<T>>;

impl<T: Scalar, P: Copy + Debug> FatTree<T, P> {
    /// Create a BVH-backed tree with an initial capacity and a fixed growth increment.
    pub fn with_capacity(margin: T, capacity: usize, growth: usize) -> Self {
        Self::with_backend(margin, Bvh::with_capacity(capacity, growth), capacity, growth)
    }
}

impl<T: Scalar, P: Copy + Debug> Default for FatTree<T, P> {
    fn default() -> Self {
        Self::new(T::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::flatvec::FlatVec;
    use alloc::vec;

    fn ids<B: Backend<f64>>(t: &FatTreeGeneric<f64, u32, B>, r: Aabb2D<f64>, approx: bool) -> Vec<u32> {
        t.query(r, approx).map(|(_, p)| p).collect()
    }

    #[test]
    fn small_moves_are_absorbed() {
        let mut t: FatTree<f64, u32> = FatTree::with_capacity(0.5, 4, 4);
        let k = t.add(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 7);
        let before = t.mutations();

        assert!(!t.move_proxy(k, Aabb2D::new(0.25, 0.0, 1.25, 1.0)));
        assert!(!t.move_proxy(k, Aabb2D::new(-0.4, -0.4, 0.6, 0.6)));
        assert_eq!(t.mutations(), before, "moves within the margin must not restructure");
        assert_eq!(t.tight_aabb(k), Some(Aabb2D::new(-0.4, -0.4, 0.6, 0.6)));

        assert!(t.move_proxy(k, Aabb2D::new(3.0, 0.0, 4.0, 1.0)));
        assert_eq!(t.mutations(), before + 1);
        assert_eq!(t.fat_aabb(k), Some(Aabb2D::new(2.5, -0.5, 4.5, 1.5)));
    }

    #[test]
    fn approximate_query_returns_fat_hits() {
        let mut t: FatTree<f64, u32> = FatTree::new(0.5);
        let _ = t.add(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 1);
        let probe = Aabb2D::new(1.2, 0.0, 2.0, 1.0);
        assert_eq!(ids(&t, probe, true), vec![1]);
        assert!(ids(&t, probe, false).is_empty());
    }

    #[test]
    fn stale_keys_do_not_alias() {
        let mut t: FatTreeGeneric<f64, u32, FlatVec<f64>> = FatTreeGeneric::new(0.0);
        let a = t.add(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 1);
        assert_eq!(t.remove(a), Some(1));
        let b = t.add(Aabb2D::new(5.0, 5.0, 6.0, 6.0), 2);
        assert_ne!(a, b);
        assert_eq!(t.remove(a), None);
        assert!(!t.move_proxy(a, Aabb2D::new(9.0, 9.0, 10.0, 10.0)));
        assert_eq!(t.get(b), Some(2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn bvh_and_flatvec_agree() {
        let mut bvh: FatTree<f64, u32> = FatTree::with_capacity(0.1, 8, 8);
        let mut flat: FatTreeGeneric<f64, u32, FlatVec<f64>> = FatTreeGeneric::new(0.1);
        let mut keys = Vec::new();
        for i in 0..40_u32 {
            let x = f64::from(i % 8) * 2.0;
            let y = f64::from(i / 8) * 2.0;
            let r = Aabb2D::new(x, y, x + 1.5, y + 1.5);
            keys.push((bvh.add(r, i), flat.add(r, i)));
        }
        for (i, (kb, kf)) in keys.iter().enumerate().step_by(3) {
            let r = Aabb2D::from_xywh(i as f64 * 0.7, 3.0, 1.0, 1.0);
            assert_eq!(bvh.move_proxy(*kb, r), flat.move_proxy(*kf, r));
        }
        for probe in [
            Aabb2D::new(0.0, 0.0, 4.0, 4.0),
            Aabb2D::new(5.0, 2.5, 9.0, 3.5),
            Aabb2D::point(15.0, 9.0),
        ] {
            assert_eq!(ids(&bvh, probe, true), ids(&flat, probe, true));
            assert_eq!(ids(&bvh, probe, false), ids(&flat, probe, false));
        }
    }
}
