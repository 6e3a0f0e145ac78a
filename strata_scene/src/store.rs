// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sparse per-component storage keyed by entity id.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::types::EntityId;

/// Sparse storage for one component kind.
///
/// Components live in a slot-indexed vector, so lookups are a bounds check plus a generation
/// compare, and iteration runs in slot order. A component stored for a stale id is never
/// returned for the entity that later reuses the slot.
#[derive(Clone)]
pub struct ComponentStore<T> {
    slots: Vec<Option<(u32, T)>>,
    len: usize,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<T: Debug> Debug for ComponentStore<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> ComponentStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored components.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or replace the component for `id`, returning the previous one.
    pub fn insert(&mut self, id: EntityId, value: T) -> Option<T> {
        let i = id.idx();
        if self.slots.len() <= i {
            self.slots.resize_with(i + 1, || None);
        }
        match self.slots[i].replace((id.generation(), value)) {
            Some((generation, old)) if generation == id.generation() => Some(old),
            Some(_) => None,
            None => {
                self.len += 1;
                None
            }
        }
    }

    /// Remove and return the component for `id`.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.idx())?;
        if slot.as_ref().is_some_and(|(g, _)| *g == id.generation()) {
            self.len -= 1;
            return slot.take().map(|(_, v)| v);
        }
        None
    }

    /// Component for `id`, if present.
    pub fn get(&self, id: EntityId) -> Option<&T> {
        match self.slots.get(id.idx())? {
            Some((g, v)) if *g == id.generation() => Some(v),
            _ => None,
        }
    }

    /// Mutable component for `id`, if present.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.slots.get_mut(id.idx())? {
            Some((g, v)) if *g == id.generation() => Some(v),
            _ => None,
        }
    }

    /// Whether `id` has a component in this store.
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate `(id, component)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "EntityId uses 32-bit indices by design."
            )]
            s.as_ref().map(|(g, v)| (EntityId::new(i as u32, *g), v))
        })
    }
}
