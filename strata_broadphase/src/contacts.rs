// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The seam to the narrow phase: where discovered pairs go.

use std::collections::BTreeMap;

use strata_scene::EntityId;

use crate::body::FixtureRef;

/// How a pair was discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PairOrigin {
    /// Found by the generic move-buffer pass.
    Generic,
    /// Found by the grid-versus-grid chunk scan.
    Grid,
}

/// Receives candidate pairs.
///
/// Implementations must be idempotent: registering a pair that already has a contact refreshes
/// it rather than creating a duplicate.
pub trait ContactManager {
    /// Register (or refresh) the contact between child `child_a` of fixture `a` and child
    /// `child_b` of fixture `b`.
    fn register_pair(
        &mut self,
        a: FixtureRef,
        child_a: u32,
        b: FixtureRef,
        child_b: u32,
        origin: PairOrigin,
    );
}

/// One side of a contact: fixture plus shape child.
pub type ContactSide = (FixtureRef, u32);

/// Book-keeping for one registered contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEntry {
    /// Origin of the most recent registration.
    pub origin: PairOrigin,
    /// How many times the pair was registered again after it was first created.
    pub refreshes: u32,
}

/// Deterministic in-memory [`ContactManager`] keyed by the canonical (ordered) pair.
#[derive(Clone, Debug, Default)]
pub struct ContactSet {
    contacts: BTreeMap<(ContactSide, ContactSide), ContactEntry>,
}

impl ContactSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether no contact has been registered.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Entry for the contact between two sides, in either order.
    pub fn get(&self, a: ContactSide, b: ContactSide) -> Option<&ContactEntry> {
        self.contacts.get(&canonical(a, b))
    }

    /// Whether any children of the two fixtures are in contact.
    pub fn contains_fixtures(&self, a: FixtureRef, b: FixtureRef) -> bool {
        self.contacts
            .keys()
            .any(|((fa, _), (fb, _))| (*fa == a && *fb == b) || (*fa == b && *fb == a))
    }

    /// Whether any contact involves an entity.
    pub fn touches(&self, entity: EntityId) -> bool {
        self.contacts
            .keys()
            .any(|((fa, _), (fb, _))| fa.entity == entity || fb.entity == entity)
    }

    /// Contacts in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&(ContactSide, ContactSide), &ContactEntry)> {
        self.contacts.iter()
    }

    /// Forget every contact.
    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}

impl ContactManager for ContactSet {
    fn register_pair(
        &mut self,
        a: FixtureRef,
        child_a: u32,
        b: FixtureRef,
        child_b: u32,
        origin: PairOrigin,
    ) {
        self.contacts
            .entry(canonical((a, child_a), (b, child_b)))
            .and_modify(|e| {
                e.origin = origin;
                e.refreshes += 1;
            })
            .or_insert(ContactEntry {
                origin,
                refreshes: 0,
            });
    }
}

fn canonical(a: ContactSide, b: ContactSide) -> (ContactSide, ContactSide) {
    if a <= b { (a, b) } else { (b, a) }
}
