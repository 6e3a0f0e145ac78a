// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Partition records and per-entity registrations.

use std::collections::BTreeMap;

use strata_index::{Aabb2D, FatTree};
use strata_scene::EntityId;

use crate::config::BroadphaseConfig;
use crate::proxy::{ProxyId, TreeKind};

/// What kind of entity owns a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKind {
    /// A top-level simulation space.
    Map,
    /// A moving sub-space with its own frame.
    Grid,
}

/// Spatial structures owned by a map or grid entity.
///
/// All boxes are in the owner's local frame. Collidable bodies live in the two trees;
/// everything else that still needs area queries lives in the sundries maps.
#[derive(Debug)]
pub struct Partition {
    owner: EntityId,
    kind: PartitionKind,
    dynamic_tree: FatTree<f64, ProxyId>,
    static_tree: FatTree<f64, ProxyId>,
    static_sundries: BTreeMap<EntityId, Aabb2D<f64>>,
    sundries: BTreeMap<EntityId, Aabb2D<f64>>,
}

impl Partition {
    pub(crate) fn new(owner: EntityId, kind: PartitionKind, config: &BroadphaseConfig) -> Self {
        let tree = || FatTree::with_capacity(config.fat_margin, config.initial_capacity, config.growth);
        Self {
            owner,
            kind,
            dynamic_tree: tree(),
            static_tree: tree(),
            static_sundries: BTreeMap::new(),
            sundries: BTreeMap::new(),
        }
    }

    /// Owning entity.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Map or grid.
    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    /// One of the two proxy trees.
    pub fn tree(&self, kind: TreeKind) -> &FatTree<f64, ProxyId> {
        match kind {
            TreeKind::Dynamic => &self.dynamic_tree,
            TreeKind::Static => &self.static_tree,
        }
    }

    pub(crate) fn tree_mut(&mut self, kind: TreeKind) -> &mut FatTree<f64, ProxyId> {
        match kind {
            TreeKind::Dynamic => &mut self.dynamic_tree,
            TreeKind::Static => &mut self.static_tree,
        }
    }

    /// Sundries of static (or bodyless) entities when `is_static`, of non-static ones otherwise.
    pub fn sundries(&self, is_static: bool) -> &BTreeMap<EntityId, Aabb2D<f64>> {
        if is_static {
            &self.static_sundries
        } else {
            &self.sundries
        }
    }

    pub(crate) fn sundries_mut(&mut self, is_static: bool) -> &mut BTreeMap<EntityId, Aabb2D<f64>> {
        if is_static {
            &mut self.static_sundries
        } else {
            &mut self.sundries
        }
    }

    /// Number of proxies across both trees.
    pub fn proxy_count(&self) -> usize {
        self.dynamic_tree.len() + self.static_tree.len()
    }

    /// Structural tree updates performed so far, across both trees.
    pub fn mutations(&self) -> u64 {
        self.dynamic_tree.mutations() + self.static_tree.mutations()
    }

    /// Union of every tight proxy box in both trees, in the local frame.
    pub fn local_bounds(&self) -> Option<Aabb2D<f64>> {
        self.dynamic_tree
            .iter()
            .chain(self.static_tree.iter())
            .map(|(_, aabb, _)| aabb)
            .reduce(|a, b| a.union(&b))
    }

    pub(crate) fn set_margin(&mut self, margin: f64) {
        self.dynamic_tree.set_margin(margin);
        self.static_tree.set_margin(margin);
    }

    /// Every proxy in both trees, dynamic first.
    pub(crate) fn proxy_ids(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.dynamic_tree
            .iter()
            .chain(self.static_tree.iter())
            .map(|(_, _, id)| id)
    }
}

/// Where a registered entity's spatial data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Proxies in the partition's dynamic or static tree, per body kind.
    Trees,
    /// One box in a sundries map.
    Sundries {
        /// Which sundries map.
        is_static: bool,
    },
    /// The entity owns the partition. When `collidable`, its own fixtures sit in its own
    /// dynamic or static tree, per body kind; otherwise nowhere.
    Own {
        /// Whether the owner's fixtures have proxies.
        collidable: bool,
    },
}

/// Which partition an entity is registered in, and how.
///
/// Kept so an entity can be removed from its previous partition after the hierarchy has
/// already changed under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Owner of the partition.
    pub partition: EntityId,
    /// Placement within it.
    pub placement: Placement,
}
