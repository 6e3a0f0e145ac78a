// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Partition resolution: the nearest partition-owning entity at or above an entity.

use std::collections::BTreeMap;

use strata_scene::{EntityId, MAX_DEPTH, Scene};
use tracing::error;

use crate::partition::Partition;

/// Resolves entities to partition owners, caching every answer until cleared.
///
/// The cache must be cleared whenever ancestry can have changed; the broad phase does so at the
/// start of lookup processing, at the start of each pair pass, and after every hierarchy event.
#[derive(Debug, Default)]
pub(crate) struct PartitionResolver {
    cache: BTreeMap<EntityId, Option<EntityId>>,
}

impl PartitionResolver {
    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn resolve(
        &mut self,
        scene: &Scene,
        partitions: &BTreeMap<EntityId, Partition>,
        e: EntityId,
    ) -> Option<EntityId> {
        if let Some(hit) = self.cache.get(&e) {
            return *hit;
        }
        let mut walked = Vec::new();
        let mut cur = Some(e);
        let found = loop {
            let Some(id) = cur else {
                break None;
            };
            if let Some(hit) = self.cache.get(&id) {
                break *hit;
            }
            if partitions.contains_key(&id) {
                break Some(id);
            }
            walked.push(id);
            if walked.len() > MAX_DEPTH {
                error!(entity = ?e, "parent chain exceeds maximum depth; treating as detached");
                break None;
            }
            cur = scene.parent(id);
        };
        // Everything walked shares the answer.
        for id in walked {
            self.cache.insert(id, found);
        }
        if let Some(owner) = found {
            self.cache.insert(owner, found);
        }
        found
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> usize {
        self.cache.len()
    }
}
