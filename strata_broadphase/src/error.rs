// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for invalid operations and configuration.
//!
//! Consistency problems found while maintaining the index (for example a registered proxy whose
//! partition has vanished) are not errors in this sense: they are logged and skipped.

use strata_scene::EntityId;
use thiserror::Error;

use crate::body::FixtureRef;

/// Errors returned by [`Simulation`](crate::Simulation) operations the caller should not have
/// attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BroadphaseError {
    /// The entity id is stale or was never issued.
    #[error("unknown entity: {0:?}")]
    UnknownEntity(EntityId),
    /// The entity is not placed under any map, so it has no simulation space.
    #[error("entity {0:?} has no resolvable map")]
    NoMap(EntityId),
    /// The entity has no body.
    #[error("entity {0:?} has no body")]
    NotABody(EntityId),
    /// The entity already has a body.
    #[error("entity {0:?} already has a body")]
    AlreadyABody(EntityId),
    /// The fixture reference does not name an existing fixture.
    #[error("no such fixture: {0:?}")]
    NoSuchFixture(FixtureRef),
    /// Hierarchy edits on contained entities go through the container operations.
    #[error("entity {0:?} is inside a container")]
    Contained(EntityId),
    /// The operation would put an entity inside its own subtree.
    #[error("re-parenting {0:?} would create a cycle")]
    Cycle(EntityId),
    /// The entity is not inside a container.
    #[error("entity {0:?} is not inside a container")]
    NotContained(EntityId),
    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid [`BroadphaseConfig`](crate::BroadphaseConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    /// A margin was negative, infinite, or NaN.
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidMargin {
        /// Which margin.
        name: &'static str,
        /// The offending value.
        value: f64,
    },
    /// Trees must grow by at least one entry at a time.
    #[error("growth increment must be positive")]
    ZeroGrowth,
}
