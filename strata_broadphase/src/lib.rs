// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Broadphase: partitioned spatial indexing and candidate-pair generation.
//!
//! Space is split into partitions. A *map* is a top-level simulation space; a *grid* is a
//! movable partition placed on a map (a ship, a vehicle, a conveyor deck). Every collidable
//! fixture child has a proxy in the nearest partition above its entity, stored in that
//! partition's local frame, so moving a grid never touches the proxies riding on it.
//!
//! Each tick:
//!
//! 1. Lifecycle edits queue [`LookupEvent`]s, which are applied in order to keep every
//!    registration in the right partition and every proxy box current.
//! 2. Touched proxies collect in their map's move buffer.
//! 3. The pair pass sweeps moved grids over the map, scans grid-against-grid overlaps, then
//!    queries every buffered proxy against its map and nearby grids, forwarding deduplicated
//!    pairs to a [`ContactManager`].
//!
//! Entities placed inside a container drop out of the index; their descendants use the
//! outer-most container's bounds. Non-collidable and body-less entities are tracked as
//! *sundries*, which take part in area queries but never in pairing.
//!
//! ## API overview
//!
//! - [`Simulation`]: owns the scene, the bodies and fixtures, and the [`Broadphase`].
//! - [`ContactManager`]: receives candidate pairs; [`ContactSet`] is an in-memory implementation.
//! - [`BroadphaseConfig`]: fattening and pair-discovery margins.
//!
//! ## Example
//!
//! ```rust
//! use strata_broadphase::{Body, BodyKind, ContactSet, Fixture, FixtureRef, Shape, Simulation};
//! use strata_scene::LocalTransform;
//!
//! let mut sim = Simulation::new();
//! let map = sim.spawn_map(LocalTransform::IDENTITY);
//!
//! let a = sim.spawn(Some(map), LocalTransform::at(0.0, 0.0)).unwrap();
//! sim.add_body(a, Body::new(BodyKind::Dynamic)).unwrap();
//! let fa = sim.add_fixture(a, Fixture::new(Shape::square(0.5))).unwrap();
//!
//! let b = sim.spawn(Some(map), LocalTransform::at(0.5, 0.5)).unwrap();
//! sim.add_body(b, Body::new(BodyKind::Dynamic)).unwrap();
//! let fb = sim.add_fixture(b, Fixture::new(Shape::square(0.5))).unwrap();
//!
//! let mut contacts = ContactSet::new();
//! let stats = sim.step(&mut contacts);
//! assert_eq!(stats.pairs, 1);
//! assert!(contacts.contains_fixtures(fa, fb));
//! ```
//!
//! Everything runs on the caller's thread and is deterministic: iteration follows id order,
//! and the pair set does not depend on the order proxies were touched in.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and installs no subscriber. Consistency problems are
//! logged at `error`, pass summaries at `debug`, and per-entity registration changes at `trace`.

mod aabb;
mod body;
mod broadphase;
mod config;
mod contacts;
mod error;
mod grid_scan;
mod lookup;
mod pairs;
mod partition;
mod pool;
mod proxy;
mod resolver;
mod shape;
mod world;

pub use body::{Body, BodyKind, CollisionFilter, Fixture, FixtureRef, FixtureSet};
pub use broadphase::Broadphase;
pub use config::BroadphaseConfig;
pub use contacts::{ContactEntry, ContactManager, ContactSet, ContactSide, PairOrigin};
pub use error::{BroadphaseError, ConfigError};
pub use grid_scan::CHUNK_SIZE;
pub use lookup::LookupEvent;
pub use pairs::PassStats;
pub use partition::{Partition, PartitionKind, Placement, Registration};
pub use proxy::{Proxy, ProxyId, TreeKind};
pub use shape::Shape;
pub use world::Simulation;
