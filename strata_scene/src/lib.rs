// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Scene: a Kurbo-native entity hierarchy for broad-phase bookkeeping.
//!
//! - Generational [`EntityId`]s over an id-indexed slot array of parent links.
//! - Local poses (position plus rotation) composed into world or partition-relative affines.
//! - Containment: entities placed inside a container are flagged, and anything below them
//!   reports the outer-most container as its stand-in (its "mover").
//! - [`ComponentStore`]: sparse per-component storage keyed by entity id.
//!
//! This crate does not know about collision. Higher layers decide which entities own spatial
//! partitions (via [`EntityFlags::MAP`] and [`EntityFlags::GRID`]) and what bounds they have.
//!
//! ## API overview
//!
//! - [`Scene`]: hierarchy container.
//! - [`LocalTransform`]: per-entity local pose.
//! - [`EntityFlags`]: roles (map, grid) and containment state.
//!
//! Key operations:
//! - [`Scene::spawn`] / [`Scene::despawn`] / [`Scene::set_parent`]
//! - [`Scene::relative_affine`]: pose of an entity in another entity's frame.
//! - [`Scene::insert_into_container`] / [`Scene::remove_from_container`] /
//!   [`Scene::outermost_container`]
//!
//! ### Minimal usage
//!
//! ```
//! use strata_scene::{LocalTransform, Scene};
//! use kurbo::Point;
//!
//! let mut scene = Scene::new();
//! let map = scene.spawn(None, LocalTransform::IDENTITY);
//! let cart = scene.spawn(Some(map), LocalTransform::at(10.0, 0.0));
//! let box_ = scene.spawn(Some(cart), LocalTransform::at(1.0, 2.0));
//!
//! assert_eq!(scene.world_position(box_), Point::new(11.0, 2.0));
//!
//! // Put the box in a crate: it now rides along as part of the crate.
//! let crate_ = scene.spawn(Some(map), LocalTransform::at(-3.0, 0.0));
//! assert!(scene.insert_into_container(box_, crate_));
//! assert!(scene.is_contained(box_));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod scene;
mod store;
mod types;
mod util;

pub use scene::{Ancestors, MAX_DEPTH, Scene};
pub use store::ComponentStore;
pub use types::{EntityFlags, EntityId, LocalTransform};
pub use util::transform_rect_bbox;
