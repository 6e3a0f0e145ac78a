// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Index: a dynamic, margin-fattened 2D AABB tree.
//!
//! - Add, move, and remove axis-aligned bounding boxes (AABBs) with small `Copy` payloads.
//! - Every stored box is enlarged by a margin, so movements that stay inside it cost nothing.
//! - Query by rectangle, either approximately (fattened boxes) or narrowed to the tight boxes.
//!
//! It is generic over the scalar type `T` and does not depend on any geometry crate.
//! Higher layers compute partition-local boxes and feed them here.
//!
//! Backends are pluggable via a simple trait. The default is a BVH with an SAH-like split;
//! a flat vector backend is available for tiny sets and as a correctness baseline.
//!
//! # Example
//!
//! ```rust
//! use strata_index::{Aabb2D, FatTree};
//!
//! let mut tree: FatTree<f64, u32> = FatTree::new(0.5);
//! let k = tree.add(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 7);
//!
//! // Small moves are absorbed by the margin.
//! assert!(!tree.move_proxy(k, Aabb2D::new(0.2, 0.0, 1.2, 1.0)));
//!
//! // Larger ones re-fatten the entry.
//! assert!(tree.move_proxy(k, Aabb2D::new(4.0, 0.0, 5.0, 1.0)));
//!
//! let hits: Vec<_> = tree.query(Aabb2D::point(4.5, 0.5), false).collect();
//! assert_eq!(hits, vec![(k, 7)]);
//! ```
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for floating-point coordinates.
//! SAH metrics use widened accumulators to reduce precision pitfalls.

#![no_std]

extern crate alloc;

pub mod backend;
pub mod backends;
pub mod tree;
pub mod types;

pub use backend::Backend;
pub use backends::bvh::Bvh;
pub use backends::flatvec::FlatVec;
pub use tree::{FatTree, FatTreeGeneric, Key};
pub use types::{Aabb2D, Scalar};
