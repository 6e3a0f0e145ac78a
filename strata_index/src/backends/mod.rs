// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend implementations for different spatial strategies.
//!
//! - `flatvec`: flat vector with linear scans (small, simple, a correctness baseline).
//! - `bvh`: generic BVH (`T: Scalar`) with SAH-like split; the default for fattened trees.
//!
//! SAH note
//! --------
//! The BVH uses an SAH-like split heuristic when a leaf overflows.
//! For a split point `k` along a sorted axis we minimize:
//!
//! `cost(k) = area(LB_k) * k + area(RB_k) * (n - k)`
//!
//! where `LB_k` and `RB_k` are the bounding boxes of the first `k` and remaining `n - k` items.
//! All `k` are evaluated in O(n) per axis using prefix/suffix bounding boxes.
//! Accumulators are widened (`f32`→`f64`) for robust comparisons.

pub mod bvh;
pub mod flatvec;
