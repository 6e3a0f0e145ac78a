// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fat tree basics.
//!
//! Add a few boxes, nudge one inside its margin, push another out of it, and query.
//!
//! Run:
//! - `cargo run -p strata_demos --example tree_basics`

use strata_index::{Aabb2D, FatTree};

fn main() {
    let mut tree: FatTree<f64, &str> = FatTree::new(0.25);
    let crate_ = tree.add(Aabb2D::from_center(0.0, 0.0, 1.0, 1.0), "crate");
    let barrel = tree.add(Aabb2D::from_center(3.0, 0.0, 0.5, 0.5), "barrel");
    let _wall = tree.add(Aabb2D::from_xywh(-5.0, 4.0, 10.0, 1.0), "wall");
    println!("after adds: {} entries, {} mutations", tree.len(), tree.mutations());

    // Inside the margin: only the tight box changes.
    let restructured = tree.move_proxy(crate_, Aabb2D::from_center(0.1, 0.0, 1.0, 1.0));
    println!("nudge crate: restructured = {restructured}, mutations = {}", tree.mutations());
    assert!(!restructured);

    // Out of the margin: the entry is re-fattened around its new box.
    let restructured = tree.move_proxy(barrel, Aabb2D::from_center(0.5, 3.5, 0.5, 0.5));
    println!("move barrel: restructured = {restructured}, mutations = {}", tree.mutations());
    println!("barrel fat box: {:?}", tree.fat_aabb(barrel));

    let probe = Aabb2D::from_xywh(-1.0, 3.0, 2.0, 1.0);
    let approximate: Vec<_> = tree.query(probe, true).map(|(_, name)| name).collect();
    let exact: Vec<_> = tree.query(probe, false).map(|(_, name)| name).collect();
    println!("fat hits: {approximate:?}");
    println!("tight hits: {exact:?}");
    assert!(exact.iter().all(|n| approximate.contains(n)));
}
