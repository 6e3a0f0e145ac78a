// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A cart drives across a map, sweeping over crates that sit still.
//!
//! The cart is a grid: cargo on its deck lives in the cart's own frame and never moves in the
//! index while the cart drives. Crates on the map are picked up by the grid sweep as the cart
//! passes over them; sleeping ones are woken.
//!
//! Run (set `RUST_LOG=strata_broadphase=debug` to see pass summaries):
//! - `cargo run -p strata_demos --example vehicle_sweep`

use kurbo::Point;
use strata_broadphase::{Body, BodyKind, ContactSet, Fixture, Shape, Simulation};
use strata_scene::LocalTransform;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut sim = Simulation::new();
    let map = sim.spawn_map(LocalTransform::IDENTITY);

    let cart = sim
        .spawn_grid(map, LocalTransform::at(0.0, 0.0))
        .expect("map is alive");
    sim.add_body(cart, Body::new(BodyKind::Kinematic)).expect("fresh entity");
    sim.add_fixture(cart, Fixture::new(Shape::Rect(kurbo::Rect::new(-2.0, -1.0, 2.0, 1.0))))
        .expect("cart sits on the map");

    // Cargo riding on the deck.
    let cargo = sim
        .spawn(Some(cart), LocalTransform::at(0.5, 0.0))
        .expect("cart is alive");
    sim.add_body(cargo, Body::new(BodyKind::Dynamic)).expect("fresh entity");
    sim.add_fixture(cargo, Fixture::new(Shape::square(0.4)))
        .expect("cargo rides on the map");

    // Sleeping crates along the road.
    let mut crates = Vec::new();
    for x in [8.0, 14.0, 20.0] {
        let c = sim
            .spawn(Some(map), LocalTransform::at(x, 0.0))
            .expect("map is alive");
        sim.add_body(c, Body::new(BodyKind::Dynamic)).expect("fresh entity");
        sim.add_fixture(c, Fixture::new(Shape::square(0.5)))
            .expect("crate sits on the map");
        sim.set_awake(c, false).expect("crate has a body");
        crates.push(c);
    }

    let mut contacts = ContactSet::new();
    for tick in 0..12 {
        let x = f64::from(tick) * 2.0;
        sim.set_local_position(cart, Point::new(x, 0.0))
            .expect("cart is alive");
        let stats = sim.step(&mut contacts);
        let awake: Vec<_> = crates
            .iter()
            .map(|c| sim.body(*c).is_some_and(|b| b.awake))
            .collect();
        println!(
            "tick {tick:2}: cart at {x:4.1}  swept {}  pairs {}  woken {}  crates awake {awake:?}",
            stats.swept, stats.pairs, stats.woken
        );
    }

    println!("{} contacts registered:", contacts.len());
    for ((a, b), entry) in contacts.iter() {
        println!("  {:?} <-> {:?} ({:?}, refreshed {}x)", a.0, b.0, entry.origin, entry.refreshes);
    }
    let cargo_box = sim.fixtures(cargo)[0].proxies()[0];
    println!(
        "cargo proxy, in the cart's frame: {:?}",
        sim.broadphase().proxy(cargo_box).map(|p| p.aabb)
    );
}
