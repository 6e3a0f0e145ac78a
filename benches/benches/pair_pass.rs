// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use kurbo::{Point, Vec2};
use strata_benches::scatter;
use strata_broadphase::{Body, BodyKind, ContactSet, Fixture, Shape, Simulation};
use strata_scene::{EntityId, LocalTransform};

/// A map holding `count` unit boxes, every third one static, plus one grid carrying a deck.
fn populated(count: usize) -> (Simulation, Vec<EntityId>, EntityId) {
    let mut sim = Simulation::new();
    let map = sim.spawn_map(LocalTransform::IDENTITY);
    let mut bodies = Vec::with_capacity(count);
    for (i, (x, y)) in scatter(count, 200.0, 0xFACE_FEED_CAFE_BABE).into_iter().enumerate() {
        let e = sim.spawn(Some(map), LocalTransform::at(x, y)).unwrap();
        let kind = if i % 3 == 0 { BodyKind::Static } else { BodyKind::Dynamic };
        sim.add_body(e, Body::new(kind)).unwrap();
        sim.add_fixture(e, Fixture::new(Shape::square(0.5))).unwrap();
        bodies.push(e);
    }
    let grid = sim.spawn_grid(map, LocalTransform::at(-20.0, 100.0)).unwrap();
    sim.add_body(grid, Body::new(BodyKind::Kinematic)).unwrap();
    sim.add_fixture(grid, Fixture::new(Shape::square(8.0))).unwrap();
    sim.step(&mut ContactSet::new());
    (sim, bodies, grid)
}

fn bench_initial_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_pass_initial");
    for &n in &[256_usize, 1_024, 4_096] {
        group.bench_function(format!("n{n}"), |b| {
            b.iter_batched(
                || {
                    let mut sim = Simulation::new();
                    let map = sim.spawn_map(LocalTransform::IDENTITY);
                    for (x, y) in scatter(n, 200.0, 0xFACE_FEED_CAFE_BABE) {
                        let e = sim.spawn(Some(map), LocalTransform::at(x, y)).unwrap();
                        sim.add_body(e, Body::new(BodyKind::Dynamic)).unwrap();
                        sim.add_fixture(e, Fixture::new(Shape::square(0.5))).unwrap();
                    }
                    sim
                },
                |mut sim| black_box(sim.step(&mut ContactSet::new()).pairs),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_moving_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_pass_tick");
    group.bench_function("tenth_moving_n4096", |b| {
        b.iter_batched(
            || populated(4_096),
            |(mut sim, bodies, _)| {
                for e in bodies.iter().skip(1).step_by(10) {
                    let p = sim.scene().local(*e).map_or(Point::ORIGIN, |l| l.position);
                    sim.set_local_position(*e, p + Vec2::new(0.3, 0.0)).unwrap();
                }
                black_box(sim.step(&mut ContactSet::new()).pairs);
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("grid_sweep_n4096", |b| {
        b.iter_batched(
            || populated(4_096),
            |(mut sim, _, grid)| {
                for x in 0..24 {
                    sim.set_local_position(grid, Point::new(f64::from(x) * 10.0, 100.0))
                        .unwrap();
                    black_box(sim.step(&mut ContactSet::new()).swept);
                }
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_initial_pass, bench_moving_tick);
criterion_main!(benches);
