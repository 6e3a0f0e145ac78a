// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use strata_benches::{Rng, scatter};
use strata_index::{Aabb2D, FatTree, FatTreeGeneric, FlatVec, Key};

fn build(centers: &[(f64, f64)], margin: f64) -> (FatTree<f64, u32>, Vec<Key>) {
    let mut tree = FatTree::with_capacity(margin, centers.len(), 64);
    let keys = centers
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| tree.add(Aabb2D::from_center(x, y, 0.5, 0.5), i as u32))
        .collect();
    (tree, keys)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("fat_tree_insert");
    for &n in &[1_024_usize, 4_096, 16_384] {
        let centers = scatter(n, 1_000.0, 0xCAFE_F00D_DEAD_BEEF);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("bvh_n{n}"), |b| {
            b.iter(|| black_box(build(&centers, 0.05).0.len()));
        });
    }
    let centers = scatter(1_024, 1_000.0, 0xCAFE_F00D_DEAD_BEEF);
    group.bench_function("flatvec_n1024", |b| {
        b.iter(|| {
            let mut tree: FatTreeGeneric<f64, u32, FlatVec<f64>> = FatTreeGeneric::new(0.05);
            for (i, &(x, y)) in centers.iter().enumerate() {
                tree.add(Aabb2D::from_center(x, y, 0.5, 0.5), i as u32);
            }
            black_box(tree.len());
        });
    });
    group.finish();
}

fn bench_jitter(c: &mut Criterion) {
    // Small moves, mostly absorbed by the margin, against large moves that always restructure.
    let mut group = c.benchmark_group("fat_tree_move");
    let centers = scatter(4_096, 1_000.0, 0xBADC_F00D_1234_5678);
    for &(name, step) in &[("jitter", 0.02), ("teleport", 40.0)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || (build(&centers, 0.05), Rng::new(7)),
                |((mut tree, keys), mut rng)| {
                    for (k, &(x, y)) in keys.iter().zip(&centers) {
                        let dx = (rng.next_f64() - 0.5) * step;
                        let dy = (rng.next_f64() - 0.5) * step;
                        tree.move_proxy(*k, Aabb2D::from_center(x + dx, y + dy, 0.5, 0.5));
                    }
                    black_box(tree.mutations());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("fat_tree_query");
    let centers = scatter(16_384, 1_000.0, 0xC1A5_7E55_9999_ABCD);
    let (tree, _) = build(&centers, 0.05);
    for &approximate in &[true, false] {
        group.bench_function(format!("approximate_{approximate}"), |b| {
            b.iter(|| {
                let mut total = 0_usize;
                for q in 0..256 {
                    let x = f64::from(q % 16) * 60.0;
                    let y = f64::from(q / 16) * 60.0;
                    total += tree
                        .query(Aabb2D::from_xywh(x, y, 20.0, 20.0), approximate)
                        .count();
                }
                black_box(total);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_jitter, bench_query);
criterion_main!(benches);
