// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::DVec3;
use understory_octree::{Aabb3, NoopListener, Octree};
use understory_spatial::{
    Camera, CullResult, Drawable, DrawableArena, DrawableId, OcclusionBackend, QueryPool,
    SpatialPartition,
};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }
}

/// Boxes scattered over a flat region, mostly small with a few large ones.
fn gen_boxes(count: usize, extent: f64, seed: u64) -> Vec<Aabb3> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|i| {
            let c = DVec3::new(
                rng.range(-extent, extent),
                rng.range(-extent, extent),
                rng.range(-8.0, 8.0),
            );
            let half = if i % 50 == 0 {
                rng.range(8.0, 32.0)
            } else {
                rng.range(0.1, 2.0)
            };
            Aabb3::from_center_half(c, DVec3::splat(half))
        })
        .collect()
}

fn build_scene(boxes: &[Aabb3]) -> (SpatialPartition, DrawableArena, Vec<DrawableId>) {
    let mut part = SpatialPartition::default();
    let mut drawables = DrawableArena::new();
    let ids = boxes
        .iter()
        .map(|b| {
            let d = drawables.insert(Drawable::new(*b));
            let _ = part.put(&mut drawables, d, false);
            d
        })
        .collect();
    (part, drawables, ids)
}

/// Every query passes; names are never reused by the backend.
struct CountingQueries {
    next: u32,
}

impl OcclusionBackend for CountingQueries {
    fn gen_query(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
    fn delete_query(&mut self, _name: u32) {}
    fn run_query(&mut self, name: u32, verts: &[DVec3; 8], indices: &[u8; 8]) {
        black_box((name, verts, indices));
    }
    fn query_result(&mut self, _name: u32) -> u32 {
        1
    }
}

fn bench_octree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree");
    for &n in &[1_000usize, 10_000] {
        let boxes = gen_boxes(n, 500.0, 0xCAFE_F00D_DEAD_BEEF);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("insert_n{n}"), |b| {
            b.iter_batched(
                Octree::<u32>::default,
                |mut tree| {
                    for (i, bx) in boxes.iter().enumerate() {
                        let r = bx.half_extents().length();
                        let _ = tree.insert(i as u32, bx.center(), r, &mut NoopListener);
                    }
                    black_box(tree.len());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for &n in &[1_000usize, 10_000] {
        let boxes = gen_boxes(n, 500.0, 0xBADC_F00D_1234_5678);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_function(format!("put_n{n}"), |b| {
            b.iter(|| black_box(build_scene(&boxes).0.group_count()));
        });

        let camera = Camera::look_at(
            DVec3::new(-520.0, 0.0, 20.0),
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::Z,
        );
        let (mut part, drawables, _) = build_scene(&boxes);
        let mut pool = QueryPool::new();
        let mut queries = CountingQueries { next: 0 };
        let mut result = CullResult::new();
        group.bench_function(format!("cull_n{n}"), |b| {
            b.iter(|| {
                part.advance_frame();
                result.clear();
                part.cull(&camera, &drawables, &mut pool, &mut queries, &mut result);
                black_box(result.visible_groups.len());
            });
        });
        group.bench_function(format!("select_n{n}"), |b| {
            b.iter(|| {
                result.clear();
                part.select(&camera, &drawables, &mut result);
                black_box(result.drawables.len());
            });
        });
    }
    group.finish();
}

fn bench_moves(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_moves");
    let boxes = gen_boxes(5_000, 500.0, 0xC1A5_7E55_9999_ABCD);
    let (mut part, mut drawables, ids) = build_scene(&boxes);
    let mut rng = Rng::new(0x0DDB_A11F_00D5_EED5);
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("jitter_all", |b| {
        b.iter(|| {
            for &id in &ids {
                if let Some(d) = drawables.get_mut(id) {
                    let step = DVec3::new(rng.range(-0.5, 0.5), rng.range(-0.5, 0.5), 0.0);
                    d.extents = d.extents.translate(step);
                    d.position += step;
                }
                let _ = part.move_drawable(&mut drawables, id, None);
            }
            part.rebound(part.root_group(), &drawables);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_octree_insert, bench_partition, bench_moves);
criterion_main!(benches);
