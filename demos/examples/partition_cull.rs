// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Partition culling and picking.
//!
//! Scatter boxes over a grid, cull them from a camera, move one, nest a
//! bridge, and pick along a ray.
//!
//! Run:
//! - `cargo run -p understory_demos --example partition_cull`

use glam::{DMat4, DVec3};
use understory_octree::Aabb3;
use understory_spatial::{
    Camera, CullResult, Drawable, DrawableArena, DrawableId, OcclusionBackend, PartitionConfig,
    Picker, QueryPool, SpatialBridge, SpatialPartition,
};

/// Reports every query as visible and logs how many were issued.
#[derive(Default)]
struct AlwaysVisible {
    next: u32,
    issued: usize,
}

impl OcclusionBackend for AlwaysVisible {
    fn gen_query(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
    fn delete_query(&mut self, _name: u32) {}
    fn run_query(&mut self, _name: u32, _verts: &[DVec3; 8], _indices: &[u8; 8]) {
        self.issued += 1;
    }
    fn query_result(&mut self, _name: u32) -> u32 {
        1
    }
}

/// Treats every drawable as its box; the hit point is the box entry point.
///
/// Drawables inside a bridge have local extents, so the picker keeps their
/// render matrices to test in world space.
struct BoxPicker {
    bridged: Vec<(DrawableId, DMat4)>,
}

impl Picker for BoxPicker {
    fn intersect(
        &mut self,
        id: DrawableId,
        drawable: &Drawable,
        start: DVec3,
        end: DVec3,
    ) -> Option<DVec3> {
        let mut bounds = drawable.extents;
        if let Some((_, m)) = self.bridged.iter().find(|(d, _)| *d == id) {
            bounds = Aabb3::new(m.transform_point3(bounds.min), m.transform_point3(bounds.max));
        }
        let dir = end - start;
        let inv = dir.recip();
        let t0 = (bounds.min - start) * inv;
        let t1 = (bounds.max - start) * inv;
        let near = t0.min(t1).max_element().max(0.0);
        let far = t0.max(t1).min_element().min(1.0);
        (near <= far).then(|| start + dir * near)
    }
}

fn unit_box(center: DVec3) -> Drawable {
    Drawable::new(Aabb3::from_center_half(center, DVec3::splat(0.5)))
}

fn main() {
    let mut drawables = DrawableArena::new();
    let mut partition = SpatialPartition::new(PartitionConfig::default());

    let mut grid = Vec::new();
    for x in -10..=10 {
        for y in -10..=10 {
            let d = drawables.insert(unit_box(DVec3::new(
                f64::from(x) * 4.0,
                f64::from(y) * 4.0,
                0.0,
            )));
            partition.put(&mut drawables, d, false).unwrap();
            grid.push(d);
        }
    }
    println!(
        "{} drawables in {} groups",
        drawables.len(),
        partition.group_count()
    );

    // Stand at the -x edge looking across the grid.
    let camera = Camera::look_at(DVec3::new(-60.0, 0.0, 5.0), DVec3::ZERO, DVec3::Z);
    let mut pool = QueryPool::new();
    let mut queries = AlwaysVisible::default();
    let mut result = CullResult::new();
    for frame in 0..3 {
        partition.advance_frame();
        result.clear();
        partition.cull(&camera, &drawables, &mut pool, &mut queries, &mut result);
        println!(
            "frame {frame}: {} visible groups, {} culled by occlusion, {} queries issued so far",
            result.visible_groups.len(),
            result.occlusion_groups.len(),
            queries.issued
        );
    }
    partition.validate(&drawables).unwrap();

    // Move one box far behind the camera and select again.
    let moved = grid[0];
    if let Some(d) = drawables.get_mut(moved) {
        let step = DVec3::new(-200.0, 0.0, 0.0);
        d.extents = d.extents.translate(step);
        d.position += step;
    }
    partition.move_drawable(&mut drawables, moved, None).unwrap();
    result.clear();
    partition.select(&camera, &drawables, &mut result);
    assert!(!result.drawables.contains(&moved), "moved box is behind the camera");
    println!("{} drawables selected after the move", result.drawables.len());

    // A bridge: a small local scene placed above the grid.
    let anchor = drawables.insert(unit_box(DVec3::ZERO).with_bridge());
    let mut bridge = SpatialBridge::new(anchor, PartitionConfig::default());
    let inner = drawables.insert(unit_box(DVec3::new(0.0, 0.0, 0.0)));
    bridge.partition_mut().put(&mut drawables, inner, false).unwrap();
    let lift = DMat4::from_translation(DVec3::new(0.0, 0.0, 10.0));
    bridge.set_render_matrix(lift);
    bridge.update_spatial_extents(&mut drawables).unwrap();
    partition.put(&mut drawables, anchor, false).unwrap();
    partition.rebound(partition.root_group(), &drawables);

    // Straight down through the bridge onto the grid.
    let bridges = [bridge];
    let mut picker = BoxPicker {
        bridged: vec![(inner, lift)],
    };
    let hit = partition.line_segment_intersect(
        DVec3::new(0.0, 0.0, 30.0),
        DVec3::new(0.0, 0.0, -30.0),
        &drawables,
        &bridges,
        &mut picker,
    );
    let hit = hit.expect("the ray crosses the bridge");
    println!("picked {:?} at {:?}", hit.drawable, hit.point);
    assert_eq!(hit.drawable, inner, "the bridged box sits above the grid");
}
