// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_spatial --heading-base-level=0

//! Understory Spatial: renderer-side spatial partitions over an octree.
//!
//! A [`SpatialPartition`] keeps drawables in an [`understory_octree::Octree`]
//! and attaches a [`SpatialGroup`] to every node. Groups carry what a renderer
//! needs per node: bounding boxes of the subtree and of the directly held
//! drawables, state bits, an occlusion query, a vertex buffer with its draw
//! batches, and camera distance for LOD and alpha sorting.
//!
//! - Drawables live in a shared [`DrawableArena`] and are addressed by
//!   generational [`DrawableId`]s; each one remembers the group holding it.
//! - Groups are kept in step with the octree through its listener events,
//!   so nodes created by inserts or collapsed by removals gain and lose
//!   groups automatically.
//! - Bounds are recomputed lazily: changes mark groups `DIRTY` up to the
//!   root and the next cull re-bounds only dirty subtrees.
//! - Culling combines a frustum test, a far-corner sphere test and hardware
//!   occlusion queries issued through an [`OcclusionBackend`].
//! - A [`SpatialBridge`] nests a whole partition in local coordinates inside
//!   another partition as a single drawable.
//!
//! The renderer is reached only through traits: [`OcclusionBackend`] for
//! queries, [`VertexBuffer`] and [`GeometryBuilder`] for geometry, and
//! [`Picker`] for exact hit tests.
//!
//! # Example
//!
//! ```rust
//! use glam::DVec3;
//! use understory_octree::Aabb3;
//! use understory_spatial::{Camera, CullResult, Drawable, DrawableArena, SpatialPartition};
//!
//! let mut drawables = DrawableArena::new();
//! let mut partition = SpatialPartition::default();
//!
//! let ahead = drawables.insert(Drawable::new(Aabb3::from_center_half(
//!     DVec3::new(20.0, 0.0, 0.0),
//!     DVec3::splat(0.5),
//! )));
//! let behind = drawables.insert(Drawable::new(Aabb3::from_center_half(
//!     DVec3::new(-20.0, 0.0, 0.0),
//!     DVec3::splat(0.5),
//! )));
//! partition.put(&mut drawables, ahead, false).unwrap();
//! partition.put(&mut drawables, behind, false).unwrap();
//!
//! // Look down +x from the origin.
//! let camera = Camera::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
//! let mut result = CullResult::new();
//! partition.select(&camera, &drawables, &mut result);
//! assert_eq!(result.drawables, [ahead]);
//! ```
//!
//! ## Features
//!
//! - `std` (default) or `libm`: math backend, forwarded to `glam`.
//! - `tracing`: spans around culling and geometry rebuilds, and warnings for
//!   inconsistent input.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod bridge;
mod camera;
mod cull;
mod drawable;
mod error;
mod geometry;
mod group;
mod intersect;
mod math;
mod occlusion;
mod partition;
mod pick;
mod state;
mod sync;
mod validate;

pub use bridge::SpatialBridge;
pub use camera::Camera;
pub use cull::CullResult;
pub use drawable::{Drawable, DrawableArena, DrawableId, GroupRef};
pub use error::SpatialError;
pub use geometry::{
    BufferUsage, DrawInfo, DrawInfoError, DrawMap, GeometryBuilder, RenderPass, VertexBuffer,
};
pub use group::{BoxBounds, GroupId, SpatialGroup, early_fail};
pub use intersect::{
    Containment, aabb_sphere_intersect, aabb_sphere_intersect_r2, line_segment_box_intersect,
    sphere_aabb,
};
pub use occlusion::{
    OCCLUSION_FUDGE, OcclusionBackend, OcclusionMode, QueryPool, get_occlusion_indices,
    occlusion_box, view_octant,
};
pub use partition::{PartitionConfig, PartitionId, SpatialPartition};
pub use pick::{PickHit, Picker};
pub use state::{GroupState, StateMode};
pub use validate::Violation;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;
    use alloc::vec::Vec;
    use glam::DVec3;
    use understory_octree::Aabb3;

    #[derive(Debug)]
    struct CpuBuffer {
        usage: BufferUsage,
        verts: u32,
        indices: Vec<u32>,
    }

    impl VertexBuffer for CpuBuffer {
        fn usage(&self) -> BufferUsage {
            self.usage
        }
        fn allocate_buffer(&mut self, verts: u32, indices: u32) {
            self.verts = verts;
            self.indices = vec![0; indices as usize];
        }
        fn resize_buffer(&mut self, verts: u32, indices: u32) {
            self.verts = verts;
            self.indices.resize(indices as usize, 0);
        }
        fn num_verts(&self) -> u32 {
            self.verts
        }
        fn num_indices(&self) -> u32 {
            u32::try_from(self.indices.len()).unwrap()
        }
        fn indices(&self) -> Option<&[u32]> {
            Some(&self.indices)
        }
    }

    /// Allocates buffers but never has geometry.
    #[derive(Debug, Default)]
    struct Boxes {
        created: u32,
    }

    impl GeometryBuilder for Boxes {
        fn create_vertex_buffer(&mut self, usage: BufferUsage) -> Box<dyn VertexBuffer> {
            self.created += 1;
            Box::new(CpuBuffer {
                usage,
                verts: 0,
                indices: Vec::new(),
            })
        }

        fn add_geometry_count(&mut self, _group: &SpatialGroup, _: &DrawableArena) -> (u32, u32) {
            (0, 0)
        }

        fn get_geometry(
            &mut self,
            _group: &SpatialGroup,
            _drawables: &DrawableArena,
            _buffer: &mut dyn VertexBuffer,
        ) -> DrawMap {
            DrawMap::new()
        }
    }

    /// Eight vertices and 36 indices per listed drawable; radius over 1 draws as alpha.
    #[derive(Debug)]
    struct Held<'a> {
        inner: Boxes,
        ids: &'a [DrawableId],
    }

    impl Held<'_> {
        fn held(&self, group: &SpatialGroup, drawables: &DrawableArena) -> Vec<DrawableId> {
            self.ids
                .iter()
                .copied()
                .filter(|&d| {
                    drawables
                        .get(d)
                        .and_then(|d| d.group())
                        .is_some_and(|g| g.group == group.id())
                })
                .collect()
        }
    }

    impl GeometryBuilder for Held<'_> {
        fn create_vertex_buffer(&mut self, usage: BufferUsage) -> Box<dyn VertexBuffer> {
            self.inner.create_vertex_buffer(usage)
        }

        fn add_geometry_count(&mut self, group: &SpatialGroup, drawables: &DrawableArena) -> (u32, u32) {
            let n = u32::try_from(self.held(group, drawables).len()).unwrap();
            (n * 8, n * 36)
        }

        fn get_geometry(
            &mut self,
            group: &SpatialGroup,
            drawables: &DrawableArena,
            buffer: &mut dyn VertexBuffer,
        ) -> DrawMap {
            let mut map = DrawMap::new();
            for (i, d) in self.held(group, drawables).into_iter().enumerate() {
                let i = u32::try_from(i).unwrap();
                let pass = if drawables.get(d).unwrap().radius > 1.0 {
                    RenderPass::ALPHA
                } else {
                    RenderPass::SIMPLE
                };
                map.entry(pass)
                    .or_insert_with(Vec::new)
                    .push(DrawInfo::new(i * 8, i * 8 + 7, 36, i * 36));
            }
            assert!(buffer.num_verts() > 0);
            map
        }
    }

    #[derive(Debug, Default)]
    struct NoQueries;

    impl OcclusionBackend for NoQueries {
        fn gen_query(&mut self) -> u32 {
            7
        }
        fn delete_query(&mut self, _name: u32) {}
        fn run_query(&mut self, _name: u32, _verts: &[DVec3; 8], _indices: &[u8; 8]) {}
        fn query_result(&mut self, _name: u32) -> u32 {
            1
        }
    }

    #[test]
    fn rebuild_geom_fills_buffers_and_alpha_list() {
        let mut drawables = DrawableArena::new();
        let mut part = SpatialPartition::new(PartitionConfig {
            occlusion_enabled: false,
            ..PartitionConfig::default()
        });
        let solid = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(20.0, 0.0, 0.0),
            DVec3::splat(0.3),
        )));
        let glass = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(30.0, 4.0, 0.0),
            DVec3::splat(2.0),
        )));
        let g_solid = part.put(&mut drawables, solid, false).unwrap();
        let g_glass = part.put(&mut drawables, glass, false).unwrap();

        let ids = [solid, glass];
        let mut builder = Held {
            inner: Boxes::default(),
            ids: &ids,
        };
        for g in [g_solid, g_glass] {
            assert!(part.group(g).unwrap().is_state(GroupState::GEOM_DIRTY));
            part.rebuild_geom(g, &drawables, &mut builder);
            let group = part.group(g).unwrap();
            assert!(!group.is_state(GroupState::GEOM_DIRTY));
            assert_eq!(group.vertex_buffer().unwrap().num_verts(), 8);
        }
        assert_eq!(builder.inner.created, 2);
        assert!(part.group(g_glass).unwrap().draw_map().contains_key(&RenderPass::ALPHA));

        let camera = Camera::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
        let mut result = CullResult::new();
        part.cull(
            &camera,
            &drawables,
            &mut QueryPool::new(),
            &mut NoQueries,
            &mut result,
        );
        assert_eq!(part.validate(&drawables), Ok(()));
        let glass_ref = drawables.get(glass).unwrap().group().unwrap();
        assert_eq!(result.alpha_groups, [glass_ref]);
        assert_eq!(result.visible_groups.len(), 2);
        assert!(part.group(g_glass).unwrap().depth() > 0.0);

        // A clean group is left alone; a dirty one reuses its buffer.
        part.rebuild_geom(g_solid, &drawables, &mut builder);
        assert_eq!(builder.inner.created, 2);
        part.set_state(g_solid, GroupState::GEOM_DIRTY, StateMode::Single);
        part.rebuild_geom(g_solid, &drawables, &mut builder);
        assert_eq!(builder.inner.created, 2);

        // Changing the usage forces a fresh buffer.
        part.set_buffer_usage(g_solid, BufferUsage::Stream);
        part.set_state(g_solid, GroupState::GEOM_DIRTY, StateMode::Single);
        part.rebuild_geom(g_solid, &drawables, &mut builder);
        assert_eq!(builder.inner.created, 3);
        assert_eq!(
            part.group(g_solid).unwrap().vertex_buffer().unwrap().usage(),
            BufferUsage::Stream
        );

        // Empty geometry drops the buffer.
        part.set_state(g_solid, GroupState::GEOM_DIRTY, StateMode::Single);
        part.rebuild_geom(g_solid, &drawables, &mut Boxes::default());
        assert!(part.group(g_solid).unwrap().vertex_buffer().is_none());
        assert!(part.group(g_solid).unwrap().draw_map().is_empty());
    }

    #[test]
    fn reset_vertex_buffers_returns_bridges() {
        let mut drawables = DrawableArena::new();
        let mut part = SpatialPartition::default();
        let bridge = drawables.insert(
            Drawable::new(Aabb3::from_center_half(DVec3::new(5.0, 5.0, 5.0), DVec3::ONE))
                .with_bridge(),
        );
        let plain = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(-5.0, 5.0, 5.0),
            DVec3::ONE,
        )));
        let g = part.put(&mut drawables, bridge, false).unwrap();
        part.put(&mut drawables, plain, false).unwrap();
        assert_eq!(part.group(g).unwrap().bridges(), [bridge]);

        let mut pool = QueryPool::new();
        assert_eq!(part.reset_vertex_buffers(&mut pool), vec![bridge]);
        assert!(part
            .groups()
            .all(|g| g.is_state(GroupState::GEOM_DIRTY | GroupState::IMAGE_DIRTY)));

        part.remove(&mut drawables, bridge).unwrap();
        assert!(part.reset_vertex_buffers(&mut pool).is_empty());
    }

    #[test]
    fn frozen_partition_keeps_visibility_stamps() {
        let mut drawables = DrawableArena::new();
        let mut part = SpatialPartition::default();
        let d = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(20.0, 0.0, 0.0),
            DVec3::splat(0.5),
        )));
        let g = part.put(&mut drawables, d, false).unwrap();
        let camera = Camera::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
        let mut pool = QueryPool::new();
        let mut result = CullResult::new();
        part.cull(&camera, &drawables, &mut pool, &mut NoQueries, &mut result);
        assert!(part.group_is_visible(g));

        part.set_frozen(true);
        part.advance_frame();
        result.clear();
        part.cull(&camera, &drawables, &mut pool, &mut NoQueries, &mut result);
        assert!(!part.group_is_visible(g));
        assert_eq!(result.visible_groups.len(), 1);
        // Bounds still update while frozen.
        assert_eq!(part.validate(&drawables), Ok(()));
        assert!(part.is_visible(&camera, DVec3::new(10.0, 0.0, 0.0)));
        assert!(!part.is_visible(&camera, DVec3::new(-10.0, 0.0, 0.0)));
    }
}
