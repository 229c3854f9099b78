// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bridges: partitions that move as one drawable inside another partition.

use glam::{DMat4, DVec3};
use understory_octree::Aabb3;

use crate::camera::Camera;
use crate::cull::CullResult;
use crate::drawable::{DrawableArena, DrawableId};
use crate::error::SpatialError;
use crate::occlusion::{OcclusionBackend, QueryPool};
use crate::partition::{PartitionConfig, SpatialPartition};

/// Largest bin radius a bridge drawable reports to its host partition.
const MAX_BRIDGE_BIN_RADIUS: f64 = 256.0;

/// A partition in local coordinates, stored in a host partition as a single drawable.
///
/// The bridge's drawable carries the world-space extents of everything in
/// the local partition; the render matrix maps local space to world space.
#[derive(Debug)]
pub struct SpatialBridge {
    partition: SpatialPartition,
    drawable: DrawableId,
    render_matrix: DMat4,
}

impl SpatialBridge {
    /// A bridge for `drawable` with an empty local partition and an identity transform.
    ///
    /// The drawable should be created with [`Drawable::with_bridge`](crate::Drawable::with_bridge).
    pub fn new(drawable: DrawableId, config: PartitionConfig) -> Self {
        Self {
            partition: SpatialPartition::new_bridge(config),
            drawable,
            render_matrix: DMat4::IDENTITY,
        }
    }

    /// The drawable standing in for the bridge.
    pub fn drawable(&self) -> DrawableId {
        self.drawable
    }

    /// The local partition.
    pub fn partition(&self) -> &SpatialPartition {
        &self.partition
    }

    /// The local partition, for placing drawables.
    pub fn partition_mut(&mut self) -> &mut SpatialPartition {
        &mut self.partition
    }

    /// Local to world transform.
    pub fn render_matrix(&self) -> DMat4 {
        self.render_matrix
    }

    /// Set the local to world transform.
    ///
    /// Call [`update_spatial_extents`](Self::update_spatial_extents) and move
    /// the drawable in its host partition afterwards.
    pub fn set_render_matrix(&mut self, matrix: DMat4) {
        self.render_matrix = matrix;
    }

    /// Recompute the bridge drawable's world extents from the local root.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "SpatialBridge::update_spatial_extents")
    )]
    pub fn update_spatial_extents(
        &mut self,
        drawables: &mut DrawableArena,
    ) -> Result<(), SpatialError> {
        let root = self.partition.root_group();
        self.partition.rebound(root, drawables);
        let Some(local) = self.partition.group(root).map(|g| g.extents()) else {
            return Ok(());
        };

        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 4 != 0 { local.max.x } else { local.min.x },
                if i & 2 != 0 { local.max.y } else { local.min.y },
                if i & 1 != 0 { local.max.z } else { local.min.z },
            );
            let p = self.render_matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }

        let d = drawables
            .get_mut(self.drawable)
            .ok_or(SpatialError::StaleDrawable(self.drawable))?;
        d.extents = Aabb3::new(min, max);
        d.position = (min + max) * 0.5;
        d.radius = ((max - min) * 0.5).length();
        d.bin_radius = d.radius.min(MAX_BRIDGE_BIN_RADIUS);
        Ok(())
    }

    /// `camera` expressed in the bridge's local space.
    pub fn local_camera(&self, camera: &Camera) -> Camera {
        let to_local = self.render_matrix.inverse();
        let origin = to_local.transform_point3(camera.origin());
        let at = to_local.transform_vector3(camera.at_axis());
        let up = to_local.transform_vector3(camera.up_axis());
        let mut local = camera.clone();
        local.set_look_at(origin, origin + at, up);
        local
    }

    /// Cull the local partition against `camera`, given in world space.
    pub fn cull(
        &mut self,
        camera: &Camera,
        drawables: &DrawableArena,
        pool: &mut QueryPool,
        backend: &mut dyn OcclusionBackend,
        result: &mut CullResult,
    ) {
        let local = self.local_camera(camera);
        self.partition
            .cull(&local, drawables, pool, backend, result);
    }

    /// Select from the local partition with `camera`, given in world space.
    pub fn select(&mut self, camera: &Camera, drawables: &DrawableArena, result: &mut CullResult) {
        let local = self.local_camera(camera);
        self.partition.select(&local, drawables, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Drawable;

    fn bridge_with_one(local_center: DVec3) -> (SpatialBridge, DrawableArena, DrawableId) {
        let mut drawables = DrawableArena::new();
        let id = drawables.insert(
            Drawable::new(Aabb3::from_center_half(DVec3::ZERO, DVec3::ONE)).with_bridge(),
        );
        let mut bridge = SpatialBridge::new(id, PartitionConfig::default());
        let inner = drawables.insert(Drawable::new(Aabb3::from_center_half(
            local_center,
            DVec3::splat(0.5),
        )));
        bridge.partition_mut().put(&mut drawables, inner, false).unwrap();
        (bridge, drawables, inner)
    }

    #[test]
    fn world_extents_follow_the_render_matrix() {
        let (mut bridge, mut drawables, _) = bridge_with_one(DVec3::new(2.0, 0.0, 0.0));
        assert!(bridge.partition().is_bridge());

        bridge.set_render_matrix(DMat4::from_translation(DVec3::new(0.0, 10.0, 0.0)));
        bridge.update_spatial_extents(&mut drawables).unwrap();
        let d = drawables.get(bridge.drawable()).unwrap();
        assert!((d.extents.min - DVec3::new(1.5, 9.5, -0.5)).length() < 1e-9);
        assert!((d.extents.max - DVec3::new(2.5, 10.5, 0.5)).length() < 1e-9);
        assert!((d.position - DVec3::new(2.0, 10.0, 0.0)).length() < 1e-9);

        // A quarter turn about z takes local +x to world +y.
        bridge.set_render_matrix(DMat4::from_rotation_z(core::f64::consts::FRAC_PI_2));
        bridge.update_spatial_extents(&mut drawables).unwrap();
        let d = drawables.get(bridge.drawable()).unwrap();
        assert!((d.position - DVec3::new(0.0, 2.0, 0.0)).length() < 1e-9);
        assert!(d.is_valid());
    }

    #[test]
    fn cull_uses_local_camera() {
        let (mut bridge, drawables, inner) = bridge_with_one(DVec3::new(20.0, 0.0, 0.0));
        bridge.set_render_matrix(DMat4::from_translation(DVec3::new(0.0, 500.0, 0.0)));
        let group = drawables.get(inner).unwrap().group().unwrap();

        // World camera looks down +x from the bridge's origin.
        let camera = Camera::look_at(
            DVec3::new(0.0, 500.0, 0.0),
            DVec3::new(1.0, 500.0, 0.0),
            DVec3::Z,
        );
        let local = bridge.local_camera(&camera);
        assert!(local.origin().length() < 1e-9);

        let mut result = CullResult::new();
        bridge.select(&camera, &drawables, &mut result);
        assert_eq!(result.drawables, [inner]);

        let mut pool = QueryPool::new();
        let mut queries = NoQueries;
        result.clear();
        bridge.cull(&camera, &drawables, &mut pool, &mut queries, &mut result);
        assert!(result.visible_groups.contains(&group));

        // The same camera without the transform sees nothing of the local scene.
        result.clear();
        bridge
            .partition_mut()
            .select(&camera, &drawables, &mut result);
        assert!(result.drawables.is_empty());
    }

    #[derive(Debug)]
    struct NoQueries;

    impl OcclusionBackend for NoQueries {
        fn gen_query(&mut self) -> u32 {
            1
        }
        fn delete_query(&mut self, _name: u32) {}
        fn run_query(&mut self, _name: u32, _verts: &[DVec3; 8], _indices: &[u8; 8]) {}
        fn query_result(&mut self, _name: u32) -> u32 {
            1
        }
    }
}
