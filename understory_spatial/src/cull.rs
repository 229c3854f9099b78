// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frustum and occlusion culling over a partition's groups.

use alloc::vec::Vec;
use glam::DVec3;
use understory_octree::NodeId;

use crate::camera::Camera;
use crate::drawable::{DrawableArena, DrawableId, GroupRef};
use crate::geometry::RenderPass;
use crate::group::{GroupId, GroupStore, Tree};
use crate::intersect::{Containment, aabb_sphere_intersect};
use crate::occlusion::{OcclusionBackend, QueryPool};
use crate::partition::{PartitionConfig, PartitionId, SpatialPartition};
use crate::state::GroupState;

/// Output of a cull or select pass.
///
/// Lists accumulate across calls so several partitions can cull into one
/// result; call [`clear`](Self::clear) between frames.
#[derive(Clone, Debug, Default)]
pub struct CullResult {
    /// Groups to draw with their batched geometry.
    pub visible_groups: Vec<GroupRef>,
    /// Visible groups holding alpha geometry.
    pub alpha_groups: Vec<GroupRef>,
    /// Groups skipped because they are occluded; their queries are re-issued.
    pub occlusion_groups: Vec<GroupRef>,
    /// Visible groups of partitions that draw per drawable.
    pub drawable_groups: Vec<GroupRef>,
    /// Drawables found by a select pass.
    pub drawables: Vec<DrawableId>,
    /// Bridges found by a select pass.
    pub visible_bridges: Vec<DrawableId>,
}

impl CullResult {
    /// An empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything collected so far.
    pub fn clear(&mut self) {
        self.visible_groups.clear();
        self.alpha_groups.clear();
        self.occlusion_groups.clear();
        self.drawable_groups.clear();
        self.drawables.clear();
        self.visible_bridges.clear();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CullMode {
    Normal,
    NoFarClip,
    Select,
}

struct Culler<'a> {
    tree: &'a Tree,
    groups: &'a mut GroupStore,
    drawables: &'a DrawableArena,
    camera: &'a Camera,
    occlusion: Option<(&'a mut QueryPool, &'a mut dyn OcclusionBackend)>,
    result: &'a mut CullResult,
    config: &'a PartitionConfig,
    partition: PartitionId,
    frame: u64,
    bridge: bool,
    mode: CullMode,
    res: Containment,
}

impl Culler<'_> {
    fn group_ref(&self, group: GroupId) -> GroupRef {
        GroupRef {
            partition: self.partition,
            group,
        }
    }

    fn traverse(&mut self, node: NodeId) {
        let id = GroupId::new(node);
        if self.mode != CullMode::Select && self.early_fail(node, id) {
            return;
        }

        let skip = self
            .groups
            .get(id)
            .is_some_and(|g| g.is_state(GroupState::SKIP_FRUSTUM_CHECK));
        if self.res == Containment::Inside || (self.res != Containment::Outside && skip) {
            self.visit_subtree(node, id);
        } else {
            self.res = self.frustum_check(id);
            if self.res.is_visible() {
                self.visit_subtree(node, id);
            }
            self.res = Containment::Outside;
        }
    }

    fn visit_subtree(&mut self, node: NodeId, id: GroupId) {
        self.visit(node, id);
        let tree = self.tree;
        for &child in tree.children(node) {
            self.traverse(child);
        }
    }

    /// Read back occlusion and skip occluded groups below the root.
    fn early_fail(&mut self, node: NodeId, id: GroupId) -> bool {
        if let Some((_, backend)) = self.occlusion.as_mut() {
            self.groups.check_occlusion(
                self.tree,
                id,
                self.config.occlusion_mode,
                self.config.occlusion_enabled,
                &mut **backend,
            );
        }
        let occluded = self
            .groups
            .get(id)
            .is_some_and(|g| g.is_state(GroupState::OCCLUDED));
        if self.tree.parent(node).is_some()
            && self.config.occlusion_mode.honors_occlusion()
            && occluded
        {
            let group = self.group_ref(id);
            self.result.occlusion_groups.push(group);
            return true;
        }
        false
    }

    fn frustum_check(&self, id: GroupId) -> Containment {
        let Some(g) = self.groups.get(id) else {
            return Containment::Outside;
        };
        let (bounds, extents) = (g.bounds(), g.extents());
        let res = self
            .camera
            .aabb_in_frustum_no_far_clip(bounds.center, bounds.half);
        self.clip_far(res, extents.min, extents.max)
    }

    fn frustum_check_objects(&self, id: GroupId) -> Containment {
        let Some(g) = self.groups.get(id) else {
            return Containment::Outside;
        };
        let (bounds, extents) = (g.object_bounds(), g.object_extents());
        let res = self
            .camera
            .aabb_in_frustum_no_far_clip(bounds.center, bounds.half);
        self.clip_far(res, extents.min, extents.max)
    }

    fn clip_far(&self, res: Containment, min: DVec3, max: DVec3) -> Containment {
        if self.mode == CullMode::NoFarClip || !res.is_visible() {
            return res;
        }
        let far = aabb_sphere_intersect(
            min,
            max,
            self.camera.origin(),
            self.camera.frustum_corner_dist(),
        );
        res.min(far)
    }

    fn check_objects(&self, node: NodeId, id: GroupId) -> bool {
        if self.tree.element_count(node) == 0 {
            false
        } else if self.tree.child_count(node) == 0 {
            // A leaf's bounds are already its object bounds.
            true
        } else {
            self.res != Containment::Partial || self.frustum_check_objects(id).is_visible()
        }
    }

    fn visit(&mut self, node: NodeId, id: GroupId) {
        if self.check_objects(node, id) {
            match self.mode {
                CullMode::Select => self.select_group(node),
                _ => self.process_group(id),
            }
        }
    }

    fn process_group(&mut self, id: GroupId) {
        let Some(g) = self.groups.get(id) else {
            return;
        };
        let stale = g.needs_update(self.frame, self.groups.lod_period())
            || g.visible_frame() < self.frame.saturating_sub(1);
        if stale && self.config.occlusion_enabled && self.config.occlusion_mode.issues_queries() {
            if let Some((pool, backend)) = self.occlusion.as_mut() {
                self.groups
                    .do_occlusion(self.tree, id, self.camera, pool, &mut **backend);
            }
        }
        self.mark_not_culled(id);
    }

    fn mark_not_culled(&mut self, id: GroupId) {
        self.groups.set_visible(id, self.frame);
        self.groups.update_distance(
            self.tree,
            id,
            self.camera,
            self.config.render_by_group,
            self.bridge,
        );
        let alpha = self
            .groups
            .get(id)
            .is_some_and(|g| g.draw_map().contains_key(&RenderPass::ALPHA));
        let group = self.group_ref(id);
        if self.config.render_by_group {
            self.result.visible_groups.push(group);
            if alpha {
                self.result.alpha_groups.push(group);
            }
        } else {
            self.result.drawable_groups.push(group);
        }
    }

    fn select_group(&mut self, node: NodeId) {
        for &id in self.tree.data(node) {
            let Some(d) = self.drawables.get(id) else {
                continue;
            };
            if d.dead {
                continue;
            }
            if d.bridge {
                self.result.visible_bridges.push(id);
            } else {
                self.result.drawables.push(id);
            }
        }
    }
}

impl SpatialPartition {
    /// Refresh dirty bounds with the freeze lifted.
    fn rebound_root(&mut self, drawables: &DrawableArena) {
        let frozen = self.groups.frozen();
        self.groups.set_frozen(false);
        let root = self.root_group();
        self.groups.rebound(&self.tree, drawables, root);
        self.groups.set_frozen(frozen);
    }

    /// Collect the groups visible from `camera` into `result`.
    ///
    /// Pending occlusion queries are read back and new ones issued through
    /// `backend`. The far plane is honored unless the partition uses an
    /// infinite far clip.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "SpatialPartition::cull")
    )]
    pub fn cull(
        &mut self,
        camera: &Camera,
        drawables: &DrawableArena,
        pool: &mut QueryPool,
        backend: &mut dyn OcclusionBackend,
        result: &mut CullResult,
    ) {
        self.groups.drain_released_queries(pool);
        self.rebound_root(drawables);
        let mode = if self.config.infinite_far_clip {
            CullMode::NoFarClip
        } else {
            CullMode::Normal
        };
        self.run(camera, drawables, Some((pool, backend)), result, mode);
    }

    /// Collect the live drawables and bridges in view of `camera` into `result`.
    ///
    /// Occlusion is ignored and no group state besides bounds changes.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "SpatialPartition::select")
    )]
    pub fn select(&mut self, camera: &Camera, drawables: &DrawableArena, result: &mut CullResult) {
        self.rebound_root(drawables);
        self.run(camera, drawables, None, result, CullMode::Select);
    }

    fn run<'a>(
        &'a mut self,
        camera: &'a Camera,
        drawables: &'a DrawableArena,
        occlusion: Option<(&'a mut QueryPool, &'a mut dyn OcclusionBackend)>,
        result: &'a mut CullResult,
        mode: CullMode,
    ) {
        let root = self.tree.root();
        let mut culler = Culler {
            tree: &self.tree,
            groups: &mut self.groups,
            drawables,
            camera,
            occlusion,
            result,
            config: &self.config,
            partition: self.id,
            frame: self.frame,
            bridge: self.bridge,
            mode,
            res: Containment::Outside,
        };
        culler.traverse(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Drawable;
    use alloc::vec;
    use understory_octree::{Aabb3, OctreeConfig};

    #[derive(Debug, Default)]
    struct Queries {
        next: u32,
        issued: Vec<u32>,
        samples: u32,
    }

    impl OcclusionBackend for Queries {
        fn gen_query(&mut self) -> u32 {
            self.next += 1;
            self.next
        }
        fn delete_query(&mut self, _name: u32) {}
        fn run_query(&mut self, name: u32, _verts: &[DVec3; 8], _indices: &[u8; 8]) {
            self.issued.push(name);
        }
        fn query_result(&mut self, _name: u32) -> u32 {
            self.samples
        }
    }

    fn small_tree() -> OctreeConfig {
        OctreeConfig {
            max_capacity: 2,
            ..OctreeConfig::default()
        }
    }

    fn scene(points: &[DVec3]) -> (SpatialPartition, DrawableArena, Vec<DrawableId>) {
        let mut part = SpatialPartition::new(PartitionConfig {
            octree: small_tree(),
            ..PartitionConfig::default()
        });
        let mut drawables = DrawableArena::new();
        let ids = points
            .iter()
            .map(|&p| {
                let d = drawables.insert(Drawable::new(Aabb3::from_center_half(
                    p,
                    DVec3::splat(0.5),
                )));
                part.put(&mut drawables, d, false).unwrap();
                d
            })
            .collect();
        (part, drawables, ids)
    }

    fn camera() -> Camera {
        Camera::look_at(DVec3::ZERO, DVec3::X, DVec3::Z)
    }

    fn holders(part: &SpatialPartition, drawables: &DrawableArena, ids: &[DrawableId]) -> Vec<GroupRef> {
        ids.iter()
            .map(|&d| drawables.get(d).unwrap().group().unwrap())
            .filter(|g| part.group(g.group).is_some())
            .collect()
    }

    #[test]
    fn cull_keeps_groups_ahead_and_drops_groups_behind() {
        let ahead = [DVec3::new(20.0, 0.0, 0.0), DVec3::new(30.0, 1.0, 0.0)];
        let behind = [DVec3::new(-20.0, 0.0, 0.0), DVec3::new(-30.0, -1.0, 0.0)];
        let (mut part, drawables, ids) = scene(&[ahead[0], ahead[1], behind[0], behind[1]]);
        let mut result = CullResult::new();
        let mut pool = QueryPool::new();
        let mut queries = Queries {
            samples: 1,
            ..Queries::default()
        };
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);

        let groups = holders(&part, &drawables, &ids);
        assert!(result.visible_groups.contains(&groups[0]));
        assert!(result.visible_groups.contains(&groups[1]));
        assert!(!result.visible_groups.contains(&groups[2]));
        assert!(!result.visible_groups.contains(&groups[3]));
        assert!(result.occlusion_groups.is_empty());
        for g in &result.visible_groups {
            let group = part.group(g.group).unwrap();
            assert_eq!(group.visible_frame(), part.frame());
            assert!(group.distance() > 0.0);
            assert!(!group.is_state(GroupState::DIRTY));
        }
    }

    #[test]
    fn far_clip_drops_distant_groups() {
        let (mut part, drawables, ids) = scene(&[DVec3::new(600.0, 0.0, 0.0)]);
        let mut queries = Queries::default();
        let mut pool = QueryPool::new();
        let mut result = CullResult::new();
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);
        let group = holders(&part, &drawables, &ids)[0];
        assert!(!result.visible_groups.contains(&group));

        let mut part = SpatialPartition::new(PartitionConfig {
            infinite_far_clip: true,
            ..PartitionConfig::default()
        });
        let mut drawables = DrawableArena::new();
        let d = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(600.0, 0.0, 0.0),
            DVec3::splat(0.5),
        )));
        let g = part.put(&mut drawables, d, false).unwrap();
        result.clear();
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);
        assert!(result.visible_groups.iter().any(|r| r.group == g));
    }

    #[test]
    fn occlusion_query_round_trip() {
        let (mut part, drawables, ids) = scene(&[
            DVec3::new(40.0, 0.0, 0.0),
            DVec3::new(40.0, 2.0, 0.0),
            DVec3::new(44.0, -2.0, 1.0),
        ]);
        let mut queries = Queries::default();
        let mut pool = QueryPool::new();
        let mut result = CullResult::new();
        let cam = camera();

        part.cull(&cam, &drawables, &mut pool, &mut queries, &mut result);
        assert!(!queries.issued.is_empty(), "no query issued");
        let queried: Vec<_> = part
            .groups()
            .filter(|g| g.is_state(GroupState::QUERY_PENDING))
            .map(|g| g.id())
            .collect();
        assert!(!queried.is_empty());
        assert!(queried
            .iter()
            .all(|&g| part.group(g).unwrap().occlusion_verts().is_some()));

        // No samples passed: the queried non-root groups become occluded.
        queries.samples = 0;
        part.advance_frame();
        result.clear();
        part.cull(&cam, &drawables, &mut pool, &mut queries, &mut result);
        let root = part.root_group();
        let occluded: Vec<_> = queried.iter().filter(|&&g| g != root).collect();
        assert!(!occluded.is_empty());
        for &&g in &occluded {
            assert!(part.group(g).unwrap().is_state(GroupState::OCCLUDED));
        }
        assert!(!result.occlusion_groups.is_empty());
        let groups = holders(&part, &drawables, &ids);
        assert!(groups
            .iter()
            .all(|g| !result.visible_groups.contains(g) || g.group == root));

        // Samples pass again: occluded groups become visible.
        queries.samples = 10;
        for _ in 0..2 {
            part.advance_frame();
            result.clear();
            part.cull(&cam, &drawables, &mut pool, &mut queries, &mut result);
        }
        assert!(part.groups().all(|g| !g.is_state(GroupState::OCCLUDED)));
        assert!(result.occlusion_groups.is_empty());
    }

    #[test]
    fn passive_mode_issues_no_queries() {
        let mut part = SpatialPartition::new(PartitionConfig {
            occlusion_mode: crate::OcclusionMode::Passive,
            ..PartitionConfig::default()
        });
        let mut drawables = DrawableArena::new();
        let d = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(30.0, 0.0, 0.0),
            DVec3::ONE,
        )));
        part.put(&mut drawables, d, false).unwrap();
        let mut queries = Queries::default();
        let mut pool = QueryPool::new();
        let mut result = CullResult::new();
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);
        assert!(queries.issued.is_empty());
        assert_eq!(pool.allocated(), 0);
        assert_eq!(result.visible_groups.len(), 1);
    }

    #[test]
    fn destroyed_group_returns_its_query() {
        let (mut part, mut drawables, ids) = scene(&[
            DVec3::new(40.0, 0.0, 0.0),
            DVec3::new(40.0, 2.0, 0.0),
            DVec3::new(44.0, -2.0, 1.0),
        ]);
        let mut queries = Queries::default();
        let mut pool = QueryPool::new();
        let mut result = CullResult::new();
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);
        let issued = pool.allocated();
        assert!(issued > 0);

        for d in ids {
            part.remove(&mut drawables, d).unwrap();
        }
        part.advance_frame();
        result.clear();
        part.cull(&camera(), &drawables, &mut pool, &mut queries, &mut result);
        // Only the root group can still hold a name.
        assert!(pool.allocated() <= 1);
        assert!(pool.free_count() + pool.allocated() >= issued);
    }

    #[test]
    fn select_collects_drawables_and_bridges() {
        let mut part = SpatialPartition::default();
        let mut drawables = DrawableArena::new();
        let plain = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::ONE,
        )));
        let bridge = drawables.insert(
            Drawable::new(Aabb3::from_center_half(DVec3::new(12.0, 1.0, 0.0), DVec3::ONE))
                .with_bridge(),
        );
        let dead = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(14.0, 0.0, 0.0),
            DVec3::ONE,
        )));
        let behind = drawables.insert(Drawable::new(Aabb3::from_center_half(
            DVec3::new(-10.0, 0.0, 0.0),
            DVec3::ONE,
        )));
        for d in [plain, bridge, dead, behind] {
            part.put(&mut drawables, d, false).unwrap();
        }
        drawables.get_mut(dead).unwrap().dead = true;

        let mut result = CullResult::new();
        part.select(&camera(), &drawables, &mut result);
        assert_eq!(result.visible_bridges, vec![bridge]);
        assert!(result.drawables.contains(&plain));
        assert!(!result.drawables.contains(&dead));
        assert!(!result.drawables.contains(&behind));
        assert!(result.visible_groups.is_empty());
    }
}
