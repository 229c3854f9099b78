// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial partitions: an octree of drawables with a group per node.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use glam::DVec3;
use understory_octree::{Aabb3, NodeId, OctreeConfig};

use crate::camera::Camera;
use crate::drawable::{DrawableArena, DrawableId};
use crate::error::SpatialError;
use crate::geometry::{BufferUsage, GeometryBuilder};
use crate::group::{GroupId, GroupStore, SpatialGroup, Tree};
use crate::occlusion::{OcclusionMode, QueryPool};
use crate::state::{GroupState, StateMode};
use crate::sync::GroupSync;

/// Source of partition ids; the only state shared between partitions.
static NEXT_PARTITION: AtomicU32 = AtomicU32::new(1);

/// Radius of the sphere tested by [`SpatialPartition::is_visible`].
const POINT_VISIBILITY_RADIUS: f64 = 4.0;

/// Process-unique identity of a partition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(u32);

impl PartitionId {
    fn next() -> Self {
        Self(NEXT_PARTITION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value of the id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Tuning knobs for a [`SpatialPartition`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PartitionConfig {
    /// Issue occlusion queries for this partition's groups.
    pub occlusion_enabled: bool,
    /// How occlusion state is used while culling.
    pub occlusion_mode: OcclusionMode,
    /// Frames between forced LOD refreshes; groups are spread evenly over the period.
    pub lod_period: u32,
    /// Relative distance change that forces a LOD refresh. Zero disables the test.
    pub slop_ratio: f64,
    /// Geometry is batched per group rather than per drawable.
    pub render_by_group: bool,
    /// Ignore the far plane and the far-corner sphere while culling.
    pub infinite_far_clip: bool,
    /// Usage requested for new vertex buffers.
    pub buffer_usage: BufferUsage,
    /// Configuration of the underlying octree.
    pub octree: OctreeConfig,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            occlusion_enabled: true,
            occlusion_mode: OcclusionMode::Queries,
            lod_period: 1,
            slop_ratio: 0.25,
            render_by_group: true,
            infinite_far_clip: false,
            buffer_usage: BufferUsage::Static,
            octree: OctreeConfig::default(),
        }
    }
}

/// An octree of drawables for one rendering category.
///
/// Drawables live in a [`DrawableArena`] shared by every partition of the
/// scene; the partition keeps their ids in its octree and a
/// [`SpatialGroup`] for every octree node.
#[derive(Debug)]
pub struct SpatialPartition {
    pub(crate) id: PartitionId,
    pub(crate) config: PartitionConfig,
    pub(crate) tree: Tree,
    pub(crate) groups: GroupStore,
    pub(crate) frame: u64,
    pub(crate) bridge: bool,
}

impl Default for SpatialPartition {
    fn default() -> Self {
        Self::new(PartitionConfig::default())
    }
}

impl SpatialPartition {
    /// Create a partition with an empty root.
    pub fn new(config: PartitionConfig) -> Self {
        let tree = Tree::new(config.octree);
        let mut groups = GroupStore::new(config.lod_period, config.buffer_usage);
        groups.create(&tree, tree.root());
        Self {
            id: PartitionId::next(),
            config,
            tree,
            groups,
            frame: 1,
            bridge: false,
        }
    }

    pub(crate) fn new_bridge(config: PartitionConfig) -> Self {
        Self {
            bridge: true,
            ..Self::new(config)
        }
    }

    /// Identity of this partition.
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Configuration the partition was created with.
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// The octree of drawable ids.
    pub fn octree(&self) -> &Tree {
        &self.tree
    }

    /// Whether the partition belongs to a [`SpatialBridge`](crate::SpatialBridge).
    pub fn is_bridge(&self) -> bool {
        self.bridge
    }

    /// Group of the octree root.
    pub fn root_group(&self) -> GroupId {
        GroupId::new(self.tree.root())
    }

    /// Group for `id`, or `None` once its node is gone.
    pub fn group(&self, id: GroupId) -> Option<&SpatialGroup> {
        self.groups.get(id)
    }

    /// Group of `node`.
    pub fn group_of(&self, node: NodeId) -> Option<&SpatialGroup> {
        self.groups.get(GroupId::new(node))
    }

    /// Every live group, in slot order.
    pub fn groups(&self) -> impl Iterator<Item = &SpatialGroup> + '_ {
        self.groups.iter()
    }

    /// Number of live groups; always equal to the number of octree nodes.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Request `usage` for the next vertex buffer of a group.
    pub fn set_buffer_usage(&mut self, id: GroupId, usage: BufferUsage) {
        if let Some(g) = self.groups.get_mut(id) {
            g.set_buffer_usage(usage);
        }
    }

    /// Current frame number.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Set the frame number, for partitions driven by a shared frame clock.
    pub fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Advance to the next frame.
    pub fn advance_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    /// Whether group state changes are suspended.
    pub fn is_frozen(&self) -> bool {
        self.groups.frozen()
    }

    /// Suspend or resume group state changes, visibility stamps and distance updates.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.groups.set_frozen(frozen);
    }

    /// Whether the group was marked visible this frame.
    pub fn group_is_visible(&self, id: GroupId) -> bool {
        self.groups.get(id).is_some_and(|g| g.visible == self.frame)
    }

    /// Stamp the group visible for this frame.
    pub fn set_group_visible(&mut self, id: GroupId) {
        self.groups.set_visible(id, self.frame);
    }

    /// Whether the point `v` is near enough to the view frustum to matter.
    pub fn is_visible(&self, camera: &Camera, v: DVec3) -> bool {
        camera.sphere_in_frustum(v, POINT_VISIBILITY_RADIUS)
    }

    /// Set state bits on a group.
    pub fn set_state(&mut self, id: GroupId, state: GroupState, mode: StateMode) {
        self.groups.set_state_mode(&self.tree, id, state, mode);
    }

    /// Clear state bits on a group.
    pub fn clear_state(&mut self, id: GroupId, state: GroupState, mode: StateMode) {
        self.groups.clear_state_mode(&self.tree, id, state, mode);
    }

    /// Mark a group and its ancestors for re-bounding.
    pub fn unbound(&mut self, id: GroupId) {
        self.groups.unbound(&self.tree, id);
    }

    /// Recompute the bounds of a dirty group and everything dirty below it.
    pub fn rebound(&mut self, id: GroupId, drawables: &DrawableArena) {
        self.groups.rebound(&self.tree, drawables, id);
    }

    /// Grow a group's object box out of its drawables, or `None` if it holds none.
    ///
    /// With `acc` the result is merged into the given box.
    pub fn bound_objects(
        &mut self,
        id: GroupId,
        drawables: &DrawableArena,
        acc: Option<Aabb3>,
    ) -> Option<Aabb3> {
        let empty = acc.is_none();
        let mut out = acc.unwrap_or(Aabb3::new(DVec3::ZERO, DVec3::ZERO));
        self.groups
            .bound_objects(&self.tree, drawables, id, empty, &mut out)
            .then_some(out)
    }

    fn sync<'a>(&'a mut self, drawables: &'a mut DrawableArena) -> (&'a mut Tree, GroupSync<'a>) {
        let sync = GroupSync {
            groups: &mut self.groups,
            drawables,
            partition: self.id,
        };
        (&mut self.tree, sync)
    }

    /// Insert a drawable and return the group now holding it.
    ///
    /// With `was_visible`, a query pending on that group is discarded since
    /// its box no longer matches what was drawn.
    pub fn put(
        &mut self,
        drawables: &mut DrawableArena,
        drawable: DrawableId,
        was_visible: bool,
    ) -> Result<GroupId, SpatialError> {
        let d = drawables
            .get(drawable)
            .ok_or(SpatialError::StaleDrawable(drawable))?;
        if !d.is_valid() {
            #[cfg(feature = "tracing")]
            tracing::warn!(?drawable, "invalid drawable placement");
        }
        let (pos, radius) = (d.position, d.bin_radius);

        let (tree, mut sync) = self.sync(drawables);
        let node = tree.insert(drawable, pos, radius, &mut sync)?;
        let id = GroupId::new(node);

        if was_visible
            && self
                .groups
                .get(id)
                .is_some_and(|g| g.state.contains(GroupState::QUERY_PENDING))
        {
            self.groups.set_state(id, GroupState::DISCARD_QUERY);
        }
        Ok(id)
    }

    /// Take a drawable out of the partition.
    pub fn remove(
        &mut self,
        drawables: &mut DrawableArena,
        drawable: DrawableId,
    ) -> Result<(), SpatialError> {
        let d = drawables
            .get_mut(drawable)
            .ok_or(SpatialError::StaleDrawable(drawable))?;
        let current = d
            .group()
            .filter(|g| g.partition == self.id)
            .ok_or(SpatialError::NotInPartition(drawable))?;
        d.set_group(None);

        let (tree, mut sync) = self.sync(drawables);
        if tree.remove(current.group.node(), drawable, &mut sync) {
            Ok(())
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(?drawable, "failed to remove drawable from octree");
            Err(SpatialError::NotInPartition(drawable))
        }
    }

    /// Re-place a drawable whose position, radius or extents changed.
    ///
    /// A drawable still acceptable to its node only dirties the bounds. A
    /// drawable held by another partition is taken out of `from` (which must
    /// be that partition) and inserted here.
    pub fn move_drawable(
        &mut self,
        drawables: &mut DrawableArena,
        drawable: DrawableId,
        from: Option<&mut Self>,
    ) -> Result<GroupId, SpatialError> {
        let d = drawables
            .get(drawable)
            .ok_or(SpatialError::StaleDrawable(drawable))?;
        let (pos, radius) = (d.position, d.bin_radius);
        let Some(current) = d.group() else {
            return self.put(drawables, drawable, false);
        };

        if current.partition != self.id {
            let from = from
                .filter(|p| p.id == current.partition)
                .ok_or(SpatialError::NotInPartition(drawable))?;
            let was_visible = from.group_is_visible(current.group);
            from.remove(drawables, drawable)?;
            return self.put(drawables, drawable, was_visible);
        }

        let id = current.group;
        let was_visible = self.group_is_visible(id);
        if self.tree.accepts_in_place(id.node(), pos, radius) {
            self.groups.unbound(&self.tree, id);
            self.groups.set_state(id, GroupState::OBJECT_DIRTY);
            return Ok(id);
        }

        self.remove(drawables, drawable)?;
        self.put(drawables, drawable, was_visible)
    }

    /// Translate every node and cached box by `offset`.
    pub fn shift(&mut self, offset: DVec3) {
        let nodes: Vec<NodeId> = self.tree.depth_first(self.tree.root()).collect();
        for node in nodes {
            self.groups.shift(
                &mut self.tree,
                GroupId::new(node),
                offset,
                self.config.render_by_group,
            );
        }
    }

    /// Collapse a root whose only child is an empty branch.
    pub fn balance(&mut self, drawables: &mut DrawableArena) -> bool {
        let (tree, mut sync) = self.sync(drawables);
        let balanced = tree.balance(&mut sync);
        if balanced {
            let root = self.root_group();
            self.groups.unbound(&self.tree, root);
        }
        balanced
    }

    /// Destroy every group and start over with an empty root.
    ///
    /// Drawables that were held lose their group.
    pub fn clear(&mut self, drawables: &mut DrawableArena) {
        let (tree, mut sync) = self.sync(drawables);
        tree.destroy(&mut sync);
        let root = self.tree.root();
        self.groups.create(&self.tree, root);
    }

    /// Rebuild the vertex buffer and draw map of a group whose geometry is dirty.
    ///
    /// Records the LOD distance first when the LOD changed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "SpatialPartition::rebuild_geom")
    )]
    pub fn rebuild_geom(
        &mut self,
        id: GroupId,
        drawables: &DrawableArena,
        builder: &mut dyn GeometryBuilder,
    ) {
        let (slop, frame, period) = (self.config.slop_ratio, self.frame, self.groups.lod_period());
        let Some(g) = self.groups.get_mut(id) else {
            return;
        };
        if g.change_lod(slop, frame, period) {
            g.last_update_distance = g.distance;
            g.last_update_view_angle = g.view_angle;
        }
        if g.is_dead() || !g.state.contains(GroupState::GEOM_DIRTY) {
            return;
        }

        g.draw_map.clear();
        let (verts, indices) = builder.add_geometry_count(g, drawables);
        if verts > 0 && indices > 0 {
            let usage = g.buffer_usage();
            let mut buffer = match g.vertex_buffer.take() {
                Some(mut buffer) if buffer.usage() == usage => {
                    buffer.resize_buffer(verts, indices);
                    buffer
                }
                _ => {
                    let mut buffer = builder.create_vertex_buffer(usage);
                    buffer.allocate_buffer(verts, indices);
                    buffer
                }
            };
            g.draw_map = builder.get_geometry(g, drawables, buffer.as_mut());
            g.vertex_buffer = Some(buffer);
        } else {
            g.vertex_buffer = None;
        }
        self.groups.clear_state(id, GroupState::GEOM_DIRTY);
    }

    /// Drop every group's renderer resources and mark all geometry dirty.
    ///
    /// Returns the bridges found along the way; their partitions need the same treatment.
    pub fn reset_vertex_buffers(&mut self, pool: &mut QueryPool) -> Vec<DrawableId> {
        let nodes: Vec<NodeId> = self.tree.depth_first(self.tree.root()).collect();
        let mut bridges = Vec::new();
        for node in nodes {
            let id = GroupId::new(node);
            self.groups.destroy_gl(id, pool);
            if let Some(g) = self.groups.get(id) {
                bridges.extend_from_slice(g.bridges());
            }
        }
        bridges
    }
}
