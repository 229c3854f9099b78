// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial groups: the renderer-facing record kept for every octree node.

use alloc::boxed::Box;
use alloc::vec::Vec;
use glam::DVec3;
use understory_octree::{Aabb3, NodeId, Octree};

use crate::camera::Camera;
use crate::drawable::{DrawableArena, DrawableId, GroupRef};
use crate::geometry::{BufferUsage, DrawMap, RenderPass, VertexBuffer};
use crate::math;
use crate::occlusion::{self, OCCLUSION_FUDGE, OcclusionBackend, OcclusionMode, QueryPool};
use crate::partition::PartitionId;
use crate::state::{GroupState, StateMode};

pub(crate) type Tree = Octree<DrawableId>;

/// Distance below which distances are compressed toward zero.
const NEAR_RAMP: f64 = 16.0;
/// View direction change that triggers an alpha re-sort.
const VIEW_ANGLE_SLOP: f64 = 0.64;
/// Occlusion boxes larger than this are never queried.
const MAX_OCCLUSION_RADIUS: f64 = 1024.0;

/// Handle of the group attached to an octree node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(NodeId);

impl GroupId {
    /// The group of `node`.
    pub const fn new(node: NodeId) -> Self {
        Self(node)
    }

    /// The octree node behind the group.
    pub const fn node(self) -> NodeId {
        self.0
    }
}

/// A box as center and half-size.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BoxBounds {
    /// Center.
    pub center: DVec3,
    /// Half-size on every axis.
    pub half: DVec3,
}

impl BoxBounds {
    /// Bounds from center and half-size.
    pub const fn new(center: DVec3, half: DVec3) -> Self {
        Self { center, half }
    }

    /// Center and half-size of `aabb`.
    pub fn from_aabb(aabb: &Aabb3) -> Self {
        Self {
            center: aabb.center(),
            half: aabb.half_extents(),
        }
    }

    /// The same box as min/max corners.
    pub fn to_aabb(&self) -> Aabb3 {
        Aabb3::from_center_half(self.center, self.half)
    }
}

/// Compress distances under 16 quadratically so nearby groups sort and LOD smoothly.
fn near_ramp(dist: f64) -> f64 {
    if dist < NEAR_RAMP {
        let d = dist / NEAR_RAMP;
        d * d * NEAR_RAMP
    } else {
        dist
    }
}

/// Renderer metadata of one octree node.
#[derive(Debug)]
pub struct SpatialGroup {
    id: GroupId,
    pub(crate) state: GroupState,
    pub(crate) bounds: BoxBounds,
    pub(crate) extents: Aabb3,
    pub(crate) object_bounds: BoxBounds,
    pub(crate) object_extents: Aabb3,
    pub(crate) draw_map: DrawMap,
    pub(crate) vertex_buffer: Option<Box<dyn VertexBuffer>>,
    buffer_usage: BufferUsage,
    pub(crate) occlusion_query: Option<u32>,
    pub(crate) occlusion_verts: Option<[DVec3; 8]>,
    pub(crate) bridges: Vec<DrawableId>,
    pub(crate) visible: u64,
    pub(crate) distance: f64,
    pub(crate) depth: f64,
    pub(crate) radius: f64,
    pub(crate) pixel_area: f64,
    pub(crate) view_angle: DVec3,
    pub(crate) last_update_view_angle: DVec3,
    pub(crate) last_update_distance: f64,
    lod_hash: u32,
}

impl SpatialGroup {
    fn new(id: GroupId, center: DVec3, size: DVec3, lod_hash: u32, usage: BufferUsage) -> Self {
        let bounds = BoxBounds::new(center, size);
        Self {
            id,
            state: GroupState::INITIAL,
            bounds,
            extents: bounds.to_aabb(),
            object_bounds: bounds,
            object_extents: bounds.to_aabb(),
            draw_map: DrawMap::new(),
            vertex_buffer: None,
            buffer_usage: usage,
            occlusion_query: None,
            occlusion_verts: None,
            bridges: Vec::new(),
            visible: 0,
            distance: 0.0,
            depth: 0.0,
            radius: 1.0,
            pixel_area: 1024.0,
            view_angle: DVec3::ZERO,
            last_update_view_angle: DVec3::splat(-1.0),
            last_update_distance: -1.0,
            lod_hash,
        }
    }

    /// Handle of this group.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Current state bits.
    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Whether any bit of `state` is set.
    pub fn is_state(&self, state: GroupState) -> bool {
        self.state.intersects(state)
    }

    /// Whether the group outlived its octree node.
    pub fn is_dead(&self) -> bool {
        self.state.contains(GroupState::DEAD)
    }

    /// Bounding box of the subtree as center and half-size.
    pub fn bounds(&self) -> BoxBounds {
        self.bounds
    }

    /// Bounding box of the subtree as min/max.
    pub fn extents(&self) -> Aabb3 {
        self.extents
    }

    /// Bounding box of the directly held drawables as center and half-size.
    pub fn object_bounds(&self) -> BoxBounds {
        self.object_bounds
    }

    /// Bounding box of the directly held drawables as min/max.
    pub fn object_extents(&self) -> Aabb3 {
        self.object_extents
    }

    /// Draw batches by render pass.
    pub fn draw_map(&self) -> &DrawMap {
        &self.draw_map
    }

    /// The group's vertex buffer, if geometry was built.
    pub fn vertex_buffer(&self) -> Option<&dyn VertexBuffer> {
        self.vertex_buffer.as_deref()
    }

    /// Usage requested for new vertex buffers.
    pub fn buffer_usage(&self) -> BufferUsage {
        self.buffer_usage
    }

    /// Request `usage` for the next vertex buffer; the current one is replaced on rebuild.
    pub fn set_buffer_usage(&mut self, usage: BufferUsage) {
        self.buffer_usage = usage;
    }

    /// Occlusion query name held by the group.
    pub fn occlusion_query(&self) -> Option<u32> {
        self.occlusion_query
    }

    /// Corners of the last occlusion box.
    pub fn occlusion_verts(&self) -> Option<&[DVec3; 8]> {
        self.occlusion_verts.as_ref()
    }

    /// Bridges stored directly at this node.
    pub fn bridges(&self) -> &[DrawableId] {
        &self.bridges
    }

    /// Frame the group was last marked visible.
    pub fn visible_frame(&self) -> u64 {
        self.visible
    }

    /// Camera distance from the last distance update.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Depth of the front of the object box along the view axis, for alpha sorting.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Radius from the last distance update.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Projected area in square pixels from the last distance update.
    pub fn pixel_area(&self) -> f64 {
        self.pixel_area
    }

    /// Unit direction to the group at the last alpha re-sort.
    pub fn view_angle(&self) -> DVec3 {
        self.view_angle
    }

    /// Distance recorded at the last LOD change.
    pub fn last_update_distance(&self) -> f64 {
        self.last_update_distance
    }

    /// Frame phase at which this group refreshes its LOD.
    pub fn lod_hash(&self) -> u32 {
        self.lod_hash
    }

    /// Whether this is the group's frame of the LOD period.
    pub fn needs_update(&self, frame: u64, lod_period: u32) -> bool {
        frame % u64::from(lod_period.max(1)) == u64::from(self.lod_hash)
    }

    /// Whether the group's LOD should be refreshed this frame.
    pub fn change_lod(&self, slop_ratio: f64, frame: u64, lod_period: u32) -> bool {
        if self.state.contains(GroupState::ALPHA_DIRTY) {
            return true;
        }
        if slop_ratio > 0.0 {
            let ratio = (self.distance - self.last_update_distance)
                / self.last_update_distance.max(self.radius);
            if ratio.abs() >= slop_ratio {
                return true;
            }
            if self.distance > self.radius {
                return false;
            }
        }
        self.needs_update(frame, lod_period)
    }

    /// Camera distance of the object box, with alpha depth and view angle bookkeeping.
    fn calc_distance(&mut self, camera: &Camera, bridge: bool) -> f64 {
        let eye = self.object_bounds.center - camera.origin();
        let dist = if self.draw_map.contains_key(&RenderPass::ALPHA) {
            let dist = eye.length();
            if !self.state.contains(GroupState::ALPHA_DIRTY) && !bridge {
                let view_angle = eye.normalize_or_zero();
                if (view_angle - self.last_update_view_angle).length() > VIEW_ANGLE_SLOP {
                    self.view_angle = view_angle;
                    self.last_update_view_angle = view_angle;
                    self.state |= GroupState::ALPHA_DIRTY;
                }
            }
            let at = camera.at_axis();
            let front = eye - self.object_bounds.half * 0.25 * at;
            self.depth = front.dot(at);
            dist
        } else {
            eye.length()
        };
        near_ramp(dist)
    }

    /// Projected area of the object box in square pixels.
    fn calc_pixel_area(&self, camera: &Camera) -> f64 {
        let dist = near_ramp((self.object_bounds.center - camera.origin()).length());
        let size = self.object_bounds.half.length();
        let r = math::atan(size / dist.max(f64::EPSILON)) * camera.pixels_per_radian();
        r * r * core::f64::consts::PI
    }
}

/// Whether the camera sits inside (or too close to) the group's occlusion box.
///
/// Such groups are never queried: the box would cover the whole view.
pub fn early_fail(camera: &Camera, bounds: &BoxBounds) -> bool {
    let vel = camera.velocity() + 0.2;
    let r = bounds.half * OCCLUSION_FUDGE + DVec3::splat(vel);
    if r.length_squared() > MAX_OCCLUSION_RADIUS * MAX_OCCLUSION_RADIUS {
        return true;
    }
    Aabb3::from_center_half(bounds.center, r).contains_point(camera.origin())
}

/// Groups of one partition indexed by octree node slot.
#[derive(Debug)]
pub(crate) struct GroupStore {
    slots: Vec<Option<SpatialGroup>>,
    frozen: bool,
    lod_seed: u32,
    lod_period: u32,
    buffer_usage: BufferUsage,
    released_queries: Vec<u32>,
}

impl GroupStore {
    pub(crate) fn new(lod_period: u32, buffer_usage: BufferUsage) -> Self {
        Self {
            slots: Vec::new(),
            frozen: false,
            lod_seed: 0,
            lod_period: lod_period.max(1),
            buffer_usage,
            released_queries: Vec::new(),
        }
    }

    pub(crate) fn get(&self, id: GroupId) -> Option<&SpatialGroup> {
        self.slots
            .get(id.node().index())
            .and_then(|g| g.as_ref())
            .filter(|g| g.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: GroupId) -> Option<&mut SpatialGroup> {
        self.slots
            .get_mut(id.node().index())
            .and_then(|g| g.as_mut())
            .filter(|g| g.id == id)
    }

    pub(crate) fn contains(&self, id: GroupId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SpatialGroup> + '_ {
        self.slots.iter().filter_map(|g| g.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    pub(crate) fn frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub(crate) fn lod_period(&self) -> u32 {
        self.lod_period
    }

    /// Attach a fresh group to `node`.
    pub(crate) fn create(&mut self, tree: &Tree, node: NodeId) -> GroupId {
        let id = GroupId(node);
        let center = tree.center(node).unwrap_or_default();
        let size = tree.size(node).unwrap_or_default();
        self.lod_seed = (self.lod_seed + 1) % self.lod_period;
        let group = SpatialGroup::new(id, center, size, self.lod_seed, self.buffer_usage);
        let idx = node.index();
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(group);
        id
    }

    /// Detach the group of a destroyed node, queueing its query name for release.
    pub(crate) fn remove(&mut self, id: GroupId) -> Option<SpatialGroup> {
        self.get(id)?;
        let mut group = self.slots[id.node().index()].take()?;
        group.state |= GroupState::DEAD;
        if let Some(name) = group.occlusion_query.take() {
            self.released_queries.push(name);
        }
        Some(group)
    }

    /// Hand queued query names of destroyed groups back to `pool`.
    pub(crate) fn drain_released_queries(&mut self, pool: &mut QueryPool) {
        for name in self.released_queries.drain(..) {
            pool.release(name);
        }
    }

    pub(crate) fn set_state(&mut self, id: GroupId, state: GroupState) {
        if self.frozen {
            return;
        }
        if let Some(g) = self.get_mut(id) {
            g.state |= state;
        }
    }

    pub(crate) fn clear_state(&mut self, id: GroupId, state: GroupState) {
        if self.frozen {
            return;
        }
        if let Some(g) = self.get_mut(id) {
            g.state &= !state;
        }
    }

    /// Set `state` on the group or its subtree.
    ///
    /// In [`StateMode::Diff`] a subtree whose root already has any of the bits is skipped.
    pub(crate) fn set_state_mode(
        &mut self,
        tree: &Tree,
        id: GroupId,
        state: GroupState,
        mode: StateMode,
    ) {
        self.apply_state_mode(tree, id, state, mode, true);
    }

    /// Clear `state` on the group or its subtree.
    ///
    /// In [`StateMode::Diff`] a subtree whose root has none of the bits is skipped.
    pub(crate) fn clear_state_mode(
        &mut self,
        tree: &Tree,
        id: GroupId,
        state: GroupState,
        mode: StateMode,
    ) {
        self.apply_state_mode(tree, id, state, mode, false);
    }

    fn apply_state_mode(
        &mut self,
        tree: &Tree,
        id: GroupId,
        state: GroupState,
        mode: StateMode,
        set: bool,
    ) {
        if self.frozen {
            return;
        }
        let mut stack = Vec::from([id.node()]);
        while let Some(node) = stack.pop() {
            let Some(g) = self.get_mut(GroupId(node)) else {
                continue;
            };
            if mode == StateMode::Diff && g.state.intersects(state) == set {
                continue;
            }
            if set {
                g.state |= state;
            } else {
                g.state &= !state;
            }
            if mode == StateMode::Single {
                break;
            }
            stack.extend(tree.children(node).iter().rev().copied());
        }
    }

    /// Mark the group and its ancestors `DIRTY`, stopping at the first ancestor already dirty.
    pub(crate) fn unbound(&mut self, tree: &Tree, id: GroupId) {
        let Some(g) = self.get(id) else {
            return;
        };
        if g.state.contains(GroupState::DIRTY) {
            return;
        }
        self.set_state(id, GroupState::DIRTY);

        let mut parent = tree.parent(id.node());
        while let Some(node) = parent {
            let pid = GroupId(node);
            match self.get(pid) {
                Some(p) if p.state.contains(GroupState::DIRTY) => return,
                Some(_) => self.set_state(pid, GroupState::DIRTY),
                None => return,
            }
            parent = tree.parent(node);
        }
    }

    /// Fold the extents of the directly held drawables into `acc`.
    ///
    /// Recomputes the object box first when `OBJECT_DIRTY` is set. With
    /// `empty` the accumulator is overwritten, otherwise it is grown. Returns
    /// false when the node holds no drawables.
    pub(crate) fn bound_objects(
        &mut self,
        tree: &Tree,
        drawables: &DrawableArena,
        id: GroupId,
        empty: bool,
        acc: &mut Aabb3,
    ) -> bool {
        let data = tree.data(id.node());
        if data.is_empty() {
            if empty && tree.parent(id.node()).is_some() {
                #[cfg(feature = "tracing")]
                tracing::warn!("empty leaf found in octree");
            }
            return false;
        }

        let frozen = self.frozen;
        let Some(g) = self.get_mut(id) else {
            return false;
        };
        if g.state.contains(GroupState::OBJECT_DIRTY) {
            if !frozen {
                g.state &= !GroupState::OBJECT_DIRTY;
            }
            let extents = data
                .iter()
                .filter_map(|&d| drawables.get(d))
                .map(|d| d.extents)
                .reduce(|a, b| a.union(&b));
            if let Some(extents) = extents {
                g.object_extents = extents;
                g.object_bounds = BoxBounds::from_aabb(&extents);
            } else {
                #[cfg(feature = "tracing")]
                tracing::warn!("spatial group holds only stale drawables");
            }
        }

        *acc = if empty {
            g.object_extents
        } else {
            acc.union(&g.object_extents)
        };
        true
    }

    /// Recompute the bounds of a dirty group and its dirty descendants.
    pub(crate) fn rebound(&mut self, tree: &Tree, drawables: &DrawableArena, id: GroupId) {
        let Some(g) = self.get(id) else {
            return;
        };
        if !g.state.contains(GroupState::DIRTY) {
            return;
        }
        let prior = g.extents;
        let node = id.node();
        let children = tree.children(node);

        if children.len() == 1 && tree.element_count(node) == 0 {
            let child = GroupId(children[0]);
            self.rebound(tree, drawables, child);
            let copied = self.get(child).map(|c| (c.bounds, c.extents));
            if let (Some((bounds, extents)), Some(g)) = (copied, self.get_mut(id)) {
                g.bounds = bounds;
                g.extents = extents;
            }
            self.set_state(child, GroupState::SKIP_FRUSTUM_CHECK);
        } else if children.is_empty() {
            let mut extents = prior;
            self.bound_objects(tree, drawables, id, true, &mut extents);
            if let Some(g) = self.get_mut(id) {
                g.extents = extents;
                g.bounds = g.object_bounds;
            }
        } else {
            let mut acc: Option<Aabb3> = None;
            for &c in children {
                let child = GroupId(c);
                self.clear_state(child, GroupState::SKIP_FRUSTUM_CHECK);
                self.rebound(tree, drawables, child);
                match self.get(child) {
                    Some(cg) => {
                        acc = Some(acc.map_or(cg.extents, |a| a.union(&cg.extents)));
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("octree child has no spatial group");
                    }
                }
            }
            let mut extents = acc.unwrap_or(prior);
            self.bound_objects(tree, drawables, id, false, &mut extents);
            if let Some(g) = self.get_mut(id) {
                g.extents = extents;
                g.bounds = BoxBounds::from_aabb(&extents);
            }
        }

        self.set_state(id, GroupState::OCCLUSION_DIRTY);
        self.clear_state(id, GroupState::DIRTY);
    }

    /// Translate the node and every cached box of the group by `offset`.
    pub(crate) fn shift(&mut self, tree: &mut Tree, id: GroupId, offset: DVec3, render_by_group: bool) {
        tree.translate_node(id.node(), offset);
        let Some(g) = self.get_mut(id) else {
            return;
        };
        g.bounds.center += offset;
        g.extents = g.extents.translate(offset);
        g.object_bounds.center += offset;
        g.object_extents = g.object_extents.translate(offset);
        if let Some(verts) = g.occlusion_verts.as_mut() {
            for v in verts {
                *v += offset;
            }
        }
        if !render_by_group {
            self.set_state(id, GroupState::GEOM_DIRTY);
        }
    }

    /// Record `drawable` as held by the group.
    pub(crate) fn add_object(
        &mut self,
        id: GroupId,
        partition: PartitionId,
        drawable: DrawableId,
        drawables: &mut DrawableArena,
    ) {
        let Some(d) = drawables.get_mut(drawable) else {
            #[cfg(feature = "tracing")]
            tracing::warn!("stale drawable added to spatial group");
            return;
        };
        d.set_group(Some(GroupRef {
            partition,
            group: id,
        }));
        let (bridge, radius) = (d.bridge, d.radius);

        self.set_state(
            id,
            GroupState::OBJECT_DIRTY | GroupState::GEOM_DIRTY | GroupState::DISCARD_QUERY,
        );
        if bridge {
            if let Some(g) = self.get_mut(id) {
                g.bridges.push(drawable);
            }
        }
        if radius > 1.0 {
            self.set_state(id, GroupState::IMAGE_DIRTY);
        }
    }

    /// Forget `drawable`, which the octree already took out of the node.
    pub(crate) fn remove_object(
        &mut self,
        tree: &Tree,
        id: GroupId,
        drawable: DrawableId,
        drawables: &mut DrawableArena,
    ) {
        self.unbound(tree, id);
        if let Some(d) = drawables.get_mut(drawable) {
            d.set_group(None);
        }
        self.set_state(id, GroupState::GEOM_DIRTY);
        let empty = tree.element_count(id.node()) == 0;
        if let Some(g) = self.get_mut(id) {
            g.bridges.retain(|&b| b != drawable);
            if empty {
                g.draw_map.clear();
            }
        }
    }

    /// Store the occlusion box of the group's current bounds.
    pub(crate) fn build_occlusion(&mut self, id: GroupId) {
        if let Some(g) = self.get_mut(id) {
            g.occlusion_verts = Some(occlusion::occlusion_box(g.bounds.center, g.bounds.half));
        }
        self.clear_state(id, GroupState::OCCLUSION_DIRTY);
    }

    /// Read back a pending query and update `OCCLUDED` on the subtree.
    pub(crate) fn check_occlusion(
        &mut self,
        tree: &Tree,
        id: GroupId,
        mode: OcclusionMode,
        enabled: bool,
        backend: &mut dyn OcclusionBackend,
    ) {
        if !mode.issues_queries() {
            return;
        }
        let Some(g) = self.get(id) else {
            return;
        };
        let parent_occluded = tree
            .parent(id.node())
            .and_then(|p| self.get(GroupId(p)))
            .is_some_and(|p| p.state.contains(GroupState::OCCLUDED));

        if parent_occluded {
            self.clear_state(id, GroupState::QUERY_PENDING | GroupState::DISCARD_QUERY);
        } else if g.state.contains(GroupState::QUERY_PENDING) {
            let mut res = 1;
            if !g.state.contains(GroupState::DISCARD_QUERY) {
                if let Some(name) = g.occlusion_query {
                    res = backend.query_result(name);
                }
            }
            if res > 0 {
                self.clear_state_mode(tree, id, GroupState::OCCLUDED, StateMode::Diff);
            } else {
                self.set_state_mode(tree, id, GroupState::OCCLUDED, StateMode::Diff);
            }
            self.clear_state(id, GroupState::QUERY_PENDING | GroupState::DISCARD_QUERY);
        } else if enabled {
            self.clear_state_mode(tree, id, GroupState::OCCLUDED, StateMode::Diff);
        }
    }

    /// Issue an occlusion query for the group's box, unless the camera is inside it.
    pub(crate) fn do_occlusion(
        &mut self,
        tree: &Tree,
        id: GroupId,
        camera: &Camera,
        pool: &mut QueryPool,
        backend: &mut dyn OcclusionBackend,
    ) {
        let Some(g) = self.get(id) else {
            return;
        };
        if early_fail(camera, &g.bounds) {
            self.set_state(id, GroupState::DISCARD_QUERY);
            self.clear_state_mode(tree, id, GroupState::OCCLUDED, StateMode::Diff);
            return;
        }

        if g.occlusion_verts.is_none() || g.state.contains(GroupState::OCCLUSION_DIRTY) {
            self.build_occlusion(id);
        }
        let Some(g) = self.get_mut(id) else {
            return;
        };
        let name = match g.occlusion_query {
            Some(name) => name,
            None => {
                let name = pool.allocate(backend);
                g.occlusion_query = Some(name);
                name
            }
        };
        let verts = g
            .occlusion_verts
            .unwrap_or_else(|| occlusion::occlusion_box(g.bounds.center, g.bounds.half));
        let indices = occlusion::get_occlusion_indices(camera.origin(), g.bounds.center);
        backend.run_query(name, &verts, indices);

        self.set_state(id, GroupState::QUERY_PENDING);
        self.clear_state(id, GroupState::DISCARD_QUERY);
    }

    /// Refresh radius, distance and pixel area of a group holding drawables.
    pub(crate) fn update_distance(
        &mut self,
        tree: &Tree,
        id: GroupId,
        camera: &Camera,
        render_by_group: bool,
        bridge: bool,
    ) {
        if self.frozen || tree.element_count(id.node()) == 0 {
            return;
        }
        let node_size = tree.size(id.node()).unwrap_or_default();
        let Some(g) = self.get_mut(id) else {
            return;
        };
        debug_assert!(
            !g.state.contains(GroupState::OBJECT_DIRTY),
            "spatial group dirty on distance update"
        );
        g.radius = if render_by_group {
            g.object_bounds.half.length()
        } else {
            node_size.length()
        };
        g.distance = g.calc_distance(camera, bridge);
        g.pixel_area = g.calc_pixel_area(camera);
    }

    pub(crate) fn set_visible(&mut self, id: GroupId, frame: u64) {
        if self.frozen {
            return;
        }
        if let Some(g) = self.get_mut(id) {
            g.visible = frame;
        }
    }

    /// Drop every renderer resource of the group and mark it for a full rebuild.
    pub(crate) fn destroy_gl(&mut self, id: GroupId, pool: &mut QueryPool) {
        self.set_state(id, GroupState::GEOM_DIRTY | GroupState::IMAGE_DIRTY);
        if let Some(g) = self.get_mut(id) {
            g.vertex_buffer = None;
            g.draw_map.clear();
            if let Some(name) = g.occlusion_query.take() {
                pool.release(name);
            }
            g.occlusion_verts = None;
        }
    }
}
