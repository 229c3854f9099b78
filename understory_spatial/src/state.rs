// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-group state bits.

use bitflags::bitflags;

bitflags! {
    /// State bits carried by every [`SpatialGroup`](crate::SpatialGroup).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GroupState: u32 {
        /// The last occlusion query found no visible samples.
        const OCCLUDED = 0x0000_0001;
        /// Queued for a geometry rebuild.
        const IN_QUEUE = 0x0000_0002;
        /// An occlusion query was issued and has not been read back.
        const QUERY_PENDING = 0x0000_0004;
        /// The group takes part in occlusion culling this frame.
        const ACTIVE_OCCLUSION = 0x0000_0008;
        /// The pending query result is stale and must be ignored.
        const DISCARD_QUERY = 0x0000_0010;
        /// The octree node behind the group is gone.
        const DEAD = 0x0000_0020;
        /// The occlusion test was skipped because the camera is inside the box.
        const EARLY_FAIL = 0x0000_0040;
        /// Bounds must be recomputed before the next query.
        const DIRTY = 0x0000_0080;
        /// The extents of the directly held drawables changed.
        const OBJECT_DIRTY = 0x0000_0100;
        /// The vertex buffer and draw map must be rebuilt.
        const GEOM_DIRTY = 0x0000_0200;
        /// Alpha batches need a re-sort.
        const ALPHA_DIRTY = 0x0000_0800;
        /// Inherit the parent's frustum result without testing.
        const SKIP_FRUSTUM_CHECK = 0x0000_1000;
        /// Queued for a texture priority update.
        const IN_IMAGE_QUEUE = 0x0000_2000;
        /// Texture priorities must be recomputed.
        const IMAGE_DIRTY = 0x0000_4000;
        /// The occlusion box vertices are stale.
        const OCCLUSION_DIRTY = 0x0000_8000;
        /// Per-drawable meshes changed.
        const MESH_DIRTY = 0x0001_0000;
    }
}

impl GroupState {
    /// Bits a new child copies from its parent.
    pub const INHERIT_MASK: Self = Self::OCCLUDED;
    /// Bits every new group starts with.
    pub const INITIAL: Self = Self::DIRTY.union(Self::GEOM_DIRTY);
}

/// How far a state change reaches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum StateMode {
    /// The group only.
    #[default]
    Single,
    /// The group and its whole subtree.
    Branch,
    /// The subtree, skipping subtrees whose root already has the requested value.
    Diff,
}
