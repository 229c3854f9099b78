// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Line segment picking through partitions and bridges.

use glam::{DMat4, DVec3};
use understory_octree::NodeId;

use crate::bridge::SpatialBridge;
use crate::drawable::{Drawable, DrawableArena, DrawableId};
use crate::group::GroupId;
use crate::intersect::line_segment_box_intersect;
use crate::partition::SpatialPartition;

/// Per-drawable hit testing supplied by the caller.
pub trait Picker {
    /// Whether the drawable takes part in picking at all.
    fn accepts(&self, _id: DrawableId, drawable: &Drawable) -> bool {
        drawable.visible
    }

    /// Hit point of the segment `start..end` with the drawable's geometry, if any.
    fn intersect(
        &mut self,
        id: DrawableId,
        drawable: &Drawable,
        start: DVec3,
        end: DVec3,
    ) -> Option<DVec3>;
}

/// Closest drawable hit by a pick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PickHit {
    /// The drawable hit.
    pub drawable: DrawableId,
    /// Hit point in world space.
    pub point: DVec3,
}

struct Intersect<'a> {
    drawables: &'a DrawableArena,
    bridges: &'a [SpatialBridge],
    picker: &'a mut dyn Picker,
    start: DVec3,
    end: DVec3,
    hit: Option<PickHit>,
}

impl Intersect<'_> {
    /// Test the node's drawables, then descend into children whose box the segment crosses.
    ///
    /// `to_local` maps world points into the partition's space for the box tests.
    fn check_node(&mut self, part: &SpatialPartition, node: NodeId, to_local: Option<&DMat4>) {
        for &id in part.tree.data(node) {
            self.check_drawable(id);
        }
        for &child in part.tree.children(node) {
            let Some(g) = part.groups.get(GroupId::new(child)) else {
                continue;
            };
            let bounds = g.bounds();
            let (start, end) = match to_local {
                Some(m) => (m.transform_point3(self.start), m.transform_point3(self.end)),
                None => (self.start, self.end),
            };
            if line_segment_box_intersect(start, end, bounds.center, bounds.half) {
                self.check_node(part, child, to_local);
            }
        }
    }

    fn check_drawable(&mut self, id: DrawableId) {
        let drawables = self.drawables;
        let Some(d) = drawables.get(id) else {
            return;
        };
        if !self.picker.accepts(id, d) {
            return;
        }
        if d.bridge {
            let bridges = self.bridges;
            match bridges.iter().find(|b| b.drawable() == id) {
                Some(bridge) => {
                    let to_local = bridge.render_matrix().inverse();
                    let part = bridge.partition();
                    self.check_node(part, part.tree.root(), Some(&to_local));
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(?id, "bridge drawable without a bridge");
                }
            }
        } else if let Some(point) = self.picker.intersect(id, d, self.start, self.end) {
            // Only closer hits from here on.
            self.end = point;
            self.hit = Some(PickHit {
                drawable: id,
                point,
            });
        }
    }
}

impl SpatialPartition {
    /// Closest drawable hit by the segment `start..end`.
    ///
    /// Bridge drawables are searched through their entry in `bridges`, with
    /// box tests done in the bridge's local space. Hit testing itself is left
    /// to `picker`, which sees world-space segments.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "SpatialPartition::line_segment_intersect")
    )]
    pub fn line_segment_intersect(
        &self,
        start: DVec3,
        end: DVec3,
        drawables: &DrawableArena,
        bridges: &[SpatialBridge],
        picker: &mut dyn Picker,
    ) -> Option<PickHit> {
        let mut intersect = Intersect {
            drawables,
            bridges,
            picker,
            start,
            end,
            hit: None,
        };
        intersect.check_node(self, self.tree.root(), None);
        intersect.hit
    }
}
