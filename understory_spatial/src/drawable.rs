// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drawables: the renderable objects partitions sort into groups.

use alloc::vec::Vec;
use glam::DVec3;
use understory_octree::Aabb3;

use crate::group::GroupId;
use crate::partition::PartitionId;

/// Generational handle for drawables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(u32, u32);

impl DrawableId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Drawable ids are intentionally 32-bit; arenas never hold 2^32 drawables."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    /// Slot index of this drawable.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

/// A group of a particular partition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupRef {
    /// Partition owning the group.
    pub partition: PartitionId,
    /// Group within that partition.
    pub group: GroupId,
}

/// Placement data of one renderable object.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawable {
    /// World-space extents of everything the drawable renders.
    pub extents: Aabb3,
    /// Position used to bin the drawable in the octree.
    pub position: DVec3,
    /// Radius used to pick the octree level.
    pub bin_radius: f64,
    /// Bounding radius of the rendered object.
    pub radius: f64,
    /// The drawable stands in for a [`SpatialBridge`](crate::SpatialBridge).
    pub bridge: bool,
    /// Rendered this frame; invisible drawables are skipped by picking.
    pub visible: bool,
    /// Scheduled for deletion; skipped by selection.
    pub dead: bool,
    group: Option<GroupRef>,
}

impl Drawable {
    /// A visible drawable with `extents`, positioned and binned by the extents' center and half diagonal.
    pub fn new(extents: Aabb3) -> Self {
        let radius = extents.half_extents().length();
        Self {
            extents,
            position: extents.center(),
            bin_radius: radius,
            radius,
            bridge: false,
            visible: true,
            dead: false,
            group: None,
        }
    }

    /// The drawable as a bridge stand-in.
    pub fn with_bridge(mut self) -> Self {
        self.bridge = true;
        self
    }

    /// Group currently holding the drawable, if any.
    pub fn group(&self) -> Option<GroupRef> {
        self.group
    }

    pub(crate) fn set_group(&mut self, group: Option<GroupRef>) {
        self.group = group;
    }

    /// Whether the placement data is usable for binning.
    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.bin_radius.is_finite()
            && self.bin_radius >= 0.0
            && self.extents.min.is_finite()
            && self.extents.max.is_finite()
            && !self.extents.is_empty()
    }
}

/// Slot storage for drawables shared by every partition of a scene.
#[derive(Clone, Debug, Default)]
pub struct DrawableArena {
    slots: Vec<Option<(u32, Drawable)>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl DrawableArena {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `drawable` and return its id.
    pub fn insert(&mut self, drawable: Drawable) -> DrawableId {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx] + 1;
            self.generations[idx] = generation;
            self.slots[idx] = Some((generation, drawable));
            DrawableId::new(idx, generation)
        } else {
            self.slots.push(Some((1, drawable)));
            self.generations.push(1);
            DrawableId::new(self.slots.len() - 1, 1)
        }
    }

    /// Take a drawable out of the arena.
    ///
    /// Remove it from its partition first; the group keeps no other record of it.
    pub fn remove(&mut self, id: DrawableId) -> Option<Drawable> {
        self.get(id)?;
        let (_, drawable) = self.slots[id.index()].take()?;
        self.free_list.push(id.index());
        Some(drawable)
    }

    /// Drawable for `id`, or `None` if the id is stale.
    pub fn get(&self, id: DrawableId) -> Option<&Drawable> {
        match self.slots.get(id.index()) {
            Some(Some((generation, d))) if *generation == id.generation() => Some(d),
            _ => None,
        }
    }

    /// Mutable drawable for `id`, or `None` if the id is stale.
    pub fn get_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        match self.slots.get_mut(id.index()) {
            Some(Some((generation, d))) if *generation == id.generation() => Some(d),
            _ => None,
        }
    }

    /// Number of live drawables.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Whether the arena holds no drawables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live drawables with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (DrawableId, &Drawable)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|(generation, d)| (DrawableId::new(idx, *generation), d))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(at: DVec3) -> Aabb3 {
        Aabb3::from_center_half(at, DVec3::splat(0.5))
    }

    #[test]
    fn stale_ids_are_rejected_after_reuse() {
        let mut arena = DrawableArena::new();
        let a = arena.insert(Drawable::new(unit_box(DVec3::ZERO)));
        assert!(arena.remove(a).is_some());
        let b = arena.insert(Drawable::new(unit_box(DVec3::ONE)));
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.get(b).map(|d| d.position), Some(DVec3::ONE));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn new_drawable_bins_by_half_diagonal() {
        let d = Drawable::new(unit_box(DVec3::new(2.0, 0.0, 0.0)));
        assert_eq!(d.position, DVec3::new(2.0, 0.0, 0.0));
        assert!((d.bin_radius - 0.75_f64.sqrt()).abs() < 1e-12);
        assert!(d.is_valid());
        assert!(d.group().is_none());

        let mut bad = d.clone();
        bad.position.x = f64::NAN;
        assert!(!bad.is_valid());
    }
}
