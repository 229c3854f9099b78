// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keeps spatial groups in step with octree mutations.

use understory_octree::{NodeId, OctreeListener};

use crate::drawable::{DrawableArena, DrawableId, GroupRef};
use crate::group::{GroupId, GroupStore, Tree};
use crate::partition::PartitionId;
use crate::state::GroupState;

/// Octree listener translating node events into group bookkeeping.
#[derive(Debug)]
pub(crate) struct GroupSync<'a> {
    pub(crate) groups: &'a mut GroupStore,
    pub(crate) drawables: &'a mut DrawableArena,
    pub(crate) partition: PartitionId,
}

impl OctreeListener<DrawableId> for GroupSync<'_> {
    fn handle_insertion(&mut self, tree: &Tree, node: NodeId, element: DrawableId) {
        let id = GroupId::new(node);
        self.groups
            .add_object(id, self.partition, element, self.drawables);
        self.groups.unbound(tree, id);
        self.groups.set_state(id, GroupState::OBJECT_DIRTY);
    }

    fn handle_removal(&mut self, tree: &Tree, node: NodeId, element: DrawableId) {
        let id = GroupId::new(node);
        self.groups
            .remove_object(tree, id, element, self.drawables);
        self.groups.set_state(id, GroupState::OBJECT_DIRTY);
    }

    fn handle_child_addition(&mut self, tree: &Tree, parent: NodeId, child: NodeId) {
        let parent = GroupId::new(parent);
        let child_id = GroupId::new(child);
        if self.groups.contains(child_id) {
            #[cfg(feature = "tracing")]
            tracing::warn!("spatial group redundancy detected");
        } else {
            let inherited = self
                .groups
                .get(parent)
                .map(|g| g.state() & GroupState::INHERIT_MASK)
                .unwrap_or_default();
            self.groups.create(tree, child);
            self.groups.set_state(child_id, inherited);
        }
        self.groups.unbound(tree, parent);
    }

    fn handle_child_removal(&mut self, tree: &Tree, parent: NodeId, _child: NodeId) {
        self.groups.unbound(tree, GroupId::new(parent));
    }

    fn handle_destruction(&mut self, tree: &Tree, node: NodeId) {
        let id = GroupId::new(node);
        let here = GroupRef {
            partition: self.partition,
            group: id,
        };
        for &element in tree.data(node) {
            if let Some(d) = self.drawables.get_mut(element) {
                if d.group() == Some(here) {
                    d.set_group(None);
                }
            }
        }
        // Draw map, buffer and query go with the group; the query name is queued for the pool.
        self.groups.remove(id);
    }
}
