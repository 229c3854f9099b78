// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consistency checks over a partition's groups.

use understory_octree::NodeId;

use crate::drawable::{DrawableArena, DrawableId, GroupRef};
use crate::geometry::DrawInfoError;
use crate::group::GroupId;
use crate::partition::SpatialPartition;
use crate::state::GroupState;

/// Slop allowed when checking that a child box lies within its parent's.
const ENCLOSE_SLOP: f64 = 0.02;

/// A broken partition invariant.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum Violation {
    /// An octree node has no group.
    #[error("octree node {0:?} has no spatial group")]
    MissingGroup(NodeId),
    /// A group still needs rebounding.
    #[error("spatial group {0:?} is dirty")]
    Dirty(GroupId),
    /// A dead group is still attached to a node.
    #[error("spatial group {0:?} is dead")]
    Dead(GroupId),
    /// A drawable does not point back at the group holding it.
    #[error("drawable {drawable:?} does not point back at spatial group {group:?}")]
    DrawableMismatch {
        /// The drawable.
        drawable: DrawableId,
        /// The group holding it.
        group: GroupId,
    },
    /// A child's box sticks out of its parent's.
    #[error("spatial group {child:?} is not enclosed by its parent {parent:?}")]
    ChildNotEnclosed {
        /// The parent group.
        parent: GroupId,
        /// The child group.
        child: GroupId,
    },
    /// A group lacks state its parent passes down.
    #[error("spatial group {group:?} is missing inherited state {state:?}")]
    InheritedState {
        /// The child group.
        group: GroupId,
        /// Bits the parent has and the child lacks.
        state: GroupState,
    },
    /// A dirty group below a clean parent.
    #[error("dirty spatial group {group:?} has a clean parent {parent:?}")]
    DirtyParent {
        /// The dirty group.
        group: GroupId,
        /// Its clean parent.
        parent: GroupId,
    },
    /// A draw batch disagrees with the group's vertex buffer.
    #[error("spatial group {group:?} has a bad draw batch")]
    DrawInfo {
        /// The group.
        group: GroupId,
        /// What is wrong with the batch.
        #[source]
        error: DrawInfoError,
    },
}

impl SpatialPartition {
    /// Check bounds, back-references and draw batches of every group.
    ///
    /// Meant to run after a cull or [`rebound`](Self::rebound) of the root,
    /// when no group may be dirty.
    pub fn validate(&self, drawables: &DrawableArena) -> Result<(), Violation> {
        for node in self.tree.depth_first(self.tree.root()) {
            let id = GroupId::new(node);
            let g = self.groups.get(id).ok_or(Violation::MissingGroup(node))?;
            if g.is_state(GroupState::DIRTY) {
                return Err(Violation::Dirty(id));
            }
            if g.is_dead() {
                return Err(Violation::Dead(id));
            }

            for batches in g.draw_map().values() {
                for info in batches {
                    info.validate(g.vertex_buffer())
                        .map_err(|error| Violation::DrawInfo { group: id, error })?;
                }
            }

            let here = GroupRef {
                partition: self.id,
                group: id,
            };
            for &drawable in self.tree.data(node) {
                if drawables.get(drawable).and_then(|d| d.group()) != Some(here) {
                    return Err(Violation::DrawableMismatch { drawable, group: id });
                }
            }

            for &child in self.tree.children(node) {
                let cid = GroupId::new(child);
                let c = self.groups.get(cid).ok_or(Violation::MissingGroup(child))?;
                if !g.extents().encloses(&c.extents(), ENCLOSE_SLOP) {
                    return Err(Violation::ChildNotEnclosed {
                        parent: id,
                        child: cid,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that inherited state reaches every child and that dirtiness runs up to the root.
    pub fn check_states(&self) -> Result<(), Violation> {
        for node in self.tree.depth_first(self.tree.root()) {
            let Some(parent) = self.tree.parent(node) else {
                continue;
            };
            let (id, pid) = (GroupId::new(node), GroupId::new(parent));
            let g = self.groups.get(id).ok_or(Violation::MissingGroup(node))?;
            let p = self.groups.get(pid).ok_or(Violation::MissingGroup(parent))?;

            let missing = (p.state() & GroupState::INHERIT_MASK).difference(g.state());
            if !missing.is_empty() {
                return Err(Violation::InheritedState {
                    group: id,
                    state: missing,
                });
            }
            if g.is_state(GroupState::DIRTY) && !p.is_state(GroupState::DIRTY) {
                return Err(Violation::DirtyParent {
                    group: id,
                    parent: pid,
                });
            }
        }
        Ok(())
    }
}
