// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listener trait notified of structural changes in an [`Octree`].

use crate::octree::{NodeId, Octree};

/// Observer of octree mutations.
///
/// Every method has an empty default so listeners only implement the events
/// they care about. Callbacks receive a shared view of the tree in its state
/// right after the change.
pub trait OctreeListener<E> {
    /// `element` was stored at `node`.
    fn handle_insertion(&mut self, tree: &Octree<E>, node: NodeId, element: E) {
        let _ = (tree, node, element);
    }

    /// `element` was taken out of `node`.
    fn handle_removal(&mut self, tree: &Octree<E>, node: NodeId, element: E) {
        let _ = (tree, node, element);
    }

    /// `child` was created under (or attached to) `parent`.
    fn handle_child_addition(&mut self, tree: &Octree<E>, parent: NodeId, child: NodeId) {
        let _ = (tree, parent, child);
    }

    /// `child` was detached from `parent`. It is still readable until its destruction event.
    fn handle_child_removal(&mut self, tree: &Octree<E>, parent: NodeId, child: NodeId) {
        let _ = (tree, parent, child);
    }

    /// `node` is about to be freed. Its data and children are still readable.
    fn handle_destruction(&mut self, tree: &Octree<E>, node: NodeId) {
        let _ = (tree, node);
    }
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl<E> OctreeListener<E> for NoopListener {}
