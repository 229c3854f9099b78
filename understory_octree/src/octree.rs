// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loose octree with generational node ids and listener callbacks.

use alloc::vec;
use alloc::vec::Vec;
use glam::DVec3;

use crate::error::InsertError;
use crate::listener::OctreeListener;
use crate::types::{Aabb3, octant_of, push_center};

/// Below this distance two child centers are considered the same point.
const APPROXIMATELY_ZERO: f64 = 0.00001;

/// Radius and size below which a node still accepts an element of that radius.
const MIN_RADIUS: f64 = 0.001;

/// Generational handle for octree nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32, u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Node ids are intentionally 32-bit; trees never hold 2^32 nodes."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    /// Slot index of this node. Stable while the node is alive; reused after it is freed.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

/// Tuning knobs for an [`Octree`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OctreeConfig {
    /// Elements a node holds before new elements are pushed to children.
    pub max_capacity: usize,
    /// Largest accepted element radius.
    pub max_radius: f64,
    /// Largest accepted distance of an element position from the origin.
    pub max_coordinate: f64,
    /// Center of the initial root.
    pub center: DVec3,
    /// Half-size of the initial root.
    pub size: DVec3,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_capacity: 128,
            max_radius: 4096.0,
            max_coordinate: 1024.0 * 1024.0,
            center: DVec3::ZERO,
            size: DVec3::ONE,
        }
    }
}

#[derive(Clone, Debug)]
struct Node<E> {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    octant: Option<u8>,
    center: DVec3,
    size: DVec3,
    bounds: Aabb3,
    data: Vec<E>,
}

impl<E> Node<E> {
    fn new(generation: u32, center: DVec3, size: DVec3, parent: Option<NodeId>) -> Self {
        Self {
            generation,
            parent,
            children: Vec::new(),
            octant: None,
            center,
            size,
            bounds: Aabb3::from_center_half(center, size),
            data: Vec::new(),
        }
    }

    fn set_center_size(&mut self, center: DVec3, size: DVec3) {
        self.center = center;
        self.size = size;
        self.bounds = Aabb3::from_center_half(center, size);
    }

    fn is_inside(&self, pos: DVec3) -> bool {
        self.bounds.contains_point(pos)
    }
}

/// A loose octree of `E` elements.
///
/// Elements are small `Copy` handles; the tree stores them by value and
/// identifies them by equality on removal. Position and bin radius are
/// supplied at insertion time and are not retained.
#[derive(Clone, Debug)]
pub struct Octree<E> {
    nodes: Vec<Option<Node<E>>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    root: NodeId,
    config: OctreeConfig,
}

impl<E: Copy + PartialEq> Default for Octree<E> {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

impl<E: Copy + PartialEq> Octree<E> {
    /// Create a tree holding a single empty root.
    pub fn new(config: OctreeConfig) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            root: NodeId::new(0, 0),
            config,
        };
        tree.root = tree.alloc(config.center, config.size, None);
        tree
    }

    /// The configuration this tree was built with.
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// The current root. Growth keeps the root id stable; [`destroy`](Self::destroy) replaces it.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Whether the tree holds nothing but an empty root.
    pub fn is_empty(&self) -> bool {
        self.node(self.root)
            .is_none_or(|n| n.children.is_empty() && n.data.is_empty())
    }

    /// Upper bound on node slot indices, for side tables indexed by [`NodeId::index`].
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `id` refers to a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Parent of `id`, `None` for the root or a stale id.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of `id`.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| &n.children)
    }

    /// Elements stored directly at `id`.
    pub fn data(&self, id: NodeId) -> &[E] {
        self.node(id).map_or(&[], |n| &n.data)
    }

    /// Center of `id`.
    pub fn center(&self, id: NodeId) -> Option<DVec3> {
        self.node(id).map(|n| n.center)
    }

    /// Half-size of `id`.
    pub fn size(&self, id: NodeId) -> Option<DVec3> {
        self.node(id).map(|n| n.size)
    }

    /// Cached min/max box of `id`.
    pub fn bounds(&self, id: NodeId) -> Option<Aabb3> {
        self.node(id).map(|n| n.bounds)
    }

    /// Octant of `id` within its parent.
    pub fn octant(&self, id: NodeId) -> Option<u8> {
        self.node(id).and_then(|n| n.octant)
    }

    /// Whether `id` has no children.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).is_none_or(|n| n.children.is_empty())
    }

    /// Number of elements stored directly at `id`.
    pub fn element_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.data.len())
    }

    /// Number of children of `id`.
    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.children.len())
    }

    /// Whether `pos` lies within the node box (faces inclusive).
    pub fn is_inside(&self, id: NodeId, pos: DVec3) -> bool {
        self.node(id).is_some_and(|n| n.is_inside(pos))
    }

    /// Whether `pos` is inside and `radius` is not larger than the node's full width.
    pub fn is_inside_radius(&self, id: NodeId, pos: DVec3, radius: f64) -> bool {
        self.node(id)
            .is_some_and(|n| radius <= n.size.x * 2.0 && n.is_inside(pos))
    }

    /// Whether elements of `radius` are binned at this node's level.
    ///
    /// The root bins nothing.
    pub fn contains_radius(&self, id: NodeId, radius: f64) -> bool {
        let Some(n) = self.node(id) else {
            return false;
        };
        if n.parent.is_none() {
            return false;
        }
        let size = n.size.x;
        (radius <= MIN_RADIUS && size <= MIN_RADIUS) || (radius <= size * 2.0 && radius > size)
    }

    /// Whether an element at `pos` with `radius` may stay at `id` without reinsertion.
    ///
    /// This is the placement rule of insertion minus the capacity check.
    pub fn accepts_in_place(&self, id: NodeId, pos: DVec3, radius: f64) -> bool {
        let Some(n) = self.node(id) else {
            return false;
        };
        n.is_inside(pos)
            && (self.contains_radius(id, radius)
                || (radius > n.size.x && self.parent_is_full(n.parent)))
    }

    /// Deepest existing node covering `pos` at `radius`, searching down from the root.
    pub fn node_at(&self, pos: DVec3, radius: f64) -> NodeId {
        self.node_at_from(self.root, pos, radius)
    }

    /// Deepest existing node covering `pos` at `radius`, searching from `start`.
    ///
    /// Walks up through parents when `start` neither covers the position nor bins the radius.
    pub fn node_at_from(&self, start: NodeId, pos: DVec3, radius: f64) -> NodeId {
        let mut node = start;
        loop {
            let Some(n) = self.node(node) else {
                return self.root;
            };
            if self.is_inside_radius(node, pos, radius) {
                let mut octant = octant_of(n.center, pos);
                let mut current = n;
                while current.size.x >= radius {
                    let next = current
                        .children
                        .iter()
                        .copied()
                        .find(|&c| self.octant(c) == Some(octant));
                    let Some(child) = next else {
                        break;
                    };
                    let Some(cn) = self.node(child) else {
                        break;
                    };
                    node = child;
                    current = cn;
                    octant = octant_of(cn.center, pos);
                }
                return node;
            }
            match n.parent {
                Some(parent) if !self.contains_radius(node, radius) => node = parent,
                _ => return node,
            }
        }
    }

    /// Insert `element` positioned at `pos` with bin radius `radius`.
    ///
    /// The root grows as needed. Returns the node now holding the element.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "Octree::insert")
    )]
    pub fn insert<L: OctreeListener<E> + ?Sized>(
        &mut self,
        element: E,
        pos: DVec3,
        radius: f64,
        listener: &mut L,
    ) -> Result<NodeId, InsertError> {
        if !pos.is_finite() || !radius.is_finite() {
            return Err(InsertError::NotFinite);
        }
        if radius > self.config.max_radius {
            return Err(InsertError::RadiusTooLarge {
                radius,
                limit: self.config.max_radius,
            });
        }
        let distance = pos.length();
        if distance >= self.config.max_coordinate {
            return Err(InsertError::OutOfRange {
                distance,
                limit: self.config.max_coordinate,
            });
        }

        let root = self.root;
        if !self.root_fits(pos, radius) {
            if self.child_count(root) == 0 {
                while !self.root_fits(pos, radius) {
                    self.grow_root(pos);
                }
            } else {
                while !self.root_fits(pos, radius) {
                    let (old_center, old_size) = self.grow_root(pos);
                    self.push_down_root(old_center, old_size, listener);
                }
            }
        }

        let start = self.node_at(pos, radius);
        Ok(self.insert_from(start, element, pos, radius, listener))
    }

    /// Remove `element` from `node`.
    ///
    /// Nodes left without children or elements are deleted up the parent
    /// chain (the root always survives). Returns false when the element is
    /// not stored at `node` or the id is stale.
    pub fn remove<L: OctreeListener<E> + ?Sized>(
        &mut self,
        node: NodeId,
        element: E,
        listener: &mut L,
    ) -> bool {
        let Some(n) = self.node_mut(node) else {
            return false;
        };
        let Some(at) = n.data.iter().position(|e| *e == element) else {
            return false;
        };
        n.data.remove(at);
        listener.handle_removal(&*self, node, element);
        self.check_alive(node, listener);
        true
    }

    /// Collapse a root whose only child is an empty branch into that child.
    ///
    /// The grandchildren are re-parented without child-addition events and
    /// the absorbed child fires its destruction event.
    pub fn balance<L: OctreeListener<E> + ?Sized>(&mut self, listener: &mut L) -> bool {
        let root = self.root;
        let Some(r) = self.node(root) else {
            return false;
        };
        let [child] = r.children[..] else {
            return false;
        };
        let Some(c) = self.node(child) else {
            return false;
        };
        if c.children.is_empty() || !c.data.is_empty() {
            return false;
        }
        let (center, size) = (c.center, c.size);
        let grandchildren = c.children.clone();

        if let Some(r) = self.node_mut(root) {
            r.set_center_size(center, size);
            r.children.clear();
        }
        for gc in grandchildren {
            self.attach(root, gc);
        }
        if let Some(c) = self.node_mut(child) {
            c.children.clear();
        }
        listener.handle_destruction(&*self, child);
        self.free(child);
        true
    }

    /// Translate the box of `id` (center and cached min/max) by `offset`.
    ///
    /// Children are not moved; callers shift a whole subtree node by node.
    pub fn translate_node(&mut self, id: NodeId, offset: DVec3) {
        if let Some(n) = self.node_mut(id) {
            let center = n.center + offset;
            let size = n.size;
            n.set_center_size(center, size);
        }
    }

    /// Tear down every node, children before parents, then start over with a fresh root.
    ///
    /// The new root fires no events; it is available through [`root`](Self::root).
    pub fn destroy<L: OctreeListener<E> + ?Sized>(&mut self, listener: &mut L) {
        let root = self.root;
        self.destroy_subtree(root, listener);
        let (center, size) = (self.config.center, self.config.size);
        self.root = self.alloc(center, size, None);
    }

    /// Pre-order depth-first walk starting at `from`.
    pub fn depth_first(&self, from: NodeId) -> DepthFirst<'_, E> {
        let stack = if self.is_alive(from) {
            vec![from]
        } else {
            Vec::new()
        };
        DepthFirst { tree: self, stack }
    }

    /// Post-order walk starting at `from`: every node after all of its children.
    pub fn post_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.post_order_into(from, &mut out);
        out
    }

    fn post_order_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &c in self.children(id) {
            self.post_order_into(c, out);
        }
        if self.is_alive(id) {
            out.push(id);
        }
    }

    fn root_fits(&self, pos: DVec3, radius: f64) -> bool {
        self.node(self.root)
            .is_some_and(|r| r.size.x > radius && r.is_inside(pos))
    }

    /// Push the root center toward `pos` by its size and double the size.
    fn grow_root(&mut self, pos: DVec3) -> (DVec3, DVec3) {
        let root = self.root;
        let Some(r) = self.node_mut(root) else {
            return (DVec3::ZERO, DVec3::ZERO);
        };
        let (old_center, old_size) = (r.center, r.size);
        r.set_center_size(push_center(old_center, old_size, pos), old_size * 2.0);
        (old_center, old_size)
    }

    /// Move the root's current children under a new node with the pre-growth box.
    fn push_down_root<L: OctreeListener<E> + ?Sized>(
        &mut self,
        old_center: DVec3,
        old_size: DVec3,
        listener: &mut L,
    ) {
        let root = self.root;
        let branch = self.alloc(old_center, old_size, None);
        let children = self
            .node_mut(root)
            .map(|r| core::mem::take(&mut r.children))
            .unwrap_or_default();
        for c in children {
            self.attach(branch, c);
        }
        self.add_child(root, branch, listener);
    }

    fn insert_from<L: OctreeListener<E> + ?Sized>(
        &mut self,
        start: NodeId,
        element: E,
        pos: DVec3,
        radius: f64,
        listener: &mut L,
    ) -> NodeId {
        let capacity = self.config.max_capacity;
        let mut node = start;
        loop {
            let Some(n) = self.node(node) else {
                node = self.root;
                continue;
            };
            if !n.is_inside(pos) {
                if node == self.root {
                    // The root was grown to cover `pos`; keep the element rather than spin.
                    debug_assert!(false, "octree root does not cover an accepted position");
                    return self.store(node, element, listener);
                }
                #[cfg(feature = "tracing")]
                tracing::warn!("octree insertion outside node, starting over from root");
                node = self.root;
                continue;
            }

            // Oversize elements under a full parent stay here even past capacity.
            let fits_here = (n.data.len() < capacity && self.contains_radius(node, radius))
                || (radius > n.size.x && self.parent_is_full(n.parent));
            if fits_here {
                return self.store(node, element, listener);
            }

            if let Some(child) = n
                .children
                .iter()
                .copied()
                .find(|&c| self.is_inside(c, pos))
            {
                node = child;
                continue;
            }

            let size = n.size * 0.5;
            let center = push_center(n.center, size, pos);
            if (center - n.center).abs().cmplt(DVec3::splat(APPROXIMATELY_ZERO)).all() {
                return self.store(node, element, listener);
            }
            let child = self.alloc(center, size, None);
            self.add_child(node, child, listener);
            node = child;
        }
    }

    fn store<L: OctreeListener<E> + ?Sized>(
        &mut self,
        node: NodeId,
        element: E,
        listener: &mut L,
    ) -> NodeId {
        if let Some(n) = self.node_mut(node) {
            n.data.push(element);
        }
        listener.handle_insertion(&*self, node, element);
        node
    }

    fn parent_is_full(&self, parent: Option<NodeId>) -> bool {
        parent.is_some_and(|p| self.element_count(p) >= self.config.max_capacity)
    }

    fn center_or_zero(&self, id: NodeId) -> DVec3 {
        self.center(id).unwrap_or(DVec3::ZERO)
    }

    /// Link `child` under `parent` without notifying listeners.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        let parent_center = self.center_or_zero(parent);
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
            c.octant = Some(octant_of(parent_center, c.center));
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
    }

    fn add_child<L: OctreeListener<E> + ?Sized>(
        &mut self,
        parent: NodeId,
        child: NodeId,
        listener: &mut L,
    ) {
        self.attach(parent, child);
        listener.handle_child_addition(&*self, parent, child);
    }

    fn check_alive<L: OctreeListener<E> + ?Sized>(&mut self, node: NodeId, listener: &mut L) {
        let mut node = node;
        while let Some(n) = self.node(node) {
            if !n.children.is_empty() || !n.data.is_empty() {
                return;
            }
            let Some(parent) = n.parent else {
                return;
            };
            listener.handle_child_removal(&*self, parent, node);
            self.destroy_subtree(node, listener);
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|&c| c != node);
            }
            node = parent;
        }
    }

    fn destroy_subtree<L: OctreeListener<E> + ?Sized>(&mut self, id: NodeId, listener: &mut L) {
        for child in self.children(id).to_vec() {
            self.destroy_subtree(child, listener);
        }
        if let Some(n) = self.node_mut(id) {
            n.children.clear();
        }
        listener.handle_destruction(&*self, id);
        self.free(id);
    }

    fn alloc(&mut self, center: DVec3, size: DVec3, parent: Option<NodeId>) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx] + 1;
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, center, size, parent));
            NodeId::new(idx, generation)
        } else {
            let generation = 1;
            self.nodes.push(Some(Node::new(generation, center, size, parent)));
            self.generations.push(generation);
            NodeId::new(self.nodes.len() - 1, generation)
        }
    }

    fn free(&mut self, id: NodeId) {
        if self.node(id).is_some() {
            self.nodes[id.index()] = None;
            self.free_list.push(id.index());
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node<E>> {
        self.nodes
            .get(id.index())
            .and_then(|n| n.as_ref())
            .filter(|n| n.generation == id.generation())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<E>> {
        self.nodes
            .get_mut(id.index())
            .and_then(|n| n.as_mut())
            .filter(|n| n.generation == id.generation())
    }
}

/// Iterator returned by [`Octree::depth_first`].
#[derive(Debug)]
pub struct DepthFirst<'a, E> {
    tree: &'a Octree<E>,
    stack: Vec<NodeId>,
}

impl<E: Copy + PartialEq> Iterator for DepthFirst<'_, E> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::NoopListener;
    use alloc::vec::Vec;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Default)]
    struct Recorder {
        events: Vec<(&'static str, NodeId, u32)>,
    }

    impl OctreeListener<u32> for Recorder {
        fn handle_insertion(&mut self, _: &Octree<u32>, node: NodeId, element: u32) {
            self.events.push(("insert", node, element));
        }
        fn handle_removal(&mut self, _: &Octree<u32>, node: NodeId, element: u32) {
            self.events.push(("remove", node, element));
        }
        fn handle_child_addition(&mut self, _: &Octree<u32>, _: NodeId, child: NodeId) {
            self.events.push(("add_child", child, 0));
        }
        fn handle_child_removal(&mut self, _: &Octree<u32>, _: NodeId, child: NodeId) {
            self.events.push(("remove_child", child, 0));
        }
        fn handle_destruction(&mut self, tree: &Octree<u32>, node: NodeId) {
            assert!(tree.is_alive(node), "destroyed node must still be readable");
            self.events.push(("destroy", node, 0));
        }
    }

    fn count(r: &Recorder, kind: &str) -> usize {
        r.events.iter().filter(|e| e.0 == kind).count()
    }

    #[test]
    fn insert_descends_to_radius_level() {
        let mut tree = Octree::<u32>::default();
        let mut rec = Recorder::default();
        let node = tree.insert(1, DVec3::new(0.3, 0.3, 0.3), 0.3, &mut rec).unwrap();
        // Root half-size 1 bins nothing, its child (0.5) bins radii in (0.5, 1], so
        // a 0.3 radius lands on the grandchild of half-size 0.25.
        assert_eq!(tree.size(node), Some(DVec3::splat(0.25)));
        assert_eq!(tree.data(node), &[1]);
        assert_eq!(count(&rec, "add_child"), 2);
        assert_eq!(count(&rec, "insert"), 1);
        assert!(tree.is_inside(node, DVec3::new(0.3, 0.3, 0.3)));
        let parent = tree.parent(node).unwrap();
        assert_eq!(tree.octant(parent), Some(7));
        assert_eq!(tree.octant(node), Some(0));
    }

    #[test]
    fn root_grows_to_cover_far_elements() {
        let mut tree = Octree::<u32>::default();
        let mut rec = Recorder::default();
        tree.insert(1, DVec3::new(0.5, 0.5, 0.5), 0.6, &mut rec).unwrap();
        let root = tree.root();
        let node = tree.insert(2, DVec3::new(40.0, -3.0, 7.0), 1.0, &mut rec).unwrap();
        assert_eq!(tree.root(), root);
        let root_box = tree.bounds(root).unwrap();
        assert!(root_box.contains_point(DVec3::new(40.0, -3.0, 7.0)));
        assert!(root_box.contains_point(DVec3::new(0.5, 0.5, 0.5)));
        assert!(tree.is_inside(node, DVec3::new(40.0, -3.0, 7.0)));
        // Every node still lies inside its parent.
        for id in tree.depth_first(root) {
            if let Some(p) = tree.parent(id) {
                assert!(tree.bounds(p).unwrap().encloses(&tree.bounds(id).unwrap(), 1e-9));
            }
        }
        // Both elements are still reachable.
        let all: Vec<u32> = tree.depth_first(root).flat_map(|n| tree.data(n).to_vec()).collect();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn insert_rejects_bad_input() {
        let mut tree = Octree::<u32>::default();
        let mut l = NoopListener;
        assert!(matches!(
            tree.insert(1, DVec3::ZERO, 5000.0, &mut l),
            Err(InsertError::RadiusTooLarge { .. })
        ));
        assert!(matches!(
            tree.insert(1, DVec3::new(2.0e6, 0.0, 0.0), 1.0, &mut l),
            Err(InsertError::OutOfRange { .. })
        ));
        assert_eq!(
            tree.insert(1, DVec3::new(f64::NAN, 0.0, 0.0), 1.0, &mut l),
            Err(InsertError::NotFinite)
        );
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_prunes_empty_nodes() {
        let mut tree = Octree::<u32>::default();
        let mut rec = Recorder::default();
        let node = tree.insert(7, DVec3::new(0.3, 0.3, 0.3), 0.3, &mut rec).unwrap();
        assert_eq!(tree.len(), 3);
        assert!(!tree.remove(node, 8, &mut rec));
        assert!(tree.remove(node, 7, &mut rec));
        assert!(!tree.is_alive(node));
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(count(&rec, "remove"), 1);
        assert_eq!(count(&rec, "remove_child"), 2);
        assert_eq!(count(&rec, "destroy"), 2);
        // Stale ids are rejected after the slot is reused.
        let again = tree.insert(9, DVec3::new(0.3, 0.3, 0.3), 0.3, &mut rec).unwrap();
        assert_eq!(again.index(), node.index());
        assert_ne!(again, node);
        assert!(tree.data(node).is_empty());
    }

    #[test]
    fn node_at_finds_holder() {
        let mut tree = Octree::<u32>::default();
        let mut l = NoopListener;
        let pos = DVec3::new(-0.6, 0.2, 0.9);
        let node = tree.insert(3, pos, 0.2, &mut l).unwrap();
        assert_eq!(tree.node_at(pos, 0.2), node);
        assert!(tree.accepts_in_place(node, pos, 0.2));
        assert!(!tree.accepts_in_place(node, DVec3::splat(0.9), 0.2));
        assert!(!tree.contains_radius(tree.root(), 0.5));
    }

    #[test]
    fn full_parent_keeps_oversize_elements() {
        let config = OctreeConfig {
            max_capacity: 2,
            ..OctreeConfig::default()
        };
        let mut tree = Octree::<u32>::new(config);
        let mut l = NoopListener;
        let pos = DVec3::splat(0.4);
        let a = tree.insert(0, pos, 0.8, &mut l).unwrap();
        tree.insert(1, pos, 0.8, &mut l).unwrap();
        // `a` is full; the next 0.8 element is pushed into a child of half-size
        // 0.25 and binned there since its parent is full.
        let c = tree.insert(2, pos, 0.8, &mut l).unwrap();
        assert_ne!(a, c);
        assert_eq!(tree.parent(c), Some(a));
        assert_eq!(tree.element_count(a), 2);

        // Once `c` is full too, oversize elements still stop there rather
        // than spawning deeper nodes.
        assert_eq!(tree.insert(3, pos, 0.8, &mut l), Ok(c));
        assert_eq!(tree.insert(4, pos, 0.8, &mut l), Ok(c));
        assert_eq!(tree.element_count(c), 3);
        assert!(tree.is_leaf(c));
    }

    #[test]
    fn balance_absorbs_single_branch() {
        let mut tree = Octree::<u32>::default();
        let mut rec = Recorder::default();
        tree.insert(1, DVec3::splat(0.2), 0.1, &mut rec).unwrap();
        tree.insert(2, DVec3::splat(0.7), 0.1, &mut rec).unwrap();
        let root = tree.root();
        assert_eq!(tree.child_count(root), 1);
        let before = tree.len();
        let destroyed = count(&rec, "destroy");
        assert!(tree.balance(&mut rec));
        assert_eq!(tree.len(), before - 1);
        assert_eq!(count(&rec, "destroy"), destroyed + 1);
        assert_eq!(tree.size(root), Some(DVec3::splat(0.5)));
        for &c in tree.children(root) {
            assert_eq!(tree.parent(c), Some(root));
        }
        // Two branches now hang off the root.
        assert!(!tree.balance(&mut rec), "a root with two children is balanced");
    }

    #[test]
    fn destroy_is_post_order() {
        let mut tree = Octree::<u32>::default();
        let mut rec = Recorder::default();
        tree.insert(1, DVec3::splat(0.3), 0.3, &mut rec).unwrap();
        tree.insert(2, DVec3::splat(-0.3), 0.3, &mut rec).unwrap();
        let order = tree.post_order(tree.root());
        let old_root = tree.root();
        rec.events.clear();
        tree.destroy(&mut rec);
        let destroyed: Vec<NodeId> = rec.events.iter().map(|e| e.1).collect();
        assert_eq!(destroyed, order);
        assert_eq!(destroyed.last(), Some(&old_root));
        assert!(!tree.is_alive(old_root));
        assert!(tree.is_alive(tree.root()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn random_inserts_stay_enclosed() {
        let mut rng = StdRng::seed_from_u64(0x0c7);
        let mut tree = Octree::<u32>::default();
        let mut l = NoopListener;
        let mut placed = Vec::new();
        for i in 0..500 {
            let pos = DVec3::new(
                rng.random_range(-200.0..200.0),
                rng.random_range(-200.0..200.0),
                rng.random_range(-50.0..50.0),
            );
            let radius = rng.random_range(0.05..8.0);
            tree.insert(i, pos, radius, &mut l).unwrap();
            placed.push((i, pos));
        }
        let root = tree.root();
        let mut seen = 0;
        for id in tree.depth_first(root) {
            seen += tree.element_count(id);
            if let Some(p) = tree.parent(id) {
                assert!(tree.bounds(p).unwrap().encloses(&tree.bounds(id).unwrap(), 1e-9));
            }
        }
        assert_eq!(seen, placed.len());
        for (i, pos) in placed {
            let holder = tree
                .depth_first(root)
                .find(|&n| tree.data(n).contains(&i))
                .unwrap();
            assert!(tree.is_inside(holder, pos));
        }
    }
}
