// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Octree basics.
//!
//! Fill a small-capacity octree, watch the listener events, then empty it.
//!
//! Run:
//! - `cargo run -p understory_demos --example octree_basics`

use glam::DVec3;
use understory_octree::{NodeId, Octree, OctreeConfig, OctreeListener};

/// Counts non-root nodes and element traffic.
#[derive(Default)]
struct Census {
    nodes: usize,
    inserted: usize,
    removed: usize,
}

impl OctreeListener<u32> for Census {
    fn handle_insertion(&mut self, _: &Octree<u32>, _: NodeId, _: u32) {
        self.inserted += 1;
    }
    fn handle_removal(&mut self, _: &Octree<u32>, _: NodeId, _: u32) {
        self.removed += 1;
    }
    fn handle_child_addition(&mut self, _: &Octree<u32>, _: NodeId, _: NodeId) {
        self.nodes += 1;
    }
    fn handle_destruction(&mut self, _: &Octree<u32>, _: NodeId) {
        self.nodes -= 1;
    }
}

fn main() {
    let mut tree = Octree::new(OctreeConfig {
        max_capacity: 4,
        ..OctreeConfig::default()
    });
    let mut census = Census::default();

    // A ring of small elements plus one large one.
    let mut placed = Vec::new();
    for i in 0..40_u32 {
        let a = f64::from(i) * core::f64::consts::TAU / 40.0;
        let pos = DVec3::new(a.cos() * 30.0, a.sin() * 30.0, 0.0);
        let node = tree.insert(i, pos, 0.5, &mut census).unwrap();
        placed.push((i, node));
    }
    let big = tree.insert(99, DVec3::ZERO, 20.0, &mut census).unwrap();
    println!(
        "{} elements in {} nodes, root bounds {:?}",
        census.inserted,
        tree.len(),
        tree.bounds(tree.root())
    );
    println!("large element lives at depth {}", depth(&tree, big));
    assert_eq!(census.nodes + 1, tree.len(), "listener saw every child node");

    for (i, node) in placed {
        assert!(tree.remove(node, i, &mut census), "element {i} is held");
    }
    assert!(tree.remove(big, 99, &mut census), "large element is held");
    let shrank = tree.balance(&mut census);
    println!(
        "after removing {} elements: {} nodes, root shrank: {shrank}",
        census.removed,
        tree.len()
    );
    assert!(tree.is_empty());
}

fn depth(tree: &Octree<u32>, mut node: NodeId) -> usize {
    let mut d = 0;
    while let Some(parent) = tree.parent(node) {
        node = parent;
        d += 1;
    }
    d
}
