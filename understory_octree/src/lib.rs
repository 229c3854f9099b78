// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_octree --heading-base-level=0

//! Understory Octree: a loose 3D octree with structural listeners.
//!
//! Understory Octree is the container underneath scene partitions.
//!
//! - Elements are small `Copy` handles inserted with a position and a bin radius.
//! - Each element is stored at the node whose half-size brackets its radius, so
//!   large objects live high in the tree and small ones near the leaves.
//! - The root grows on demand to cover far-away elements, and empty nodes are
//!   pruned bottom-up when their last element is removed.
//! - An [`OctreeListener`] observes every structural change (insertion, removal,
//!   child addition/removal, destruction), which is how higher layers keep
//!   per-node metadata in sync without owning the tree.
//!
//! Nodes are addressed by generational [`NodeId`]s; ids of freed nodes are
//! rejected even after their slot is reused, and [`NodeId::index`] is dense
//! enough to key side tables.
//!
//! # Example
//!
//! ```rust
//! use glam::DVec3;
//! use understory_octree::{NoopListener, Octree};
//!
//! let mut tree: Octree<u32> = Octree::default();
//! let mut listener = NoopListener;
//!
//! // Insert two elements; the root grows to reach the far one.
//! let near = tree.insert(1, DVec3::new(0.3, 0.3, 0.3), 0.3, &mut listener).unwrap();
//! let far = tree.insert(2, DVec3::new(90.0, 0.0, -4.0), 2.0, &mut listener).unwrap();
//! assert_ne!(near, far);
//! assert_eq!(tree.node_at(DVec3::new(0.3, 0.3, 0.3), 0.3), near);
//!
//! // Removing the last element of a node prunes it.
//! assert!(tree.remove(near, 1, &mut listener));
//! assert!(!tree.is_alive(near));
//! ```
//!
//! ## Placement rule
//!
//! A non-root node with half-size `s` bins radii in `(s, 2s]` (and tiny radii
//! once `s` itself is tiny). The root bins nothing. A node at capacity pushes
//! new elements into children; an element that is too large for the child
//! it lands in stays there anyway when that child's parent is full, even
//! if the child is at capacity itself.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod error;
mod listener;
mod octree;
mod types;

pub use error::InsertError;
pub use listener::{NoopListener, OctreeListener};
pub use octree::{DepthFirst, NodeId, Octree, OctreeConfig};
pub use types::{Aabb3, octant_of, push_center};
