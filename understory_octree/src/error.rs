// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by [`Octree::insert`](crate::Octree::insert).

/// Reasons an element cannot be placed in an octree.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum InsertError {
    /// The element's bin radius is larger than any node the tree will grow to hold it.
    #[error("element radius {radius} exceeds the octree limit of {limit}")]
    RadiusTooLarge {
        /// Radius of the rejected element.
        radius: f64,
        /// Configured maximum radius.
        limit: f64,
    },
    /// The element's position is too far from the origin.
    #[error("element lies {distance} from the origin, beyond the octree range of {limit}")]
    OutOfRange {
        /// Distance of the rejected position from the origin.
        distance: f64,
        /// Configured maximum distance.
        limit: f64,
    },
    /// Position or radius contained NaN or infinity.
    #[error("element position or radius is not finite")]
    NotFinite,
}
