// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by partition updates.

use understory_octree::InsertError;

use crate::drawable::DrawableId;

/// Reasons a drawable cannot be placed in or taken out of a partition.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SpatialError {
    /// The drawable id no longer refers to a live drawable.
    #[error("drawable {0:?} is not in the arena")]
    StaleDrawable(DrawableId),
    /// The drawable is not held by the partition it was removed from.
    #[error("drawable {0:?} is not held by this partition")]
    NotInPartition(DrawableId),
    /// The octree rejected the drawable's position or radius.
    #[error(transparent)]
    Insert(#[from] InsertError),
}
