// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vertex buffers, draw batches and the geometry builder hooks.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::drawable::DrawableArena;
use crate::group::SpatialGroup;

/// How often a vertex buffer is expected to change.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten occasionally.
    Dynamic,
    /// Rewritten every frame.
    Stream,
}

/// A renderer-owned vertex and index buffer.
pub trait VertexBuffer: core::fmt::Debug {
    /// Usage the buffer was created with.
    fn usage(&self) -> BufferUsage;

    /// Allocate storage for `verts` vertices and `indices` indices.
    fn allocate_buffer(&mut self, verts: u32, indices: u32);

    /// Grow or shrink the storage, keeping the buffer object.
    fn resize_buffer(&mut self, verts: u32, indices: u32);

    /// Vertices the buffer holds.
    fn num_verts(&self) -> u32;

    /// Indices the buffer holds.
    fn num_indices(&self) -> u32;

    /// CPU copy of the index data, when the buffer keeps one.
    fn indices(&self) -> Option<&[u32]> {
        None
    }
}

/// Render pass key of a draw map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPass(pub u32);

impl RenderPass {
    /// Opaque geometry.
    pub const SIMPLE: Self = Self(0);
    /// Fullbright geometry.
    pub const FULLBRIGHT: Self = Self(1);
    /// Bump mapped geometry.
    pub const BUMP: Self = Self(2);
    /// Alpha blended geometry; groups holding it are depth sorted.
    pub const ALPHA: Self = Self(3);
}

/// One batched draw call out of a group's vertex buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawInfo {
    /// First vertex referenced.
    pub start: u32,
    /// Last vertex referenced.
    pub end: u32,
    /// Index count.
    pub count: u32,
    /// First index.
    pub offset: u32,
    /// Renderer texture handle.
    pub texture: Option<u32>,
    /// Drawn without lighting.
    pub fullbright: bool,
    /// Bump map code.
    pub bump: u8,
    /// Particle batch.
    pub particle: bool,
    /// Particle size.
    pub part_size: f32,
}

/// Ways a [`DrawInfo`] can disagree with its vertex buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DrawInfoError {
    /// The group has batches but no buffer.
    #[error("draw batch has no vertex buffer")]
    NoVertexBuffer,
    /// `start` is not below `end`.
    #[error("draw batch has invalid range {start}..{end}")]
    InvalidRange {
        /// First vertex.
        start: u32,
        /// Last vertex.
        end: u32,
    },
    /// `end` is past the last vertex.
    #[error("draw batch vertex {end} overruns a buffer of {verts} vertices")]
    VertexOverrun {
        /// Last vertex.
        end: u32,
        /// Vertices in the buffer.
        verts: u32,
    },
    /// `offset + count` is past the last index.
    #[error("draw batch indices end at {end}, past a buffer of {indices} indices")]
    IndexOverrun {
        /// One past the last index used.
        end: u64,
        /// Indices in the buffer.
        indices: u32,
    },
    /// An index points outside `start..=end`.
    #[error("draw batch index {index} is outside {start}..={end}")]
    IndexOutOfRange {
        /// Offending index value.
        index: u32,
        /// First vertex.
        start: u32,
        /// Last vertex.
        end: u32,
    },
}

impl DrawInfo {
    /// A batch over vertices `start..=end` drawing `count` indices from `offset`.
    pub fn new(start: u32, end: u32, count: u32, offset: u32) -> Self {
        Self {
            start,
            end,
            count,
            offset,
            ..Self::default()
        }
    }

    /// Check the batch against `buffer`.
    pub fn validate(&self, buffer: Option<&dyn VertexBuffer>) -> Result<(), DrawInfoError> {
        let Some(buffer) = buffer else {
            return Err(DrawInfoError::NoVertexBuffer);
        };
        if self.start >= self.end {
            return Err(DrawInfoError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.end >= buffer.num_verts() {
            return Err(DrawInfoError::VertexOverrun {
                end: self.end,
                verts: buffer.num_verts(),
            });
        }
        let index_end = u64::from(self.offset) + u64::from(self.count);
        if index_end > u64::from(buffer.num_indices()) {
            return Err(DrawInfoError::IndexOverrun {
                end: index_end,
                indices: buffer.num_indices(),
            });
        }
        if let Some(indices) = buffer.indices() {
            let first = self.offset as usize;
            let range = indices.get(first..first + self.count as usize).unwrap_or(&[]);
            if let Some(&index) = range.iter().find(|&&i| i < self.start || i > self.end) {
                return Err(DrawInfoError::IndexOutOfRange {
                    index,
                    start: self.start,
                    end: self.end,
                });
            }
        }
        Ok(())
    }
}

/// Draw batches of a group keyed by render pass.
pub type DrawMap = BTreeMap<RenderPass, Vec<DrawInfo>>;

/// Fills group vertex buffers from the drawables they hold.
///
/// A partition calls these hooks from
/// [`rebuild_geom`](crate::SpatialPartition::rebuild_geom).
pub trait GeometryBuilder {
    /// A new, unallocated buffer with `usage`.
    fn create_vertex_buffer(&mut self, usage: BufferUsage) -> Box<dyn VertexBuffer>;

    /// Vertices and indices needed for the drawables held by `group`.
    fn add_geometry_count(&mut self, group: &SpatialGroup, drawables: &DrawableArena) -> (u32, u32);

    /// Write geometry into `buffer` and return the draw batches referencing it.
    fn get_geometry(
        &mut self,
        group: &SpatialGroup,
        drawables: &DrawableArena,
        buffer: &mut dyn VertexBuffer,
    ) -> DrawMap;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[derive(Debug)]
    struct Buffer {
        verts: u32,
        indices: Vec<u32>,
    }

    impl VertexBuffer for Buffer {
        fn usage(&self) -> BufferUsage {
            BufferUsage::Static
        }
        fn allocate_buffer(&mut self, verts: u32, indices: u32) {
            self.verts = verts;
            self.indices = vec![0; indices as usize];
        }
        fn resize_buffer(&mut self, verts: u32, indices: u32) {
            self.allocate_buffer(verts, indices);
        }
        fn num_verts(&self) -> u32 {
            self.verts
        }
        fn num_indices(&self) -> u32 {
            u32::try_from(self.indices.len()).unwrap()
        }
        fn indices(&self) -> Option<&[u32]> {
            Some(&self.indices)
        }
    }

    #[test]
    fn draw_info_checks_ranges() {
        let buffer = Buffer {
            verts: 8,
            indices: vec![2, 3, 4, 2, 4, 5],
        };
        let buffer: &dyn VertexBuffer = &buffer;
        let ok = DrawInfo::new(2, 5, 6, 0);
        assert_eq!(ok.validate(Some(buffer)), Ok(()));
        assert_eq!(ok.validate(None), Err(DrawInfoError::NoVertexBuffer));
        assert!(matches!(
            DrawInfo::new(5, 5, 3, 0).validate(Some(buffer)),
            Err(DrawInfoError::InvalidRange { .. })
        ));
        assert!(matches!(
            DrawInfo::new(2, 8, 3, 0).validate(Some(buffer)),
            Err(DrawInfoError::VertexOverrun { .. })
        ));
        assert!(matches!(
            DrawInfo::new(2, 5, 6, 1).validate(Some(buffer)),
            Err(DrawInfoError::IndexOverrun { end: 7, .. })
        ));
        assert_eq!(
            DrawInfo::new(3, 5, 3, 0).validate(Some(buffer)),
            Err(DrawInfoError::IndexOutOfRange {
                index: 2,
                start: 3,
                end: 5
            })
        );
    }
}
