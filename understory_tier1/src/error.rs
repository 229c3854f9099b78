// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors raised by the tile-level drivers.

/// Malformed tile structure handed to [`encode_cblks`](crate::encode_cblks) or
/// [`decode_cblks`](crate::decode_cblks).
///
/// Damaged code-stream data is not an error: missing segments are skipped and
/// the affected coefficients keep their previous values.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum Tier1Error {
    /// A code-block reaches outside the coefficient plane of its component.
    #[error(
        "code-block at ({x}, {y}) of size {width}x{height} lies outside the {tile_width}x{tile_height} component"
    )]
    CodeBlockOutOfBounds {
        /// Tile-relative column of the block's first sample.
        x: i32,
        /// Tile-relative row of the block's first sample.
        y: i32,
        /// Block width.
        width: i32,
        /// Block height.
        height: i32,
        /// Component width.
        tile_width: i32,
        /// Component height.
        tile_height: i32,
    },
    /// A high-pass band at resolution 0, which has no lower resolution to offset from.
    #[error("band {bandno} at resolution 0 needs a lower resolution")]
    MissingLowerResolution {
        /// Offending band number.
        bandno: usize,
    },
    /// Decomposition level beyond the norm tables.
    #[error("decomposition level {level} exceeds the supported maximum of 9")]
    LevelOutOfRange {
        /// Requested level.
        level: usize,
    },
    /// The tile and its coding parameters disagree on the component count.
    #[error("tile has {tile} components but coding parameters describe {params}")]
    ComponentCount {
        /// Components in the tile.
        tile: usize,
        /// Components in the coding parameters.
        params: usize,
    },
    /// The irreversible path needs a quantizer step of at least 1/8192.
    #[error("quantizer step size {stepsize} is too small for the irreversible path")]
    InvalidStepSize {
        /// Offending step size.
        stepsize: f32,
    },
}
