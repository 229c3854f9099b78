// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tile, band and code-block records consumed and produced by the coder.
//!
//! The structure mirrors the tile-component decomposition: a tile holds
//! components, a component holds resolutions, a resolution holds bands, a
//! band holds precincts, and a precinct holds code-blocks. The records are
//! generic over the code-block type so encoder and decoder tiles share them.

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// Code-block coding style switches (`SPcod` / `SPcoc` in the COD marker).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CodeBlockStyle: u32 {
        /// Selective arithmetic coding bypass: lower significance and refinement passes are raw.
        const LAZY = 0x01;
        /// Reset context probabilities after every pass.
        const RESET = 0x02;
        /// Terminate the coder after every pass.
        const TERMALL = 0x04;
        /// Vertically causal context formation.
        const VSC = 0x08;
        /// Predictable termination.
        const PTERM = 0x10;
        /// Segmentation symbol after every cleanup pass.
        const SEGSYM = 0x20;
    }
}

/// Rate and distortion of one coding pass.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Pass {
    /// Bytes of code-stream needed to decode up to and including this pass.
    pub rate: usize,
    /// Cumulative weighted MSE decrease up to and including this pass.
    pub distortiondec: f64,
    /// Bytes contributed by this pass alone.
    pub len: usize,
    /// The coder was terminated at the end of this pass.
    pub term: bool,
}

/// A run of passes decoded from one contiguous byte range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    /// Start of the segment in the code-block data, or `None` when it was lost.
    pub offset: Option<usize>,
    /// Length in bytes.
    pub len: usize,
    /// Passes coded in the segment.
    pub numpasses: usize,
}

/// A code-block as produced by the encoder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeBlockEnc {
    /// Left edge in band coordinates.
    pub x0: i32,
    /// Top edge in band coordinates.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Code-stream bytes for all passes.
    pub data: Vec<u8>,
    /// Pass records in coding order.
    pub passes: Vec<Pass>,
    /// Number of magnitude bit-planes.
    pub numbps: i32,
    /// Number of passes coded.
    pub totalpasses: usize,
}

impl CodeBlockEnc {
    /// An empty block covering `[x0, x1) x [y0, y1)`.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            ..Self::default()
        }
    }

    /// Split the coded passes into decoder segments at every terminated pass.
    ///
    /// Segment lengths are taken from the rates of the terminating passes, which
    /// are exact byte boundaries.
    pub fn to_decoder(&self) -> CodeBlockDec {
        let mut segs = Vec::new();
        let mut start = 0;
        let mut numpasses = 0;
        for pass in &self.passes[..self.totalpasses.min(self.passes.len())] {
            numpasses += 1;
            if pass.term {
                let end = pass.rate.clamp(start, self.data.len());
                segs.push(Segment {
                    offset: Some(start),
                    len: end - start,
                    numpasses,
                });
                start = end;
                numpasses = 0;
            }
        }
        CodeBlockDec {
            x0: self.x0,
            y0: self.y0,
            x1: self.x1,
            y1: self.y1,
            data: self.data.clone(),
            segs,
            numbps: self.numbps,
        }
    }
}

/// A code-block as handed to the decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeBlockDec {
    /// Left edge in band coordinates.
    pub x0: i32,
    /// Top edge in band coordinates.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Concatenated segment bytes.
    pub data: Vec<u8>,
    /// Segments in coding order.
    pub segs: Vec<Segment>,
    /// Number of magnitude bit-planes, excluding any ROI shift.
    pub numbps: i32,
}

impl CodeBlockDec {
    /// An empty block covering `[x0, x1) x [y0, y1)`.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            ..Self::default()
        }
    }

    /// Bytes of segment `seg`, or `None` if it is missing or out of range.
    pub fn segment_data(&self, seg: &Segment) -> Option<&[u8]> {
        let offset = seg.offset?;
        self.data.get(offset..offset.checked_add(seg.len)?)
    }
}

/// Code-blocks of one precinct.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Precinct<C> {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Code-blocks across.
    pub cw: usize,
    /// Code-blocks down.
    pub ch: usize,
    /// Code-blocks in raster order.
    pub cblks: Vec<C>,
}

/// One subband of a resolution level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Band<C> {
    /// Band number: 0 = LL, 1 = HL, 2 = LH, 3 = HH. Doubles as the orientation.
    pub bandno: usize,
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Precincts of the band.
    pub precincts: Vec<Precinct<C>>,
    /// Nominal bit-planes of the band.
    pub numbps: i32,
    /// Quantizer step size.
    pub stepsize: f32,
}

/// One resolution level of a component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution<C> {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Precincts across.
    pub pw: usize,
    /// Precincts down.
    pub ph: usize,
    /// Bands: one at resolution 0, three above.
    pub bands: Vec<Band<C>>,
}

impl<C> Resolution<C> {
    /// Width of the resolution.
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// Height of the resolution.
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }
}

/// One component of a tile with its coefficient planes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileComponent<C> {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
    /// Number of resolution levels.
    pub numresolutions: usize,
    /// Resolutions, lowest first.
    pub resolutions: Vec<Resolution<C>>,
    /// Integer coefficients, row-major with stride `x1 - x0`.
    pub data: Vec<i32>,
    /// Dequantized coefficients written by the irreversible decoder.
    pub real_data: Vec<f32>,
}

impl<C> TileComponent<C> {
    /// Width of the component.
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// Height of the component.
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }
}

/// A tile: its components and the distortion accumulated while encoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tile<C> {
    /// Components.
    pub comps: Vec<TileComponent<C>>,
    /// Total weighted distortion decrease over every coded pass.
    pub distotile: f64,
}

/// Coding parameters of one component.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentParams {
    /// Code-block style switches.
    pub cblksty: CodeBlockStyle,
    /// Wavelet filter: 1 for reversible 5/3, 0 for irreversible 9/7.
    pub qmfbid: u32,
    /// Region-of-interest up-shift.
    pub roishift: i32,
}

/// Coding parameters of one tile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TileCodingParams {
    /// A multi-component transform was applied.
    pub mct: bool,
    /// Per-component parameters.
    pub tccps: Vec<ComponentParams>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn segments_split_at_terminated_passes() {
        let pass = |rate, term| Pass {
            rate,
            term,
            ..Pass::default()
        };
        let mut cblk = CodeBlockEnc::new(0, 0, 4, 4);
        cblk.data = vec![1, 2, 3, 4, 5, 6, 7];
        // A non-terminated estimate may overshoot the next boundary.
        cblk.passes = vec![pass(6, false), pass(3, true), pass(5, false), pass(7, true)];
        cblk.totalpasses = 4;
        let dec = cblk.to_decoder();
        assert_eq!(dec.segs.len(), 2);
        assert_eq!(dec.segs[0], Segment {
            offset: Some(0),
            len: 3,
            numpasses: 2
        });
        assert_eq!(dec.segment_data(&dec.segs[1]), Some(&[4_u8, 5, 6, 7][..]));
    }

    #[test]
    fn lost_or_truncated_segments_have_no_data() {
        let mut dec = CodeBlockDec::new(0, 0, 2, 2);
        dec.data = vec![9; 4];
        let lost = Segment {
            offset: None,
            len: 2,
            numpasses: 1,
        };
        let overrun = Segment {
            offset: Some(3),
            len: 2,
            numpasses: 1,
        };
        assert_eq!(dec.segment_data(&lost), None);
        assert_eq!(dec.segment_data(&overrun), None);
    }
}
