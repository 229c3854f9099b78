// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tile-level drivers: move coefficients between tile planes and code-blocks.

use alloc::vec::Vec;

use crate::error::Tier1Error;
use crate::luts::NMSEDEC_FRACBITS;
use crate::norms::{DistortionWeights, fix_mul};
use crate::t1::Tier1;
use crate::tile::{
    Band, CodeBlockDec, CodeBlockEnc, CodeBlockStyle, ComponentParams, Resolution, Tile,
    TileCodingParams, TileComponent,
};

/// Where a code-block's samples sit in its component plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Placement {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

/// Locate a code-block inside a `tile_w x tile_h` component plane.
///
/// High-pass bands sit to the right of (HL, HH) and below (LH, HH) the
/// lower resolution, whose extent is `lower`.
fn locate<C>(
    bounds: (i32, i32, i32, i32),
    band: &Band<C>,
    lower: Option<(i32, i32)>,
    tile: (i32, i32),
) -> Result<Placement, Tier1Error> {
    let (x0, y0, x1, y1) = bounds;
    let mut x = x0 - band.x0;
    let mut y = y0 - band.y0;
    if band.bandno & 3 != 0 {
        let (lower_w, lower_h) = lower.ok_or(Tier1Error::MissingLowerResolution {
            bandno: band.bandno,
        })?;
        if band.bandno & 1 != 0 {
            x += lower_w;
        }
        if band.bandno & 2 != 0 {
            y += lower_h;
        }
    }
    let (width, height) = (x1 - x0, y1 - y0);
    let out_of_bounds = Tier1Error::CodeBlockOutOfBounds {
        x,
        y,
        width,
        height,
        tile_width: tile.0,
        tile_height: tile.1,
    };
    if x < 0 || y < 0 || width < 0 || height < 0 || x + width > tile.0 || y + height > tile.1 {
        return Err(out_of_bounds);
    }
    let to_usize = |v: i32| usize::try_from(v).map_err(|_| out_of_bounds);
    Ok(Placement {
        x: to_usize(x)?,
        y: to_usize(y)?,
        w: to_usize(width)?,
        h: to_usize(height)?,
    })
}

/// Extents of every resolution, so bands can be placed while the resolutions are mutably borrowed.
fn resolution_extents<C>(resolutions: &[Resolution<C>]) -> Vec<(i32, i32)> {
    resolutions.iter().map(|r| (r.width(), r.height())).collect()
}

fn plane_size<C>(tilec: &TileComponent<C>) -> (i32, i32, usize) {
    let (w, h) = (tilec.width(), tilec.height());
    let len = usize::try_from(w).unwrap_or(0) * usize::try_from(h).unwrap_or(0);
    (w, h, len)
}

/// How integer samples become block samples with fractional bits.
#[derive(Copy, Clone, Debug)]
enum Scaling {
    Reversible,
    /// Multiply by the fixed-point inverse of the step size.
    Irreversible(i32),
}

impl Scaling {
    fn for_band(qmfbid: u32, stepsize: f32) -> Result<Self, Tier1Error> {
        if qmfbid == 1 {
            return Ok(Self::Reversible);
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Saturating float to int conversion; out-of-range steps are rejected below."
        )]
        let step = (stepsize * 8192.0).floor() as i32;
        if step <= 0 {
            return Err(Tier1Error::InvalidStepSize { stepsize });
        }
        Ok(Self::Irreversible(8192 * 8192 / step))
    }

    #[inline]
    fn apply(self, v: i32) -> i32 {
        match self {
            Self::Reversible => v << NMSEDEC_FRACBITS,
            Self::Irreversible(inv) => fix_mul(v, inv) >> (11 - NMSEDEC_FRACBITS),
        }
    }
}

/// One code-block to encode and everything needed to do so.
#[derive(Debug)]
struct EncodeJob<'a> {
    cblk: &'a mut CodeBlockEnc,
    plane: &'a [i32],
    stride: usize,
    at: Placement,
    scaling: Scaling,
    weights: DistortionWeights,
    style: CodeBlockStyle,
}

impl EncodeJob<'_> {
    fn run(self, t1: &mut Tier1) -> Result<f64, Tier1Error> {
        let Self {
            cblk,
            plane,
            stride,
            at,
            scaling,
            weights,
            style,
        } = self;
        t1.load(at.w, at.h, |i, j| {
            scaling.apply(plane[(at.y + j) * stride + at.x + i])
        });
        t1.encode_cblk(cblk, &weights, style)
    }
}

/// Encode every code-block of `tile`, accumulating the tile distortion in
/// [`Tile::distotile`].
///
/// Coefficients are read from each component's integer plane: as integers
/// for the reversible path (`qmfbid == 1`), as fixed-point values divided by
/// the band step size otherwise.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "Tier1::encode_cblks"))]
pub fn encode_cblks(
    tile: &mut Tile<CodeBlockEnc>,
    tcp: &TileCodingParams,
) -> Result<(), Tier1Error> {
    if tile.comps.len() != tcp.tccps.len() {
        return Err(Tier1Error::ComponentCount {
            tile: tile.comps.len(),
            params: tcp.tccps.len(),
        });
    }
    tile.distotile = 0.0;
    let numcomps = tile.comps.len();

    let mut jobs = Vec::new();
    for (compno, (tilec, tccp)) in tile.comps.iter_mut().zip(&tcp.tccps).enumerate() {
        let (tile_w, tile_h, len) = plane_size(tilec);
        let numres = tilec.numresolutions.min(tilec.resolutions.len());
        let extents = resolution_extents(&tilec.resolutions);
        let TileComponent {
            data, resolutions, ..
        } = tilec;
        if data.len() < len {
            return Err(Tier1Error::CodeBlockOutOfBounds {
                x: 0,
                y: 0,
                width: tile_w,
                height: tile_h,
                tile_width: tile_w,
                tile_height: tile_h,
            });
        }
        let plane: &[i32] = data;
        let stride = usize::try_from(tile_w).unwrap_or(0);

        for (resno, res) in resolutions.iter_mut().take(numres).enumerate() {
            let lower = resno.checked_sub(1).map(|r| extents[r]);
            for band in &mut res.bands {
                let scaling = Scaling::for_band(tccp.qmfbid, band.stepsize)?;
                let weights = DistortionWeights {
                    compno,
                    level: numres - 1 - resno,
                    orient: band.bandno,
                    qmfbid: tccp.qmfbid,
                    stepsize: f64::from(band.stepsize),
                    numcomps,
                    mct: tcp.mct,
                };
                let placements = band
                    .precincts
                    .iter()
                    .flat_map(|prc| &prc.cblks)
                    .map(|c| locate((c.x0, c.y0, c.x1, c.y1), band, lower, (tile_w, tile_h)))
                    .collect::<Result<Vec<_>, _>>()?;
                let cblks = band.precincts.iter_mut().flat_map(|prc| &mut prc.cblks);
                for (cblk, at) in cblks.zip(placements) {
                    jobs.push(EncodeJob {
                        cblk,
                        plane,
                        stride,
                        at,
                        scaling,
                        weights,
                        style: tccp.cblksty,
                    });
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(blocks = jobs.len(), "encoding code-blocks");

    #[cfg(feature = "parallel")]
    let results: Vec<Result<f64, Tier1Error>> = {
        use rayon::prelude::*;
        jobs.into_par_iter()
            .map_init(Tier1::new, |t1, job| job.run(t1))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<f64, Tier1Error>> = {
        let mut t1 = Tier1::new();
        jobs.into_iter().map(|job| job.run(&mut t1)).collect()
    };

    // Summed in block order so the total does not depend on scheduling.
    for distortion in results {
        tile.distotile += distortion?;
    }
    Ok(())
}

/// One decoded code-block, ready to be written into the component plane.
#[derive(Debug)]
struct Decoded {
    at: Placement,
    samples: Vec<i32>,
    stepsize: f32,
}

fn decode_one(
    t1: &mut Tier1,
    cblk: &CodeBlockDec,
    orient: usize,
    at: Placement,
    stepsize: f32,
    tccp: &ComponentParams,
) -> Decoded {
    t1.decode_cblk(cblk, orient, tccp.roishift, tccp.cblksty);
    let mut samples = t1.samples().to_vec();
    if tccp.roishift > 0 {
        let thresh = 1_i32 << tccp.roishift.min(30);
        for v in &mut samples {
            let mag = v.abs();
            if mag >= thresh {
                let mag = mag >> tccp.roishift;
                *v = if *v < 0 { -mag } else { mag };
            }
        }
    }
    Decoded {
        at,
        samples,
        stepsize,
    }
}

/// Decode every code-block of `tilec` into its coefficient planes.
///
/// The reversible path writes integers into [`TileComponent::data`]; the
/// irreversible path writes dequantized values into
/// [`TileComponent::real_data`]. Planes are grown to the component size if
/// needed. Samples of blocks whose segments are missing keep whatever the
/// decoder could recover.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "Tier1::decode_cblks"))]
pub fn decode_cblks(
    tilec: &mut TileComponent<CodeBlockDec>,
    tccp: &ComponentParams,
) -> Result<(), Tier1Error> {
    let (tile_w, tile_h, len) = plane_size(tilec);
    let numres = tilec.numresolutions.min(tilec.resolutions.len());
    let extents = resolution_extents(&tilec.resolutions);

    let mut jobs = Vec::new();
    for (resno, res) in tilec.resolutions.iter().take(numres).enumerate() {
        let lower = resno.checked_sub(1).map(|r| extents[r]);
        for band in &res.bands {
            for cblk in band.precincts.iter().flat_map(|prc| &prc.cblks) {
                let at = locate(
                    (cblk.x0, cblk.y0, cblk.x1, cblk.y1),
                    band,
                    lower,
                    (tile_w, tile_h),
                )?;
                jobs.push((cblk, band.bandno, at, band.stepsize));
            }
        }
    }

    #[cfg(feature = "parallel")]
    let decoded: Vec<Decoded> = {
        use rayon::prelude::*;
        jobs.into_par_iter()
            .map_init(Tier1::new, |t1, (cblk, orient, at, stepsize)| {
                decode_one(t1, cblk, orient, at, stepsize, tccp)
            })
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let decoded: Vec<Decoded> = {
        let mut t1 = Tier1::new();
        jobs.into_iter()
            .map(|(cblk, orient, at, stepsize)| decode_one(&mut t1, cblk, orient, at, stepsize, tccp))
            .collect()
    };

    let stride = usize::try_from(tile_w).unwrap_or(0);
    if tccp.qmfbid == 1 {
        if tilec.data.len() < len {
            tilec.data.resize(len, 0);
        }
        for block in decoded {
            let at = block.at;
            for (j, row) in block.samples.chunks_exact(at.w.max(1)).enumerate().take(at.h) {
                let start = (at.y + j) * stride + at.x;
                for (dst, v) in tilec.data[start..start + at.w].iter_mut().zip(row) {
                    *dst = v / 2;
                }
            }
        }
    } else {
        if tilec.real_data.len() < len {
            tilec.real_data.resize(len, 0.0);
        }
        for block in decoded {
            let at = block.at;
            for (j, row) in block.samples.chunks_exact(at.w.max(1)).enumerate().take(at.h) {
                let start = (at.y + j) * stride + at.x;
                for (dst, v) in tilec.real_data[start..start + at.w].iter_mut().zip(row) {
                    *dst = *v as f32 * block.stepsize;
                }
            }
        }
    }
    Ok(())
}

impl TileComponent<CodeBlockDec> {
    /// Drop the code-stream bytes and segment lists of every code-block.
    pub fn release_code_blocks(&mut self) {
        for cblk in self
            .resolutions
            .iter_mut()
            .flat_map(|r| &mut r.bands)
            .flat_map(|b| &mut b.precincts)
            .flat_map(|p| &mut p.cblks)
        {
            cblk.data = Vec::new();
            cblk.segs = Vec::new();
        }
    }
}
