// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synthesis norms and the weighted distortion estimate built on them.

use crate::error::Tier1Error;

/// Colour-transform norms for the reversible transform, per component.
const MCT_NORMS: [f64; 3] = [1.732, 0.8292, 0.8292];
/// Colour-transform norms for the irreversible transform, per component.
const MCT_NORMS_REAL: [f64; 3] = [1.732, 1.805, 1.573];

/// 5/3 wavelet synthesis norms by orientation (LL, HL, LH, HH) and level.
const DWT_NORMS: [[f64; 10]; 4] = [
    [
        1.000, 1.500, 2.750, 5.375, 10.68, 21.34, 42.67, 85.33, 170.7, 341.3,
    ],
    [
        1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9, 0.0,
    ],
    [
        1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9, 0.0,
    ],
    [
        0.7186, 0.9218, 1.586, 3.043, 6.019, 12.01, 24.00, 48.00, 96.00, 0.0,
    ],
];

/// 9/7 wavelet synthesis norms by orientation and level.
const DWT_NORMS_REAL: [[f64; 10]; 4] = [
    [
        1.000, 1.965, 4.177, 8.403, 16.90, 33.84, 67.69, 135.3, 270.6, 540.9,
    ],
    [
        2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0, 0.0,
    ],
    [
        2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0, 0.0,
    ],
    [
        2.080, 3.865, 8.307, 17.18, 34.71, 69.59, 139.3, 278.6, 557.2, 0.0,
    ],
];

/// Deepest decomposition level the norm tables describe.
pub const MAX_LEVEL: usize = 9;

/// Synthesis norm of a subband.
///
/// High-pass bands have no entry at the deepest level and reuse the one above.
pub fn dwt_norm(level: usize, orient: usize, reversible: bool) -> Result<f64, Tier1Error> {
    if level > MAX_LEVEL {
        return Err(Tier1Error::LevelOutOfRange { level });
    }
    let level = if orient > 0 { level.min(MAX_LEVEL - 1) } else { level };
    let table = if reversible {
        &DWT_NORMS
    } else {
        &DWT_NORMS_REAL
    };
    Ok(table[orient.min(3)][level])
}

/// Inputs to [`wmsedec`] that are fixed for a whole code-block.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistortionWeights {
    /// Component index.
    pub compno: usize,
    /// Decomposition level of the band.
    pub level: usize,
    /// Band orientation (0 = LL, 1 = HL, 2 = LH, 3 = HH).
    pub orient: usize,
    /// Wavelet filter: 1 for reversible 5/3, 0 for irreversible 9/7.
    pub qmfbid: u32,
    /// Quantizer step size of the band.
    pub stepsize: f64,
    /// Components in the tile.
    pub numcomps: usize,
    /// Whether a multi-component transform is applied.
    pub mct: bool,
}

impl DistortionWeights {
    /// Per-bit-plane weight before squaring, without the plane factor.
    pub fn base(&self) -> Result<f64, Tier1Error> {
        let reversible = self.qmfbid == 1;
        let w1 = if self.mct && self.numcomps == 3 {
            let table = if reversible {
                &MCT_NORMS
            } else {
                &MCT_NORMS_REAL
            };
            table[self.compno.min(2)]
        } else {
            1.0
        };
        let w2 = dwt_norm(self.level, self.orient, reversible)?;
        Ok(w1 * w2 * self.stepsize)
    }
}

/// Weighted MSE reduction for `nmsedec` accumulated at bit-plane `bpno`.
///
/// `base` comes from [`DistortionWeights::base`].
#[inline]
pub fn wmsedec(nmsedec: i32, base: f64, bpno: i32) -> f64 {
    let w = base * f64::from(1_i32 << bpno.clamp(0, 30));
    w * w * f64::from(nmsedec) / 8192.0
}

/// Fixed-point multiply with 13 fractional bits, rounding half up.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Products of coefficients and inverse step sizes fit back in 32 bits."
)]
#[inline]
pub fn fix_mul(a: i32, b: i32) -> i32 {
    let mut t = i64::from(a) * i64::from(b);
    t += t & 4096;
    (t >> 13) as i32
}

/// `floor(log2(a))` for `a > 0`.
#[inline]
pub fn floorlog2(a: u32) -> i32 {
    debug_assert!(a > 0, "floorlog2 of zero");
    31 - a.leading_zeros().min(31) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepest_highpass_level_is_clamped() {
        assert_eq!(dwt_norm(9, 1, true), dwt_norm(8, 1, true));
        assert_eq!(dwt_norm(9, 0, false), Ok(540.9));
        assert_eq!(dwt_norm(0, 3, true), Ok(0.7186));
        assert_eq!(
            dwt_norm(10, 0, true),
            Err(Tier1Error::LevelOutOfRange { level: 10 })
        );
    }

    #[test]
    fn colour_weights_need_three_components() {
        let mut w = DistortionWeights {
            compno: 1,
            level: 0,
            orient: 0,
            qmfbid: 1,
            stepsize: 1.0,
            numcomps: 3,
            mct: true,
        };
        assert_eq!(w.base(), Ok(0.8292));
        w.numcomps = 4;
        assert_eq!(w.base(), Ok(1.0));
        w.numcomps = 3;
        w.qmfbid = 0;
        assert_eq!(w.base(), Ok(1.805));
    }

    #[test]
    fn weighted_distortion_scales_with_plane() {
        assert_eq!(wmsedec(8192, 1.0, 0), 1.0);
        assert_eq!(wmsedec(8192, 1.0, 2), 16.0);
        assert_eq!(wmsedec(4096, 2.0, 1), 8.0);
    }

    #[test]
    fn fixed_point_helpers() {
        assert_eq!(fix_mul(3, 8192), 3);
        assert_eq!(fix_mul(-8192, 8192), -8192);
        // 1 * 4096 / 8192 = 0.5 rounds up.
        assert_eq!(fix_mul(1, 4096), 1);
        assert_eq!(floorlog2(1), 0);
        assert_eq!(floorlog2(64), 6);
        assert_eq!(floorlog2(127), 6);
    }
}
