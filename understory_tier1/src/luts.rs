// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Context labels and distortion tables, computed at compile time.
//!
//! The zero-coding, sign-coding and sign-prediction tables follow Annex D of
//! ITU-T T.800 (tables D.1 and D.3). The distortion tables hold the decrease
//! in squared error, scaled by 2^13, obtained by coding one more bit of a
//! coefficient whose remaining magnitude is given with 6 fractional bits.

use crate::flags::Flags;

/// First zero-coding context.
pub const CTXNO_ZC: usize = 0;
/// First sign-coding context.
pub const CTXNO_SC: usize = CTXNO_ZC + 9;
/// First magnitude-refinement context.
pub const CTXNO_MAG: usize = CTXNO_SC + 5;
/// Run-length aggregation context.
pub const CTXNO_AGG: usize = CTXNO_MAG + 3;
/// Uniform context.
pub const CTXNO_UNI: usize = CTXNO_AGG + 1;
/// Total number of contexts.
pub const NUM_CTXS: usize = CTXNO_UNI + 1;

/// Fractional bits carried by coefficients during encoding.
pub const NMSEDEC_FRACBITS: i32 = 6;
/// Index width of the distortion tables.
const NMSEDEC_BITS: u32 = 7;
const NMSEDEC_MASK: i32 = (1 << NMSEDEC_BITS) - 1;

const fn bit(f: u16, flag: Flags) -> u8 {
    (f & flag.bits() != 0) as u8
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const fn init_ctxno_zc(f: u16, orient: usize) -> u8 {
    let mut h = bit(f, Flags::SIG_W) + bit(f, Flags::SIG_E);
    let mut v = bit(f, Flags::SIG_N) + bit(f, Flags::SIG_S);
    let d = bit(f, Flags::SIG_NW) + bit(f, Flags::SIG_NE) + bit(f, Flags::SIG_SE)
        + bit(f, Flags::SIG_SW);

    let n = if orient == 3 {
        let hv = h + v;
        match d {
            0 => match hv {
                0 => 0,
                1 => 1,
                _ => 2,
            },
            1 => match hv {
                0 => 3,
                1 => 4,
                _ => 5,
            },
            2 => {
                if hv == 0 {
                    6
                } else {
                    7
                }
            }
            _ => 8,
        }
    } else {
        if orient == 2 {
            let t = h;
            h = v;
            v = t;
        }
        match h {
            0 => match v {
                0 => match d {
                    0 => 0,
                    1 => 1,
                    _ => 2,
                },
                1 => 3,
                _ => 4,
            },
            1 => {
                if v == 0 {
                    if d == 0 { 5 } else { 6 }
                } else {
                    7
                }
            }
            _ => 8,
        }
    };
    CTXNO_ZC as u8 + n
}

/// Horizontal and vertical sign contributions, each in `-1..=1`.
const fn sign_contributions(f: u16) -> (i8, i8) {
    const fn pair(f: u16, sig_a: Flags, sgn_a: Flags, sig_b: Flags, sgn_b: Flags) -> i8 {
        let a = f & (sig_a.bits() | sgn_a.bits());
        let b = f & (sig_b.bits() | sgn_b.bits());
        let pos = (a == sig_a.bits()) as i8 + (b == sig_b.bits()) as i8;
        let neg = (a == sig_a.bits() | sgn_a.bits()) as i8 + (b == sig_b.bits() | sgn_b.bits()) as i8;
        let pos = if pos > 1 { 1 } else { pos };
        let neg = if neg > 1 { 1 } else { neg };
        pos - neg
    }
    let hc = pair(f, Flags::SIG_E, Flags::SGN_E, Flags::SIG_W, Flags::SGN_W);
    let vc = pair(f, Flags::SIG_N, Flags::SGN_N, Flags::SIG_S, Flags::SGN_S);
    (hc, vc)
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const fn init_ctxno_sc(f: u16) -> u8 {
    let (mut hc, mut vc) = sign_contributions(f);
    if hc < 0 {
        hc = -hc;
        vc = -vc;
    }
    let n = if hc == 0 {
        if vc == 0 { 0 } else { 1 }
    } else {
        match vc {
            -1 => 2,
            0 => 3,
            _ => 4,
        }
    };
    CTXNO_SC as u8 + n
}

const fn init_spb(f: u16) -> u8 {
    let (hc, vc) = sign_contributions(f);
    if hc == 0 && vc == 0 {
        0
    } else {
        !(hc > 0 || (hc == 0 && vc > 0)) as u8
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const LUT_CTXNO_ZC: [u8; 1024] = {
    let mut lut = [0; 1024];
    let mut i = 0;
    while i < 1024 {
        lut[i] = init_ctxno_zc((i & 0xFF) as u16, i >> 8);
        i += 1;
    }
    lut
};

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const LUT_CTXNO_SC: [u8; 256] = {
    let mut lut = [0; 256];
    let mut i = 0;
    while i < 256 {
        lut[i] = init_ctxno_sc((i as u16) << 4);
        i += 1;
    }
    lut
};

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const LUT_SPB: [u8; 256] = {
    let mut lut = [0; 256];
    let mut i = 0;
    while i < 256 {
        lut[i] = init_spb((i as u16) << 4);
        i += 1;
    }
    lut
};

#[allow(
    clippy::cast_possible_truncation,
    reason = "Table indices and context numbers are small by construction."
)]
const fn max0(v: i32) -> i16 {
    if v < 0 { 0 } else { v as i16 }
}

/// `[sig, sig0, ref, ref0]`, each indexed by 7 bits of the coefficient.
const LUT_NMSEDEC: [[i16; 128]; 4] = {
    let mut lut = [[0; 128]; 4];
    let mut i = 0;
    while i < 128 {
        let n = i as i32;
        // Values are (floor(x * 64 + 0.5) / 64) * 8192 for the squared-error terms below.
        lut[0][i] = max0((3 * n - 144) * 128);
        lut[1][i] = max0((n * n + 32) / 64 * 128);
        let r = if n & 64 != 0 { n - 80 } else { 48 - n };
        lut[2][i] = max0(r * 128);
        lut[3][i] = max0(((n - 64) * (n - 64) + 32) / 64 * 128);
        i += 1;
    }
    lut
};

/// Zero-coding context of a sample whose neighbourhood is `f`, in a band of orientation `orient`.
#[inline]
pub fn ctxno_zc(f: Flags, orient: usize) -> usize {
    usize::from(LUT_CTXNO_ZC[(orient << 8) | usize::from(f.bits() & Flags::SIG_OTH.bits())])
}

#[inline]
fn sign_index(f: Flags) -> usize {
    usize::from((f.bits() & (Flags::SIG_PRIM.bits() | Flags::SGN.bits())) >> 4)
}

/// Sign-coding context.
#[inline]
pub fn ctxno_sc(f: Flags) -> usize {
    usize::from(LUT_CTXNO_SC[sign_index(f)])
}

/// Predicted sign bit (`true` for negative), XOR-ed with the coded sign.
#[inline]
pub fn spb(f: Flags) -> bool {
    LUT_SPB[sign_index(f)] != 0
}

/// Magnitude-refinement context: 16 after a first refinement, else 15 with a significant neighbour, else 14.
#[inline]
pub fn ctxno_mag(f: Flags) -> usize {
    if f.contains(Flags::REFINE) {
        CTXNO_MAG + 2
    } else if f.intersects(Flags::SIG_OTH) {
        CTXNO_MAG + 1
    } else {
        CTXNO_MAG
    }
}

/// Distortion decrease of a newly significant sample with magnitude `x` at bit `bitpos`.
#[inline]
pub fn nmsedec_sig(x: i32, bitpos: i32) -> i32 {
    nmsedec(x, bitpos, 0)
}

/// Distortion decrease of a refinement bit of magnitude `x` at bit `bitpos`.
#[inline]
pub fn nmsedec_ref(x: i32, bitpos: i32) -> i32 {
    nmsedec(x, bitpos, 2)
}

#[allow(
    clippy::cast_sign_loss,
    reason = "The index is masked to 7 bits before the cast."
)]
fn nmsedec(x: i32, bitpos: i32, table: usize) -> i32 {
    let (lut, idx) = if bitpos > NMSEDEC_FRACBITS {
        (&LUT_NMSEDEC[table], (x >> (bitpos - NMSEDEC_FRACBITS)) & NMSEDEC_MASK)
    } else {
        (&LUT_NMSEDEC[table + 1], x & NMSEDEC_MASK)
    };
    i32::from(lut[idx as usize])
}
