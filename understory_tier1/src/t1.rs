// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bit-plane coding of a single code-block.

use alloc::vec::Vec;

use crate::error::Tier1Error;
use crate::flags::{FlagGrid, Flags};
use crate::luts::{
    CTXNO_AGG, CTXNO_UNI, NMSEDEC_FRACBITS, ctxno_mag, ctxno_sc, ctxno_zc, nmsedec_ref,
    nmsedec_sig, spb,
};
use crate::mqc::{MqDecoder, MqEncoder};
use crate::norms::{DistortionWeights, floorlog2, wmsedec};
use crate::raw::RawDecoder;
use crate::tile::{CodeBlockDec, CodeBlockEnc, CodeBlockStyle, Pass};

/// How the bits of a pass reach the code-stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Coding {
    /// Arithmetic coded.
    Mq,
    /// Packed raw (lazy mode).
    Raw,
}

/// Pass kinds in coding order within a bit-plane.
const SIGNIFICANCE: u8 = 0;
const REFINEMENT: u8 = 1;
const CLEANUP: u8 = 2;

/// Samples of the block being coded and their state words.
#[derive(Clone, Debug, Default)]
struct Block {
    w: usize,
    h: usize,
    data: Vec<i32>,
    flags: FlagGrid,
}

/// Iterate stripe-major: four-row stripes, columns within a stripe, rows within a column.
///
/// Calls `visit(i, j, vsc)` where `vsc` is set for the row whose south
/// neighbours are hidden in vertically causal mode.
#[inline]
fn for_each_in_stripes(w: usize, h: usize, vsc_mode: bool, mut visit: impl FnMut(usize, usize, bool)) {
    for k in (0..h).step_by(4) {
        for i in 0..w {
            for j in k..(k + 4).min(h) {
                visit(i, j, vsc_mode && (j == k + 3 || j == h - 1));
            }
        }
    }
}

impl Block {
    fn allocate(&mut self, w: usize, h: usize) {
        self.w = w;
        self.h = h;
        self.data.clear();
        self.data.resize(w * h, 0);
        self.flags.reset(w, h);
    }

    /// Whether the four-sample column at `(i, k..k + 4)` can be run-length coded.
    fn aggregates(&self, i: usize, k: usize, vsc_mode: bool) -> bool {
        if k + 3 >= self.h {
            return false;
        }
        let busy = Flags::SIG | Flags::VISIT | Flags::SIG_OTH;
        let f = |j: usize| self.flags.get(self.flags.index(i, j));
        !(f(k).intersects(busy)
            || f(k + 1).intersects(busy)
            || f(k + 2).intersects(busy)
            || f(k + 3).causal(vsc_mode).intersects(busy))
    }

    fn enc_sigpass(
        &mut self,
        enc: &mut MqEncoder,
        bpno: i32,
        orient: usize,
        coding: Coding,
        style: CodeBlockStyle,
    ) -> i32 {
        let one = 1 << (bpno + NMSEDEC_FRACBITS);
        let mut nmsedec = 0;
        let (w, h) = (self.w, self.h);
        let Self { data, flags, .. } = self;
        for_each_in_stripes(w, h, style.contains(CodeBlockStyle::VSC), |i, j, vsc| {
            let fi = flags.index(i, j);
            let flag = flags.get(fi).causal(vsc);
            if !flag.intersects(Flags::SIG_OTH) || flag.intersects(Flags::SIG | Flags::VISIT) {
                return;
            }
            let d = data[j * w + i];
            let v = d.abs() & one != 0;
            enc.set_context(ctxno_zc(flag, orient));
            match coding {
                Coding::Raw => enc.bypass_encode(v),
                Coding::Mq => enc.encode(v),
            }
            if v {
                let negative = d < 0;
                nmsedec += nmsedec_sig(d.abs(), bpno + NMSEDEC_FRACBITS);
                enc.set_context(ctxno_sc(flag));
                match coding {
                    Coding::Raw => enc.bypass_encode(negative),
                    Coding::Mq => enc.encode(negative ^ spb(flag)),
                }
                flags.update(fi, negative);
            }
            flags.insert(fi, Flags::VISIT);
        });
        nmsedec
    }

    fn enc_refpass(
        &mut self,
        enc: &mut MqEncoder,
        bpno: i32,
        coding: Coding,
        style: CodeBlockStyle,
    ) -> i32 {
        let one = 1 << (bpno + NMSEDEC_FRACBITS);
        let mut nmsedec = 0;
        let (w, h) = (self.w, self.h);
        let Self { data, flags, .. } = self;
        for_each_in_stripes(w, h, style.contains(CodeBlockStyle::VSC), |i, j, vsc| {
            let fi = flags.index(i, j);
            let flag = flags.get(fi).causal(vsc);
            if flag.intersection(Flags::SIG | Flags::VISIT) != Flags::SIG {
                return;
            }
            let d = data[j * w + i].abs();
            nmsedec += nmsedec_ref(d, bpno + NMSEDEC_FRACBITS);
            let v = d & one != 0;
            enc.set_context(ctxno_mag(flag));
            match coding {
                Coding::Raw => enc.bypass_encode(v),
                Coding::Mq => enc.encode(v),
            }
            flags.insert(fi, Flags::REFINE);
        });
        nmsedec
    }

    fn enc_clnpass(
        &mut self,
        enc: &mut MqEncoder,
        bpno: i32,
        orient: usize,
        style: CodeBlockStyle,
    ) -> i32 {
        let one = 1 << (bpno + NMSEDEC_FRACBITS);
        let vsc_mode = style.contains(CodeBlockStyle::VSC);
        let mut nmsedec = 0;
        for k in (0..self.h).step_by(4) {
            for i in 0..self.w {
                let agg = self.aggregates(i, k, vsc_mode);
                let mut runlen = 0;
                if agg {
                    while runlen < 4 && self.data[(k + runlen) * self.w + i].abs() & one == 0 {
                        runlen += 1;
                    }
                    enc.set_context(CTXNO_AGG);
                    enc.encode(runlen != 4);
                    if runlen == 4 {
                        continue;
                    }
                    enc.set_context(CTXNO_UNI);
                    enc.encode(runlen >> 1 != 0);
                    enc.encode(runlen & 1 != 0);
                }
                for j in k + runlen..(k + 4).min(self.h) {
                    let vsc = vsc_mode && (j == k + 3 || j == self.h - 1);
                    let partial = agg && j == k + runlen;
                    nmsedec += self.enc_clnpass_step(enc, i, j, bpno, one, orient, partial, vsc);
                }
            }
        }
        nmsedec
    }

    fn enc_clnpass_step(
        &mut self,
        enc: &mut MqEncoder,
        i: usize,
        j: usize,
        bpno: i32,
        one: i32,
        orient: usize,
        partial: bool,
        vsc: bool,
    ) -> i32 {
        let fi = self.flags.index(i, j);
        let raw_flag = self.flags.get(fi);
        let flag = raw_flag.causal(vsc);
        let d = self.data[j * self.w + i];
        let mut nmsedec = 0;
        let significant = if partial {
            // The run-length code already told the decoder this sample is significant.
            true
        } else if !raw_flag.intersects(Flags::SIG | Flags::VISIT) {
            let v = d.abs() & one != 0;
            enc.set_context(ctxno_zc(flag, orient));
            enc.encode(v);
            v
        } else {
            false
        };
        if significant {
            let negative = d < 0;
            nmsedec += nmsedec_sig(d.abs(), bpno + NMSEDEC_FRACBITS);
            enc.set_context(ctxno_sc(flag));
            enc.encode(negative ^ spb(flag));
            self.flags.update(fi, negative);
        }
        self.flags.remove(fi, Flags::VISIT);
        nmsedec
    }

    fn dec_sigpass(
        &mut self,
        dec: &mut MqDecoder,
        raw: &mut RawDecoder,
        bpno: i32,
        orient: usize,
        coding: Coding,
        style: CodeBlockStyle,
    ) {
        let one = 1 << bpno;
        let oneplushalf = one | (one >> 1);
        let (w, h) = (self.w, self.h);
        let Self { data, flags, .. } = self;
        for_each_in_stripes(w, h, style.contains(CodeBlockStyle::VSC), |i, j, vsc| {
            let fi = flags.index(i, j);
            let flag = flags.get(fi).causal(vsc);
            if !flag.intersects(Flags::SIG_OTH) || flag.intersects(Flags::SIG | Flags::VISIT) {
                return;
            }
            let sign = match coding {
                Coding::Raw => raw.decode().then(|| raw.decode()),
                Coding::Mq => {
                    dec.set_context(ctxno_zc(flag, orient));
                    dec.decode().then(|| {
                        dec.set_context(ctxno_sc(flag));
                        dec.decode() ^ spb(flag)
                    })
                }
            };
            if let Some(negative) = sign {
                data[j * w + i] = if negative { -oneplushalf } else { oneplushalf };
                flags.update(fi, negative);
            }
            flags.insert(fi, Flags::VISIT);
        });
    }

    fn dec_refpass(
        &mut self,
        dec: &mut MqDecoder,
        raw: &mut RawDecoder,
        bpno: i32,
        coding: Coding,
        style: CodeBlockStyle,
    ) {
        let one = 1 << bpno;
        let poshalf = one >> 1;
        let neghalf = if bpno > 0 { -poshalf } else { -1 };
        let (w, h) = (self.w, self.h);
        let Self { data, flags, .. } = self;
        for_each_in_stripes(w, h, style.contains(CodeBlockStyle::VSC), |i, j, vsc| {
            let fi = flags.index(i, j);
            let flag = flags.get(fi).causal(vsc);
            if flag.intersection(Flags::SIG | Flags::VISIT) != Flags::SIG {
                return;
            }
            let v = match coding {
                Coding::Raw => raw.decode(),
                Coding::Mq => {
                    dec.set_context(ctxno_mag(flag));
                    dec.decode()
                }
            };
            let t = if v { poshalf } else { neghalf };
            let d = &mut data[j * w + i];
            *d += if *d < 0 { -t } else { t };
            flags.insert(fi, Flags::REFINE);
        });
    }

    fn dec_clnpass(&mut self, dec: &mut MqDecoder, bpno: i32, orient: usize, style: CodeBlockStyle) {
        let one = 1 << bpno;
        let oneplushalf = one | (one >> 1);
        let vsc_mode = style.contains(CodeBlockStyle::VSC);
        for k in (0..self.h).step_by(4) {
            for i in 0..self.w {
                let agg = self.aggregates(i, k, vsc_mode);
                let mut runlen = 0;
                if agg {
                    dec.set_context(CTXNO_AGG);
                    if !dec.decode() {
                        continue;
                    }
                    dec.set_context(CTXNO_UNI);
                    runlen = usize::from(dec.decode()) << 1;
                    runlen |= usize::from(dec.decode());
                }
                for j in k + runlen..(k + 4).min(self.h) {
                    let vsc = vsc_mode && (j == k + 3 || j == self.h - 1);
                    let partial = agg && j == k + runlen;
                    let fi = self.flags.index(i, j);
                    let raw_flag = self.flags.get(fi);
                    let flag = raw_flag.causal(vsc);
                    let significant = partial
                        || (!raw_flag.intersects(Flags::SIG | Flags::VISIT) && {
                            dec.set_context(ctxno_zc(flag, orient));
                            dec.decode()
                        });
                    if significant {
                        dec.set_context(ctxno_sc(flag));
                        let negative = dec.decode() ^ spb(flag);
                        self.data[j * self.w + i] = if negative { -oneplushalf } else { oneplushalf };
                        self.flags.update(fi, negative);
                    }
                    self.flags.remove(fi, Flags::VISIT);
                }
            }
        }
        if style.contains(CodeBlockStyle::SEGSYM) {
            dec.set_context(CTXNO_UNI);
            let mut symbol = 0_u8;
            for _ in 0..4 {
                symbol = (symbol << 1) | u8::from(dec.decode());
            }
            #[cfg(feature = "tracing")]
            if symbol != 0xA {
                tracing::warn!(symbol, "bad segmentation symbol");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = symbol;
        }
    }
}

/// Reusable tier-1 coder state: the block buffers and both entropy coders.
///
/// One instance codes one block at a time; keep one per thread and reuse it
/// across blocks to avoid reallocating.
#[derive(Clone, Debug, Default)]
pub struct Tier1 {
    block: Block,
    enc: MqEncoder,
    dec: MqDecoder,
    raw: RawDecoder,
}

impl Tier1 {
    /// Fresh coder with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Width of the current block.
    pub fn width(&self) -> usize {
        self.block.w
    }

    /// Height of the current block.
    pub fn height(&self) -> usize {
        self.block.h
    }

    /// Samples of the current block, row-major.
    ///
    /// After [`decode_cblk`](Self::decode_cblk) these are the reconstructed
    /// coefficients at twice their nominal scale.
    pub fn samples(&self) -> &[i32] {
        &self.block.data
    }

    /// Load a `w x h` block to encode, taking each sample from `sample(x, y)`.
    ///
    /// Samples carry [`NMSEDEC_FRACBITS`] fractional bits.
    pub fn load(&mut self, w: usize, h: usize, mut sample: impl FnMut(usize, usize) -> i32) {
        self.block.allocate(w, h);
        for y in 0..h {
            for x in 0..w {
                self.block.data[y * w + x] = sample(x, y);
            }
        }
    }

    /// Encode the loaded block into `cblk`, returning the distortion decrease of all passes.
    ///
    /// Every pass gets a record in `cblk.passes`. The last pass is always
    /// terminated, so [`CodeBlockEnc::to_decoder`] yields segments that cover
    /// the whole code-stream.
    pub fn encode_cblk(
        &mut self,
        cblk: &mut CodeBlockEnc,
        weights: &DistortionWeights,
        style: CodeBlockStyle,
    ) -> Result<f64, Tier1Error> {
        let base = weights.base()?;
        let orient = weights.orient;
        let Self { block, enc, .. } = self;
        debug_assert!(block.flags.border_is_clean(), "stale ghost border");

        let max = block.data.iter().map(|d| d.unsigned_abs()).max().unwrap_or(0);
        cblk.numbps = if max > 0 {
            (floorlog2(max) + 1 - NMSEDEC_FRACBITS).max(0)
        } else {
            0
        };
        let numbps = cblk.numbps;

        let mut bpno = numbps - 1;
        let mut passtype = CLEANUP;
        enc.reset_contexts();
        enc.init();
        cblk.passes.clear();

        let mut cumwmsedec = 0.0;
        let mut distotile = 0.0;
        let mut prev_term = false;
        while bpno >= 0 {
            let coding = pass_coding(bpno < numbps - 4, passtype, style);
            if prev_term {
                match coding {
                    Coding::Raw => enc.bypass_init(),
                    Coding::Mq => enc.restart_init(),
                }
            }

            let nmsedec = match passtype {
                SIGNIFICANCE => block.enc_sigpass(enc, bpno, orient, coding, style),
                REFINEMENT => block.enc_refpass(enc, bpno, coding, style),
                _ => {
                    let n = block.enc_clnpass(enc, bpno, orient, style);
                    if style.contains(CodeBlockStyle::SEGSYM) {
                        enc.segmark();
                    }
                    n
                }
            };
            let tempwmsedec = wmsedec(nmsedec, base, bpno);
            cumwmsedec += tempwmsedec;
            distotile += tempwmsedec;

            let lazy = style.contains(CodeBlockStyle::LAZY)
                && ((bpno < numbps - 4 && passtype > SIGNIFICANCE)
                    || (bpno == numbps - 4 && passtype == CLEANUP));
            let term = (style.contains(CodeBlockStyle::TERMALL)
                && !(passtype == CLEANUP && bpno == 0))
                || lazy;
            if term {
                terminate(enc, coding, style);
            }
            cblk.passes.push(Pass {
                rate: if term { enc.numbytes() } else { enc.numbytes() + 3 },
                distortiondec: cumwmsedec,
                len: 0,
                term,
            });

            passtype += 1;
            if passtype == 3 {
                passtype = SIGNIFICANCE;
                bpno -= 1;
            }
            if style.contains(CodeBlockStyle::RESET) {
                enc.reset_contexts();
            }
            prev_term = term;
        }

        // The final pass is always a cleanup pass, hence arithmetic coded.
        if let Some(pass) = cblk.passes.last_mut() {
            if !pass.term {
                terminate(enc, Coding::Mq, style);
                pass.term = true;
                pass.rate = enc.numbytes();
            }
        }

        cblk.data.clear();
        cblk.data.extend_from_slice(enc.data());
        cblk.totalpasses = cblk.passes.len();
        finish_rates(&mut cblk.passes, &cblk.data);

        Ok(distotile)
    }

    /// Decode `cblk` into the block buffers, readable through [`samples`](Self::samples).
    ///
    /// Missing segments are skipped; their passes leave samples untouched.
    pub fn decode_cblk(
        &mut self,
        cblk: &CodeBlockDec,
        orient: usize,
        roishift: i32,
        style: CodeBlockStyle,
    ) {
        let w = usize::try_from(cblk.x1 - cblk.x0).unwrap_or(0);
        let h = usize::try_from(cblk.y1 - cblk.y0).unwrap_or(0);
        let Self {
            block, dec, raw, ..
        } = self;
        block.allocate(w, h);

        let numbps = cblk.numbps;
        let mut bpno = roishift + numbps - 1;
        let mut passtype = CLEANUP;
        dec.contexts_mut().reset();

        for seg in &cblk.segs {
            let coding = pass_coding(bpno <= numbps - 1 - 4, passtype, style);
            match cblk.segment_data(seg) {
                Some(bytes) => match coding {
                    Coding::Raw => raw.init(bytes),
                    Coding::Mq => dec.init(bytes),
                },
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        offset = ?seg.offset,
                        len = seg.len,
                        "skipping missing code-block segment"
                    );
                    for _ in 0..seg.numpasses {
                        advance(&mut bpno, &mut passtype);
                    }
                    continue;
                }
            }

            for _ in 0..seg.numpasses {
                if bpno < 0 {
                    break;
                }
                match passtype {
                    SIGNIFICANCE => block.dec_sigpass(dec, raw, bpno + 1, orient, coding, style),
                    REFINEMENT => block.dec_refpass(dec, raw, bpno + 1, coding, style),
                    _ => block.dec_clnpass(dec, bpno + 1, orient, style),
                }
                if style.contains(CodeBlockStyle::RESET) && coding == Coding::Mq {
                    dec.contexts_mut().reset();
                }
                advance(&mut bpno, &mut passtype);
            }
        }
    }
}

/// Coding of a pass: raw only for lazy significance and refinement passes below the top planes.
fn pass_coding(below_top_planes: bool, passtype: u8, style: CodeBlockStyle) -> Coding {
    if below_top_planes && passtype < CLEANUP && style.contains(CodeBlockStyle::LAZY) {
        Coding::Raw
    } else {
        Coding::Mq
    }
}

fn advance(bpno: &mut i32, passtype: &mut u8) {
    *passtype += 1;
    if *passtype == 3 {
        *passtype = SIGNIFICANCE;
        *bpno -= 1;
    }
}

fn terminate(enc: &mut MqEncoder, coding: Coding, style: CodeBlockStyle) {
    match coding {
        Coding::Raw => enc.bypass_flush(),
        Coding::Mq if style.contains(CodeBlockStyle::PTERM) => enc.erterm(),
        Coding::Mq => enc.flush(),
    }
}

/// Clamp pass rates to the code-stream, step back off a trailing `0xFF` and fill in pass lengths.
///
/// Terminated rates are exact byte counts since termination leaves the
/// coder past its last byte. A one-byte pass keeps its byte.
fn finish_rates(passes: &mut [Pass], data: &[u8]) {
    let mut prev = 0;
    for pass in passes {
        pass.rate = pass.rate.min(data.len());
        if pass.rate > 1 && data[pass.rate - 1] == 0xFF {
            pass.rate -= 1;
        }
        pass.len = pass.rate.saturating_sub(prev);
        prev = pass.rate;
    }
}
