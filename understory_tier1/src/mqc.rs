// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MQ arithmetic coder (ITU-T T.800 Annex C) with the raw bypass used by lazy coding.

use alloc::vec::Vec;

use crate::luts::{CTXNO_AGG, CTXNO_UNI, CTXNO_ZC, NUM_CTXS};

/// Probability estimation table: `(Qe, next state after MPS, next state after LPS, switch MPS)`.
const QE_TABLE: [(u16, u8, u8, bool); 47] = [
    (0x5601, 1, 1, true),
    (0x3401, 2, 6, false),
    (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false),
    (0x0521, 5, 29, false),
    (0x0221, 38, 33, false),
    (0x5601, 7, 6, true),
    (0x5401, 8, 14, false),
    (0x4801, 9, 14, false),
    (0x3801, 10, 14, false),
    (0x3001, 11, 17, false),
    (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false),
    (0x1601, 29, 21, false),
    (0x5601, 15, 14, true),
    (0x5401, 16, 14, false),
    (0x5101, 17, 15, false),
    (0x4801, 18, 16, false),
    (0x3801, 19, 17, false),
    (0x3401, 20, 18, false),
    (0x3001, 21, 19, false),
    (0x2801, 22, 19, false),
    (0x2401, 23, 20, false),
    (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false),
    (0x1801, 26, 23, false),
    (0x1601, 27, 24, false),
    (0x1401, 28, 25, false),
    (0x1201, 29, 26, false),
    (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false),
    (0x09C1, 32, 29, false),
    (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false),
    (0x0441, 35, 32, false),
    (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false),
    (0x0141, 38, 35, false),
    (0x0111, 39, 36, false),
    (0x0085, 40, 37, false),
    (0x0049, 41, 38, false),
    (0x0025, 42, 39, false),
    (0x0015, 43, 40, false),
    (0x0009, 44, 41, false),
    (0x0005, 45, 42, false),
    (0x0001, 45, 43, false),
    (0x5601, 46, 46, false),
];

/// One entry of the expanded state machine: a table row paired with an MPS value.
#[derive(Copy, Clone, Debug)]
struct State {
    qeval: u32,
    mps: bool,
    nmps: u8,
    nlps: u8,
}

/// Entry `2 * row + mps` of the expanded table.
#[allow(
    clippy::cast_possible_truncation,
    reason = "State indices are below 94."
)]
const STATES: [State; 94] = {
    let mut states = [State {
        qeval: 0,
        mps: false,
        nmps: 0,
        nlps: 0,
    }; 94];
    let mut row = 0;
    while row < 47 {
        let (qe, nmps, nlps, switch) = QE_TABLE[row];
        let mut mps = 0;
        while mps < 2 {
            let lps_mps = if switch { mps ^ 1 } else { mps };
            states[2 * row + mps] = State {
                qeval: qe as u32,
                mps: mps == 1,
                nmps: (2 * nmps as usize + mps) as u8,
                nlps: (2 * nlps as usize + lps_mps) as u8,
            };
            mps += 1;
        }
        row += 1;
    }
    states
};

/// Adaptive state of every coding context, plus the current context.
#[derive(Clone, Debug)]
pub struct Contexts {
    states: [u8; NUM_CTXS],
    cur: usize,
}

impl Default for Contexts {
    fn default() -> Self {
        let mut ctx = Self {
            states: [0; NUM_CTXS],
            cur: 0,
        };
        ctx.reset();
        ctx
    }
}

impl Contexts {
    /// Return every context to its initial state.
    ///
    /// All contexts start at state 0 except the uniform (46), run-length (3)
    /// and first zero-coding (4) contexts.
    pub fn reset(&mut self) {
        self.states = [0; NUM_CTXS];
        self.set(CTXNO_UNI, false, 46);
        self.set(CTXNO_AGG, false, 3);
        self.set(CTXNO_ZC, false, 4);
    }

    /// Put context `ctxno` in table row `row` with the given MPS.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "State indices are below 94."
    )]
    pub fn set(&mut self, ctxno: usize, mps: bool, row: usize) {
        self.states[ctxno] = (usize::from(mps) + (row << 1)) as u8;
    }

    #[inline]
    fn select(&mut self, ctxno: usize) {
        self.cur = ctxno;
    }

    #[inline]
    fn current(&self) -> State {
        STATES[usize::from(self.states[self.cur])]
    }

    #[inline]
    fn advance(&mut self, next: u8) {
        self.states[self.cur] = next;
    }
}

/// MQ encoder writing into an owned buffer.
///
/// The buffer keeps one sentinel byte in front of the code-stream so the
/// carry logic always has a previous byte to look at. After any termination
/// the cursor sits one past the last byte that belongs to the segment.
#[derive(Clone, Debug)]
pub struct MqEncoder {
    buf: Vec<u8>,
    bp: usize,
    a: u32,
    c: u32,
    ct: u32,
    ctx: Contexts,
}

impl Default for MqEncoder {
    fn default() -> Self {
        let mut enc = Self {
            buf: Vec::new(),
            bp: 0,
            a: 0,
            c: 0,
            ct: 0,
            ctx: Contexts::default(),
        };
        enc.init();
        enc
    }
}

impl MqEncoder {
    const START: usize = 1;

    /// Start a new code-stream. Context states are left alone.
    pub fn init(&mut self) {
        self.buf.clear();
        self.buf.push(0);
        self.bp = Self::START - 1;
        self.ctx.select(0);
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
    }

    /// Mutable access to the context states.
    pub fn contexts_mut(&mut self) -> &mut Contexts {
        &mut self.ctx
    }

    /// Select the context used by the next [`encode`](Self::encode) or [`bypass_encode`](Self::bypass_encode).
    #[inline]
    pub fn set_context(&mut self, ctxno: usize) {
        self.ctx.select(ctxno);
    }

    /// Bytes emitted so far, excluding a byte that may still receive a carry.
    pub fn numbytes(&self) -> usize {
        self.bp.saturating_sub(Self::START)
    }

    /// The code-stream emitted so far (first [`numbytes`](Self::numbytes) bytes).
    pub fn data(&self) -> &[u8] {
        let end = (Self::START + self.numbytes()).min(self.buf.len());
        &self.buf[Self::START.min(end)..end]
    }

    /// Code one decision in the current context.
    #[inline]
    pub fn encode(&mut self, d: bool) {
        if self.ctx.current().mps == d {
            self.code_mps();
        } else {
            self.code_lps();
        }
    }

    /// Terminate the code-stream so a decoder can read every decision coded so far.
    pub fn flush(&mut self) {
        self.set_bits();
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
        if self.byte(self.bp) != 0xFF {
            self.bp += 1;
        }
        self.trim_trailing_ff();
    }

    /// Predictable termination: emit just enough bytes for the decoder to resolve the interval.
    pub fn erterm(&mut self) {
        let mut k = 11 - i64::from(self.ct) + 1;
        while k > 0 {
            self.c <<= self.ct;
            self.ct = 0;
            self.byte_out();
            k -= i64::from(self.ct);
        }
        if self.byte(self.bp) != 0xFF {
            self.byte_out();
        }
        self.trim_trailing_ff();
    }

    /// Re-arm the arithmetic coder after a terminated segment, continuing in the same buffer.
    pub fn restart_init(&mut self) {
        self.ctx.select(0);
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
        self.bp = self.bp.saturating_sub(1);
        if self.byte(self.bp) == 0xFF {
            self.ct = 13;
        }
    }

    /// Switch to raw bit packing after a terminated segment.
    pub fn bypass_init(&mut self) {
        self.c = 0;
        self.ct = 8;
        self.bp = self.bp.saturating_sub(1);
    }

    /// Pack one bit without arithmetic coding.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "`c` holds at most eight bits here."
    )]
    #[inline]
    pub fn bypass_encode(&mut self, d: bool) {
        self.ct -= 1;
        self.c += u32::from(d) << self.ct;
        if self.ct == 0 {
            self.bp += 1;
            self.put(self.bp, self.c as u8);
            self.ct = if self.byte(self.bp) == 0xFF { 7 } else { 8 };
            self.c = 0;
        }
    }

    /// Terminate a raw segment, padding the last byte with alternating bits.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "`c` holds at most eight bits here."
    )]
    pub fn bypass_flush(&mut self) {
        let mut pad = 0;
        while self.ct > 0 {
            self.ct -= 1;
            self.c += pad << self.ct;
            pad ^= 1;
        }
        self.bp += 1;
        self.put(self.bp, self.c as u8);
        self.ct = 8;
        self.c = 0;
        if self.byte(self.bp) != 0xFF {
            self.bp += 1;
        }
        self.trim_trailing_ff();
    }

    /// Code the segmentation symbol `1010` in the uniform context.
    pub fn segmark(&mut self) {
        self.set_context(CTXNO_UNI);
        for i in 1..5 {
            self.encode(i % 2 == 1);
        }
    }

    /// Reset every context to its initial state.
    pub fn reset_contexts(&mut self) {
        self.ctx.reset();
    }

    fn code_mps(&mut self) {
        let s = self.ctx.current();
        self.a -= s.qeval;
        if self.a & 0x8000 == 0 {
            if self.a < s.qeval {
                self.a = s.qeval;
            } else {
                self.c += s.qeval;
            }
            self.ctx.advance(s.nmps);
            self.renorm();
        } else {
            self.c += s.qeval;
        }
    }

    fn code_lps(&mut self) {
        let s = self.ctx.current();
        self.a -= s.qeval;
        if self.a < s.qeval {
            self.c += s.qeval;
        } else {
            self.a = s.qeval;
        }
        self.ctx.advance(s.nlps);
        self.renorm();
    }

    fn renorm(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn set_bits(&mut self) {
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "The shifted register fits a byte after masking."
    )]
    fn byte_out(&mut self) {
        if self.byte(self.bp) == 0xFF {
            self.bp += 1;
            self.put(self.bp, (self.c >> 20) as u8);
            self.c &= 0xF_FFFF;
            self.ct = 7;
        } else if self.c & 0x800_0000 == 0 {
            self.bp += 1;
            self.put(self.bp, (self.c >> 19) as u8);
            self.c &= 0x7_FFFF;
            self.ct = 8;
        } else {
            let carried = self.byte(self.bp).wrapping_add(1);
            self.put(self.bp, carried);
            if carried == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.bp += 1;
                self.put(self.bp, (self.c >> 20) as u8);
                self.c &= 0xF_FFFF;
                self.ct = 7;
            } else {
                self.bp += 1;
                self.put(self.bp, (self.c >> 19) as u8);
                self.c &= 0x7_FFFF;
                self.ct = 8;
            }
        }
    }

    /// A segment never ends on `0xFF`: decoders synthesise trailing `0xFF`s, and
    /// the next segment starts where the dropped byte was.
    fn trim_trailing_ff(&mut self) {
        while self.bp > Self::START && self.byte(self.bp - 1) == 0xFF {
            self.bp -= 1;
        }
    }

    #[inline]
    fn byte(&self, at: usize) -> u8 {
        self.buf.get(at).copied().unwrap_or(0)
    }

    #[inline]
    fn put(&mut self, at: usize, v: u8) {
        if at >= self.buf.len() {
            self.buf.resize(at + 1, 0);
        }
        self.buf[at] = v;
    }
}

/// MQ decoder over a copied segment.
#[derive(Clone, Debug, Default)]
pub struct MqDecoder {
    buf: Vec<u8>,
    bp: usize,
    a: u32,
    c: u32,
    ct: u32,
    ctx: Contexts,
}

impl MqDecoder {
    /// Start decoding `data`. Context states carry over from the previous segment.
    pub fn init(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.ctx.select(0);
        self.bp = 0;
        self.c = if data.is_empty() {
            0xFF << 16
        } else {
            u32::from(data[0]) << 16
        };
        self.byte_in();
        self.c <<= 7;
        self.ct -= 7;
        self.a = 0x8000;
    }

    /// Mutable access to the context states.
    pub fn contexts_mut(&mut self) -> &mut Contexts {
        &mut self.ctx
    }

    /// Select the context used by the next [`decode`](Self::decode).
    #[inline]
    pub fn set_context(&mut self, ctxno: usize) {
        self.ctx.select(ctxno);
    }

    /// Decode one decision in the current context.
    #[inline]
    pub fn decode(&mut self) -> bool {
        let s = self.ctx.current();
        self.a -= s.qeval;
        if (self.c >> 16) < s.qeval {
            let d = self.lps_exchange(s);
            self.renorm();
            d
        } else {
            self.c -= s.qeval << 16;
            if self.a & 0x8000 == 0 {
                let d = self.mps_exchange(s);
                self.renorm();
                d
            } else {
                s.mps
            }
        }
    }

    fn mps_exchange(&mut self, s: State) -> bool {
        if self.a < s.qeval {
            self.ctx.advance(s.nlps);
            !s.mps
        } else {
            self.ctx.advance(s.nmps);
            s.mps
        }
    }

    fn lps_exchange(&mut self, s: State) -> bool {
        let mps = self.a < s.qeval;
        self.a = s.qeval;
        if mps {
            self.ctx.advance(s.nmps);
            s.mps
        } else {
            self.ctx.advance(s.nlps);
            !s.mps
        }
    }

    fn byte_in(&mut self) {
        let end = self.buf.len();
        if self.bp < end {
            let next = self.buf.get(self.bp + 1).copied().map_or(0xFF, u32::from);
            if self.buf[self.bp] == 0xFF {
                if next > 0x8F {
                    self.c = self.c.wrapping_add(0xFF00);
                    self.ct = 8;
                } else {
                    self.bp += 1;
                    self.c = self.c.wrapping_add(next << 9);
                    self.ct = 7;
                }
            } else {
                self.bp += 1;
                self.c = self.c.wrapping_add(next << 8);
                self.ct = 8;
            }
        } else {
            self.c = self.c.wrapping_add(0xFF00);
            self.ct = 8;
        }
    }

    fn renorm(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a >= 0x8000 {
                break;
            }
        }
    }
}
