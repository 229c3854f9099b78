// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-sample state words and the bordered grid that holds them.

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// State of one coefficient during bit-plane coding.
    ///
    /// The low byte records which of the eight neighbours are significant, the
    /// next nibble the signs of the four primary neighbours.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// North-east neighbour is significant.
        const SIG_NE = 0x0001;
        /// South-east neighbour is significant.
        const SIG_SE = 0x0002;
        /// South-west neighbour is significant.
        const SIG_SW = 0x0004;
        /// North-west neighbour is significant.
        const SIG_NW = 0x0008;
        /// North neighbour is significant.
        const SIG_N = 0x0010;
        /// East neighbour is significant.
        const SIG_E = 0x0020;
        /// South neighbour is significant.
        const SIG_S = 0x0040;
        /// West neighbour is significant.
        const SIG_W = 0x0080;
        /// North neighbour is negative.
        const SGN_N = 0x0100;
        /// East neighbour is negative.
        const SGN_E = 0x0200;
        /// South neighbour is negative.
        const SGN_S = 0x0400;
        /// West neighbour is negative.
        const SGN_W = 0x0800;
        /// The sample itself is significant.
        const SIG = 0x1000;
        /// The sample has had at least one refinement bit coded.
        const REFINE = 0x2000;
        /// The sample was coded in the current bit-plane's significance pass.
        const VISIT = 0x4000;

        /// Any neighbour is significant.
        const SIG_OTH = Self::SIG_N.bits() | Self::SIG_NE.bits() | Self::SIG_E.bits()
            | Self::SIG_SE.bits() | Self::SIG_S.bits() | Self::SIG_SW.bits()
            | Self::SIG_W.bits() | Self::SIG_NW.bits();
        /// Any primary (N, E, S, W) neighbour is significant.
        const SIG_PRIM = Self::SIG_N.bits() | Self::SIG_E.bits() | Self::SIG_S.bits()
            | Self::SIG_W.bits();
        /// Any primary neighbour sign.
        const SGN = Self::SGN_N.bits() | Self::SGN_E.bits() | Self::SGN_S.bits()
            | Self::SGN_W.bits();
    }
}

impl Flags {
    /// Bits hidden from the last row of a stripe in vertically causal mode.
    pub const SOUTH: Self = Self::SIG_S
        .union(Self::SIG_SE)
        .union(Self::SIG_SW)
        .union(Self::SGN_S);

    /// This word as seen by context modelling, with the south neighbours masked when `vsc`.
    #[inline]
    pub fn causal(self, vsc: bool) -> Self {
        if vsc { self.difference(Self::SOUTH) } else { self }
    }
}

/// Neighbour bits to set on the N, W, E and S neighbours of a newly significant
/// sample, indexed by `2 * direction + sign`.
const MOD: [Flags; 8] = [
    Flags::SIG_S,
    Flags::SIG_S.union(Flags::SGN_S),
    Flags::SIG_E,
    Flags::SIG_E.union(Flags::SGN_E),
    Flags::SIG_W,
    Flags::SIG_W.union(Flags::SGN_W),
    Flags::SIG_N,
    Flags::SIG_N.union(Flags::SGN_N),
];

/// Flag words for a `w x h` block surrounded by a one-sample ghost border.
///
/// The border absorbs neighbour updates from edge samples so the coding loops
/// never bounds-check; it never becomes significant, visited or refined.
#[derive(Clone, Debug, Default)]
pub struct FlagGrid {
    stride: usize,
    words: Vec<Flags>,
}

impl FlagGrid {
    /// Clear the grid and size it for a `w x h` block.
    pub fn reset(&mut self, w: usize, h: usize) {
        self.stride = w + 2;
        self.words.clear();
        self.words.resize(self.stride * (h + 2), Flags::empty());
    }

    /// Row pitch, including both border columns.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Word index of interior sample `(x, y)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.stride + x + 1
    }

    /// Word at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Flags {
        self.words[index]
    }

    /// Set `bits` on the word at `index`.
    #[inline]
    pub fn insert(&mut self, index: usize, bits: Flags) {
        self.words[index] |= bits;
    }

    /// Clear `bits` on the word at `index`.
    #[inline]
    pub fn remove(&mut self, index: usize, bits: Flags) {
        self.words[index].remove(bits);
    }

    /// Mark the sample at `index` significant with the given sign and tell its eight neighbours.
    #[inline]
    pub fn update(&mut self, index: usize, negative: bool) {
        let s = usize::from(negative);
        let north = index - self.stride;
        let south = index + self.stride;
        let w = &mut self.words;

        w[north - 1] |= Flags::SIG_SE;
        w[north] |= MOD[s];
        w[north + 1] |= Flags::SIG_SW;

        w[index - 1] |= MOD[s + 2];
        w[index] |= Flags::SIG;
        w[index + 1] |= MOD[s + 4];

        w[south - 1] |= Flags::SIG_NE;
        w[south] |= MOD[s + 6];
        w[south + 1] |= Flags::SIG_NW;
    }

    /// Whether the ghost border is free of `SIG`, `VISIT` and `REFINE`.
    pub fn border_is_clean(&self) -> bool {
        let h = self.words.len() / self.stride.max(1);
        let own = Flags::SIG | Flags::VISIT | Flags::REFINE;
        (0..h).all(|y| {
            (0..self.stride).all(|x| {
                let border = y == 0 || y + 1 == h || x == 0 || x + 1 == self.stride;
                !border || !self.words[y * self.stride + x].intersects(own)
            })
        })
    }
}
