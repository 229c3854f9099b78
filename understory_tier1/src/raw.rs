// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Raw (bypass) bit reader for lazily coded passes.

use alloc::vec::Vec;

/// Reads bits MSB first, skipping the stuffed bit after every `0xFF`.
///
/// Reading past the end yields ones.
#[derive(Clone, Debug, Default)]
pub struct RawDecoder {
    buf: Vec<u8>,
    len: usize,
    c: u8,
    ct: u32,
}

impl RawDecoder {
    /// Start reading `data`.
    pub fn init(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.len = 0;
        self.c = 0;
        self.ct = 0;
    }

    /// Next bit.
    #[inline]
    pub fn decode(&mut self) -> bool {
        if self.ct == 0 {
            self.ct = 8;
            if self.len == self.buf.len() {
                self.c = 0xFF;
            } else {
                if self.c == 0xFF {
                    self.ct = 7;
                }
                self.c = self.buf[self.len];
                self.len += 1;
            }
        }
        self.ct -= 1;
        (self.c >> self.ct) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqc::MqEncoder;
    use alloc::vec::Vec;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn bypass_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        // Mostly ones so the packer produces plenty of 0xFF bytes.
        let bits: Vec<bool> = (0..900).map(|_| rng.random_bool(0.9)).collect();
        let mut enc = MqEncoder::default();
        enc.bypass_init();
        for &b in &bits {
            enc.bypass_encode(b);
        }
        enc.bypass_flush();
        assert_ne!(enc.data().last(), Some(&0xFF));

        let mut dec = RawDecoder::default();
        dec.init(enc.data());
        let got: Vec<bool> = bits.iter().map(|_| dec.decode()).collect();
        assert_eq!(got, bits);
    }

    #[test]
    fn stuffed_bit_after_ff() {
        let mut dec = RawDecoder::default();
        dec.init(&[0xFF, 0x7F]);
        for _ in 0..8 {
            assert!(dec.decode());
        }
        // Only seven payload bits follow a 0xFF; all of 0x7F's low bits are ones.
        for _ in 0..7 {
            assert!(dec.decode());
        }
        // Past the end reads ones.
        assert!(dec.decode());
    }
}
