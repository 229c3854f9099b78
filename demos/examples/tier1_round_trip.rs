// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tier-1 round trip.
//!
//! Code one block with each style, report pass counts and rates, then decode
//! a truncated code-stream and watch the error grow.
//!
//! Run:
//! - `cargo run -p understory_demos --example tier1_round_trip`

use understory_tier1::{CodeBlockEnc, CodeBlockStyle, DistortionWeights, Tier1};

const W: usize = 32;
const H: usize = 32;

/// A smooth ramp with a sharp edge, like a high band of a real image.
fn coefficients() -> Vec<i32> {
    (0..W * H)
        .map(|i| {
            let (x, y) = ((i % W) as i32, (i / W) as i32);
            let edge = if x > 20 { 200 } else { 0 };
            (x * 3 - y * 2) + edge - 40
        })
        .collect()
}

fn main() {
    let coeffs = coefficients();
    let weights = DistortionWeights {
        compno: 0,
        level: 0,
        orient: 0,
        qmfbid: 1,
        stepsize: 1.0,
        numcomps: 1,
        mct: false,
    };

    let styles = [
        ("default", CodeBlockStyle::empty()),
        ("lazy", CodeBlockStyle::LAZY),
        ("termall", CodeBlockStyle::TERMALL),
        ("reset+vsc", CodeBlockStyle::RESET | CodeBlockStyle::VSC),
        ("segsym+pterm", CodeBlockStyle::SEGSYM | CodeBlockStyle::PTERM),
    ];

    let mut t1 = Tier1::new();
    for (name, style) in styles {
        t1.load(W, H, |x, y| coeffs[y * W + x] << 6);
        let mut cblk = CodeBlockEnc::new(0, 0, W as i32, H as i32);
        let distortion = t1.encode_cblk(&mut cblk, &weights, style).unwrap();

        t1.decode_cblk(&cblk.to_decoder(), 0, 0, style);
        let exact = t1
            .samples()
            .iter()
            .zip(&coeffs)
            .all(|(&s, &c)| s / 2 == c);
        println!(
            "{name:>13}: {} bit-planes, {} passes, {} bytes, distortion {distortion:.1}, lossless {exact}",
            cblk.numbps,
            cblk.passes.len(),
            cblk.data.len(),
        );
        assert!(exact, "{name} decodes exactly");
    }

    // Every pass is its own segment under TERMALL; keep only a prefix.
    t1.load(W, H, |x, y| coeffs[y * W + x] << 6);
    let mut cblk = CodeBlockEnc::new(0, 0, W as i32, H as i32);
    let style = CodeBlockStyle::TERMALL;
    t1.encode_cblk(&mut cblk, &weights, style).unwrap();
    let total = cblk.passes.len();
    for keep in [total / 4, total / 2, total] {
        let mut dec = cblk.to_decoder();
        dec.segs.truncate(keep);
        t1.decode_cblk(&dec, 0, 0, style);
        let err: i64 = t1
            .samples()
            .iter()
            .zip(&coeffs)
            .map(|(&s, &c)| i64::from(s / 2 - c).pow(2))
            .sum();
        println!("{keep:>3} of {total} passes: squared error {err}");
    }
}
