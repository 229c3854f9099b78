// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_tier1::{
    Band, CodeBlockEnc, CodeBlockStyle, ComponentParams, DistortionWeights, Precinct, Resolution,
    Tier1, Tile, TileCodingParams, TileComponent, encode_cblks,
};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// Wavelet-like coefficients: mostly zero, magnitudes falling off geometrically.
fn gen_coeffs(len: usize, seed: u64) -> Vec<i32> {
    let mut rng = Rng::new(seed);
    (0..len)
        .map(|_| {
            let r = rng.next_u64();
            if r % 3 == 0 {
                return 0;
            }
            let bits = (r >> 8) % 12;
            let mag = ((r >> 16) % (1 << bits)) as i32;
            if r & 0x80 != 0 { -mag } else { mag }
        })
        .collect()
}

fn weights() -> DistortionWeights {
    DistortionWeights {
        compno: 0,
        level: 0,
        orient: 0,
        qmfbid: 1,
        stepsize: 1.0,
        numcomps: 1,
        mct: false,
    }
}

/// One 64x64 component at a single resolution, coded as four 32x32 blocks.
fn tile(data: Vec<i32>) -> Tile<CodeBlockEnc> {
    let cblks = [(0, 0), (32, 0), (0, 32), (32, 32)]
        .into_iter()
        .map(|(x, y)| CodeBlockEnc::new(x, y, x + 32, y + 32))
        .collect();
    let band = Band {
        bandno: 0,
        x0: 0,
        y0: 0,
        x1: 64,
        y1: 64,
        precincts: vec![Precinct {
            x0: 0,
            y0: 0,
            x1: 64,
            y1: 64,
            cw: 2,
            ch: 2,
            cblks,
        }],
        numbps: 0,
        stepsize: 1.0,
    };
    Tile {
        comps: vec![TileComponent {
            x0: 0,
            y0: 0,
            x1: 64,
            y1: 64,
            numresolutions: 1,
            resolutions: vec![Resolution {
                x0: 0,
                y0: 0,
                x1: 64,
                y1: 64,
                pw: 1,
                ph: 1,
                bands: vec![band],
            }],
            data,
            real_data: Vec::new(),
        }],
        distotile: 0.0,
    }
}

fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("tier1_block");
    let coeffs = gen_coeffs(64 * 64, 0xCAFE_F00D_DEAD_BEEF);
    group.throughput(Throughput::Elements(coeffs.len() as u64));
    let styles = [
        ("default", CodeBlockStyle::empty()),
        ("lazy", CodeBlockStyle::LAZY),
        ("termall", CodeBlockStyle::TERMALL),
        ("all", CodeBlockStyle::all()),
    ];
    for (name, style) in styles {
        let mut t1 = Tier1::new();
        group.bench_function(format!("encode_64x64_{name}"), |b| {
            b.iter(|| {
                t1.load(64, 64, |x, y| coeffs[y * 64 + x] << 6);
                let mut cblk = CodeBlockEnc::new(0, 0, 64, 64);
                let _ = t1.encode_cblk(&mut cblk, &weights(), style);
                black_box(cblk.data.len());
            });
        });

        t1.load(64, 64, |x, y| coeffs[y * 64 + x] << 6);
        let mut cblk = CodeBlockEnc::new(0, 0, 64, 64);
        let _ = t1.encode_cblk(&mut cblk, &weights(), style);
        let dec = cblk.to_decoder();
        group.bench_function(format!("decode_64x64_{name}"), |b| {
            b.iter(|| {
                t1.decode_cblk(&dec, 0, 0, style);
                black_box(t1.samples()[0]);
            });
        });
    }
    group.finish();
}

fn bench_tile(c: &mut Criterion) {
    let mut group = c.benchmark_group("tier1_tile");
    let coeffs = gen_coeffs(64 * 64, 0xBADC_F00D_1234_5678);
    let tcp = TileCodingParams {
        mct: false,
        tccps: vec![ComponentParams {
            cblksty: CodeBlockStyle::empty(),
            qmfbid: 1,
            roishift: 0,
        }],
    };
    group.throughput(Throughput::Elements(coeffs.len() as u64));
    group.bench_function("encode_cblks_64x64", |b| {
        b.iter_batched(
            || tile(coeffs.clone()),
            |mut t| {
                let _ = encode_cblks(&mut t, &tcp);
                black_box(t.distotile);
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_block, bench_tile);
criterion_main!(benches);
