// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_tier1 --heading-base-level=0

//! Understory Tier-1: the JPEG 2000 bit-plane coder.
//!
//! Tier-1 turns the quantized wavelet coefficients of a code-block into an
//! embedded code-stream and back. Each magnitude bit-plane is coded in up to
//! three passes (significance propagation, magnitude refinement, cleanup),
//! each pass a sequence of binary decisions driven by a context label taken
//! from the sample's neighbourhood.
//!
//! - [`Tier1`] codes one block at a time: [`Tier1::encode_cblk`] records the
//!   rate and cumulative distortion of every pass, and
//!   [`Tier1::decode_cblk`] reconstructs the samples from the terminated
//!   segments it is given.
//! - [`encode_cblks`] and [`decode_cblks`] walk a whole tile (components,
//!   resolutions, bands, precincts, code-blocks), moving samples between the
//!   component planes and the blocks.
//! - [`CodeBlockStyle`] carries the coding switches: lazy (raw) passes,
//!   context reset, termination on every pass, vertically causal contexts,
//!   predictable termination and segmentation symbols.
//!
//! The entropy coders ([`mqc`], [`raw`]), the context and distortion tables
//! ([`luts`], [`norms`]) and the bordered flag grid ([`flags`]) are public
//! for callers that build their own drivers.
//!
//! Damaged input is not an error: a segment that is missing is skipped and
//! the samples it would have refined keep their previous values. Errors
//! ([`Tier1Error`]) only report tiles whose structure is inconsistent.
//!
//! # Example
//!
//! ```rust
//! use understory_tier1::{CodeBlockEnc, CodeBlockStyle, DistortionWeights, Tier1};
//!
//! let coeffs = [0, 3, -12, 0, 5, 0, 0, -1, 0, 0, 7, 0, 0, 0, 0, 2];
//! let mut t1 = Tier1::new();
//! // Samples carry six fractional bits.
//! t1.load(4, 4, |x, y| coeffs[y * 4 + x] << 6);
//!
//! let mut cblk = CodeBlockEnc::new(0, 0, 4, 4);
//! let weights = DistortionWeights {
//!     compno: 0,
//!     level: 0,
//!     orient: 0,
//!     qmfbid: 1,
//!     stepsize: 1.0,
//!     numcomps: 1,
//!     mct: false,
//! };
//! let style = CodeBlockStyle::TERMALL;
//! t1.encode_cblk(&mut cblk, &weights, style).unwrap();
//! assert_eq!(cblk.numbps, 4);
//! assert!(cblk.passes.iter().all(|p| p.term));
//!
//! t1.decode_cblk(&cblk.to_decoder(), 0, 0, style);
//! let decoded: Vec<i32> = t1.samples().iter().map(|v| v / 2).collect();
//! assert_eq!(decoded, coeffs);
//! ```
//!
//! ## Features
//!
//! - `std` (default): standard library support.
//! - `parallel`: code the blocks of a tile on the `rayon` thread pool. Results
//!   are identical to the serial path.
//! - `tracing`: spans on the tile drivers and warnings for skipped segments
//!   and bad segmentation symbols.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod blocks;
mod error;
pub mod flags;
pub mod luts;
pub mod mqc;
pub mod norms;
pub mod raw;
mod t1;
mod tile;

pub use blocks::{decode_cblks, encode_cblks};
pub use error::Tier1Error;
pub use norms::DistortionWeights;
pub use t1::Tier1;
pub use tile::{
    Band, CodeBlockDec, CodeBlockEnc, CodeBlockStyle, ComponentParams, Pass, Precinct,
    Resolution, Segment, Tile, TileCodingParams, TileComponent,
};
