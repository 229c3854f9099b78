// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scalar float functions for `std` and `libm` builds.

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("understory_spatial requires either the `std` or the `libm` feature");

#[cfg(feature = "std")]
#[inline]
pub(crate) fn atan(x: f64) -> f64 {
    x.atan()
}

#[cfg(all(not(feature = "std"), feature = "libm"))]
#[inline]
pub(crate) fn atan(x: f64) -> f64 {
    libm::atan(x)
}

#[cfg(feature = "std")]
#[inline]
pub(crate) fn tan(x: f64) -> f64 {
    x.tan()
}

#[cfg(all(not(feature = "std"), feature = "libm"))]
#[inline]
pub(crate) fn tan(x: f64) -> f64 {
    libm::tan(x)
}
