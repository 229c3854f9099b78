// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and helpers.

use glam::DVec3;

/// Axis-aligned bounding box in 3D.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: DVec3,
    /// Maximum corner.
    pub max: DVec3,
}

impl Aabb3 {
    /// Create a new AABB from min/max corners.
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a center and half extents.
    pub fn from_center_half(center: DVec3, half: DVec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Center of the box.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half extents of the box.
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether this AABB contains the point (inclusive on all faces).
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies entirely inside this box, allowing `slop` on every face.
    pub fn encloses(&self, other: &Self, slop: f64) -> bool {
        other.min.cmpge(self.min - DVec3::splat(slop)).all()
            && other.max.cmple(self.max + DVec3::splat(slop)).all()
    }

    /// The smallest box covering both inputs.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Return true if the AABB is inverted on any axis. Assumes no NaN.
    pub fn is_empty(&self) -> bool {
        self.max.cmplt(self.min).any()
    }

    /// Translate the box by `offset`.
    pub fn translate(&self, offset: DVec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

/// Octant of `pos` relative to `center`: bit 0 for +x, bit 1 for +y, bit 2 for +z.
#[inline]
pub fn octant_of(center: DVec3, pos: DVec3) -> u8 {
    u8::from(pos.x > center.x) | (u8::from(pos.y > center.y) << 1) | (u8::from(pos.z > center.z) << 2)
}

/// Move `center` by `amount` on every axis, toward `pos`.
///
/// Axes where `pos` equals the center move in the negative direction.
#[inline]
pub fn push_center(center: DVec3, amount: DVec3, pos: DVec3) -> DVec3 {
    let step = |c: f64, a: f64, p: f64| if p > c { c + a } else { c - a };
    DVec3::new(
        step(center.x, amount.x, pos.x),
        step(center.y, amount.y, pos.y),
        step(center.z, amount.z, pos.z),
    )
}
