// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Box, sphere and segment overlap tests used by culling and picking.

use glam::DVec3;

/// How much of a volume lies inside a region.
///
/// Ordered so that combining two tests is `min`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Containment {
    /// Entirely outside.
    Outside,
    /// Overlapping the boundary.
    Partial,
    /// Entirely inside.
    Inside,
}

impl Containment {
    /// Whether any part of the volume is inside.
    pub fn is_visible(self) -> bool {
        self != Self::Outside
    }
}

/// Test the box `[min, max]` against the sphere at `origin` with radius `rad`.
pub fn aabb_sphere_intersect(min: DVec3, max: DVec3, origin: DVec3, rad: f64) -> Containment {
    aabb_sphere_intersect_r2(min, max, origin, rad * rad)
}

/// [`aabb_sphere_intersect`] with the radius already squared.
///
/// A box whose two corners lie within the sphere counts as inside.
pub fn aabb_sphere_intersect_r2(min: DVec3, max: DVec3, origin: DVec3, r2: f64) -> Containment {
    if (min - origin).length_squared() < r2 && (max - origin).length_squared() < r2 {
        return Containment::Inside;
    }

    let mut d = 0.0;
    for i in 0..3 {
        if origin[i] < min[i] {
            let t = min[i] - origin[i];
            d += t * t;
        } else if origin[i] > max[i] {
            let t = origin[i] - max[i];
            d += t * t;
        }
        if d > r2 {
            return Containment::Outside;
        }
    }
    Containment::Partial
}

/// Test the box at `center` with half-size `size` against the sphere at `pos` with radius `rad`.
///
/// Per axis: a box beyond the sphere's slab is outside, one poking out of it is partial.
pub fn sphere_aabb(center: DVec3, size: DVec3, pos: DVec3, rad: f64) -> Containment {
    let min = center - size;
    let max = center + size;
    let mut ret = Containment::Inside;
    for i in 0..3 {
        if min[i] > pos[i] + rad || max[i] < pos[i] - rad {
            return Containment::Outside;
        }
        if min[i] < pos[i] - rad || max[i] > pos[i] + rad {
            ret = Containment::Partial;
        }
    }
    ret
}

/// Separating-axis test of the segment `start..end` against the box at `center` with half-size `size`.
pub fn line_segment_box_intersect(start: DVec3, end: DVec3, center: DVec3, size: DVec3) -> bool {
    let dir = (end - start) * 0.5;
    let diff = (end + start) * 0.5 - center;
    let adir = dir.abs();
    if diff.abs().cmpgt(size + adir).any() {
        return false;
    }

    let cross = dir.cross(diff);
    cross.x.abs() <= size.y * adir.z + size.z * adir.y
        && cross.y.abs() <= size.x * adir.z + size.z * adir.x
        && cross.z.abs() <= size.x * adir.y + size.y * adir.x
}
