// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Viewing camera and its frustum planes.

use glam::DVec3;

use crate::intersect::Containment;
use crate::math;

/// A plane `normal . p + d = 0` with the normal pointing into the frustum.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Plane {
    normal: DVec3,
    d: f64,
}

impl Plane {
    fn through(normal: DVec3, point: DVec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    fn distance(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.d
    }
}

const NEAR: usize = 0;
const FAR: usize = 1;

/// A perspective camera.
///
/// The frame is right-handed with `at` forward, `left` to the left and `up`
/// up. Frustum planes are rebuilt whenever the camera moves.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    origin: DVec3,
    at: DVec3,
    left: DVec3,
    up: DVec3,
    view_angle: f64,
    aspect: f64,
    near: f64,
    far: f64,
    planes: [Plane; 6],
    frustum_corner_dist: f64,
    screen_height: f64,
    velocity: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(DVec3::ZERO, DVec3::X, DVec3::Z)
    }
}

impl Camera {
    /// A camera at `origin` looking at `target` with `up` as the up hint.
    ///
    /// Starts with a 60 degree vertical field of view, square aspect, near 0.1,
    /// far 256 and a 1024 pixel tall viewport.
    pub fn look_at(origin: DVec3, target: DVec3, up: DVec3) -> Self {
        let mut camera = Self {
            origin,
            at: DVec3::X,
            left: DVec3::Y,
            up: DVec3::Z,
            view_angle: core::f64::consts::FRAC_PI_3,
            aspect: 1.0,
            near: 0.1,
            far: 256.0,
            planes: [Plane {
                normal: DVec3::ZERO,
                d: 0.0,
            }; 6],
            frustum_corner_dist: 0.0,
            screen_height: 1024.0,
            velocity: 0.0,
        };
        camera.set_look_at(origin, target, up);
        camera
    }

    /// Move the camera and point it at `target`.
    pub fn set_look_at(&mut self, origin: DVec3, target: DVec3, up: DVec3) {
        let at = (target - origin).normalize_or(DVec3::X);
        let left = up.cross(at).normalize_or(at.any_orthonormal_vector());
        self.origin = origin;
        self.at = at;
        self.left = left;
        self.up = at.cross(left);
        self.calculate_frustum_planes();
    }

    /// Set the vertical field of view in radians and the width / height ratio.
    pub fn set_view(&mut self, view_angle: f64, aspect: f64) {
        self.view_angle = view_angle;
        self.aspect = aspect;
        self.calculate_frustum_planes();
    }

    /// Set the near and far clip distances.
    pub fn set_clip(&mut self, near: f64, far: f64) {
        self.near = near;
        self.far = far;
        self.calculate_frustum_planes();
    }

    /// Set the viewport height in pixels.
    pub fn set_screen_height(&mut self, pixels: f64) {
        self.screen_height = pixels;
    }

    /// Set the camera speed used to pad occlusion boxes.
    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity = velocity;
    }

    /// Eye position.
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Unit view direction.
    pub fn at_axis(&self) -> DVec3 {
        self.at
    }

    /// Unit left axis.
    pub fn left_axis(&self) -> DVec3 {
        self.left
    }

    /// Unit up axis.
    pub fn up_axis(&self) -> DVec3 {
        self.up
    }

    /// Far clip distance.
    pub fn far(&self) -> f64 {
        self.far
    }

    /// Distance from the eye to a corner of the far plane.
    pub fn frustum_corner_dist(&self) -> f64 {
        self.frustum_corner_dist
    }

    /// Camera speed.
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Vertical pixels covered by one radian of view angle.
    pub fn pixels_per_radian(&self) -> f64 {
        self.screen_height / self.view_angle
    }

    fn calculate_frustum_planes(&mut self) {
        let th = math::tan(self.view_angle * 0.5);
        let tw = th * self.aspect;
        let o = self.origin;
        let (at, left, up) = (self.at, self.left, self.up);

        self.planes = [
            Plane::through(at, o + at * self.near),
            Plane::through(-at, o + at * self.far),
            Plane::through(at * tw - left, o),
            Plane::through(at * tw + left, o),
            Plane::through(at * th - up, o),
            Plane::through(at * th + up, o),
        ];
        self.frustum_corner_dist = self.far * DVec3::new(1.0, tw, th).length();
    }

    /// Test the box at `center` with half-size `radius` against every frustum plane.
    pub fn aabb_in_frustum(&self, center: DVec3, radius: DVec3) -> Containment {
        self.aabb_in_planes(center, radius, false)
    }

    /// [`aabb_in_frustum`](Self::aabb_in_frustum) ignoring the far plane.
    pub fn aabb_in_frustum_no_far_clip(&self, center: DVec3, radius: DVec3) -> Containment {
        self.aabb_in_planes(center, radius, true)
    }

    fn aabb_in_planes(&self, center: DVec3, radius: DVec3, skip_far: bool) -> Containment {
        let mut result = Containment::Inside;
        for (i, plane) in self.planes.iter().enumerate() {
            if skip_far && i == FAR {
                continue;
            }
            let r = plane.normal.abs().dot(radius);
            let dist = plane.distance(center);
            if dist < -r {
                return Containment::Outside;
            }
            if dist < r {
                result = Containment::Partial;
            }
        }
        result
    }

    /// Whether any part of the sphere at `center` with `radius` is inside the frustum.
    pub fn sphere_in_frustum(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance(center) >= -radius)
    }

    /// Distance of `p` in front of the near plane.
    pub fn near_distance(&self, p: DVec3) -> f64 {
        self.planes[NEAR].distance(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut c = Camera::look_at(DVec3::ZERO, DVec3::X, DVec3::Z);
        c.set_view(core::f64::consts::FRAC_PI_2, 1.0);
        c.set_clip(0.5, 100.0);
        c
    }

    #[test]
    fn axes_are_right_handed() {
        let c = camera();
        assert!((c.left_axis() - DVec3::Y).length() < 1e-12);
        assert!((c.up_axis() - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn boxes_classified_against_frustum() {
        let c = camera();
        let half = DVec3::splat(1.0);
        assert_eq!(
            c.aabb_in_frustum(DVec3::new(10.0, 0.0, 0.0), half),
            Containment::Inside
        );
        assert_eq!(
            c.aabb_in_frustum(DVec3::new(-10.0, 0.0, 0.0), half),
            Containment::Outside
        );
        // Straddles the 45 degree left plane.
        assert_eq!(
            c.aabb_in_frustum(DVec3::new(10.0, 10.0, 0.0), half),
            Containment::Partial
        );
        // Beyond the far plane only the no-far-clip test keeps it.
        let far = DVec3::new(150.0, 0.0, 0.0);
        assert_eq!(c.aabb_in_frustum(far, half), Containment::Outside);
        assert_eq!(c.aabb_in_frustum_no_far_clip(far, half), Containment::Inside);
    }

    #[test]
    fn corner_distance_and_spheres() {
        let c = camera();
        // tan(45) = 1 on both axes.
        assert!((c.frustum_corner_dist() - 100.0 * 3.0_f64.sqrt()).abs() < 1e-9);
        assert!(c.sphere_in_frustum(DVec3::new(5.0, 0.0, 0.0), 1.0));
        assert!(!c.sphere_in_frustum(DVec3::new(-5.0, 0.0, 0.0), 1.0));
        assert!((c.near_distance(DVec3::new(2.0, 0.0, 0.0)) - 1.5).abs() < 1e-12);
    }
}
