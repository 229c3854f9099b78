// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Occlusion query boxes, the silhouette fan table and the query name pool.

use alloc::vec::Vec;
use glam::DVec3;

/// Triangle fans over the silhouette of a box, one row per view octant.
///
/// Rows are indexed by the octant of `center - eye` (x -> bit 2, y -> bit 1,
/// z -> bit 0). Vertex indices use the same bit layout. Each fan starts at
/// the corner facing the eye and closes on its second vertex.
static OCCLUSION_INDICES: [[u8; 8]; 8] = [
    [0b111, 0b110, 0b010, 0b011, 0b001, 0b101, 0b100, 0b110],
    [0b110, 0b000, 0b010, 0b011, 0b111, 0b101, 0b100, 0b000],
    [0b101, 0b100, 0b110, 0b111, 0b011, 0b001, 0b000, 0b100],
    [0b100, 0b010, 0b110, 0b111, 0b101, 0b001, 0b000, 0b010],
    [0b011, 0b010, 0b000, 0b001, 0b101, 0b111, 0b110, 0b010],
    [0b010, 0b100, 0b000, 0b001, 0b011, 0b111, 0b110, 0b100],
    [0b001, 0b000, 0b100, 0b101, 0b111, 0b011, 0b010, 0b000],
    [0b000, 0b110, 0b100, 0b101, 0b001, 0b011, 0b010, 0b110],
];

/// Scale applied to a group's half-size for occlusion boxes.
pub const OCCLUSION_FUDGE: f64 = 1.01;

/// Octant of `center` as seen from `origin`, in fan-table bit order.
#[inline]
pub fn view_octant(origin: DVec3, center: DVec3) -> usize {
    let d = center - origin;
    (usize::from(d.x > 0.0) << 2) | (usize::from(d.y > 0.0) << 1) | usize::from(d.z > 0.0)
}

/// Triangle fan indices for the box at `center` seen from `origin`.
#[inline]
pub fn get_occlusion_indices(origin: DVec3, center: DVec3) -> &'static [u8; 8] {
    &OCCLUSION_INDICES[view_octant(origin, center)]
}

/// The eight corners of a slightly inflated box around `center` / `half`.
///
/// The inflation is `half * 1.01 + 0.1`, capped per axis at `half + 0.25`.
pub fn occlusion_box(center: DVec3, half: DVec3) -> [DVec3; 8] {
    let r = (half * OCCLUSION_FUDGE + DVec3::splat(0.1)).min(half + DVec3::splat(0.25));
    core::array::from_fn(|i| {
        let sign = |bit: usize| if i & bit != 0 { 1.0 } else { -1.0 };
        center + DVec3::new(sign(4) * r.x, sign(2) * r.y, sign(1) * r.z)
    })
}

/// Occlusion handling of a partition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum OcclusionMode {
    /// Occlusion state is ignored.
    Off,
    /// Groups already marked occluded are skipped, but no queries are issued.
    Passive,
    /// Queries are issued and read back every frame.
    #[default]
    Queries,
}

impl OcclusionMode {
    /// Whether occluded groups are skipped by culling.
    pub fn honors_occlusion(self) -> bool {
        self != Self::Off
    }

    /// Whether queries are issued and read back.
    pub fn issues_queries(self) -> bool {
        self == Self::Queries
    }
}

/// The renderer side of occlusion queries.
pub trait OcclusionBackend {
    /// Create a new query name.
    fn gen_query(&mut self) -> u32;

    /// Destroy a query name.
    fn delete_query(&mut self, name: u32);

    /// Draw the fan `indices` over `verts` counting samples into query `name`.
    fn run_query(&mut self, name: u32, verts: &[DVec3; 8], indices: &[u8; 8]);

    /// Samples that passed for query `name`.
    fn query_result(&mut self, name: u32) -> u32;
}

/// Recycles query names between groups.
#[derive(Clone, Debug, Default)]
pub struct QueryPool {
    free: Vec<u32>,
    allocated: usize,
}

impl QueryPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// A name from the free list, or a fresh one from `backend`.
    pub fn allocate(&mut self, backend: &mut dyn OcclusionBackend) -> u32 {
        self.allocated += 1;
        match self.free.pop() {
            Some(name) => name,
            None => backend.gen_query(),
        }
    }

    /// Return `name` for reuse.
    pub fn release(&mut self, name: u32) {
        debug_assert!(!self.free.contains(&name), "query name released twice");
        self.allocated = self.allocated.saturating_sub(1);
        self.free.push(name);
    }

    /// Names currently handed out.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Names waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Delete every free name through `backend`.
    pub fn clean_names(&mut self, backend: &mut dyn OcclusionBackend) {
        for name in self.free.drain(..) {
            backend.delete_query(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_rows_close_over_the_silhouette() {
        for (cypher, row) in OCCLUSION_INDICES.iter().enumerate() {
            assert!(row.iter().all(|&v| v < 8), "row {cypher} out of range");
            assert_eq!(usize::from(row[0]), cypher ^ 7, "row {cypher} apex");
            assert_eq!(row[7], row[1], "row {cypher} does not close");
            assert!(
                !row.contains(&u8::try_from(cypher).unwrap()),
                "row {cypher} includes the hidden corner"
            );
            // The six rim vertices are distinct.
            let mut rim: Vec<u8> = row[1..7].to_vec();
            rim.sort_unstable();
            rim.dedup();
            assert_eq!(rim.len(), 6, "row {cypher} rim repeats");
        }
    }

    #[test]
    fn fans_cover_the_silhouette_facing_the_eye() {
        let verts = occlusion_box(DVec3::ZERO, DVec3::ONE);
        for octant in 0..8_usize {
            let toward = DVec3::new(
                if octant & 4 != 0 { 1.0 } else { -1.0 },
                if octant & 2 != 0 { 1.0 } else { -1.0 },
                if octant & 1 != 0 { 1.0 } else { -1.0 },
            );
            let eye = -toward * 10.0;
            let row = get_occlusion_indices(eye, DVec3::ZERO);
            let corner = |i: usize| verts[usize::from(row[i])];

            let nearest = (0..8)
                .min_by(|&a, &b| verts[a].distance(eye).total_cmp(&verts[b].distance(eye)))
                .unwrap();
            assert_eq!(usize::from(row[0]), nearest, "octant {octant} apex");

            let mut seen = [false; 8];
            for &v in &row[..7] {
                seen[usize::from(v)] = true;
            }
            assert!(!seen[octant], "octant {octant} draws the far corner");
            assert_eq!(seen.iter().filter(|&&s| s).count(), 7, "octant {octant}");

            for i in 1..7 {
                // Rim neighbours share a box edge.
                assert_eq!((row[i] ^ row[i + 1]).count_ones(), 1, "octant {octant} rim {i}");
                let (a, b, c) = (corner(0), corner(i), corner(i + 1));
                let normal = (b - a).cross(c - a);
                assert!(
                    normal.dot(eye - a) > 0.0,
                    "octant {octant} triangle {i} faces away from the eye"
                );
            }
        }
    }

    #[test]
    fn octant_follows_direction_signs() {
        let o = DVec3::ZERO;
        assert_eq!(view_octant(o, DVec3::new(1.0, -1.0, -1.0)), 0b100);
        assert_eq!(view_octant(o, DVec3::new(-1.0, 1.0, 1.0)), 0b011);
        // Zero counts as negative.
        assert_eq!(view_octant(o, DVec3::ZERO), 0);
        assert_eq!(get_occlusion_indices(o, DVec3::splat(-1.0))[0], 0b111);
    }

    #[test]
    fn box_corners_encode_axis_facing() {
        let verts = occlusion_box(DVec3::new(10.0, 0.0, 0.0), DVec3::new(1.0, 100.0, 0.0));
        // x: 1.01 + 0.1 = 1.11; y: capped at 100.25; z: 0.1.
        assert!((verts[0].x - (10.0 - 1.11)).abs() < 1e-12);
        assert!((verts[0b100].x - (10.0 + 1.11)).abs() < 1e-12);
        assert!((verts[0b010].y - 100.25).abs() < 1e-12);
        assert!((verts[0b001].z - 0.1).abs() < 1e-12);
        assert!((verts[0b110].z + 0.1).abs() < 1e-12);
    }

    #[derive(Default)]
    struct Names {
        next: u32,
        deleted: Vec<u32>,
    }

    impl OcclusionBackend for Names {
        fn gen_query(&mut self) -> u32 {
            self.next += 1;
            self.next
        }
        fn delete_query(&mut self, name: u32) {
            self.deleted.push(name);
        }
        fn run_query(&mut self, _: u32, _: &[DVec3; 8], _: &[u8; 8]) {}
        fn query_result(&mut self, _: u32) -> u32 {
            1
        }
    }

    #[test]
    fn pool_reuses_released_names() {
        let mut backend = Names::default();
        let mut pool = QueryPool::new();
        let a = pool.allocate(&mut backend);
        let b = pool.allocate(&mut backend);
        assert_ne!(a, b);
        pool.release(a);
        assert_eq!(pool.allocate(&mut backend), a);
        assert_eq!(pool.allocated(), 2);
        pool.release(b);
        pool.clean_names(&mut backend);
        assert_eq!(backend.deleted, [b]);
        assert_eq!(pool.free_count(), 0);
    }
}
