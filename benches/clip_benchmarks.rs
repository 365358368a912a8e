//! Benchmarks for `poly_carve` clipping and downstream operations.
//!
//! Run with: `cargo bench --bench clip_benchmarks`
//!
//! These benchmarks test:
//! - Single-plane and multi-plane clipping in 2D and 3D
//! - Moment evaluation on clipped results
//! - Face extraction and tetrahedralization
//! - Degenerate collapse on near-duplicate geometry

use divan::{black_box, Bencher};
use glam::{DVec2, DVec3};
use poly_carve::{Plane2d, Plane3d, Polygon, Polyhedron};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() {
    divan::main();
}

// ============================================================================
// Test Data Generators
// ============================================================================

/// Regular n-gon inscribed in the unit circle.
fn regular_polygon(n: usize) -> Polygon {
    let positions: Vec<DVec2> = (0..n)
        .map(|k| {
            let theta = std::f64::consts::TAU * k as f64 / n as f64;
            DVec2::new(theta.cos(), theta.sin())
        })
        .collect();
    let neighbors: Vec<[usize; 2]> = (0..n).map(|k| [(k + n - 1) % n, (k + 1) % n]).collect();
    Polygon::from_adjacency(&positions, &neighbors).unwrap()
}

/// Unit cube with the canonical outward-oriented adjacency.
fn unit_cube() -> Polyhedron {
    let positions: Vec<DVec3> = [
        (0.0, 0.0, 0.0),
        (1.0, 0.0, 0.0),
        (1.0, 1.0, 0.0),
        (0.0, 1.0, 0.0),
        (0.0, 0.0, 1.0),
        (1.0, 0.0, 1.0),
        (1.0, 1.0, 1.0),
        (0.0, 1.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| DVec3::new(x, y, z))
    .collect();
    let neighbors = vec![
        vec![1, 4, 3],
        vec![5, 0, 2],
        vec![3, 6, 1],
        vec![7, 2, 0],
        vec![5, 7, 0],
        vec![1, 6, 4],
        vec![5, 2, 7],
        vec![4, 6, 3],
    ];
    Polyhedron::from_adjacency(&positions, &neighbors).unwrap()
}

/// Random unit vector from a seeded generator.
fn random_direction(rng: &mut StdRng) -> DVec3 {
    loop {
        let v = DVec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if v.length_squared() > 1.0e-6 {
            return v.normalize();
        }
    }
}

/// Planes through random interior points of the unit cube.
fn random_planes(count: usize, seed: u64) -> Vec<Plane3d> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|k| {
            let p0 = DVec3::new(
                rng.gen_range(0.2..0.8),
                rng.gen_range(0.2..0.8),
                rng.gen_range(0.2..0.8),
            );
            Plane3d::through_point(p0, random_direction(&mut rng)).with_id(k as i32)
        })
        .collect()
}

// ============================================================================
// 2D Clipping
// ============================================================================

#[divan::bench(args = [8, 64, 512])]
fn clip_polygon_one_plane(bencher: Bencher, n: usize) {
    let poly = regular_polygon(n);
    let plane = Plane2d::new(0.0, DVec2::new(0.8, 0.6));
    bencher.bench(|| {
        let mut p = poly.clone();
        p.clip(black_box(std::slice::from_ref(&plane)));
        p
    });
}

#[divan::bench]
fn clip_polygon_to_sliver(bencher: Bencher) {
    let poly = regular_polygon(64);
    let planes: Vec<Plane2d> = (0..8)
        .map(|k| {
            let theta = std::f64::consts::TAU * k as f64 / 8.0;
            Plane2d::new(0.9, DVec2::new(theta.cos(), theta.sin()))
        })
        .collect();
    bencher.bench(|| {
        let mut p = poly.clone();
        p.clip(black_box(&planes));
        p
    });
}

// ============================================================================
// 3D Clipping
// ============================================================================

#[divan::bench(args = [1, 4, 16])]
fn clip_polyhedron(bencher: Bencher, nplanes: usize) {
    let cube = unit_cube();
    let planes = random_planes(nplanes, 0x5eed);
    bencher.bench(|| {
        let mut p = cube.clone();
        p.clip(black_box(&planes));
        p
    });
}

#[divan::bench]
fn clip_polyhedron_miss(bencher: Bencher) {
    let cube = unit_cube();
    let planes = [Plane3d::new(3.0, DVec3::Z)];
    bencher.bench(|| {
        let mut p = cube.clone();
        p.clip(black_box(&planes));
        p
    });
}

// ============================================================================
// Downstream Operations
// ============================================================================

#[divan::bench(args = [1, 4, 16])]
fn moments_after_clip(bencher: Bencher, nplanes: usize) {
    let mut poly = unit_cube();
    poly.clip(&random_planes(nplanes, 0xface));
    bencher.bench(|| black_box(&poly).moments());
}

#[divan::bench]
fn extract_faces_clipped(bencher: Bencher) {
    let mut poly = unit_cube();
    poly.clip(&random_planes(4, 0xbeef));
    bencher.bench(|| black_box(&poly).extract_faces());
}

#[divan::bench]
fn split_into_tetrahedra_clipped(bencher: Bencher) {
    let mut poly = unit_cube();
    poly.clip(&random_planes(4, 0xbeef));
    bencher.bench(|| black_box(&poly).split_into_tetrahedra(0.0));
}

#[divan::bench]
fn collapse_degenerates_near_duplicates(bencher: Bencher) {
    // Clipping with two barely separated parallel planes leaves vertex
    // pairs a hair apart along the cuts.
    let mut poly = unit_cube();
    let n = DVec3::ONE.normalize();
    poly.clip(&[
        Plane3d::through_point(DVec3::splat(0.5), n),
        Plane3d::through_point(DVec3::splat(0.5) + 1.0e-9 * n, n),
    ]);
    bencher.bench(|| {
        let mut p = poly.clone();
        p.collapse_degenerates(1.0e-6);
        p
    });
}
