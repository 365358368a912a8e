//! # `poly_carve`
//!
//! In-place plane clipping of faceted volumes: convex or non-convex polygons
//! in 2D and polyhedra in 3D, truncated against an ordered list of oriented
//! planes so that only the portion **above** each plane survives
//! (`plane.compare(point) >= 0`).
//!
//! This is the computational core of physically-conservative remeshing and
//! voxelization schemes in the spirit of Powell & Abel (2015): overlaps
//! between a source and a target mesh are intersected plane by plane so that
//! mass, momentum, and other integrated quantities can be transferred
//! exactly between meshes.
//!
//! ## Representation
//!
//! A polytope is a dense array of vertices, each carrying its position and
//! the indices of its neighbors: exactly `[prev, next]` along the boundary
//! in 2D, a cyclic list of >=3 incident edges in 3D ordered consistently
//! with outward face orientation. Clipping rewrites this graph in place,
//! appending interpolated vertices along each cut and tombstoning the
//! clipped ones; every pass ends compacted, so the array never exposes dead
//! slots between operations.
//!
//! ## Quick Start
//!
//! ```rust
//! use poly_carve::{Plane2d, Polygon};
//! use poly_carve::math::DVec2;
//!
//! // Unit square, counter-clockwise, neighbors as [prev, next].
//! let positions = [
//!     DVec2::new(0.0, 0.0),
//!     DVec2::new(1.0, 0.0),
//!     DVec2::new(1.0, 1.0),
//!     DVec2::new(0.0, 1.0),
//! ];
//! let neighbors = [[3, 1], [0, 2], [1, 3], [2, 0]];
//! let mut square = Polygon::from_adjacency(&positions, &neighbors).unwrap();
//!
//! // Keep the half with x >= 0.5.
//! square.clip(&[Plane2d::new(-0.5, DVec2::X)]);
//!
//! let (area, centroid) = square.moments();
//! assert!((area - 0.5).abs() < 1e-12);
//! assert!((centroid - DVec2::new(0.75, 0.5)).length() < 1e-12);
//! ```
//!
//! ## Operations
//!
//! Both dimensions offer the same surface: construction from positions plus
//! adjacency, [`clip`](Polygon::clip) against a plane list, zeroth and first
//! [`moments`](Polygon::moments), tolerance-driven
//! [`collapse_degenerates`](Polygon::collapse_degenerates), face loop
//! extraction, per-face clip-set intersection, and decomposition into
//! triangles / tetrahedra for star-shaped results.
//!
//! ## Numerical model
//!
//! Everything is `f64` with an explicit tolerance model: vertex
//! classification against a plane is an exact sign test, and all fuzziness
//! lives in `collapse_degenerates`. Empty results are ordinary values, not
//! errors. The kernel holds no global state and takes no locks; distinct
//! polytopes may be clipped from distinct threads freely.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
pub mod polygon;
pub mod polyhedron;

pub use error::{AdjacencyError, TopologyError};
pub use polygon::{Plane2d, Polygon, Vertex2d};
pub use polyhedron::{Plane3d, Polyhedron, Vertex3d};

/// Plane id used when the caller did not assign one.
pub const UNSET_PLANE_ID: i32 = i32::MIN;

/// Re-export glam types for convenience
pub mod math {
    pub use glam::{DVec2, DVec3};
}
