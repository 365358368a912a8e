//! Error types for polytope construction and topology diagnostics.

use std::fmt;

/// Rejection reasons for [`Polygon::from_adjacency`](crate::Polygon::from_adjacency)
/// and [`Polyhedron::from_adjacency`](crate::Polyhedron::from_adjacency).
///
/// Construction is all-or-nothing: on error no polytope is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjacencyError {
    /// The position and neighbor slices have different lengths.
    CountMismatch { positions: usize, neighbors: usize },

    /// A polyhedron vertex has fewer than 3 neighbors.
    TooFewNeighbors { vertex: usize, count: usize },

    /// A neighbor index is out of bounds.
    DanglingIndex { vertex: usize, neighbor: usize },
}

impl fmt::Display for AdjacencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch {
                positions,
                neighbors,
            } => {
                write!(
                    f,
                    "{positions} positions but {neighbors} neighbor lists supplied"
                )
            }
            Self::TooFewNeighbors { vertex, count } => {
                write!(f, "Vertex {vertex} has only {count} neighbors (need >=3)")
            }
            Self::DanglingIndex { vertex, neighbor } => {
                write!(f, "Vertex {vertex} references out-of-bounds index {neighbor}")
            }
        }
    }
}

impl std::error::Error for AdjacencyError {}

/// Inconsistencies in a polytope's vertex-neighbor graph.
///
/// Reported by the `validate` diagnostics. These indicate either a corrupted
/// input adjacency or a bug in an in-place operation; the clipping kernel
/// never produces them from well-formed inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// A live vertex references a slot beyond the vertex array.
    DanglingNeighbor { vertex: usize, neighbor: usize },

    /// A live vertex references a tombstoned vertex.
    DeadNeighbor { vertex: usize, neighbor: usize },

    /// 2D: `next(prev(v)) != v` or `prev(next(v)) != v`.
    OpenBoundary { vertex: usize },

    /// 3D: a live vertex has fewer than 3 neighbors.
    UnderconnectedVertex { vertex: usize, count: usize },

    /// 3D: directed edge `from -> to` has no reverse `to -> from`.
    MissingReverseEdge { from: usize, to: usize },

    /// 3D: the face walk starting along `from -> to` never returned to its
    /// starting edge.
    UnclosedFaceWalk { from: usize, to: usize },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingNeighbor { vertex, neighbor } => {
                write!(f, "Vertex {vertex} references non-existent vertex {neighbor}")
            }
            Self::DeadNeighbor { vertex, neighbor } => {
                write!(f, "Vertex {vertex} references tombstoned vertex {neighbor}")
            }
            Self::OpenBoundary { vertex } => {
                write!(f, "Boundary links through vertex {vertex} do not close")
            }
            Self::UnderconnectedVertex { vertex, count } => {
                write!(f, "Vertex {vertex} has only {count} neighbors (need >=3)")
            }
            Self::MissingReverseEdge { from, to } => {
                write!(f, "Directed edge {from} -> {to} has no reverse edge")
            }
            Self::UnclosedFaceWalk { from, to } => {
                write!(f, "Face walk from edge {from} -> {to} failed to close")
            }
        }
    }
}

impl std::error::Error for TopologyError {}
