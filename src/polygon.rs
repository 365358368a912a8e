//! Polygons as prev/next vertex cycles, clipped in place by half-planes.
//!
//! A [`Polygon`] stores its boundary as a doubly linked cycle over a dense
//! vertex array: `neighbors = [prev, next]`, with repeated `next` steps
//! walking the boundary counter-clockwise. Clipping against a [`Plane2d`]
//! keeps the portion with `compare(point) >= 0`, splicing interpolated
//! vertices into the cycle along the cut. A non-convex polygon cut into
//! several pieces stays in one `Polygon` as multiple disjoint cycles.

use std::fmt;

use glam::DVec2;
use itertools::Itertools;
use rustc_hash::FxHashSet;

use crate::error::{AdjacencyError, TopologyError};
use crate::UNSET_PLANE_ID;

// CORE GEOMETRIC TYPES

/// An oriented half-plane: `normal · p + dist = 0` is the boundary line and
/// points with `normal · p + dist >= 0` are **above** (kept by clipping).
///
/// `id` labels vertices spawned by this plane's cuts (see
/// [`Vertex2d::clips`]); it defaults to [`UNSET_PLANE_ID`] and never affects
/// geometry.
#[derive(Clone, Debug)]
pub struct Plane2d {
    /// Unit normal pointing into the kept half-plane.
    pub normal: DVec2,
    /// Signed distance term of the plane equation.
    pub dist: f64,
    /// Label stamped onto vertices this plane creates.
    pub id: i32,
}

impl Plane2d {
    /// Plane from its equation terms.
    #[must_use]
    pub const fn new(dist: f64, normal: DVec2) -> Self {
        Self {
            normal,
            dist,
            id: UNSET_PLANE_ID,
        }
    }

    /// Plane through `point` with the given unit `normal`.
    #[must_use]
    pub fn through_point(point: DVec2, normal: DVec2) -> Self {
        Self {
            normal,
            dist: -point.dot(normal),
            id: UNSET_PLANE_ID,
        }
    }

    /// Same plane with an id attached.
    #[must_use]
    pub const fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    /// Signed distance of `p` to the plane: positive above, negative below.
    #[inline]
    #[must_use]
    pub fn compare(&self, p: DVec2) -> f64 {
        self.normal.dot(p) + self.dist
    }

    /// Returns `true` if `p` is on the kept side (or exactly on the plane).
    #[inline]
    #[must_use]
    pub fn is_above(&self, p: DVec2) -> bool {
        self.compare(p) >= 0.0
    }
}

impl PartialEq for Plane2d {
    /// Geometric equality; `id` is a label and does not participate.
    fn eq(&self, rhs: &Self) -> bool {
        self.dist == rhs.dist && self.normal == rhs.normal
    }
}

impl PartialOrd for Plane2d {
    /// Planes sort by `dist`, giving callers a stable ordering criterion.
    fn partial_cmp(&self, rhs: &Self) -> Option<std::cmp::Ordering> {
        self.dist.partial_cmp(&rhs.dist)
    }
}

/// A boundary vertex of a [`Polygon`].
#[derive(Clone, Debug)]
pub struct Vertex2d {
    /// Position in the plane.
    pub position: DVec2,
    /// `[prev, next]` indices into the same polygon.
    pub neighbors: [usize; 2],
    /// Liveness tag: `1` live, `0` on the current clip plane (kept),
    /// `-1` tombstone. Between operations every stored vertex has `comp = 1`.
    pub comp: i32,
    /// Caller-owned scratch label; initialized to `-1`, never read or
    /// written by the kernel.
    pub id: i32,
    /// Ids of the planes whose cuts produced this vertex (empty for input
    /// vertices). Informational only.
    pub clips: FxHashSet<i32>,
}

impl Vertex2d {
    fn new(position: DVec2, neighbors: [usize; 2]) -> Self {
        Self {
            position,
            neighbors,
            comp: 1,
            id: -1,
            clips: FxHashSet::default(),
        }
    }

    /// Index of the previous vertex along the boundary.
    #[inline]
    #[must_use]
    pub const fn prev(&self) -> usize {
        self.neighbors[0]
    }

    /// Index of the next vertex along the boundary (counter-clockwise).
    #[inline]
    #[must_use]
    pub const fn next(&self) -> usize {
        self.neighbors[1]
    }

    #[inline]
    const fn is_live(&self) -> bool {
        self.comp >= 0
    }
}

// POLYGON

/// A faceted area: one or more closed counter-clockwise vertex cycles.
#[derive(Clone, Debug, Default)]
pub struct Polygon {
    verts: Vec<Vertex2d>,
}

impl Polygon {
    // CONSTRUCTION & ACCESS

    /// Build a polygon from positions and `[prev, next]` adjacency.
    ///
    /// The adjacency is copied verbatim and must describe closed
    /// counter-clockwise cycles; orientation is not repaired here.
    ///
    /// # Errors
    ///
    /// [`AdjacencyError`] if the slice lengths differ or an index is out of
    /// bounds. Nothing is constructed on error.
    pub fn from_adjacency(
        positions: &[DVec2],
        neighbors: &[[usize; 2]],
    ) -> Result<Self, AdjacencyError> {
        if positions.len() != neighbors.len() {
            return Err(AdjacencyError::CountMismatch {
                positions: positions.len(),
                neighbors: neighbors.len(),
            });
        }
        for (i, nb) in neighbors.iter().enumerate() {
            for &j in nb {
                if j >= positions.len() {
                    return Err(AdjacencyError::DanglingIndex {
                        vertex: i,
                        neighbor: j,
                    });
                }
            }
        }
        let verts = positions
            .iter()
            .zip_eq(neighbors)
            .map(|(&p, &nb)| Vertex2d::new(p, nb))
            .collect();
        Ok(Self { verts })
    }

    /// Returns `true` if no vertices remain (e.g. after clipping everything
    /// away).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    /// Number of live vertices.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.verts.iter().filter(|v| v.is_live()).count()
    }

    /// Returns the vertex at `idx`, if it exists and is live.
    #[must_use]
    pub fn vertex(&self, idx: usize) -> Option<&Vertex2d> {
        self.verts.get(idx).filter(|v| v.is_live())
    }

    /// Iterates over all live vertices with their indices.
    pub fn vertices(&self) -> impl Iterator<Item = (usize, &Vertex2d)> {
        self.verts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_live())
    }

    /// Axis-aligned bounds of the live vertices, or `None` when empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<(DVec2, DVec2)> {
        let mut live = self.verts.iter().filter(|v| v.is_live());
        let first = live.next()?.position;
        let (lo, hi) = live.fold((first, first), |(lo, hi), v| {
            (lo.min(v.position), hi.max(v.position))
        });
        Some((lo, hi))
    }

    // CLIPPING

    /// Clip against `planes` in order, keeping the portion above each.
    ///
    /// Each plane pass classifies every vertex by the exact sign of
    /// [`Plane2d::compare`], splices an interpolated vertex into every edge
    /// that crosses the plane, drops the below side, and compacts. Clipping
    /// a list is identical to clipping one plane at a time, and clipping is
    /// deterministic; once the polygon is empty remaining planes are
    /// skipped.
    pub fn clip(&mut self, planes: &[Plane2d]) {
        for plane in planes {
            if self.verts.is_empty() {
                break;
            }
            self.clip_once(plane);
        }
    }

    fn clip_once(&mut self, plane: &Plane2d) {
        // Cheap rejection against the bounding box: strictly above on the
        // whole box means no cut, strictly below means nothing survives.
        if let Some((lo, hi)) = self.bounding_box() {
            let nearest = DVec2::new(
                if plane.normal.x >= 0.0 { lo.x } else { hi.x },
                if plane.normal.y >= 0.0 { lo.y } else { hi.y },
            );
            let farthest = lo + hi - nearest;
            if plane.compare(nearest) > 0.0 {
                log::trace!("plane {} misses the polygon", plane.id);
                return;
            }
            if plane.compare(farthest) < 0.0 {
                log::debug!("plane {} rejects the whole polygon", plane.id);
                self.verts.clear();
                return;
            }
        }

        // Classify by exact sign; on-plane vertices are kept as-is.
        let mut any_above = false;
        let mut any_below = false;
        for v in &mut self.verts {
            let d = plane.compare(v.position);
            v.comp = if d > 0.0 {
                any_above = true;
                1
            } else if d < 0.0 {
                any_below = true;
                -1
            } else {
                0
            };
        }
        if !any_below {
            for v in &mut self.verts {
                if v.comp == 0 {
                    v.clips.insert(plane.id);
                }
                v.comp = 1;
            }
            return;
        }
        if !any_above {
            log::debug!("plane {} rejects the whole polygon", plane.id);
            self.verts.clear();
            return;
        }
        for v in &mut self.verts {
            if v.comp == 0 {
                v.clips.insert(plane.id);
            }
        }

        // Splice a new vertex into every edge that crosses the plane. Each
        // surviving vertex keeps its slot; new vertices are appended. The
        // `pending` list holds every vertex whose outgoing edge died and the
        // first tombstone on that edge.
        let n0 = self.verts.len();
        let mut pending: Vec<(usize, usize)> = Vec::new();
        for i in 0..n0 {
            match self.verts[i].comp {
                1 => {
                    let [iprev, inext] = self.verts[i].neighbors;
                    if self.verts[inext].comp == -1 {
                        let w = self.spawn(plane, i, inext);
                        self.verts[w].neighbors = [i, usize::MAX];
                        self.verts[i].neighbors[1] = w;
                        pending.push((w, inext));
                    }
                    if self.verts[iprev].comp == -1 {
                        let w = self.spawn(plane, i, iprev);
                        self.verts[w].neighbors = [usize::MAX, i];
                        self.verts[i].neighbors[0] = w;
                    }
                }
                0 => {
                    let inext = self.verts[i].neighbors[1];
                    if self.verts[inext].comp == -1 {
                        pending.push((i, inext));
                    }
                }
                _ => {}
            }
        }

        // Close the cut: walk each dead chain along the original `next`
        // pointers until a kept vertex appears. A kept `comp == 1` vertex
        // was entered through an ascending crossing, so its `prev` slot
        // already holds the new vertex spawned there; a kept on-plane vertex
        // is joined directly.
        for (start, first_dead) in pending {
            let mut c = first_dead;
            while self.verts[c].comp == -1 {
                c = self.verts[c].neighbors[1];
            }
            let target = if self.verts[c].comp == 1 {
                let t = self.verts[c].neighbors[0];
                debug_assert_eq!(self.verts[t].comp, 2, "ascending cut vertex missing");
                t
            } else {
                c
            };
            self.verts[start].neighbors[1] = target;
            self.verts[target].neighbors[0] = start;
        }

        log::trace!(
            "plane {} cut the polygon: {} of {} vertices survive",
            plane.id,
            self.verts.iter().filter(|v| v.comp >= 0).count(),
            n0
        );
        self.compact();
    }

    /// Append the interpolated vertex for the crossing edge `above -> below`.
    fn spawn(&mut self, plane: &Plane2d, above: usize, below: usize) -> usize {
        let pa = self.verts[above].position;
        let pb = self.verts[below].position;
        let da = plane.compare(pa);
        let db = plane.compare(pb);
        // Signs differ strictly, so t is in (0, 1).
        let t = da / (da - db);
        let mut clips: FxHashSet<i32> = self.verts[above]
            .clips
            .union(&self.verts[below].clips)
            .copied()
            .collect();
        clips.insert(plane.id);
        self.verts.push(Vertex2d {
            position: pa + t * (pb - pa),
            neighbors: [usize::MAX; 2],
            comp: 2,
            id: -1,
            clips,
        });
        self.verts.len() - 1
    }

    /// Drop tombstones, renumber neighbors, and reset `comp` to 1.
    fn compact(&mut self) {
        let mut remap = vec![usize::MAX; self.verts.len()];
        let mut k = 0;
        for (i, v) in self.verts.iter().enumerate() {
            if v.is_live() {
                remap[i] = k;
                k += 1;
            }
        }
        self.verts.retain(Vertex2d::is_live);
        for v in &mut self.verts {
            v.comp = 1;
            for n in &mut v.neighbors {
                debug_assert_ne!(remap[*n], usize::MAX, "live vertex references tombstone");
                *n = remap[*n];
            }
        }
    }

    // MOMENTS

    /// Signed area and centroid of the polygon.
    ///
    /// The shoelace sum runs relative to the first live vertex, one boundary
    /// loop at a time, so disjoint pieces accumulate together. An empty or
    /// zero-area polygon reports `(0.0, DVec2::ZERO)`. A clockwise input
    /// yields a negative area unchanged.
    #[must_use]
    pub fn moments(&self) -> (f64, DVec2) {
        let Some((_, first)) = self.vertices().next() else {
            return (0.0, DVec2::ZERO);
        };
        let p0 = first.position;
        let mut m0 = 0.0;
        let mut m1 = DVec2::ZERO;
        for cycle in self.extract_faces() {
            for (&i, &j) in cycle.iter().circular_tuple_windows() {
                let a = self.verts[i].position - p0;
                let b = self.verts[j].position - p0;
                let da = 0.5 * a.perp_dot(b);
                m0 += da;
                m1 += da * (self.verts[i].position + self.verts[j].position + p0) / 3.0;
            }
        }
        let centroid = if m0 == 0.0 { DVec2::ZERO } else { m1 / m0 };
        (m0, centroid)
    }

    // DEGENERATE COLLAPSE

    /// Merge boundary-adjacent vertices within `tol` of each other until a
    /// full pass makes no merges, then compact.
    ///
    /// Each merge keeps the lower-indexed vertex of the pair, unions the two
    /// `clips` sets, and re-closes the cycle. `tol = 0.0` merges exact
    /// coordinate duplicates only. Loops may legitimately shrink below three
    /// vertices; such remnants simply report zero moments.
    pub fn collapse_degenerates(&mut self, tol: f64) {
        self.merge_within(tol);
        self.compact();
    }

    /// Merge passes without the terminal compaction; indices of surviving
    /// vertices are preserved.
    fn merge_within(&mut self, tol: f64) {
        let tol2 = tol * tol;
        loop {
            let mut merged = false;
            for i in 0..self.verts.len() {
                if !self.verts[i].is_live() {
                    continue;
                }
                let j = self.verts[i].neighbors[1];
                if j == i || !self.verts[j].is_live() {
                    continue;
                }
                let gap = self.verts[i].position - self.verts[j].position;
                if gap.length_squared() <= tol2 {
                    self.merge_edge(i, j);
                    merged = true;
                }
            }
            if !merged {
                break;
            }
        }
    }

    /// Contract the boundary edge `i -> next(i) == j`, keeping the
    /// lower-indexed endpoint.
    fn merge_edge(&mut self, i: usize, j: usize) {
        debug_assert_eq!(self.verts[i].neighbors[1], j);
        let (keep, drop) = if i < j { (i, j) } else { (j, i) };
        let drop_clips: Vec<i32> = self.verts[drop].clips.iter().copied().collect();
        self.verts[keep].clips.extend(drop_clips);
        if drop == j {
            let after = self.verts[j].neighbors[1];
            self.verts[i].neighbors[1] = after;
            self.verts[after].neighbors[0] = i;
        } else {
            let before = self.verts[i].neighbors[0];
            self.verts[j].neighbors[0] = before;
            self.verts[before].neighbors[1] = j;
        }
        self.verts[drop].comp = -1;
    }

    // FACE EXTRACTION

    /// The boundary loops, each as vertex indices in walk order.
    ///
    /// A connected polygon yields a single loop; clipping a non-convex
    /// polygon may leave several.
    ///
    /// # Panics
    ///
    /// Panics if a boundary walk re-enters a vertex without closing, which
    /// can only happen on a corrupted adjacency.
    #[must_use]
    pub fn extract_faces(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.verts.len()];
        let mut loops = Vec::new();
        for start in 0..self.verts.len() {
            if !self.verts[start].is_live() || seen[start] {
                continue;
            }
            let mut cycle = Vec::new();
            let mut c = start;
            loop {
                assert!(!seen[c], "boundary walk re-entered vertex {c}");
                seen[c] = true;
                cycle.push(c);
                c = self.verts[c].neighbors[1];
                if c == start {
                    break;
                }
            }
            loops.push(cycle);
        }
        loops
    }

    /// For each face, the plane ids common to every vertex on it.
    ///
    /// A boundary stretch created by a single cut reports exactly that
    /// plane's id; faces containing any original vertex report the empty
    /// set.
    #[must_use]
    pub fn common_face_clips(&self, faces: &[Vec<usize>]) -> Vec<FxHashSet<i32>> {
        faces
            .iter()
            .map(|face| {
                let mut ids = face
                    .first()
                    .map(|&i| self.verts[i].clips.clone())
                    .unwrap_or_default();
                for &i in &face[1..] {
                    ids.retain(|id| self.verts[i].clips.contains(id));
                }
                ids
            })
            .collect()
    }

    // TRIANGULATION

    /// Fan-triangulate into index triples, assuming the polygon is
    /// star-shaped from its lowest-index vertex.
    ///
    /// With `tol > 0.0` the fan runs on an internally collapsed copy whose
    /// surviving vertices keep their slots, so the returned indices are
    /// valid for `self`. Degenerate (non-positive area) triangles are
    /// skipped. Disjoint loops are fanned independently.
    #[must_use]
    pub fn split_into_triangles(&self, tol: f64) -> Vec<[usize; 3]> {
        if tol > 0.0 {
            let mut collapsed = self.clone();
            collapsed.merge_within(tol);
            return collapsed.fan_triangles(tol);
        }
        self.fan_triangles(tol)
    }

    fn fan_triangles(&self, tol: f64) -> Vec<[usize; 3]> {
        let mut tris = Vec::new();
        for cycle in self.extract_faces() {
            let Some(&apex) = cycle.iter().min() else {
                continue;
            };
            let p0 = self.verts[apex].position;
            for (&i, &j) in cycle.iter().circular_tuple_windows() {
                if i == apex || j == apex {
                    continue;
                }
                let area = 0.5
                    * (self.verts[i].position - p0).perp_dot(self.verts[j].position - p0);
                if area <= tol * tol {
                    continue;
                }
                tris.push([apex, i, j]);
            }
        }
        tris
    }

    // DIAGNOSTICS

    /// Check the boundary invariants: live neighbors and two-sided closure.
    ///
    /// # Errors
    ///
    /// The first [`TopologyError`] found, if any.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (i, v) in self.vertices() {
            for &n in &v.neighbors {
                if n >= self.verts.len() {
                    return Err(TopologyError::DanglingNeighbor {
                        vertex: i,
                        neighbor: n,
                    });
                }
                if !self.verts[n].is_live() {
                    return Err(TopologyError::DeadNeighbor {
                        vertex: i,
                        neighbor: n,
                    });
                }
            }
            if self.verts[v.next()].neighbors[0] != i || self.verts[v.prev()].neighbors[1] != i {
                return Err(TopologyError::OpenBoundary { vertex: i });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Polygon[{} vertices]", self.live_count())?;
        for (i, v) in self.vertices() {
            writeln!(
                f,
                "  {i}: ({:.10e}, {:.10e}) prev={} next={} comp={} clips={{{}}}",
                v.position.x,
                v.position.y,
                v.prev(),
                v.next(),
                v.comp,
                v.clips.iter().sorted().join(", "),
            )?;
        }
        Ok(())
    }
}
