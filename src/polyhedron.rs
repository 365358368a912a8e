//! Polyhedra as cyclic vertex-neighbor graphs, clipped in place by
//! half-spaces.
//!
//! A [`Polyhedron`] vertex stores the indices of its >=3 neighbors in a
//! cyclic order tied to outward face orientation: a face walk arriving at
//! `v` from `u` continues to the neighbor cyclically **preceding** `u` in
//! `v`'s list, and under that rule every face loop reads counter-clockwise
//! viewed from outside the solid. That single convention is what clipping,
//! face extraction, moments, and tetrahedralization all rely on; the
//! initializer copies adjacency verbatim and does not repair orientation.

use std::fmt;

use glam::DVec3;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::{AdjacencyError, TopologyError};
use crate::UNSET_PLANE_ID;

/// Neighbor list of a polyhedron vertex; nearly always 3 entries.
pub type NeighborList = SmallVec<[usize; 6]>;

// CORE GEOMETRIC TYPES

/// An oriented half-space: points with `normal · p + dist >= 0` are
/// **above** and survive clipping.
///
/// The normal is expected to be unit length; constructors debug-assert it.
/// `id` labels vertices spawned by this plane's cuts and defaults to
/// [`UNSET_PLANE_ID`].
#[derive(Clone, Debug)]
pub struct Plane3d {
    /// Unit normal pointing into the kept half-space.
    pub normal: DVec3,
    /// Signed distance term of the plane equation.
    pub dist: f64,
    /// Label stamped onto vertices this plane creates.
    pub id: i32,
}

impl Plane3d {
    /// Plane from its equation terms.
    #[must_use]
    pub fn new(dist: f64, normal: DVec3) -> Self {
        debug_assert!((normal.length() - 1.0).abs() < 1.0e-10);
        Self {
            normal,
            dist,
            id: UNSET_PLANE_ID,
        }
    }

    /// Plane through `point` with the given unit `normal`.
    #[must_use]
    pub fn through_point(point: DVec3, normal: DVec3) -> Self {
        debug_assert!((normal.length() - 1.0).abs() < 1.0e-10);
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
    pub fn compare(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.dist
    }

    /// Returns `true` if `p` is on the kept side (or exactly on the plane).
    #[inline]
    #[must_use]
    pub fn is_above(&self, p: DVec3) -> bool {
        self.compare(p) >= 0.0
    }
}

impl PartialEq for Plane3d {
    /// Geometric equality; `id` is a label and does not participate.
    fn eq(&self, rhs: &Self) -> bool {
        self.dist == rhs.dist && self.normal == rhs.normal
    }
}

impl PartialOrd for Plane3d {
    /// Planes sort by `dist`, giving callers a stable ordering criterion.
    fn partial_cmp(&self, rhs: &Self) -> Option<std::cmp::Ordering> {
        self.dist.partial_cmp(&rhs.dist)
    }
}

/// A vertex of a [`Polyhedron`].
#[derive(Clone, Debug)]
pub struct Vertex3d {
    /// Position in space.
    pub position: DVec3,
    /// Indices of the neighboring vertices, in the cyclic order described
    /// on [`Polyhedron`].
    pub neighbors: NeighborList,
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

impl Vertex3d {
    fn new(position: DVec3, neighbors: NeighborList) -> Self {
        Self {
            position,
            neighbors,
            comp: 1,
            id: -1,
            clips: FxHashSet::default(),
        }
    }

    #[inline]
    const fn is_live(&self) -> bool {
        self.comp >= 0
    }
}

// POLYHEDRON

/// A faceted volume encoded purely by vertex adjacency.
///
/// Faces are implicit: the walk rule on the cyclic neighbor lists (see the
/// module docs) recovers every face loop counter-clockwise from outside.
#[derive(Clone, Debug, Default)]
pub struct Polyhedron {
    verts: Vec<Vertex3d>,
}

impl Polyhedron {
    // CONSTRUCTION & ACCESS

    /// Build a polyhedron from positions and cyclic neighbor lists.
    ///
    /// The adjacency is copied verbatim and must already satisfy the
    /// outward-orientation convention; [`validate`](Self::validate) can
    /// check the structural part of it.
    ///
    /// # Errors
    ///
    /// [`AdjacencyError`] if the slice lengths differ, a list has fewer
    /// than 3 entries, or an index is out of bounds. Nothing is constructed
    /// on error.
    pub fn from_adjacency(
        positions: &[DVec3],
        neighbors: &[Vec<usize>],
    ) -> Result<Self, AdjacencyError> {
        if positions.len() != neighbors.len() {
            return Err(AdjacencyError::CountMismatch {
                positions: positions.len(),
                neighbors: neighbors.len(),
            });
        }
        for (i, nb) in neighbors.iter().enumerate() {
            if nb.len() < 3 {
                return Err(AdjacencyError::TooFewNeighbors {
                    vertex: i,
                    count: nb.len(),
                });
            }
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
            .map(|(&p, nb)| Vertex3d::new(p, NeighborList::from_slice(nb)))
            .collect();
        Ok(Self { verts })
    }

    /// Returns `true` if no vertices remain.
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
    pub fn vertex(&self, idx: usize) -> Option<&Vertex3d> {
        self.verts.get(idx).filter(|v| v.is_live())
    }

    /// Iterates over all live vertices with their indices.
    pub fn vertices(&self) -> impl Iterator<Item = (usize, &Vertex3d)> {
        self.verts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_live())
    }

    /// Axis-aligned bounds of the live vertices, or `None` when empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<(DVec3, DVec3)> {
        let mut live = self.verts.iter().filter(|v| v.is_live());
        let first = live.next()?.position;
        let (lo, hi) = live.fold((first, first), |(lo, hi), v| {
            (lo.min(v.position), hi.max(v.position))
        });
        Some((lo, hi))
    }

    /// The face-walk step: arriving at `at` from `from`, the face continues
    /// to the neighbor cyclically preceding `from` in `at`'s list.
    fn next_in_face_loop(&self, at: usize, from: usize) -> usize {
        let nb = &self.verts[at].neighbors;
        let k = nb
            .iter()
            .position(|&n| n == from)
            .expect("face walk entered a vertex that does not list the incoming edge");
        if k == 0 {
            nb[nb.len() - 1]
        } else {
            nb[k - 1]
        }
    }

    // CLIPPING

    /// Clip against `planes` in order, keeping the portion above each.
    ///
    /// Identical semantics to the 2D clipper: exact sign classification,
    /// one interpolated vertex per crossing edge, in-place graph rewrite,
    /// compaction after every plane. The new on-plane vertices chain into
    /// cap faces whose outward normal is the negated plane normal.
    pub fn clip(&mut self, planes: &[Plane3d]) {
        for plane in planes {
            if self.verts.is_empty() {
                break;
            }
            self.clip_once(plane);
        }
    }

    #[expect(clippy::too_many_lines)]
    fn clip_once(&mut self, plane: &Plane3d) {
        // Cheap rejection against the bounding box.
        if let Some((lo, hi)) = self.bounding_box() {
            let nearest = DVec3::new(
                if plane.normal.x >= 0.0 { lo.x } else { hi.x },
                if plane.normal.y >= 0.0 { lo.y } else { hi.y },
                if plane.normal.z >= 0.0 { lo.z } else { hi.z },
            );
            let farthest = lo + hi - nearest;
            if plane.compare(nearest) > 0.0 {
                log::trace!("plane {} misses the polyhedron", plane.id);
                return;
            }
            if plane.compare(farthest) < 0.0 {
                log::debug!("plane {} rejects the whole polyhedron", plane.id);
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
            log::debug!("plane {} rejects the whole polyhedron", plane.id);
            self.verts.clear();
            return;
        }
        for v in &mut self.verts {
            if v.comp == 0 {
                v.clips.insert(plane.id);
            }
        }

        // One new vertex per descending directed edge. The new vertex takes
        // over the dead endpoint's slot in the surviving endpoint's cycle;
        // tombstoned cycles stay untouched so the relink walks below can
        // still traverse the removed region.
        let n0 = self.verts.len();
        let mut crossings: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut spawned: Vec<(usize, usize, usize)> = Vec::new();
        for i in 0..n0 {
            if self.verts[i].comp != 1 {
                continue;
            }
            for j in 0..self.verts[i].neighbors.len() {
                let jn = self.verts[i].neighbors[j];
                if self.verts[jn].comp != -1 {
                    continue;
                }
                let w = self.spawn(plane, i, jn);
                self.verts[i].neighbors[j] = w;
                crossings.insert((i, jn), w);
                spawned.push((w, i, jn));
            }
        }

        // Give every new vertex its two in-plane neighbors.
        //
        // `x` closes the face that dives below through the edge `a -> b`:
        // walk that face onward through the tombstones and resolve the
        // crossing where it climbs back out. `y` closes the face on the
        // other side of the edge: walk the already-patched surviving loop
        // `w -> a -> ...` until it reaches the plane. The cyclic order
        // `[a, y, x]` routes the cap walk `x -> w -> y`, which is what makes
        // the cap's outward normal come out as the negated plane normal.
        for &(w, a, b) in &spawned {
            let x = self.resolve_cut_exit(&crossings, a, b);
            let mut iprev = w;
            let mut icur = a;
            let mut steps = 0;
            while self.verts[icur].comp == 1 {
                let nxt = self.next_in_face_loop(icur, iprev);
                iprev = icur;
                icur = nxt;
                steps += 1;
                assert!(steps <= n0, "surviving face walk failed to reach the cut");
            }
            let y = icur;
            self.verts[w].neighbors = NeighborList::from_slice(&[a, y, x]);
        }

        // On-plane vertices lie on the cap boundary already. Each of their
        // tombstoned neighbors stands for the two faces flanking that dead
        // edge, so the slot is replaced by a pair of exits: `z` from the
        // face arriving through the dead edge (followed onward across the
        // kept side) and `x` from the face leaving through it (followed
        // through the removed region). Duplicates scrub out afterwards.
        for i in 0..n0 {
            if self.verts[i].comp != 0 {
                continue;
            }
            let original = self.verts[i].neighbors.clone();
            if original.iter().all(|&jn| self.verts[jn].comp != -1) {
                continue;
            }
            let mut patched = NeighborList::new();
            for (j, &jn) in original.iter().enumerate() {
                if self.verts[jn].comp != -1 {
                    patched.push(jn);
                    continue;
                }
                let x = self.resolve_cut_exit(&crossings, i, jn);
                let s = original[(j + original.len() - 1) % original.len()];
                let z = match self.verts[s].comp {
                    -1 => self.resolve_cut_exit(&crossings, i, s),
                    1 => {
                        let (mut u, mut v) = (i, s);
                        let mut steps = 0;
                        while self.verts[v].comp == 1 {
                            let nxt = self.next_in_face_loop(v, u);
                            u = v;
                            v = nxt;
                            steps += 1;
                            assert!(steps <= n0, "surviving face walk failed to reach the cut");
                        }
                        v
                    }
                    _ => s,
                };
                patched.push(z);
                patched.push(x);
            }
            self.verts[i].neighbors = patched;
            self.scrub_cycle(i);
            if self.verts[i].neighbors.is_empty() {
                self.verts[i].comp = -1;
            }
        }

        log::trace!(
            "plane {} cut the polyhedron: {} of {} vertices survive, {} created",
            plane.id,
            self.verts.iter().filter(|v| v.comp >= 0).count(),
            n0,
            spawned.len()
        );
        self.compact();
    }

    /// Append the interpolated vertex for the crossing edge `above -> below`.
    fn spawn(&mut self, plane: &Plane3d, above: usize, below: usize) -> usize {
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
        self.verts.push(Vertex3d {
            position: pa + t * (pb - pa),
            neighbors: NeighborList::new(),
            comp: 2,
            id: -1,
            clips,
        });
        self.verts.len() - 1
    }

    /// Follow the face that enters the removed region along `from -> dead`
    /// until it climbs back to the clip plane, and return the vertex sitting
    /// there: a crossing spawned this pass, or a kept on-plane vertex.
    fn resolve_cut_exit(
        &self,
        crossings: &FxHashMap<(usize, usize), usize>,
        from: usize,
        dead: usize,
    ) -> usize {
        let mut iprev = from;
        let mut icur = dead;
        let mut steps = 0;
        while self.verts[icur].comp == -1 {
            let nxt = self.next_in_face_loop(icur, iprev);
            iprev = icur;
            icur = nxt;
            steps += 1;
            assert!(
                steps <= self.verts.len(),
                "clipped face walk failed to leave the removed region"
            );
        }
        if self.verts[icur].comp == 0 {
            icur
        } else {
            *crossings
                .get(&(icur, iprev))
                .expect("clipped face walk exited through an edge with no crossing")
        }
    }

    /// Drop self-references and cyclically repeated entries from a neighbor
    /// list.
    fn scrub_cycle(&mut self, i: usize) {
        let nb = &mut self.verts[i].neighbors;
        nb.retain(|&mut n| n != i);
        let mut k = 0;
        while nb.len() > 1 && k < nb.len() {
            if nb[k] == nb[(k + 1) % nb.len()] {
                nb.remove(k);
            } else {
                k += 1;
            }
        }
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
        self.verts.retain(Vertex3d::is_live);
        for v in &mut self.verts {
            v.comp = 1;
            for n in &mut v.neighbors {
                debug_assert_ne!(remap[*n], usize::MAX, "live vertex references tombstone");
                *n = remap[*n];
            }
        }
    }

    // MOMENTS

    /// Signed volume and centroid.
    ///
    /// Every face is fanned from its first vertex into signed tetrahedra
    /// against the first live vertex's position; outward-oriented input
    /// gives positive volume. Empty or zero-volume polyhedra report
    /// `(0.0, DVec3::ZERO)`.
    #[must_use]
    pub fn moments(&self) -> (f64, DVec3) {
        let Some((_, first)) = self.vertices().next() else {
            return (0.0, DVec3::ZERO);
        };
        let origin = first.position;
        let mut six_m0 = 0.0;
        let mut m1 = DVec3::ZERO;
        for face in self.extract_faces() {
            if face.len() < 3 {
                continue;
            }
            let q0 = self.verts[face[0]].position - origin;
            for k in 1..face.len() - 1 {
                let q1 = self.verts[face[k]].position - origin;
                let q2 = self.verts[face[k + 1]].position - origin;
                let dv = q0.dot(q1.cross(q2));
                six_m0 += dv;
                m1 += dv * (q0 + q1 + q2);
            }
        }
        let m0 = six_m0 / 6.0;
        let centroid = if m0 == 0.0 {
            DVec3::ZERO
        } else {
            origin + m1 / (24.0 * m0)
        };
        (m0, centroid)
    }

    // DEGENERATE COLLAPSE

    /// Merge edge-adjacent vertices within `tol` of each other until a full
    /// pass makes no merges, removing pinched remnants after each pass, then
    /// compact.
    ///
    /// Each merge contracts the edge into its lower-indexed endpoint: the
    /// absorbed vertex's fan is spliced into the survivor's cycle in place,
    /// and the two `clips` sets are unioned. Vertices left with fewer than
    /// three distinct neighbors (collapsed faces, pinched edges) are
    /// dissolved, cascading. `tol = 0.0` merges exact coordinate duplicates
    /// only.
    pub fn collapse_degenerates(&mut self, tol: f64) {
        self.merge_within(tol);
        self.compact();
    }

    /// Merge and pinch-removal passes without the terminal compaction;
    /// indices of surviving vertices are preserved.
    fn merge_within(&mut self, tol: f64) {
        let tol2 = tol * tol;
        loop {
            let merged = self.merge_pass(tol2);
            self.remove_pinches();
            if !merged {
                break;
            }
        }
    }

    fn merge_pass(&mut self, tol2: f64) -> bool {
        let mut merged = false;
        for i in 0..self.verts.len() {
            if !self.verts[i].is_live() {
                continue;
            }
            let mut j = 0;
            while j < self.verts[i].neighbors.len() {
                let n = self.verts[i].neighbors[j];
                if n == i || !self.verts[n].is_live() {
                    j += 1;
                    continue;
                }
                let gap = self.verts[i].position - self.verts[n].position;
                if gap.length_squared() <= tol2 {
                    self.contract_edge(i, n);
                    merged = true;
                    if !self.verts[i].is_live() {
                        break;
                    }
                    j = 0;
                } else {
                    j += 1;
                }
            }
        }
        merged
    }

    /// Contract the edge `a - b` into its lower-indexed endpoint, splicing
    /// the absorbed fan into the survivor's cycle in place.
    fn contract_edge(&mut self, a: usize, b: usize) {
        let (keep, drop) = if a < b { (a, b) } else { (b, a) };
        let kpos = self.verts[keep]
            .neighbors
            .iter()
            .position(|&n| n == drop)
            .expect("contracted endpoints are not adjacent");
        let dpos = self.verts[drop]
            .neighbors
            .iter()
            .position(|&n| n == keep)
            .expect("contracted endpoints are not adjacent");

        // The absorbed cycle, rotated to start just after the survivor.
        let dn = self.verts[drop].neighbors.clone();
        let fan: NeighborList = (1..dn.len()).map(|k| dn[(dpos + k) % dn.len()]).collect();

        let mut spliced = NeighborList::new();
        spliced.extend_from_slice(&self.verts[keep].neighbors[..kpos]);
        spliced.extend_from_slice(&fan);
        spliced.extend_from_slice(&self.verts[keep].neighbors[kpos + 1..]);
        self.verts[keep].neighbors = spliced;

        for &m in &fan {
            for slot in &mut self.verts[m].neighbors {
                if *slot == drop {
                    *slot = keep;
                }
            }
        }
        let drop_clips: Vec<i32> = self.verts[drop].clips.iter().copied().collect();
        self.verts[keep].clips.extend(drop_clips);
        self.verts[drop].comp = -1;

        self.scrub_cycle(keep);
        for k in 0..fan.len() {
            self.scrub_cycle(fan[k]);
        }
    }

    /// Dissolve vertices with fewer than three distinct neighbors until none
    /// remain: empty and dangling remnants vanish, degree-2 vertices fuse
    /// their two edges into one.
    fn remove_pinches(&mut self) {
        loop {
            let mut changed = false;
            for v in 0..self.verts.len() {
                if !self.verts[v].is_live() {
                    continue;
                }
                self.scrub_cycle(v);
                match self.verts[v].neighbors.len() {
                    0 => {
                        self.verts[v].comp = -1;
                        changed = true;
                    }
                    1 => {
                        let p = self.verts[v].neighbors[0];
                        self.verts[v].comp = -1;
                        self.verts[p].neighbors.retain(|&mut n| n != v);
                        changed = true;
                    }
                    2 => {
                        let p = self.verts[v].neighbors[0];
                        let q = self.verts[v].neighbors[1];
                        self.verts[v].comp = -1;
                        for slot in &mut self.verts[p].neighbors {
                            if *slot == v {
                                *slot = q;
                            }
                        }
                        for slot in &mut self.verts[q].neighbors {
                            if *slot == v {
                                *slot = p;
                            }
                        }
                        self.scrub_cycle(p);
                        self.scrub_cycle(q);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }
    }

    // FACE EXTRACTION

    /// Recover the face loops, each counter-clockwise viewed from outside.
    ///
    /// Every directed edge belongs to exactly one face; the walk visits each
    /// once, tracked in a visited set, so extraction needs no scratch state
    /// on the vertices.
    ///
    /// # Panics
    ///
    /// Panics if a face walk fails to close, which can only happen on a
    /// corrupted adjacency.
    #[must_use]
    pub fn extract_faces(&self) -> Vec<Vec<usize>> {
        let mut visited: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut faces = Vec::new();
        let edge_count: usize = self
            .vertices()
            .map(|(_, v)| v.neighbors.len())
            .sum();
        for i in 0..self.verts.len() {
            if !self.verts[i].is_live() {
                continue;
            }
            for &n in &self.verts[i].neighbors {
                if visited.contains(&(i, n)) {
                    continue;
                }
                let mut face = Vec::new();
                let (mut u, mut v) = (i, n);
                loop {
                    visited.insert((u, v));
                    face.push(u);
                    let w = self.next_in_face_loop(v, u);
                    u = v;
                    v = w;
                    if (u, v) == (i, n) {
                        break;
                    }
                    assert!(face.len() <= edge_count, "face walk failed to close");
                }
                faces.push(face);
            }
        }
        faces
    }

    /// For each face, the plane ids common to every vertex on it.
    ///
    /// A cap face created by a single cut reports exactly that plane's id.
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

    // TETRAHEDRALIZATION

    /// Fan into tetrahedra around the lowest-index vertex, assuming the
    /// polyhedron is star-shaped from it.
    ///
    /// Faces incident to the apex span no volume and are skipped, as are
    /// degenerate (non-positive volume) tetrahedra. With `tol > 0.0` the fan
    /// runs on an internally collapsed copy whose surviving vertices keep
    /// their slots, so the returned indices are valid for `self`.
    #[must_use]
    pub fn split_into_tetrahedra(&self, tol: f64) -> Vec<[usize; 4]> {
        if tol > 0.0 {
            let mut collapsed = self.clone();
            collapsed.merge_within(tol);
            return collapsed.fan_tetrahedra(tol);
        }
        self.fan_tetrahedra(tol)
    }

    fn fan_tetrahedra(&self, tol: f64) -> Vec<[usize; 4]> {
        let Some((apex, _)) = self.vertices().next() else {
            return Vec::new();
        };
        let p0 = self.verts[apex].position;
        let mut tets = Vec::new();
        for face in self.extract_faces() {
            if face.len() < 3 || face.contains(&apex) {
                continue;
            }
            let f0 = face[0];
            let q0 = self.verts[f0].position - p0;
            for k in 1..face.len() - 1 {
                let (fi, fj) = (face[k], face[k + 1]);
                let q1 = self.verts[fi].position - p0;
                let q2 = self.verts[fj].position - p0;
                let vol = q0.dot(q1.cross(q2)) / 6.0;
                if vol <= tol.powi(3) {
                    continue;
                }
                tets.push([apex, f0, fi, fj]);
            }
        }
        tets
    }

    // DIAGNOSTICS

    /// Check the graph invariants: live neighbors, minimum degree, paired
    /// directed edges, and closing face walks.
    ///
    /// # Errors
    ///
    /// The first [`TopologyError`] found, if any.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let edge_count: usize = self
            .vertices()
            .map(|(_, v)| v.neighbors.len())
            .sum();
        for (i, v) in self.vertices() {
            if v.neighbors.len() < 3 {
                return Err(TopologyError::UnderconnectedVertex {
                    vertex: i,
                    count: v.neighbors.len(),
                });
            }
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
                if !self.verts[n].neighbors.contains(&i) {
                    return Err(TopologyError::MissingReverseEdge { from: i, to: n });
                }
            }
        }
        // Every face walk must return to its starting edge.
        for (i, v) in self.vertices() {
            for &n in &v.neighbors {
                let (mut u, mut w) = (i, n);
                for _ in 0..=edge_count {
                    let nxt = self.next_in_face_loop(w, u);
                    u = w;
                    w = nxt;
                    if (u, w) == (i, n) {
                        break;
                    }
                }
                if (u, w) != (i, n) {
                    return Err(TopologyError::UnclosedFaceWalk { from: i, to: n });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Polyhedron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Polyhedron[{} vertices]", self.live_count())?;
        for (i, v) in self.vertices() {
            writeln!(
                f,
                "  {i}: ({:.10e}, {:.10e}, {:.10e}) neighbors=[{}] comp={} clips={{{}}}",
                v.position.x,
                v.position.y,
                v.position.z,
                v.neighbors.iter().join(", "),
                v.comp,
                v.clips.iter().sorted().join(", "),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1.0e-10;

    fn cube_neighbors() -> Vec<Vec<usize>> {
        vec![
            vec![1, 4, 3],
            vec![5, 0, 2],
            vec![3, 6, 1],
            vec![7, 2, 0],
            vec![5, 7, 0],
            vec![1, 6, 4],
            vec![5, 2, 7],
            vec![4, 6, 3],
        ]
    }

    fn cube_positions(side: f64) -> Vec<DVec3> {
        [
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
        .map(|&(x, y, z)| DVec3::new(x, y, z) * side)
        .collect()
    }

    fn cube(side: f64) -> Polyhedron {
        Polyhedron::from_adjacency(&cube_positions(side), &cube_neighbors()).unwrap()
    }

    /// Regular-ish tetrahedron on the coordinate corners.
    fn tetrahedron() -> Polyhedron {
        let positions = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        ];
        let neighbors = vec![vec![1, 3, 2], vec![3, 0, 2], vec![1, 0, 3], vec![0, 1, 2]];
        Polyhedron::from_adjacency(&positions, &neighbors).unwrap()
    }

    /// Non-convex prism: a 4 x 2 x 1 block with a triangular notch cut
    /// into its long side.
    fn notched_prism() -> Polyhedron {
        let coords = [
            (0.0, 0.0, 0.0),
            (4.0, 0.0, 0.0),
            (4.0, 2.0, 0.0),
            (3.0, 2.0, 0.0),
            (2.0, 1.0, 0.0),
            (1.0, 2.0, 0.0),
            (0.0, 2.0, 0.0),
            (0.0, 0.0, 1.0),
            (4.0, 0.0, 1.0),
            (4.0, 2.0, 1.0),
            (3.0, 2.0, 1.0),
            (2.0, 1.0, 1.0),
            (1.0, 2.0, 1.0),
            (0.0, 2.0, 1.0),
        ];
        let positions: Vec<DVec3> = coords
            .iter()
            .map(|&(x, y, z)| DVec3::new(x, y, z))
            .collect();
        let neighbors = vec![
            vec![7, 6, 1],
            vec![0, 2, 8],
            vec![1, 3, 9],
            vec![4, 10, 2],
            vec![5, 11, 3],
            vec![6, 12, 4],
            vec![13, 5, 0],
            vec![8, 13, 0],
            vec![1, 9, 7],
            vec![2, 10, 8],
            vec![9, 3, 11],
            vec![10, 4, 12],
            vec![11, 5, 13],
            vec![7, 12, 6],
        ];
        Polyhedron::from_adjacency(&positions, &neighbors).unwrap()
    }

    fn newell_normal(poly: &Polyhedron, face: &[usize]) -> DVec3 {
        let mut n = DVec3::ZERO;
        for k in 0..face.len() {
            let p = poly.vertex(face[k]).unwrap().position;
            let q = poly.vertex(face[(k + 1) % face.len()]).unwrap().position;
            n += p.cross(q);
        }
        n / 2.0
    }

    #[test]
    fn test_from_adjacency_validation() {
        let positions = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        assert_eq!(
            Polyhedron::from_adjacency(&positions, &[vec![1, 2], vec![0, 2, 3]]).unwrap_err(),
            AdjacencyError::CountMismatch {
                positions: 4,
                neighbors: 2
            }
        );
        let mut neighbors = vec![vec![1, 3, 2], vec![3, 0, 2], vec![1, 0, 3], vec![0, 1, 2]];
        neighbors[2] = vec![1, 0];
        assert_eq!(
            Polyhedron::from_adjacency(&positions, &neighbors).unwrap_err(),
            AdjacencyError::TooFewNeighbors { vertex: 2, count: 2 }
        );
        neighbors[2] = vec![1, 0, 9];
        assert_eq!(
            Polyhedron::from_adjacency(&positions, &neighbors).unwrap_err(),
            AdjacencyError::DanglingIndex {
                vertex: 2,
                neighbor: 9
            }
        );
    }

    #[test]
    fn test_cube_moments_and_faces() {
        let cube = cube(10.0);
        assert!(cube.validate().is_ok());
        let (vol, centroid) = cube.moments();
        assert!((vol - 1000.0).abs() < 1.0e-9);
        assert!((centroid - DVec3::splat(5.0)).length() < EPS);

        let faces = cube.extract_faces();
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.len() == 4));

        // Every face normal points away from the cube's center.
        for face in &faces {
            let n = newell_normal(&cube, face);
            let mid: DVec3 = face
                .iter()
                .map(|&i| cube.vertex(i).unwrap().position)
                .sum::<DVec3>()
                / 4.0;
            assert!(n.dot(mid - DVec3::splat(5.0)) > 0.0);
        }
    }

    #[test]
    fn test_tetrahedron_moments() {
        let tet = tetrahedron();
        assert!(tet.validate().is_ok());
        let (vol, centroid) = tet.moments();
        assert!((vol - 1.0 / 6.0).abs() < EPS);
        assert!((centroid - DVec3::splat(0.25)).length() < EPS);
        assert_eq!(tet.extract_faces().len(), 4);
    }

    #[test]
    fn test_clip_corner_slice() {
        let mut poly = cube(1.0);
        let n = DVec3::ONE.normalize();
        // Keep x + y + z >= 0.5: slices off the corner at the origin.
        poly.clip(&[Plane3d::new(-0.5 / 3.0_f64.sqrt(), n).with_id(11)]);
        assert!(poly.validate().is_ok());
        assert_eq!(poly.live_count(), 10);

        let (vol, _) = poly.moments();
        assert!((vol - (1.0 - 1.0 / 48.0)).abs() < EPS);

        // Exactly one triangular cap, tagged with the plane id, facing
        // against the clip normal.
        let faces = poly.extract_faces();
        assert_eq!(faces.len(), 7);
        let clips = poly.common_face_clips(&faces);
        let caps: Vec<usize> = (0..faces.len())
            .filter(|&k| clips[k].len() == 1 && clips[k].contains(&11))
            .collect();
        assert_eq!(caps.len(), 1);
        let cap = &faces[caps[0]];
        assert_eq!(cap.len(), 3);
        let cap_normal = newell_normal(&poly, cap);
        assert!((cap_normal.normalize() + n).length() < EPS);

        // All three cap vertices carry the plane id.
        for &i in cap {
            assert!(poly.vertex(i).unwrap().clips.contains(&11));
        }
    }

    #[test]
    fn test_clip_through_diagonal_edges() {
        // The plane x + y = 1 contains four cube vertices; the cut spawns
        // nothing and the kept half is a triangular prism whose cap is the
        // diagonal rectangle through those vertices.
        let mut poly = cube(1.0);
        let n = DVec3::new(1.0, 1.0, 0.0) / 2.0_f64.sqrt();
        poly.clip(&[Plane3d::through_point(DVec3::new(1.0, 0.0, 0.0), n).with_id(9)]);
        assert!(poly.validate().is_ok());
        assert_eq!(poly.live_count(), 6);
        let (vol, _) = poly.moments();
        assert!((vol - 0.5).abs() < EPS);

        let faces = poly.extract_faces();
        assert_eq!(faces.len(), 5);
        let clips = poly.common_face_clips(&faces);
        let caps: Vec<usize> = (0..faces.len())
            .filter(|&k| clips[k].contains(&9))
            .collect();
        assert_eq!(caps.len(), 1);
        assert_eq!(faces[caps[0]].len(), 4);
        let cap_normal = newell_normal(&poly, &faces[caps[0]]);
        assert!((cap_normal.normalize() + n).length() < EPS);
    }

    #[test]
    fn test_clip_missing_plane_is_noop() {
        let mut poly = cube(1.0);
        poly.clip(&[Plane3d::new(5.0, DVec3::Z)]);
        assert_eq!(poly.live_count(), 8);
        let (vol, _) = poly.moments();
        assert!((vol - 1.0).abs() < EPS);
    }

    #[test]
    fn test_clip_rejecting_plane_empties() {
        let mut poly = cube(1.0);
        poly.clip(&[Plane3d::new(-5.0, DVec3::Z)]);
        assert!(poly.is_empty());
        assert_eq!(poly.moments(), (0.0, DVec3::ZERO));
        assert!(poly.extract_faces().is_empty());
        poly.clip(&[Plane3d::new(5.0, DVec3::Z)]);
        assert!(poly.is_empty());
    }

    #[test]
    fn test_clip_idempotent() {
        let plane = Plane3d::through_point(DVec3::new(0.5, 0.4, 0.3), DVec3::new(0.6, -0.48, 0.64));
        let mut once = cube(1.0);
        once.clip(std::slice::from_ref(&plane));
        let mut twice = cube(1.0);
        twice.clip(&[plane.clone(), plane]);
        assert!(once.validate().is_ok());
        assert!(twice.validate().is_ok());
        let (v1, c1) = once.moments();
        let (v2, c2) = twice.moments();
        assert!((v1 - v2).abs() < EPS);
        assert!((c1 - c2).length() < EPS);
    }

    #[test]
    fn test_clip_volume_conservation_cube() {
        let (v0, c0) = cube(10.0).moments();
        let probes = [
            (DVec3::new(5.0, 5.0, 5.0), DVec3::new(1.0, 2.0, 2.0) / 3.0),
            (DVec3::new(2.0, 7.0, 1.0), DVec3::new(-0.6, 0.8, 0.0)),
            (DVec3::new(8.0, 3.0, 9.0), DVec3::new(0.0, -0.28, 0.96)),
        ];
        for (p0, n) in probes {
            let mut above = cube(10.0);
            let mut below = cube(10.0);
            above.clip(&[Plane3d::through_point(p0, n)]);
            below.clip(&[Plane3d::through_point(p0, -n)]);
            assert!(above.validate().is_ok());
            assert!(below.validate().is_ok());
            let (v1, c1) = above.moments();
            let (v2, c2) = below.moments();
            assert!((v1 + v2 - v0).abs() < 1.0e-9);
            assert!((v1 * c1 + v2 * c2 - v0 * c0).length() < 1.0e-8);
        }
    }

    #[test]
    fn test_clip_volume_conservation_nonconvex() {
        let poly = notched_prism();
        assert!(poly.validate().is_ok());
        assert_eq!(poly.extract_faces().len(), 9);
        let (v0, c0) = poly.moments();
        assert!((v0 - 7.0).abs() < EPS);

        // Planes through the notch exercise multi-segment cuts.
        let probes = [
            (DVec3::new(2.0, 1.0, 0.5), DVec3::new(1.0, 0.0, 0.0)),
            (DVec3::new(2.0, 1.5, 0.5), DVec3::new(0.0, 1.0, 0.0)),
            (DVec3::new(2.0, 1.0, 0.5), DVec3::new(2.0, 1.0, 2.0) / 3.0),
        ];
        for (p0, n) in probes {
            let mut above = poly.clone();
            let mut below = poly.clone();
            above.clip(&[Plane3d::through_point(p0, n)]);
            below.clip(&[Plane3d::through_point(p0, -n)]);
            let (v1, c1) = above.moments();
            let (v2, c2) = below.moments();
            assert!((v1 + v2 - v0).abs() < 1.0e-9);
            assert!((v1 * c1 + v2 * c2 - v0 * c0).length() < 1.0e-8);
        }
    }

    #[test]
    fn test_monotone_volume() {
        let mut poly = cube(1.0);
        let planes = [
            Plane3d::through_point(DVec3::splat(0.2), DVec3::X),
            Plane3d::through_point(DVec3::splat(0.5), DVec3::new(0.0, -0.6, 0.8)),
            Plane3d::through_point(DVec3::splat(0.4), DVec3::ONE.normalize()),
        ];
        let mut last = poly.moments().0;
        for plane in planes {
            poly.clip(std::slice::from_ref(&plane));
            assert!(poly.validate().is_ok());
            let (vol, _) = poly.moments();
            assert!(vol <= last + EPS);
            last = vol;
        }
    }

    #[test]
    fn test_collapse_degenerate_cube_to_pyramid() {
        // A cube whose top face is collapsed onto a single point: the graph
        // still has 8 vertices but only 5 distinct positions.
        let mut positions = cube_positions(1.0);
        for p in positions.iter_mut().skip(4) {
            *p = DVec3::new(0.0, 0.0, 1.0);
        }
        let mut poly = Polyhedron::from_adjacency(&positions, &cube_neighbors()).unwrap();
        let (v0, c0) = poly.moments();
        assert!((v0 - 1.0 / 3.0).abs() < EPS);

        poly.collapse_degenerates(1.0e-10);
        assert_eq!(poly.live_count(), 5);
        assert!(poly.validate().is_ok());
        let (v1, c1) = poly.moments();
        assert!((v1 - v0).abs() < EPS);
        assert!((c1 - c0).length() < EPS);

        // Fixed point: collapsing again changes nothing.
        let before = poly.to_string();
        poly.collapse_degenerates(1.0e-10);
        assert_eq!(before, poly.to_string());
    }

    #[test]
    fn test_split_into_tetrahedra_cube() {
        let cube = cube(1.0);
        let tets = cube.split_into_tetrahedra(0.0);
        // Three faces away from the apex, two fan tetrahedra each.
        assert_eq!(tets.len(), 6);
        let mut vol = 0.0;
        let mut weighted = DVec3::ZERO;
        for &[a, b, c, d] in &tets {
            let pa = cube.vertex(a).unwrap().position;
            let pb = cube.vertex(b).unwrap().position;
            let pc = cube.vertex(c).unwrap().position;
            let pd = cube.vertex(d).unwrap().position;
            let v = (pb - pa).dot((pc - pa).cross(pd - pa)) / 6.0;
            assert!(v > 0.0);
            vol += v;
            weighted += v * (pa + pb + pc + pd) / 4.0;
        }
        let (v0, c0) = cube.moments();
        assert!((vol - v0).abs() < EPS);
        assert!((weighted - v0 * c0).length() < EPS);
    }

    #[test]
    fn test_split_into_tetrahedra_clipped() {
        let mut poly = cube(1.0);
        poly.clip(&[Plane3d::through_point(
            DVec3::splat(0.3),
            DVec3::ONE.normalize(),
        )]);
        let (v0, _) = poly.moments();
        let tets = poly.split_into_tetrahedra(0.0);
        let vol: f64 = tets
            .iter()
            .map(|&[a, b, c, d]| {
                let pa = poly.vertex(a).unwrap().position;
                let pb = poly.vertex(b).unwrap().position;
                let pc = poly.vertex(c).unwrap().position;
                let pd = poly.vertex(d).unwrap().position;
                (pb - pa).dot((pc - pa).cross(pd - pa)) / 6.0
            })
            .sum();
        assert!((vol - v0).abs() < EPS);
    }

    #[test]
    fn test_validate_reports_missing_reverse_edge() {
        let mut poly = cube(1.0);
        // Corrupt one adjacency entry.
        poly.verts[0].neighbors[0] = 6;
        assert!(matches!(
            poly.validate(),
            Err(TopologyError::MissingReverseEdge { .. })
        ));
    }

    #[test]
    fn test_display_lists_live_vertices() {
        let tet = tetrahedron();
        let text = tet.to_string();
        assert!(text.contains("Polyhedron[4 vertices]"));
        assert!(text.contains("neighbors=[1, 3, 2]"));
    }
}
