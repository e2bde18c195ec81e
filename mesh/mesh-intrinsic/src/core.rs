//! State and geometric machinery shared by the triangulation variants.
//!
//! Both representations carry the same borrowed input surface, an owned
//! intrinsic mesh with edge-length geometry, vertex locations on the input,
//! marked edges, and the callback registry. They also share every geometric
//! predicate: flip feasibility in the diamond layout, split lengths, and
//! the straight walk across face charts used by circumcenter insertion and
//! the tracers.

#![allow(clippy::similar_names)]

use mesh_halfedge::{
    EdgeData, EdgeId, FaceId, HalfedgeId, HalfedgeMesh, SurfacePoint, Vector2, VertexData,
    VertexId,
};

use crate::callbacks::CallbackRegistry;
use crate::error::IntrinsicResult;
use crate::geometry::{barycentric_of_point, place_third_vertex, EdgeLengthGeometry};

/// Default numerical tolerance for geometric predicates.
pub const TRIANGLE_TEST_EPS: f64 = 1e-6;

#[derive(Debug)]
pub(crate) struct TriangulationCore<'a> {
    pub input: &'a HalfedgeMesh,
    pub input_geometry: EdgeLengthGeometry,
    pub mesh: HalfedgeMesh,
    pub geometry: EdgeLengthGeometry,
    pub locations: VertexData<SurfacePoint>,
    pub marked: EdgeData<bool>,
    pub callbacks: CallbackRegistry,
    pub triangle_test_eps: f64,
}

/// Validated geometric data for an edge flip.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlipGeometry {
    pub new_length: f64,
}

/// Validated lengths for an edge split.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitLengths {
    pub tail_side: f64,
    pub head_side: f64,
    pub spoke_front: f64,
    pub spoke_back: Option<f64>,
}

impl<'a> TriangulationCore<'a> {
    pub fn new(
        input: &'a HalfedgeMesh,
        input_lengths: &EdgeData<f64>,
    ) -> IntrinsicResult<Self> {
        let input_geometry = EdgeLengthGeometry::new(input, input_lengths.clone())?;
        let mesh = input.clone();
        let geometry = EdgeLengthGeometry::new(&mesh, input_lengths.clone())?;
        let mut locations =
            VertexData::new(mesh.n_vertices_capacity(), SurfacePoint::Vertex(VertexId::from_index(0)));
        for v in mesh.vertices() {
            locations[v] = SurfacePoint::Vertex(v);
        }
        let marked = EdgeData::new(mesh.n_edges_capacity(), false);
        Ok(Self {
            input,
            input_geometry,
            mesh,
            geometry,
            locations,
            marked,
            callbacks: CallbackRegistry::new(),
            triangle_test_eps: TRIANGLE_TEST_EPS,
        })
    }

    /// Marked or boundary: never flipped, never removed.
    pub fn is_fixed(&self, e: EdgeId) -> bool {
        self.marked[e] || self.mesh.is_boundary_edge(e)
    }

    /// Whether any incident edge is fixed.
    pub fn is_on_fixed_edge(&self, v: VertexId) -> bool {
        self.mesh
            .outgoing_halfedges(v)
            .any(|h| self.is_fixed(h.edge()))
    }

    /// Whether the vertex exists in the input mesh.
    pub fn is_original_vertex(&self, v: VertexId) -> bool {
        matches!(self.locations[v], SurfacePoint::Vertex(_))
    }

    /// Validate a flip geometrically: the diamond must exist, be strictly
    /// convex at the old diagonal, and yield non-degenerate new faces.
    pub fn flip_geometry(&self, e: EdgeId) -> Option<FlipGeometry> {
        let h = self.mesh.halfedge(e);
        let [pa, pb, pc, pd] = self.geometry.layout_diamond(&self.mesh, h)?;
        let eps = self.triangle_test_eps;

        // The quad is convex at the diagonal when its old endpoints lie
        // strictly on opposite sides of the new one.
        let diag = pd - pb;
        let cross = |u: Vector2<f64>, v: Vector2<f64>| u.x * v.y - u.y * v.x;
        let side_a = cross(diag, pa - pb);
        let side_c = cross(diag, pc - pb);
        if !(side_a > eps && side_c < -eps) && !(side_a < -eps && side_c > eps) {
            return None;
        }

        let new_length = (pb - pd).norm();
        if new_length <= eps {
            return None;
        }
        let t = h.twin();
        let l_cb = self.geometry.length(self.mesh.next(h).edge());
        let l_ba = self.geometry.length(self.mesh.prev(h).edge());
        let l_ad = self.geometry.length(self.mesh.next(t).edge());
        let l_dc = self.geometry.length(self.mesh.prev(t).edge());
        let ok = |x: f64, y: f64, z: f64| x < y + z - eps && y < z + x - eps && z < x + y - eps;
        if !ok(new_length, l_dc, l_cb) || !ok(new_length, l_ba, l_ad) {
            return None;
        }
        Some(FlipGeometry { new_length })
    }

    /// Validate a split at parameter `t` along interior half-edge `h`,
    /// returning the child and spoke lengths.
    pub fn split_lengths(&self, h: HalfedgeId, t: f64) -> Option<SplitLengths> {
        if !(t > 0.0 && t < 1.0) || !self.mesh.is_interior(h) {
            return None;
        }
        let eps = self.triangle_test_eps;
        let l_e = self.geometry.length(h.edge());
        let pa = Vector2::zeros();
        let pc = Vector2::new(l_e, 0.0);
        let pb = place_third_vertex(
            pa,
            pc,
            self.geometry.length(self.mesh.prev(h).edge()),
            self.geometry.length(self.mesh.next(h).edge()),
        );
        let pv = Vector2::new(t * l_e, 0.0);

        let tail_side = t * l_e;
        let head_side = (1.0 - t) * l_e;
        let spoke_front = (pb - pv).norm();
        let ok = |x: f64, y: f64, z: f64| x < y + z - eps && y < z + x - eps && z < x + y - eps;
        if tail_side <= eps || head_side <= eps || spoke_front <= eps {
            return None;
        }
        let l_ba = self.geometry.length(self.mesh.prev(h).edge());
        let l_cb = self.geometry.length(self.mesh.next(h).edge());
        if !ok(tail_side, spoke_front, l_ba) || !ok(head_side, l_cb, spoke_front) {
            return None;
        }

        let spoke_back = if self.mesh.is_interior(h.twin()) {
            let tw = h.twin();
            let pd = place_third_vertex(
                pc,
                pa,
                self.geometry.length(self.mesh.prev(tw).edge()),
                self.geometry.length(self.mesh.next(tw).edge()),
            );
            let spoke = (pd - pv).norm();
            let l_ad = self.geometry.length(self.mesh.next(tw).edge());
            let l_dc = self.geometry.length(self.mesh.prev(tw).edge());
            if spoke <= eps || !ok(head_side, spoke, l_dc) || !ok(tail_side, l_ad, spoke) {
                return None;
            }
            Some(spoke)
        } else {
            None
        };

        Some(SplitLengths {
            tail_side,
            head_side,
            spoke_front,
            spoke_back,
        })
    }

    /// Spoke lengths for inserting a vertex at `bary` inside `f`, or `None`
    /// if a resulting face would be degenerate.
    pub fn insert_lengths(&self, f: FaceId, bary: [f64; 3]) -> Option<[f64; 3]> {
        let eps = self.triangle_test_eps;
        if bary.iter().any(|&b| b < eps) {
            return None;
        }
        let corners = self.geometry.vertex_coordinates_in_face(&self.mesh, f);
        let p = corners[0] * bary[0] + corners[1] * bary[1] + corners[2] * bary[2];
        let spokes = [
            (p - corners[0]).norm(),
            (p - corners[1]).norm(),
            (p - corners[2]).norm(),
        ];
        let hes = self.mesh.face_halfedges(f);
        let ok = |x: f64, y: f64, z: f64| x < y + z - eps && y < z + x - eps && z < x + y - eps;
        for i in 0..3 {
            let side = self.geometry.length(hes[i].edge());
            if spokes[i] <= eps || !ok(side, spokes[(i + 1) % 3], spokes[i]) {
                return None;
            }
        }
        Some(spokes)
    }

    /// Grow every attribute array to the mesh's current capacities.
    pub fn resize_arrays(&mut self) {
        self.geometry.resize(&self.mesh);
        self.locations.resize(self.mesh.n_vertices_capacity());
        self.marked.resize(self.mesh.n_edges_capacity());
    }

    /// Refresh derived geometry around a set of faces and vertices.
    pub fn refresh(&mut self, faces: &[FaceId], vertices: &[VertexId]) {
        for &f in faces {
            if self.mesh.face_is_live(f) {
                self.geometry.refresh_face(&self.mesh, f);
            }
        }
        for &v in vertices {
            if self.mesh.vertex_is_live(v) {
                self.geometry.refresh_vertex(&self.mesh, v);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Face charts and the straight walk
// ---------------------------------------------------------------------

/// A face isometrically unfolded into a working plane.
#[derive(Debug, Clone)]
pub(crate) struct FaceChart {
    pub face: FaceId,
    pub hes: [HalfedgeId; 3],
    pub pos: [Vector2<f64>; 3],
}

impl FaceChart {
    /// Chart of `f` in its canonical layout.
    pub fn new(mesh: &HalfedgeMesh, geometry: &EdgeLengthGeometry, f: FaceId) -> Self {
        Self {
            face: f,
            hes: mesh.face_halfedges(f),
            pos: geometry.vertex_coordinates_in_face(mesh, f),
        }
    }

    /// Chart of `f` entered through `entering` (a half-edge of `f`), with
    /// the shared edge pinned at the given endpoint positions (tail and
    /// head of `entering`).
    pub fn entered_through(
        mesh: &HalfedgeMesh,
        geometry: &EdgeLengthGeometry,
        entering: HalfedgeId,
        p_tail: Vector2<f64>,
        p_head: Vector2<f64>,
    ) -> Option<Self> {
        let f = mesh.face(entering)?;
        let hes = mesh.face_halfedges(f);
        let apex = place_third_vertex(
            p_tail,
            p_head,
            geometry.length(mesh.prev(entering).edge()),
            geometry.length(mesh.next(entering).edge()),
        );
        let i = hes.iter().position(|&h| h == entering)?;
        let mut pos = [Vector2::zeros(); 3];
        pos[i] = p_tail;
        pos[(i + 1) % 3] = p_head;
        pos[(i + 2) % 3] = apex;
        Some(Self { face: f, hes, pos })
    }

    /// Unfold across edge `i` of this chart (between corners `i` and
    /// `i + 1`). Returns the neighboring face's chart in the same plane, or
    /// `None` at the boundary.
    pub fn across(
        &self,
        mesh: &HalfedgeMesh,
        geometry: &EdgeLengthGeometry,
        i: usize,
    ) -> Option<Self> {
        let twin = self.hes[i].twin();
        // The twin runs opposite: its tail sits at our corner i + 1.
        Self::entered_through(mesh, geometry, twin, self.pos[(i + 1) % 3], self.pos[i])
    }

    /// Barycentric coordinates of a plane point in this chart.
    pub fn barycentric(&self, p: Vector2<f64>) -> [f64; 3] {
        barycentric_of_point(&self.pos, p)
    }
}

/// Where a straight walk ended.
#[derive(Debug, Clone)]
pub(crate) enum WalkOutcome {
    /// The target lies inside this face at these barycentric coordinates.
    Landed { face: FaceId, bary: [f64; 3] },
    /// The walk was stopped at a crossing by the caller's visitor.
    Stopped {
        halfedge: HalfedgeId,
        edge_param: f64,
    },
    /// The walk ran off the surface through a boundary edge.
    HitBoundary {
        halfedge: HalfedgeId,
        edge_param: f64,
    },
    /// Step budget exhausted; the walk is numerically stuck.
    StepLimit,
}

/// Whether to keep walking after a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkControl {
    Continue,
    Stop,
}

/// Walk the straight segment from `start` to `target` (both in `chart`'s
/// plane) across face charts. The visitor sees each transversal edge
/// crossing as `(halfedge of the current face, parameter along it)` and can
/// stop the walk there.
pub(crate) fn walk_segment(
    mesh: &HalfedgeMesh,
    geometry: &EdgeLengthGeometry,
    chart: &FaceChart,
    start: Vector2<f64>,
    target: Vector2<f64>,
    max_steps: usize,
    mut on_crossing: impl FnMut(HalfedgeId, f64) -> WalkControl,
) -> WalkOutcome {
    let mut chart = chart.clone();
    let mut entered: Option<HalfedgeId> = None;
    let mut u_done = 0.0_f64;

    for _ in 0..max_steps {
        // Find the earliest exit of the segment from the current chart.
        let mut best: Option<(usize, f64, f64)> = None; // (edge index, u, w)
        for i in 0..3 {
            if Some(chart.hes[i]) == entered {
                continue;
            }
            let (q0, q1) = (chart.pos[i], chart.pos[(i + 1) % 3]);
            let d = target - start;
            let e = q1 - q0;
            let denom = d.x * e.y - d.y * e.x;
            if denom.abs() < 1e-14 {
                continue;
            }
            let r = q0 - start;
            let u = (r.x * e.y - r.y * e.x) / denom;
            let w = (r.x * d.y - r.y * d.x) / denom;
            if u > u_done + 1e-12 && u <= 1.0 && (-1e-9..=1.0 + 1e-9).contains(&w) {
                if best.map_or(true, |(_, bu, _)| u < bu) {
                    best = Some((i, u, w.clamp(0.0, 1.0)));
                }
            }
        }

        let Some((i, u, w)) = best else {
            return WalkOutcome::Landed {
                face: chart.face,
                bary: chart.barycentric(target),
            };
        };

        let h = chart.hes[i];
        let edge_param = if mesh.halfedge(h.edge()) == h { w } else { 1.0 - w };
        if on_crossing(h, edge_param) == WalkControl::Stop {
            return WalkOutcome::Stopped {
                halfedge: h,
                edge_param,
            };
        }
        match chart.across(mesh, geometry, i) {
            Some(next) => {
                entered = Some(chart.hes[i].twin());
                chart = next;
                u_done = u;
            }
            None => {
                return WalkOutcome::HitBoundary {
                    halfedge: h,
                    edge_param,
                };
            }
        }
    }
    WalkOutcome::StepLimit
}
