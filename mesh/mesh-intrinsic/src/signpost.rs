//! The signpost intrinsic triangulation.
//!
//! The alternative representation: instead of integer crossing counts,
//! every intrinsic half-edge stores its direction angle in the tangent
//! space of its tail ("signposts"), anchored to the input surface at
//! construction. Correspondence queries trace geodesics with
//! floating-point unfolding, so they drift where the integer encoding
//! stays exact, but the outward contract is the same.

#![allow(clippy::similar_names)]

use mesh_halfedge::{
    EdgeData, EdgeId, FaceId, HalfedgeData, HalfedgeId, HalfedgeMesh, SurfacePoint, Vector2,
    VertexId,
};
use smallvec::SmallVec;

use crate::callbacks::CallbackRegistry;
use crate::core::{walk_segment, FaceChart, TriangulationCore, WalkControl, WalkOutcome};
use crate::correspond::{angle_between, rotate_direction};
use crate::error::{IntrinsicError, IntrinsicResult};
use crate::geometry::EdgeLengthGeometry;
use crate::triangulation::RefinementInsertion;

const TAU: f64 = std::f64::consts::TAU;

/// An intrinsic triangulation encoded by signpost angles.
#[derive(Debug)]
pub struct SignpostTriangulation<'a> {
    core: TriangulationCore<'a>,
    /// Direction of each half-edge in its tail's rescaled tangent space.
    /// At original vertices the coordinate is anchored to the input
    /// vertex's reference direction; at inserted vertices it is anchored to
    /// the chart of the input face the vertex lives in.
    signposts: HalfedgeData<f64>,
    /// Whether the edge still coincides with an input edge.
    is_original: EdgeData<bool>,
}

impl<'a> SignpostTriangulation<'a> {
    /// Build the triangulation that initially coincides with the input
    /// mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if a length is non-positive or a face violates the
    /// triangle inequality.
    pub fn new(input: &'a HalfedgeMesh, input_lengths: &EdgeData<f64>) -> IntrinsicResult<Self> {
        let core = TriangulationCore::new(input, input_lengths)?;
        let mut signposts = HalfedgeData::new(core.mesh.n_halfedges_capacity(), 0.0);
        for h in core.mesh.halfedges() {
            let v = core.input_geometry.halfedge_vector_in_vertex(h);
            signposts[h] = v.y.atan2(v.x).rem_euclid(TAU);
        }
        let is_original = EdgeData::new(core.mesh.n_edges_capacity(), true);
        Ok(Self {
            core,
            signposts,
            is_original,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The intrinsic mesh connectivity.
    #[must_use]
    pub fn mesh(&self) -> &HalfedgeMesh {
        &self.core.mesh
    }

    /// The borrowed input mesh.
    #[must_use]
    pub fn input_mesh(&self) -> &HalfedgeMesh {
        self.core.input
    }

    /// Derived geometry of the intrinsic metric.
    #[must_use]
    pub fn geometry(&self) -> &EdgeLengthGeometry {
        &self.core.geometry
    }

    /// Location of an intrinsic vertex on the input surface.
    #[must_use]
    pub fn location(&self, v: VertexId) -> SurfacePoint {
        self.core.locations[v]
    }

    /// The signpost angle of a half-edge.
    #[must_use]
    pub fn signpost(&self, h: HalfedgeId) -> f64 {
        self.signposts[h]
    }

    /// Whether the edge still coincides with an input edge.
    #[must_use]
    pub fn edge_is_original(&self, e: EdgeId) -> bool {
        self.is_original[e]
    }

    /// The mutation callback registry.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.core.callbacks
    }

    /// Mark edges that refinement must never flip nor remove.
    pub fn set_marked_edges(&mut self, marked: &EdgeData<bool>) {
        for e in self.core.mesh.edges() {
            self.core.marked[e] = e.index() < marked.len() && marked[e];
        }
    }

    /// Marked or boundary edge.
    #[must_use]
    pub fn is_fixed(&self, e: EdgeId) -> bool {
        self.core.is_fixed(e)
    }

    /// Whether the edge satisfies the intrinsic Delaunay criterion.
    #[must_use]
    pub fn is_delaunay_edge(&self, e: EdgeId) -> bool {
        self.is_fixed(e)
            || self.core.geometry.edge_cotan_weight(&self.core.mesh, e)
                >= -self.core.triangle_test_eps
    }

    /// Whether every edge satisfies the intrinsic Delaunay criterion.
    #[must_use]
    pub fn is_delaunay(&self) -> bool {
        self.core.mesh.edges().all(|e| self.is_delaunay_edge(e))
    }

    /// Smallest corner angle of the triangulation, in degrees.
    #[must_use]
    pub fn min_angle_degrees(&self) -> f64 {
        self.core.geometry.min_angle_degrees(&self.core.mesh)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Flip the edge if it fails the Delaunay criterion and is flippable.
    pub fn flip_edge_if_not_delaunay(&mut self, e: EdgeId) -> bool {
        if self.is_delaunay_edge(e) {
            return false;
        }
        self.flip_edge_if_possible(e)
    }

    /// Flip the edge if it is combinatorially and geometrically flippable.
    pub fn flip_edge_if_possible(&mut self, e: EdgeId) -> bool {
        if self.is_fixed(e) {
            return false;
        }
        let mesh = &self.core.mesh;
        let h0 = mesh.halfedge(e);
        let h1 = h0.twin();
        let (Some(f0), Some(f1)) = (mesh.face(h0), mesh.face(h1)) else {
            return false;
        };
        if f0 == f1 {
            return false;
        }
        let a = mesh.tail(h0);
        let c = mesh.tail(h1);
        if mesh.vertex_degree(a) < 3 || mesh.vertex_degree(c) < 3 {
            return false;
        }
        let Some(flip_geometry) = self.core.flip_geometry(e) else {
            return false;
        };
        let b = mesh.opposite_vertex(h0);
        let d = mesh.opposite_vertex(h1);
        let neighbor_b = mesh.next(h0).twin(); // b -> c
        let neighbor_d = mesh.next(h1).twin(); // d -> a

        if !self.core.mesh.flip_edge(e) {
            return false;
        }
        self.core.geometry.set_length(e, flip_geometry.new_length);
        self.is_original[e] = false;
        self.core.refresh(&[f0, f1], &[a, b, c, d]);
        // The flipped half-edges inherit their directions from the
        // counterclockwise neighbors at their new tails.
        self.update_signpost_from_ccw_neighbor(h0, neighbor_b);
        self.update_signpost_from_ccw_neighbor(h1, neighbor_d);
        self.core.callbacks.fire_edge_flip(e);
        true
    }

    /// Split an edge at parameter `t` along its canonical half-edge.
    ///
    /// # Errors
    ///
    /// Propagates tracing failures while locating the split point.
    pub fn split_edge(&mut self, e: EdgeId, t: f64) -> IntrinsicResult<Option<VertexId>> {
        let h = self.core.mesh.halfedge(e);
        if self.core.mesh.is_interior(h) {
            self.split_halfedge(h, t)
        } else {
            self.split_halfedge(h.twin(), 1.0 - t)
        }
    }

    fn split_halfedge(&mut self, h: HalfedgeId, t: f64) -> IntrinsicResult<Option<VertexId>> {
        let Some(lengths) = self.core.split_lengths(h, t) else {
            return Ok(None);
        };
        let e = h.edge();
        let was_original = self.is_original[e];
        let was_marked = self.core.marked[e];
        let signpost_to_head = self.signposts[h.twin()];
        let location = self.split_point(h, t)?;
        let mesh = &self.core.mesh;
        let b = mesh.opposite_vertex(h);
        let neighbor_b = mesh.next(h).twin(); // b -> c
        let back = mesh.is_interior(h.twin());
        let (neighbor_d, d) = if back {
            (
                Some(mesh.next(h.twin()).twin()), // d -> a
                Some(mesh.opposite_vertex(h.twin())),
            )
        } else {
            (None, None)
        };
        let (a, c) = (mesh.tail(h), mesh.head(h));

        let Some(result) = self.core.mesh.split_edge(h) else {
            return Ok(None);
        };
        self.core.resize_arrays();
        self.signposts.resize(self.core.mesh.n_halfedges_capacity());
        self.is_original.resize(self.core.mesh.n_edges_capacity());
        let v = result.new_vertex;

        self.core.geometry.set_length(e, lengths.tail_side);
        self.core
            .geometry
            .set_length(result.he_to_head.edge(), lengths.head_side);
        self.core
            .geometry
            .set_length(result.spoke_front, lengths.spoke_front);
        if let (Some(spoke), Some(length)) = (result.spoke_back, lengths.spoke_back) {
            self.core.geometry.set_length(spoke, length);
        }
        self.is_original[e] = was_original;
        self.is_original[result.he_to_head.edge()] = was_original;
        self.is_original[result.spoke_front] = false;
        if let Some(spoke) = result.spoke_back {
            self.is_original[spoke] = false;
        }
        self.core.marked[e] = was_marked;
        self.core.marked[result.he_to_head.edge()] = was_marked;
        self.core.locations[v] = location;

        let mut faces: SmallVec<[FaceId; 4]> = SmallVec::new();
        for he in [h, result.he_to_head, result.he_to_tail, result.he_to_head.twin()] {
            if let Some(f) = self.core.mesh.face(he) {
                faces.push(f);
            }
        }
        let mut vertices: SmallVec<[VertexId; 5]> = SmallVec::from_slice(&[a, c, b, v]);
        if let Some(d) = d {
            vertices.push(d);
        }
        self.core.refresh(&faces, &vertices);

        // Surviving directions: the tail-side half-edge reuses its slot;
        // the head-side inherits the old reverse direction.
        self.signposts[result.he_to_head.twin()] = signpost_to_head;
        let b_to_v = self.core.mesh.halfedge(result.spoke_front).twin();
        self.update_signpost_from_ccw_neighbor(b_to_v, neighbor_b);
        if let (Some(spoke), Some(neighbor)) = (result.spoke_back, neighbor_d) {
            let d_to_v = self.core.mesh.halfedge(spoke).twin();
            self.update_signpost_from_ccw_neighbor(d_to_v, neighbor);
        }
        self.assign_inserted_vertex_signposts(v, location);

        self.core
            .callbacks
            .fire_edge_split(e, result.he_to_head, result.he_to_tail);
        Ok(Some(v))
    }

    /// Insert a vertex at a surface point of the intrinsic triangulation.
    ///
    /// # Errors
    ///
    /// Rejects vertex points; propagates tracing failures.
    pub fn insert_vertex(&mut self, point: SurfacePoint) -> IntrinsicResult<Option<VertexId>> {
        match point {
            SurfacePoint::Vertex(v) => Err(IntrinsicError::InsertAtVertex { vertex: v }),
            SurfacePoint::Edge(e, t) => self.split_edge(e, t),
            SurfacePoint::Face(f, bary) => self.insert_in_face(f, bary),
        }
    }

    fn insert_in_face(&mut self, f: FaceId, bary: [f64; 3]) -> IntrinsicResult<Option<VertexId>> {
        let Some(spoke_lengths) = self.core.insert_lengths(f, bary) else {
            return Ok(None);
        };
        let location = self.face_point(f, bary)?;
        let corners = self.core.mesh.face_vertices(f);
        let hes = self.core.mesh.face_halfedges(f);
        let neighbors = [hes[2].twin(), hes[0].twin(), hes[1].twin()];

        let result = self.core.mesh.insert_vertex_in_face(f);
        self.core.resize_arrays();
        self.signposts.resize(self.core.mesh.n_halfedges_capacity());
        self.is_original.resize(self.core.mesh.n_edges_capacity());
        let v = result.new_vertex;

        for i in 0..3 {
            self.core
                .geometry
                .set_length(result.spokes[i], spoke_lengths[i]);
            self.is_original[result.spokes[i]] = false;
        }
        self.core.locations[v] = location;
        self.core.refresh(
            &result.faces,
            &[corners[0], corners[1], corners[2], v],
        );
        for i in 0..3 {
            let corner_to_v = self.core.mesh.halfedge(result.spokes[i]);
            self.update_signpost_from_ccw_neighbor(corner_to_v, neighbors[i]);
        }
        self.assign_inserted_vertex_signposts(v, location);
        self.core.callbacks.fire_face_insertion(f, v);
        Ok(Some(v))
    }

    /// Remove a previously inserted vertex by flipping its star down to a
    /// tripod. Rolls back on failure.
    ///
    /// # Errors
    ///
    /// Rejects vertices of the original input mesh.
    pub fn remove_inserted_vertex(&mut self, v: VertexId) -> IntrinsicResult<Option<FaceId>> {
        if !self.core.mesh.vertex_is_live(v) {
            return Ok(None);
        }
        if self.core.is_original_vertex(v) {
            return Err(IntrinsicError::RemoveOriginalVertex { vertex: v });
        }
        if self.core.mesh.is_boundary_vertex(v) {
            return Ok(None);
        }
        let mut journal: Vec<(EdgeId, f64)> = Vec::new();
        while self.core.mesh.vertex_degree(v) > 3 {
            let incident: SmallVec<[EdgeId; 8]> = self
                .core
                .mesh
                .outgoing_halfedges(v)
                .map(|h| h.edge())
                .collect();
            let mut flipped = false;
            for e in incident {
                let length = self.core.geometry.length(e);
                if self.flip_edge_if_possible(e) {
                    journal.push((e, length));
                    flipped = true;
                    break;
                }
            }
            if !flipped {
                self.rollback_flips(&journal);
                return Ok(None);
            }
        }
        let ring: SmallVec<[VertexId; 4]> = self
            .core
            .mesh
            .outgoing_halfedges(v)
            .map(|h| self.core.mesh.head(h))
            .collect();
        let Some(kept) = self.core.mesh.remove_insertion_tripod(v) else {
            self.rollback_flips(&journal);
            return Ok(None);
        };
        self.core.refresh(&[kept], &ring);
        Ok(Some(kept))
    }

    fn rollback_flips(&mut self, journal: &[(EdgeId, f64)]) {
        for &(e, length) in journal.iter().rev() {
            let undone = self.flip_edge_if_possible(e);
            debug_assert!(undone, "rollback flip must be legal");
            self.core.geometry.set_length(e, length);
            let h = self.core.mesh.halfedge(e);
            let faces: SmallVec<[FaceId; 2]> = [h, h.twin()]
                .into_iter()
                .filter_map(|he| self.core.mesh.face(he))
                .collect();
            let vertices = [
                self.core.mesh.tail(h),
                self.core.mesh.head(h),
                self.core.mesh.opposite_vertex(h),
                self.core.mesh.opposite_vertex(h.twin()),
            ];
            self.core.refresh(&faces, &vertices);
        }
    }

    /// Insert the circumcenter of `f`, or split the fixed edge blocking the
    /// geodesic toward it.
    ///
    /// # Errors
    ///
    /// Propagates tracing failures.
    pub fn insert_circumcenter_or_split_segment(
        &mut self,
        f: FaceId,
    ) -> IntrinsicResult<Option<RefinementInsertion>> {
        let eps = self.core.triangle_test_eps;
        let bary = self
            .core
            .geometry
            .circumcenter_barycentric(&self.core.mesh, f);
        if bary.iter().all(|&b| b > eps) {
            return Ok(self
                .insert_in_face(f, bary)?
                .map(RefinementInsertion::Circumcenter));
        }
        let chart = FaceChart::new(&self.core.mesh, &self.core.geometry, f);
        let start = (chart.pos[0] + chart.pos[1] + chart.pos[2]) / 3.0;
        let target = chart.pos[0] * bary[0] + chart.pos[1] * bary[1] + chart.pos[2] * bary[2];
        let mut blocking: Option<EdgeId> = None;
        let outcome = {
            let core = &self.core;
            walk_segment(
                &core.mesh,
                &core.geometry,
                &chart,
                start,
                target,
                2 * core.mesh.n_faces() + 8,
                |h, _| {
                    if core.is_fixed(h.edge()) {
                        blocking = Some(h.edge());
                        WalkControl::Stop
                    } else {
                        WalkControl::Continue
                    }
                },
            )
        };
        match outcome {
            WalkOutcome::Landed { face, bary } => {
                let floor = 2.0 * eps;
                let clamped = bary.map(|b| b.max(floor));
                let total: f64 = clamped.iter().sum();
                Ok(self
                    .insert_in_face(face, clamped.map(|b| b / total))?
                    .map(RefinementInsertion::Circumcenter))
            }
            WalkOutcome::Stopped { halfedge, .. } | WalkOutcome::HitBoundary { halfedge, .. } => {
                let e = blocking.unwrap_or_else(|| halfedge.edge());
                Ok(self
                    .split_edge(e, 0.5)?
                    .map(|v| RefinementInsertion::SegmentSplit(v, e)))
            }
            WalkOutcome::StepLimit => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Tracing
    // ------------------------------------------------------------------

    /// Trace an intrinsic half-edge along the input surface by walking the
    /// geodesic its signpost points down.
    ///
    /// # Errors
    ///
    /// Fails if the walk cannot be started or leaves the surface.
    pub fn trace_halfedge(&self, h: HalfedgeId) -> IntrinsicResult<Vec<SurfacePoint>> {
        let tail_loc = self.location(self.core.mesh.tail(h));
        let head_loc = self.location(self.core.mesh.head(h));
        if self.is_original[h.edge()] {
            return Ok(vec![tail_loc, head_loc]);
        }
        let (chart, origin, direction) = self.resolve_direction(h)?;
        let length = self.core.geometry.length(h.edge());
        let mut points = vec![tail_loc];
        let outcome = walk_segment(
            self.core.input,
            &self.core.input_geometry,
            &chart,
            origin,
            origin + direction * length,
            2 * self.core.input.n_faces() + 8,
            |he, param| {
                points.push(SurfacePoint::Edge(he.edge(), param));
                WalkControl::Continue
            },
        );
        match outcome {
            WalkOutcome::Landed { .. } | WalkOutcome::HitBoundary { .. } => {
                points.push(head_loc);
                Ok(points)
            }
            _ => Err(IntrinsicError::CorruptNormalCoordinates {
                halfedge: h,
                detail: "signpost trace failed",
            }),
        }
    }

    /// Map a point on the intrinsic triangulation to the input surface.
    ///
    /// # Errors
    ///
    /// Propagates tracing failures.
    pub fn equivalent_point_on_input(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        match p {
            SurfacePoint::Vertex(v) => Ok(self.location(v)),
            SurfacePoint::Edge(e, t) => {
                let h = self.core.mesh.halfedge(e);
                self.split_point(if self.core.mesh.is_interior(h) { h } else { h.twin() },
                    if self.core.mesh.is_interior(h) { t } else { 1.0 - t })
            }
            SurfacePoint::Face(f, bary) => self.face_point(f, bary),
        }
    }

    /// Map a point on the input surface to the intrinsic triangulation by
    /// walking from an original vertex.
    ///
    /// # Errors
    ///
    /// Propagates tracing failures.
    pub fn equivalent_point_on_intrinsic(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: self.core.mesh.halfedge(EdgeId::from_index(0)),
            detail,
        };
        let input = self.core.input;
        let (face, target_bary) = match p {
            SurfacePoint::Vertex(u) => return Ok(SurfacePoint::Vertex(u)),
            SurfacePoint::Face(f, bary) => (f, bary),
            SurfacePoint::Edge(e, t) => {
                let h = input.halfedge(e);
                let (h, t) = if input.is_interior(h) { (h, t) } else { (h.twin(), 1.0 - t) };
                let f = input.face(h).ok_or_else(|| corrupt("edge point off the surface"))?;
                let hes = input.face_halfedges(f);
                let i = hes
                    .iter()
                    .position(|&he| he == h)
                    .ok_or_else(|| corrupt("face does not contain its half-edge"))?;
                let mut bary = [0.0; 3];
                bary[i] = 1.0 - t;
                bary[(i + 1) % 3] = t;
                (f, bary)
            }
        };

        let chart = FaceChart::new(input, &self.core.input_geometry, face);
        let target = chart.pos[0] * target_bary[0]
            + chart.pos[1] * target_bary[1]
            + chart.pos[2] * target_bary[2];
        let u = input.tail(chart.hes[0]);
        let origin = chart.pos[0];
        let segment = target - origin;
        let distance = segment.norm();
        if distance < 1e-12 {
            return Ok(SurfacePoint::Vertex(u));
        }
        // Angle of the target in the input tangent space at u.
        let input_scale = self.input_tangent_scale(u);
        let wedge_base = self.input_wedge_base_angle(u, chart.hes[0]);
        let within = angle_between(chart.pos[1] - chart.pos[0], segment).rem_euclid(TAU);
        let theta = (wedge_base + within) * input_scale;

        // Signposts at original vertices live in the same coordinate; pick
        // the intrinsic wedge just below the target angle.
        let mut best: Option<(HalfedgeId, f64)> = None;
        for h in self.core.mesh.outgoing_halfedges(u) {
            if !self.core.mesh.is_interior(h) {
                continue;
            }
            let offset = (theta - self.signposts[h]).rem_euclid(TAU);
            if best.map_or(true, |(_, o)| offset < o) {
                best = Some((h, offset));
            }
        }
        let (h, offset) = best.ok_or_else(|| corrupt("no intrinsic wedge at input vertex"))?;
        let true_offset = offset / input_scale;

        let f = self
            .core
            .mesh
            .face(h)
            .ok_or_else(|| corrupt("wedge face missing"))?;
        let intrinsic_chart = FaceChart::new(&self.core.mesh, &self.core.geometry, f);
        let i = intrinsic_chart
            .hes
            .iter()
            .position(|&he| he == h)
            .ok_or_else(|| corrupt("wedge half-edge missing from its face"))?;
        let pivot = intrinsic_chart.pos[i];
        let along = (intrinsic_chart.pos[(i + 1) % 3] - pivot)
            .try_normalize(1e-12)
            .ok_or_else(|| corrupt("degenerate wedge edge"))?;
        let (walk_chart, direction) = rotate_direction(
            &self.core.mesh,
            &self.core.geometry,
            intrinsic_chart,
            pivot,
            along,
            true_offset,
        )?;
        match walk_segment(
            &self.core.mesh,
            &self.core.geometry,
            &walk_chart,
            pivot,
            pivot + direction * distance,
            2 * self.core.mesh.n_faces() + 8,
            |_, _| WalkControl::Continue,
        ) {
            WalkOutcome::Landed { face, bary } => Ok(SurfacePoint::Face(face, bary)),
            WalkOutcome::HitBoundary {
                halfedge,
                edge_param,
            } => Ok(SurfacePoint::Edge(halfedge.edge(), edge_param)),
            _ => Err(corrupt("input point walk failed")),
        }
    }

    // ------------------------------------------------------------------
    // Signpost bookkeeping
    // ------------------------------------------------------------------

    /// Rescaling factor of the tangent space at a vertex of the intrinsic
    /// mesh.
    fn tangent_scale(&self, v: VertexId) -> f64 {
        let full = if self.core.mesh.is_boundary_vertex(v) {
            std::f64::consts::PI
        } else {
            TAU
        };
        full / self.core.geometry.angle_sum(v)
    }

    fn input_tangent_scale(&self, u: VertexId) -> f64 {
        let full = if self.core.input.is_boundary_vertex(u) {
            std::f64::consts::PI
        } else {
            TAU
        };
        full / self.core.input_geometry.angle_sum(u)
    }

    /// Cumulative input interior angle at `u` from its reference outgoing
    /// half-edge to `target`.
    fn input_wedge_base_angle(&self, u: VertexId, target: HalfedgeId) -> f64 {
        let input = self.core.input;
        let mut angle = 0.0;
        for h in input.outgoing_halfedges(u) {
            if h == target {
                break;
            }
            if input.is_interior(h) {
                angle += self.core.input_geometry.corner_angle(h);
            }
        }
        angle
    }

    /// Set the signpost of `h` from its counterclockwise neighbor at the
    /// same tail: the neighbor's angle minus the wedge between them.
    fn update_signpost_from_ccw_neighbor(&mut self, h: HalfedgeId, neighbor: HalfedgeId) {
        let v = self.core.mesh.tail(h);
        let scale = self.tangent_scale(v);
        let wedge = self.core.geometry.corner_angle(h);
        self.signposts[h] = (self.signposts[neighbor] - scale * wedge).rem_euclid(TAU);
    }

    /// Give a freshly inserted vertex a tangent frame: angles measured in
    /// the chart of the input face it lives in, accumulated around the
    /// star from whichever outgoing half-edge has a head the chart can
    /// place.
    fn assign_inserted_vertex_signposts(&mut self, v: VertexId, location: SurfacePoint) {
        let input = self.core.input;
        let face = match location {
            SurfacePoint::Face(f, _) => Some(f),
            SurfacePoint::Edge(e, _) => {
                let h = input.halfedge(e);
                input.face(h).or_else(|| input.face(h.twin()))
            }
            SurfacePoint::Vertex(_) => None,
        };
        let anchor = face.and_then(|face| {
            let chart = FaceChart::new(input, &self.core.input_geometry, face);
            let p = chart_position(input, &chart, location)?;
            self.core.mesh.outgoing_halfedges(v).find_map(|h| {
                let head_loc = self.core.locations[self.core.mesh.head(h)];
                let q = chart_position(input, &chart, head_loc)?;
                let d = q - p;
                (d.norm() > 1e-12).then(|| (h, d.y.atan2(d.x).rem_euclid(TAU)))
            })
        });
        let (start, base) = anchor.unwrap_or((self.core.mesh.halfedge_of_vertex(v), 0.0));

        let scale = self.tangent_scale(v);
        let mut theta = base;
        let mut h = start;
        loop {
            self.signposts[h] = theta.rem_euclid(TAU);
            if !self.core.mesh.is_interior(h) {
                break;
            }
            theta += scale * self.core.geometry.corner_angle(h);
            h = self.core.mesh.next_outgoing(h);
            if h == start {
                break;
            }
        }
    }

    /// Resolve a half-edge's direction into an input face chart for
    /// walking.
    fn resolve_direction(
        &self,
        h: HalfedgeId,
    ) -> IntrinsicResult<(FaceChart, Vector2<f64>, Vector2<f64>)> {
        self.resolve_direction_with_angle(h, self.signposts[h])
    }

    /// Location on the input surface of the point at `t` along an interior
    /// half-edge, by tracing.
    fn split_point(&self, h: HalfedgeId, t: f64) -> IntrinsicResult<SurfacePoint> {
        let e = h.edge();
        if self.is_original[e] {
            // Still coincident with an input edge: interpolate along it.
            let tail = self.location(self.core.mesh.tail(h));
            let head = self.location(self.core.mesh.head(h));
            if let Some((input_edge, a, b)) = self.shared_span(tail, head) {
                return Ok(SurfacePoint::Edge(input_edge, a + (b - a) * t));
            }
        }
        let (chart, origin, direction) = self.resolve_direction(h)?;
        let distance = self.core.geometry.length(e) * t;
        match walk_segment(
            self.core.input,
            &self.core.input_geometry,
            &chart,
            origin,
            origin + direction * distance,
            2 * self.core.input.n_faces() + 8,
            |_, _| WalkControl::Continue,
        ) {
            WalkOutcome::Landed { face, bary } => Ok(SurfacePoint::Face(face, bary)),
            WalkOutcome::HitBoundary {
                halfedge,
                edge_param,
            } => Ok(SurfacePoint::Edge(halfedge.edge(), edge_param)),
            _ => Err(IntrinsicError::CorruptNormalCoordinates {
                halfedge: h,
                detail: "signpost split point walk failed",
            }),
        }
    }

    /// Location of a barycentric point of an intrinsic face, by tracing
    /// from its first corner.
    fn face_point(&self, f: FaceId, bary: [f64; 3]) -> IntrinsicResult<SurfacePoint> {
        let chart = FaceChart::new(&self.core.mesh, &self.core.geometry, f);
        let target = chart.pos[0] * bary[0] + chart.pos[1] * bary[1] + chart.pos[2] * bary[2];
        let segment = target - chart.pos[0];
        let distance = segment.norm();
        let h0 = chart.hes[0];
        if distance < 1e-12 {
            return Ok(self.location(self.core.mesh.tail(h0)));
        }
        let alpha = angle_between(chart.pos[1] - chart.pos[0], segment);
        let v = self.core.mesh.tail(h0);
        let scale = self.tangent_scale(v);
        let theta = (self.signposts[h0] + alpha * scale).rem_euclid(TAU);

        // Walk in the input from the corner with the adjusted angle.
        let (chart, origin, direction) = self.resolve_direction_with_angle(h0, theta)?;
        match walk_segment(
            self.core.input,
            &self.core.input_geometry,
            &chart,
            origin,
            origin + direction * distance,
            2 * self.core.input.n_faces() + 8,
            |_, _| WalkControl::Continue,
        ) {
            WalkOutcome::Landed { face, bary } => Ok(SurfacePoint::Face(face, bary)),
            WalkOutcome::HitBoundary {
                halfedge,
                edge_param,
            } => Ok(SurfacePoint::Edge(halfedge.edge(), edge_param)),
            _ => Err(IntrinsicError::CorruptNormalCoordinates {
                halfedge: h0,
                detail: "signpost face point walk failed",
            }),
        }
    }

    fn resolve_direction_with_angle(
        &self,
        h: HalfedgeId,
        theta: f64,
    ) -> IntrinsicResult<(FaceChart, Vector2<f64>, Vector2<f64>)> {
        // Identical to resolve_direction, with the angle supplied.
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: h,
            detail,
        };
        let input = self.core.input;
        let v = self.core.mesh.tail(h);
        match self.location(v) {
            SurfacePoint::Vertex(u) => {
                let scale = self.input_tangent_scale(u);
                let mut target = theta.rem_euclid(TAU);
                // At boundary vertices the surface wedges span less than a
                // full turn; rounding can push an angle just past the gap,
                // so clamp it to the nearer end of the covered range.
                let total: f64 = input
                    .outgoing_halfedges(u)
                    .filter(|&ih| input.is_interior(ih))
                    .map(|ih| self.core.input_geometry.corner_angle(ih) * scale)
                    .sum();
                if target > total {
                    target = if target - total < TAU - target { total } else { 0.0 };
                }
                let mut base = 0.0;
                for ih in input.outgoing_halfedges(u) {
                    if !input.is_interior(ih) {
                        continue;
                    }
                    let span = self.core.input_geometry.corner_angle(ih) * scale;
                    if target <= base + span + 1e-9 {
                        let f = input.face(ih).ok_or_else(|| corrupt("wedge face missing"))?;
                        let chart = FaceChart::new(input, &self.core.input_geometry, f);
                        let i = chart
                            .hes
                            .iter()
                            .position(|&he| he == ih)
                            .ok_or_else(|| corrupt("wedge half-edge missing"))?;
                        let origin = chart.pos[i];
                        let along = (chart.pos[(i + 1) % 3] - origin)
                            .try_normalize(1e-12)
                            .ok_or_else(|| corrupt("degenerate wedge edge"))?;
                        let angle = (target - base).max(0.0) / scale;
                        let (sin, cos) = angle.sin_cos();
                        let direction =
                            Vector2::new(along.x * cos - along.y * sin, along.x * sin + along.y * cos);
                        return Ok((chart, origin, direction));
                    }
                    base += span;
                }
                Err(corrupt("angle outside every input wedge"))
            }
            location => {
                let face = match location {
                    SurfacePoint::Face(f, _) => f,
                    SurfacePoint::Edge(e, _) => {
                        let ih = input.halfedge(e);
                        input
                            .face(ih)
                            .or_else(|| input.face(ih.twin()))
                            .ok_or_else(|| corrupt("edge point off the surface"))?
                    }
                    SurfacePoint::Vertex(_) => unreachable!(),
                };
                let mut chart = FaceChart::new(input, &self.core.input_geometry, face);
                let origin = chart_position(input, &chart, location)
                    .ok_or_else(|| corrupt("location outside its chart"))?;
                let (sin, cos) = theta.sin_cos();
                let direction = Vector2::new(cos, sin);
                // For a point sitting on an edge, the angle may aim into
                // the neighboring face; unfold across so the walk starts in
                // the face it actually enters.
                if let SurfacePoint::Edge(e, _) = location {
                    if let Some(i) = (0..3).find(|&i| chart.hes[i].edge() == e) {
                        let along = chart.pos[(i + 1) % 3] - chart.pos[i];
                        let outward = along.x * direction.y - along.y * direction.x < 0.0;
                        if outward {
                            if let Some(flipped) =
                                chart.across(input, &self.core.input_geometry, i)
                            {
                                chart = flipped;
                            }
                        }
                    }
                }
                Ok((chart, origin, direction))
            }
        }
    }

    /// The input edge both surface points lie on, with their parameters.
    fn shared_span(&self, a: SurfacePoint, b: SurfacePoint) -> Option<(EdgeId, f64, f64)> {
        let input = self.core.input;
        let param = |loc: SurfacePoint, e: EdgeId| -> Option<f64> {
            let h = input.halfedge(e);
            match loc {
                SurfacePoint::Vertex(v) if v == input.tail(h) => Some(0.0),
                SurfacePoint::Vertex(v) if v == input.head(h) => Some(1.0),
                SurfacePoint::Edge(le, t) if le == e => Some(t),
                _ => None,
            }
        };
        let candidate_edges = |loc: SurfacePoint| -> SmallVec<[EdgeId; 8]> {
            match loc {
                SurfacePoint::Vertex(u) => input
                    .outgoing_halfedges(u)
                    .map(|h| h.edge())
                    .collect(),
                SurfacePoint::Edge(e, _) => SmallVec::from_slice(&[e]),
                SurfacePoint::Face(..) => SmallVec::new(),
            }
        };
        for e in candidate_edges(a) {
            if let (Some(pa), Some(pb)) = (param(a, e), param(b, e)) {
                return Some((e, pa, pb));
            }
        }
        None
    }
}

/// Position of a surface point in a chart of its containing face.
fn chart_position(
    mesh: &HalfedgeMesh,
    chart: &FaceChart,
    loc: SurfacePoint,
) -> Option<Vector2<f64>> {
    match loc {
        SurfacePoint::Vertex(v) => (0..3)
            .find(|&i| mesh.tail(chart.hes[i]) == v)
            .map(|i| chart.pos[i]),
        SurfacePoint::Edge(e, t) => {
            let i = (0..3).find(|&i| chart.hes[i].edge() == e)?;
            let w = if mesh.halfedge(e) == chart.hes[i] { t } else { 1.0 - t };
            Some(chart.pos[i] * (1.0 - w) + chart.pos[(i + 1) % 3] * w)
        }
        SurfacePoint::Face(f, bary) => (f == chart.face).then(|| {
            chart.pos[0] * bary[0] + chart.pos[1] * bary[1] + chart.pos[2] * bary[2]
        }),
    }
}
