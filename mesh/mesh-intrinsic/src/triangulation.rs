//! The integer-coordinate intrinsic triangulation.
//!
//! Sits on top of a borrowed input surface. Topology, edge lengths, normal
//! coordinates, roundabouts, and vertex locations are updated in lockstep
//! by every mutation; each mutation validates everything it needs before
//! touching any state, so a failed operation leaves the triangulation
//! exactly as it was.

#![allow(clippy::similar_names)]

use mesh_halfedge::{
    EdgeData, EdgeId, FaceId, HalfedgeId, HalfedgeMesh, SurfacePoint, Vector2, VertexId,
};
use smallvec::SmallVec;

use crate::callbacks::CallbackRegistry;
use crate::core::{FaceChart, TriangulationCore, WalkControl, WalkOutcome, walk_segment};
use crate::error::{IntrinsicError, IntrinsicResult};
use crate::geometry::{point_from_barycentric, EdgeLengthGeometry};
use crate::normal_coords::{
    flip_normal_coordinates, insert_normal_coordinates, split_normal_coordinates, FlipQuad,
    NormalCoordinates, SplitEdgePrism,
};

/// What a refinement insertion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementInsertion {
    /// The face's circumcenter was inserted as a new vertex.
    Circumcenter(VertexId),
    /// A fixed edge blocked the circumcenter; it was split at its midpoint.
    SegmentSplit(VertexId, EdgeId),
}

impl RefinementInsertion {
    /// The vertex created by the insertion.
    #[must_use]
    pub fn vertex(&self) -> VertexId {
        match self {
            Self::Circumcenter(v) | Self::SegmentSplit(v, _) => *v,
        }
    }
}

struct FlipRecord {
    edge: EdgeId,
    /// Tail of the canonical half-edge when recorded; undoing a flip
    /// reverses the canonical orientation, so restoration matches on this.
    tail: VertexId,
    length: f64,
    coord: i64,
    roundabout_fwd: u32,
    roundabout_rev: u32,
}

/// An intrinsic triangulation encoded by integer normal coordinates.
///
/// The correspondence with the input surface is exact: every intrinsic edge
/// knows precisely how many input edges it crosses, and tracing recovers
/// the crossing points without accumulating drift.
#[derive(Debug)]
pub struct IntegerTriangulation<'a> {
    pub(crate) core: TriangulationCore<'a>,
    pub(crate) normal_coords: NormalCoordinates,
}

impl<'a> IntegerTriangulation<'a> {
    /// Build the triangulation that initially coincides with the input
    /// mesh, whose geometry is given by per-edge lengths.
    ///
    /// # Errors
    ///
    /// Returns an error if a length is non-positive or a face violates the
    /// triangle inequality.
    pub fn new(input: &'a HalfedgeMesh, input_lengths: &EdgeData<f64>) -> IntrinsicResult<Self> {
        let core = TriangulationCore::new(input, input_lengths)?;
        let normal_coords = NormalCoordinates::identity(&core.mesh);
        Ok(Self {
            core,
            normal_coords,
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

    /// Derived geometry of the input metric.
    #[must_use]
    pub fn input_geometry(&self) -> &EdgeLengthGeometry {
        &self.core.input_geometry
    }

    /// The normal coordinates and roundabouts.
    #[must_use]
    pub fn normal_coordinates(&self) -> &NormalCoordinates {
        &self.normal_coords
    }

    /// Location of an intrinsic vertex on the input surface.
    #[must_use]
    pub fn location(&self, v: VertexId) -> SurfacePoint {
        self.core.locations[v]
    }

    /// Whether the vertex exists in the input mesh.
    #[must_use]
    pub fn is_original_vertex(&self, v: VertexId) -> bool {
        self.core.is_original_vertex(v)
    }

    /// The mutation callback registry.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.core.callbacks
    }

    /// Mark edges that refinement must never flip nor remove. Marked edges
    /// propagate their mark to both children when split.
    pub fn set_marked_edges(&mut self, marked: &EdgeData<bool>) {
        for e in self.core.mesh.edges() {
            self.core.marked[e] = e.index() < marked.len() && marked[e];
        }
    }

    /// Mark a single edge as fixed.
    pub fn mark_edge(&mut self, e: EdgeId) {
        self.core.marked[e] = true;
    }

    /// Marked or boundary edge.
    #[must_use]
    pub fn is_fixed(&self, e: EdgeId) -> bool {
        self.core.is_fixed(e)
    }

    /// Whether the vertex touches a marked or boundary edge.
    #[must_use]
    pub fn is_on_fixed_edge(&self, v: VertexId) -> bool {
        self.core.is_on_fixed_edge(v)
    }

    /// Tolerance used by geometric predicates.
    #[must_use]
    pub fn triangle_test_eps(&self) -> f64 {
        self.core.triangle_test_eps
    }

    /// Override the geometric predicate tolerance.
    pub fn set_triangle_test_eps(&mut self, eps: f64) {
        self.core.triangle_test_eps = eps;
    }

    /// Number of vertices in the common subdivision: every intrinsic vertex
    /// plus one per transversal crossing.
    #[must_use]
    pub fn n_subdivided_vertices(&self) -> usize {
        let crossings: i64 = self
            .core
            .mesh
            .edges()
            .map(|e| self.normal_coords.coords[e].max(0))
            .sum();
        self.core.mesh.n_vertices() + crossings as usize
    }

    // ------------------------------------------------------------------
    // Delaunay queries
    // ------------------------------------------------------------------

    /// Whether the edge satisfies the intrinsic Delaunay criterion. Fixed
    /// edges count as Delaunay.
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

    /// Smallest corner angle in degrees, ignoring faces with a corner at a
    /// vertex whose angle sum is below `min_angle_sum` (needle cones that no
    /// amount of refinement can fix).
    #[must_use]
    pub fn min_angle_degrees_at_valid_faces(&self, min_angle_sum: f64) -> f64 {
        let mesh = &self.core.mesh;
        let geometry = &self.core.geometry;
        mesh.faces()
            .filter(|&f| {
                mesh.face_vertices(f)
                    .iter()
                    .all(|&v| geometry.angle_sum(v) >= min_angle_sum)
            })
            .map(|f| geometry.min_corner_angle(mesh, f))
            .fold(f64::INFINITY, f64::min)
            .to_degrees()
    }

    // ------------------------------------------------------------------
    // Shared edges
    // ------------------------------------------------------------------

    /// The input half-edge an intrinsic half-edge runs along, when it does.
    ///
    /// A half-edge is shared when its coordinate is non-positive and its
    /// endpoint locations lie along a common input edge; a zero coordinate
    /// between two input vertices always means coincidence, since an
    /// uncrossed geodesic between vertices of a common face is that face's
    /// edge.
    #[must_use]
    pub fn shared_input_halfedge(&self, h: HalfedgeId) -> Option<HalfedgeId> {
        if self.normal_coords.coords[h.edge()] > 0 {
            return None;
        }
        let input = self.core.input;
        let tail = self.core.locations[self.core.mesh.tail(h)];
        let head = self.core.locations[self.core.mesh.head(h)];
        match (tail, head) {
            (SurfacePoint::Vertex(u), SurfacePoint::Vertex(w)) => input
                .outgoing_halfedges(u)
                .find(|&ih| input.head(ih) == w),
            (SurfacePoint::Vertex(u), SurfacePoint::Edge(e, _)) => {
                let ih = input.halfedge(e);
                [ih, ih.twin()].into_iter().find(|&ih| input.tail(ih) == u)
            }
            (SurfacePoint::Edge(e, _), SurfacePoint::Vertex(w)) => {
                let ih = input.halfedge(e);
                [ih, ih.twin()].into_iter().find(|&ih| input.head(ih) == w)
            }
            (SurfacePoint::Edge(e1, t1), SurfacePoint::Edge(e2, t2)) if e1 == e2 => {
                let ih = input.halfedge(e1);
                Some(if t2 > t1 { ih } else { ih.twin() })
            }
            _ => None,
        }
    }

    /// The input half-edge a shared intrinsic half-edge runs along.
    ///
    /// # Errors
    ///
    /// Returns an error if the half-edge does not lie along an input edge.
    pub fn identify_shared_input_edge(&self, h: HalfedgeId) -> IntrinsicResult<HalfedgeId> {
        self.shared_input_halfedge(h)
            .ok_or(IntrinsicError::NotASharedEdge { halfedge: h })
    }

    /// The input face wholly containing an uncrossed intrinsic face, if
    /// any.
    #[must_use]
    pub fn get_parent_face(&self, f: FaceId) -> Option<FaceId> {
        let mesh = &self.core.mesh;
        if mesh
            .face_halfedges(f)
            .iter()
            .any(|&h| self.normal_coords.coords[h.edge()] > 0)
        {
            return None;
        }
        let candidates = |v: VertexId| -> SmallVec<[FaceId; 8]> {
            let input = self.core.input;
            match self.core.locations[v] {
                SurfacePoint::Vertex(u) => input
                    .outgoing_halfedges(u)
                    .filter_map(|h| input.face(h))
                    .collect(),
                SurfacePoint::Edge(e, _) => {
                    let h = input.halfedge(e);
                    [h, h.twin()]
                        .into_iter()
                        .filter_map(|h| input.face(h))
                        .collect()
                }
                SurfacePoint::Face(g, _) => SmallVec::from_slice(&[g]),
            }
        };
        let [a, b, c] = mesh.face_vertices(f);
        let (fa, fb, fc) = (candidates(a), candidates(b), candidates(c));
        fa.into_iter()
            .find(|g| fb.contains(g) && fc.contains(g))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Flip the edge if it fails the Delaunay criterion and is flippable.
    /// Returns whether a flip occurred.
    pub fn flip_edge_if_not_delaunay(&mut self, e: EdgeId) -> bool {
        if self.is_delaunay_edge(e) {
            return false;
        }
        self.flip_edge_if_possible(e)
    }

    /// Flip the edge if it is combinatorially and geometrically flippable:
    /// interior, unmarked, two distinct faces, strictly convex diamond.
    /// Returns whether a flip occurred.
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

        let h2 = mesh.next(h0); // c -> b
        let h3 = mesh.prev(h0); // b -> a
        let h4 = mesh.next(h1); // a -> d
        let h5 = mesh.prev(h1); // d -> c
        let b = mesh.tail(h3);
        let d = mesh.tail(h5);
        let quad = FlipQuad {
            diagonal: self.normal_coords.coords[e],
            diagonal_is_shared: self.shared_input_halfedge(h0).is_some(),
            ab: self.normal_coords.coords[h3.edge()],
            bc: self.normal_coords.coords[h2.edge()],
            cd: self.normal_coords.coords[h5.edge()],
            da: self.normal_coords.coords[h4.edge()],
        };
        let update = flip_normal_coordinates(&quad);
        // Counterclockwise neighbors of the flipped half-edges; these
        // survive the flip with their roundabouts intact.
        let neighbor_b = h2.twin(); // b -> c
        let neighbor_d = h4.twin(); // d -> a

        if !self.core.mesh.flip_edge(e) {
            return false;
        }
        self.core.geometry.set_length(e, flip_geometry.new_length);
        self.normal_coords.coords[e] = update.new_diagonal;
        // h0 now runs b -> d, h1 runs d -> b.
        self.normal_coords.set_roundabout_from_ccw_neighbor(
            &self.core.mesh,
            h0,
            neighbor_b,
            update.arcs_at_b,
        );
        self.normal_coords.set_roundabout_from_ccw_neighbor(
            &self.core.mesh,
            h1,
            neighbor_d,
            update.arcs_at_d,
        );
        self.core.refresh(&[f0, f1], &[a, b, c, d]);
        self.core.callbacks.fire_edge_flip(e);
        true
    }

    /// Split an edge at parameter `t` measured along its canonical
    /// half-edge (or its twin when the canonical side is a boundary loop).
    ///
    /// Returns the new vertex, or `Ok(None)` when the split would produce a
    /// degenerate face.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption discovered while locating the split
    /// point on the input surface.
    pub fn split_edge(&mut self, e: EdgeId, t: f64) -> IntrinsicResult<Option<VertexId>> {
        let h = self.core.mesh.halfedge(e);
        if self.core.mesh.is_interior(h) {
            self.split_halfedge(h, t)
        } else {
            self.split_halfedge(h.twin(), 1.0 - t)
        }
    }

    /// Split along an interior half-edge at parameter `t` from its tail.
    pub(crate) fn split_halfedge(
        &mut self,
        h: HalfedgeId,
        t: f64,
    ) -> IntrinsicResult<Option<VertexId>> {
        let Some(lengths) = self.core.split_lengths(h, t) else {
            return Ok(None);
        };
        let e = h.edge();
        let mesh = &self.core.mesh;
        let h2 = mesh.next(h); // c -> b
        let h3 = mesh.prev(h); // b -> a
        let back = if mesh.is_interior(h.twin()) {
            let h4 = mesh.next(h.twin()); // a -> d
            let h5 = mesh.prev(h.twin()); // d -> c
            Some((
                self.normal_coords.coords[h4.edge()],
                self.normal_coords.coords[h5.edge()],
            ))
        } else {
            None
        };
        let prism = SplitEdgePrism {
            edge: self.normal_coords.coords[e],
            front_near: self.normal_coords.coords[h3.edge()],
            front_far: self.normal_coords.coords[h2.edge()],
            back,
        };
        let update = split_normal_coordinates(&prism, t);
        let location = self.split_point_location(h, t)?;

        let was_marked = self.core.marked[e];
        let roundabout_to_head = self.normal_coords.roundabouts[h.twin()];
        let neighbor_b = h2.twin(); // b -> c
        let neighbor_d = back.map(|_| self.core.mesh.next(h.twin()).twin()); // d -> a
        let b = self.core.mesh.tail(h3);
        let d = back.map(|_| self.core.mesh.tail(self.core.mesh.prev(h.twin())));
        let (a, c) = (self.core.mesh.tail(h), self.core.mesh.head(h));

        let Some(result) = self.core.mesh.split_edge(h) else {
            return Ok(None);
        };
        self.core.resize_arrays();
        self.normal_coords.resize(&self.core.mesh);
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

        self.normal_coords.coords[e] = update.tail_side;
        self.normal_coords.coords[result.he_to_head.edge()] = update.head_side;
        self.normal_coords.coords[result.spoke_front] = update.spoke_front;
        if let (Some(spoke), Some(coord)) = (result.spoke_back, update.spoke_back) {
            self.normal_coords.coords[spoke] = coord;
        }

        self.core.marked[e] = was_marked;
        self.core.marked[result.he_to_head.edge()] = was_marked;
        self.core.locations[v] = location;

        // The tail-side half-edge from `a` reuses its slot and direction;
        // the head-side half-edge from `c` inherits the old roundabout.
        self.normal_coords.roundabouts[result.he_to_head.twin()] = roundabout_to_head;
        let b_to_v = self.core.mesh.halfedge(result.spoke_front).twin();
        self.normal_coords.set_roundabout_from_ccw_neighbor(
            &self.core.mesh,
            b_to_v,
            neighbor_b,
            update.arcs_at_front_apex,
        );
        if let (Some(spoke), Some(neighbor)) = (result.spoke_back, neighbor_d) {
            let d_to_v = self.core.mesh.halfedge(spoke).twin();
            self.normal_coords.set_roundabout_from_ccw_neighbor(
                &self.core.mesh,
                d_to_v,
                neighbor,
                update.arcs_at_back_apex,
            );
        }

        let mut faces: SmallVec<[FaceId; 4]> = SmallVec::new();
        for he in [h, result.he_to_head, result.he_to_tail] {
            if let Some(f) = self.core.mesh.face(he) {
                faces.push(f);
            }
        }
        if let Some(f) = self.core.mesh.face(result.he_to_head.twin()) {
            faces.push(f);
        }
        let mut vertices: SmallVec<[VertexId; 5]> = SmallVec::from_slice(&[a, c, b, v]);
        if let Some(d) = d {
            vertices.push(d);
        }
        self.core.refresh(&faces, &vertices);
        self.core
            .callbacks
            .fire_edge_split(e, result.he_to_head, result.he_to_tail);
        Ok(Some(v))
    }

    /// Insert a vertex at a surface point of the intrinsic triangulation.
    ///
    /// Returns `Ok(None)` when the insertion would create a degenerate
    /// face.
    ///
    /// # Errors
    ///
    /// Rejects vertex points, and propagates invariant corruption found
    /// while locating the new vertex on the input surface.
    pub fn insert_vertex(&mut self, point: SurfacePoint) -> IntrinsicResult<Option<VertexId>> {
        match point {
            SurfacePoint::Vertex(v) => Err(IntrinsicError::InsertAtVertex { vertex: v }),
            SurfacePoint::Edge(e, t) => self.split_edge(e, t),
            SurfacePoint::Face(f, bary) => self.insert_in_face(f, bary),
        }
    }

    /// Insert the barycenter of a face.
    ///
    /// # Errors
    ///
    /// As for [`insert_vertex`](Self::insert_vertex).
    pub fn insert_barycenter(&mut self, f: FaceId) -> IntrinsicResult<Option<VertexId>> {
        self.insert_in_face(f, [1.0 / 3.0; 3])
    }

    fn insert_in_face(
        &mut self,
        f: FaceId,
        bary: [f64; 3],
    ) -> IntrinsicResult<Option<VertexId>> {
        let Some(spoke_lengths) = self.core.insert_lengths(f, bary) else {
            return Ok(None);
        };
        let hes = self.core.mesh.face_halfedges(f);
        let corners = self.core.mesh.face_vertices(f);
        let coords = [
            self.normal_coords.coords[hes[0].edge()],
            self.normal_coords.coords[hes[1].edge()],
            self.normal_coords.coords[hes[2].edge()],
        ];
        let update = insert_normal_coordinates(&coords, bary);
        let location = self.face_point_location(f, bary)?;
        // Counterclockwise neighbor of each new spoke at its corner: the
        // half-edge toward the previous corner.
        let neighbors = [hes[2].twin(), hes[0].twin(), hes[1].twin()];

        let result = self.core.mesh.insert_vertex_in_face(f);
        self.core.resize_arrays();
        self.normal_coords.resize(&self.core.mesh);
        let v = result.new_vertex;

        for i in 0..3 {
            self.core
                .geometry
                .set_length(result.spokes[i], spoke_lengths[i]);
            self.normal_coords.coords[result.spokes[i]] = update.spokes[i];
            let corner_to_v = self.core.mesh.halfedge(result.spokes[i]);
            self.normal_coords.set_roundabout_from_ccw_neighbor(
                &self.core.mesh,
                corner_to_v,
                neighbors[i],
                update.arcs_ccw_of_spoke[i],
            );
        }
        self.core.locations[v] = location;

        self.core.refresh(
            &result.faces,
            &[corners[0], corners[1], corners[2], v],
        );
        self.core.callbacks.fire_face_insertion(f, v);
        Ok(Some(v))
    }

    /// Remove a previously inserted vertex by flipping its star down to a
    /// tripod and deleting it. Returns the surviving face.
    ///
    /// If no legal flip sequence exists the triangulation is rolled back to
    /// its state at entry and `Ok(None)` is returned.
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

        let mut journal: Vec<FlipRecord> = Vec::new();
        while self.core.mesh.vertex_degree(v) > 3 {
            let incident: SmallVec<[EdgeId; 8]> = self
                .core
                .mesh
                .outgoing_halfedges(v)
                .map(|h| h.edge())
                .collect();
            let mut flipped = false;
            for e in incident {
                let record = FlipRecord {
                    edge: e,
                    tail: self.core.mesh.tail(self.core.mesh.halfedge(e)),
                    length: self.core.geometry.length(e),
                    coord: self.normal_coords.coords[e],
                    roundabout_fwd: self.normal_coords.roundabouts[self.core.mesh.halfedge(e)],
                    roundabout_rev: self.normal_coords.roundabouts
                        [self.core.mesh.halfedge(e).twin()],
                };
                if self.flip_edge_if_possible(e) {
                    journal.push(record);
                    flipped = true;
                    break;
                }
            }
            if !flipped {
                self.rollback_flips(journal);
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
            self.rollback_flips(journal);
            return Ok(None);
        };
        self.core.refresh(&[kept], &ring);
        Ok(Some(kept))
    }

    fn rollback_flips(&mut self, journal: Vec<FlipRecord>) {
        for record in journal.into_iter().rev() {
            // Each recorded flip is undone by flipping the same edge again;
            // the exact pre-flip values are then restored to erase any
            // floating-point drift.
            let undone = self.flip_edge_if_possible(record.edge);
            debug_assert!(undone, "rollback flip must be legal");
            let h = self.core.mesh.halfedge(record.edge);
            self.core.geometry.set_length(record.edge, record.length);
            self.normal_coords.coords[record.edge] = record.coord;
            if self.core.mesh.tail(h) == record.tail {
                self.normal_coords.roundabouts[h] = record.roundabout_fwd;
                self.normal_coords.roundabouts[h.twin()] = record.roundabout_rev;
            } else {
                self.normal_coords.roundabouts[h] = record.roundabout_rev;
                self.normal_coords.roundabouts[h.twin()] = record.roundabout_fwd;
            }
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

    /// Insert the circumcenter of `f`, walking a geodesic from the
    /// barycenter toward it. If the walk crosses a fixed edge first, that
    /// edge is split at its midpoint instead (a segment split).
    ///
    /// Returns `Ok(None)` when neither insertion is geometrically possible.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption from vertex location.
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
        let target = point_from_barycentric(&chart.pos, bary);
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
                let clamped = clamp_barycentric(bary, 2.0 * eps);
                Ok(self
                    .insert_in_face(face, clamped)?
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

    /// Move an inserted vertex along a tangent-space vector: trace the
    /// geodesic, insert the landing point, then remove the old vertex.
    ///
    /// Returns the vertex at the new position, or `Ok(None)` if the trace
    /// leaves the surface or either mutation is infeasible (the
    /// triangulation is left unchanged in that case).
    ///
    /// # Errors
    ///
    /// Rejects vertices of the original input mesh.
    pub fn move_vertex(
        &mut self,
        v: VertexId,
        vec: Vector2<f64>,
    ) -> IntrinsicResult<Option<VertexId>> {
        if self.core.is_original_vertex(v) {
            return Err(IntrinsicError::RemoveOriginalVertex { vertex: v });
        }
        let distance = vec.norm();
        if distance <= self.core.triangle_test_eps {
            return Ok(None);
        }
        let Some((chart, start, direction)) = self.tangent_direction_chart(v, vec) else {
            return Ok(None);
        };
        let target = start + direction * distance;
        let outcome = walk_segment(
            &self.core.mesh,
            &self.core.geometry,
            &chart,
            start,
            target,
            2 * self.core.mesh.n_faces() + 8,
            |_, _| WalkControl::Continue,
        );
        let WalkOutcome::Landed { face, bary } = outcome else {
            return Ok(None);
        };
        let clamped = clamp_barycentric(bary, 2.0 * self.core.triangle_test_eps);
        let Some(new_vertex) = self.insert_in_face(face, clamped)? else {
            return Ok(None);
        };
        if self.remove_inserted_vertex(v)?.is_some() {
            Ok(Some(new_vertex))
        } else {
            let removed = self.remove_inserted_vertex(new_vertex)?;
            debug_assert!(removed.is_some(), "fresh tripod vertex must be removable");
            Ok(None)
        }
    }

    /// Resolve a tangent vector at `v` into a face chart, the position of
    /// `v` in it, and a unit direction.
    fn tangent_direction_chart(
        &self,
        v: VertexId,
        vec: Vector2<f64>,
    ) -> Option<(FaceChart, Vector2<f64>, Vector2<f64>)> {
        let mesh = &self.core.mesh;
        let geometry = &self.core.geometry;
        let theta = vec.y.atan2(vec.x).rem_euclid(std::f64::consts::TAU);
        let scale = std::f64::consts::TAU / geometry.angle_sum(v);

        // Find the wedge whose scaled angular span contains theta.
        let mut best: Option<(HalfedgeId, f64)> = None;
        for h in mesh.outgoing_halfedges(v) {
            if !mesh.is_interior(h) {
                continue;
            }
            let angle = geometry
                .halfedge_vector_in_vertex(h)
                .y
                .atan2(geometry.halfedge_vector_in_vertex(h).x)
                .rem_euclid(std::f64::consts::TAU);
            let offset = (theta - angle).rem_euclid(std::f64::consts::TAU);
            let span = geometry.corner_angle(h) * scale;
            if offset <= span + 1e-12 && best.map_or(true, |(_, o)| offset < o) {
                best = Some((h, offset));
            }
        }
        let (h, offset) = best?;
        let chart = FaceChart::new(mesh, geometry, mesh.face(h)?);
        let i = chart.hes.iter().position(|&he| he == h)?;
        let start = chart.pos[i];
        let along = (chart.pos[(i + 1) % 3] - start).normalize();
        let true_angle = offset / scale;
        let (sin, cos) = true_angle.sin_cos();
        let direction = Vector2::new(
            along.x * cos - along.y * sin,
            along.x * sin + along.y * cos,
        );
        Some((chart, start, direction))
    }
}

fn clamp_barycentric(bary: [f64; 3], floor: f64) -> [f64; 3] {
    let clamped = bary.map(|b| b.max(floor));
    let total: f64 = clamped.iter().sum();
    clamped.map(|b| b / total)
}
