//! The capability contract shared by the triangulation variants.
//!
//! Two representations satisfy the same outward contract: the signpost
//! encoding (per-half-edge direction angles, floating-point correspondence)
//! and the integer encoding (normal coordinates, exact correspondence).
//! The refinement drivers are written against this trait and work with
//! either.

use mesh_halfedge::{EdgeId, FaceId, HalfedgeId, HalfedgeMesh, SurfacePoint, VertexId};

use crate::error::IntrinsicResult;
use crate::geometry::EdgeLengthGeometry;
use crate::subdivision::CommonSubdivision;
use crate::triangulation::RefinementInsertion;

/// An intrinsic triangulation sitting atop a fixed input surface.
pub trait IntrinsicTriangulation {
    /// The intrinsic mesh connectivity.
    fn mesh(&self) -> &HalfedgeMesh;

    /// The borrowed input mesh.
    fn input_mesh(&self) -> &HalfedgeMesh;

    /// Derived geometry of the intrinsic metric.
    fn geometry(&self) -> &EdgeLengthGeometry;

    /// Location of an intrinsic vertex on the input surface.
    fn location(&self, v: VertexId) -> SurfacePoint;

    /// Marked or boundary edge: refinement must not flip or remove it.
    fn is_fixed(&self, e: EdgeId) -> bool;

    /// Flip the edge if it fails the Delaunay criterion; report whether a
    /// flip occurred.
    fn flip_edge_if_not_delaunay(&mut self, e: EdgeId) -> bool;

    /// Flip the edge whenever it is combinatorially and geometrically
    /// flippable; report whether a flip occurred.
    fn flip_edge_if_possible(&mut self, e: EdgeId) -> bool;

    /// Insert a vertex at a surface point of the intrinsic triangulation.
    ///
    /// # Errors
    ///
    /// Rejects vertex points; propagates invariant corruption.
    fn insert_vertex(&mut self, point: SurfacePoint) -> IntrinsicResult<Option<VertexId>>;

    /// Remove a previously inserted vertex, returning the surviving face.
    ///
    /// # Errors
    ///
    /// Rejects vertices of the original input mesh.
    fn remove_inserted_vertex(&mut self, v: VertexId) -> IntrinsicResult<Option<FaceId>>;

    /// Split an edge at parameter `t` along its canonical half-edge.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption.
    fn split_edge(&mut self, e: EdgeId, t: f64) -> IntrinsicResult<Option<VertexId>>;

    /// Insert a face's circumcenter, or split the fixed edge blocking it.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption.
    fn insert_circumcenter_or_split_segment(
        &mut self,
        f: FaceId,
    ) -> IntrinsicResult<Option<RefinementInsertion>>;

    /// Trace an intrinsic half-edge along the input surface.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption.
    fn trace_halfedge(&self, h: HalfedgeId) -> IntrinsicResult<Vec<SurfacePoint>>;

    /// Map a point on the intrinsic triangulation to the input surface.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption.
    fn equivalent_point_on_input(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint>;

    /// Map a point on the input surface to the intrinsic triangulation.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption.
    fn equivalent_point_on_intrinsic(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint>;

    /// Extract the overlay of the two triangulations.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption; variants without an exact
    /// correspondence report the operation as unsupported.
    fn extract_common_subdivision(&self) -> IntrinsicResult<CommonSubdivision>;

    /// Whether the edge satisfies the intrinsic Delaunay criterion. Fixed
    /// edges count as satisfied.
    fn is_delaunay_edge(&self, e: EdgeId) -> bool {
        self.is_fixed(e) || self.geometry().edge_cotan_weight(self.mesh(), e) >= -1e-6
    }

    /// Whether every edge satisfies the intrinsic Delaunay criterion.
    fn is_delaunay(&self) -> bool {
        self.mesh().edges().all(|e| self.is_delaunay_edge(e))
    }

    /// Smallest corner angle of the triangulation, in degrees.
    fn min_angle_degrees(&self) -> f64 {
        self.geometry().min_angle_degrees(self.mesh())
    }
}

impl IntrinsicTriangulation for crate::IntegerTriangulation<'_> {
    fn mesh(&self) -> &HalfedgeMesh {
        self.mesh()
    }

    fn input_mesh(&self) -> &HalfedgeMesh {
        self.input_mesh()
    }

    fn geometry(&self) -> &EdgeLengthGeometry {
        self.geometry()
    }

    fn location(&self, v: VertexId) -> SurfacePoint {
        self.location(v)
    }

    fn is_fixed(&self, e: EdgeId) -> bool {
        self.is_fixed(e)
    }

    fn flip_edge_if_not_delaunay(&mut self, e: EdgeId) -> bool {
        self.flip_edge_if_not_delaunay(e)
    }

    fn flip_edge_if_possible(&mut self, e: EdgeId) -> bool {
        self.flip_edge_if_possible(e)
    }

    fn insert_vertex(&mut self, point: SurfacePoint) -> IntrinsicResult<Option<VertexId>> {
        self.insert_vertex(point)
    }

    fn remove_inserted_vertex(&mut self, v: VertexId) -> IntrinsicResult<Option<FaceId>> {
        self.remove_inserted_vertex(v)
    }

    fn split_edge(&mut self, e: EdgeId, t: f64) -> IntrinsicResult<Option<VertexId>> {
        self.split_edge(e, t)
    }

    fn insert_circumcenter_or_split_segment(
        &mut self,
        f: FaceId,
    ) -> IntrinsicResult<Option<RefinementInsertion>> {
        self.insert_circumcenter_or_split_segment(f)
    }

    fn trace_halfedge(&self, h: HalfedgeId) -> IntrinsicResult<Vec<SurfacePoint>> {
        self.trace_halfedge(h)
    }

    fn equivalent_point_on_input(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        self.equivalent_point_on_input(p)
    }

    fn equivalent_point_on_intrinsic(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        self.equivalent_point_on_intrinsic(p)
    }

    fn extract_common_subdivision(&self) -> IntrinsicResult<CommonSubdivision> {
        self.extract_common_subdivision()
    }

    fn is_delaunay_edge(&self, e: EdgeId) -> bool {
        self.is_delaunay_edge(e)
    }

    fn min_angle_degrees(&self) -> f64 {
        self.min_angle_degrees()
    }
}

impl IntrinsicTriangulation for crate::SignpostTriangulation<'_> {
    fn mesh(&self) -> &HalfedgeMesh {
        self.mesh()
    }

    fn input_mesh(&self) -> &HalfedgeMesh {
        self.input_mesh()
    }

    fn geometry(&self) -> &EdgeLengthGeometry {
        self.geometry()
    }

    fn location(&self, v: VertexId) -> SurfacePoint {
        self.location(v)
    }

    fn is_fixed(&self, e: EdgeId) -> bool {
        self.is_fixed(e)
    }

    fn flip_edge_if_not_delaunay(&mut self, e: EdgeId) -> bool {
        self.flip_edge_if_not_delaunay(e)
    }

    fn flip_edge_if_possible(&mut self, e: EdgeId) -> bool {
        self.flip_edge_if_possible(e)
    }

    fn insert_vertex(&mut self, point: SurfacePoint) -> IntrinsicResult<Option<VertexId>> {
        self.insert_vertex(point)
    }

    fn remove_inserted_vertex(&mut self, v: VertexId) -> IntrinsicResult<Option<FaceId>> {
        self.remove_inserted_vertex(v)
    }

    fn split_edge(&mut self, e: EdgeId, t: f64) -> IntrinsicResult<Option<VertexId>> {
        self.split_edge(e, t)
    }

    fn insert_circumcenter_or_split_segment(
        &mut self,
        f: FaceId,
    ) -> IntrinsicResult<Option<RefinementInsertion>> {
        self.insert_circumcenter_or_split_segment(f)
    }

    fn trace_halfedge(&self, h: HalfedgeId) -> IntrinsicResult<Vec<SurfacePoint>> {
        self.trace_halfedge(h)
    }

    fn equivalent_point_on_input(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        self.equivalent_point_on_input(p)
    }

    fn equivalent_point_on_intrinsic(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        self.equivalent_point_on_intrinsic(p)
    }

    fn extract_common_subdivision(&self) -> IntrinsicResult<CommonSubdivision> {
        // The floating-point representation has no exact crossing record to
        // thread an overlay from.
        Err(crate::error::IntrinsicError::Unsupported {
            operation: "extract_common_subdivision",
        })
    }

    fn is_delaunay_edge(&self, e: EdgeId) -> bool {
        self.is_delaunay_edge(e)
    }

    fn min_angle_degrees(&self) -> f64 {
        self.min_angle_degrees()
    }
}
