//! Geometry derived from per-edge lengths alone.
//!
//! An intrinsic triangulation has no vertex positions; every geometric
//! quantity comes from positive edge lengths satisfying the triangle
//! inequality on each face. This module maintains the derived quantities
//! (corner angles, vertex angle sums, isometric face layouts, tangent-space
//! directions) and refreshes them locally after each mutation.

// Algorithm uses many short geometric variable names
#![allow(clippy::similar_names)]
#![allow(clippy::suboptimal_flops)]

use mesh_halfedge::{
    EdgeData, EdgeId, FaceId, HalfedgeData, HalfedgeId, HalfedgeMesh, Vector2, VertexData,
    VertexId,
};

use crate::error::{IntrinsicError, IntrinsicResult};

/// Interior angle at the corner with adjacent side lengths `l_b`, `l_c` and
/// opposite side length `l_a`, by the law of cosines.
#[must_use]
pub fn corner_angle_from_lengths(l_a: f64, l_b: f64, l_c: f64) -> f64 {
    let cos = ((l_b * l_b + l_c * l_c - l_a * l_a) / (2.0 * l_b * l_c)).clamp(-1.0, 1.0);
    cos.acos()
}

/// Cotangent of the angle opposite edge `ij` in the triangle with side
/// lengths `l_ij`, `l_jk`, `l_ki`.
#[must_use]
pub fn halfedge_cotan_weight(l_ij: f64, l_jk: f64, l_ki: f64) -> f64 {
    let cos = (l_jk * l_jk + l_ki * l_ki - l_ij * l_ij) / (2.0 * l_jk * l_ki);
    let cos = cos.clamp(-1.0, 1.0);
    let sin = (1.0 - cos * cos).sqrt();
    if sin < 1e-14 {
        return cos.signum() / 1e-14;
    }
    cos / sin
}

/// Place the third vertex of a triangle to the left of the segment
/// `a -> b`, at distance `l_ac` from `a` and `l_bc` from `b`.
#[must_use]
pub fn place_third_vertex(pa: Vector2<f64>, pb: Vector2<f64>, l_ac: f64, l_bc: f64) -> Vector2<f64> {
    let ab = pb - pa;
    let d = ab.norm();
    let x = (d * d + l_ac * l_ac - l_bc * l_bc) / (2.0 * d);
    let y = (l_ac * l_ac - x * x).max(0.0).sqrt();
    let unit = ab / d;
    let normal = Vector2::new(-unit.y, unit.x);
    pa + unit * x + normal * y
}

/// Corner positions of a triangle with side lengths `l0` (corner 0 to 1),
/// `l1` (1 to 2), `l2` (2 to 0): corner 0 at the origin, corner 1 on the
/// positive x-axis, corner 2 in the upper half-plane.
#[must_use]
pub fn face_layout_from_lengths(l0: f64, l1: f64, l2: f64) -> [Vector2<f64>; 3] {
    let p0 = Vector2::zeros();
    let p1 = Vector2::new(l0, 0.0);
    let p2 = place_third_vertex(p0, p1, l2, l1);
    [p0, p1, p2]
}

/// Evaluate barycentric coordinates against triangle corners.
#[must_use]
pub fn point_from_barycentric(corners: &[Vector2<f64>; 3], bary: [f64; 3]) -> Vector2<f64> {
    corners[0] * bary[0] + corners[1] * bary[1] + corners[2] * bary[2]
}

/// Barycentric coordinates of `p` in the triangle with the given corners.
#[must_use]
pub fn barycentric_of_point(corners: &[Vector2<f64>; 3], p: Vector2<f64>) -> [f64; 3] {
    let cross = |u: Vector2<f64>, v: Vector2<f64>| u.x * v.y - u.y * v.x;
    let area = cross(corners[1] - corners[0], corners[2] - corners[0]);
    let b0 = cross(corners[2] - corners[1], p - corners[1]) / area;
    let b1 = cross(corners[0] - corners[2], p - corners[2]) / area;
    [b0, b1, 1.0 - b0 - b1]
}

/// Derived geometric quantities of an edge-length metric.
///
/// All fields are kept consistent with the connectivity by the incremental
/// `refresh_*` methods; the triangulation calls them for exactly the
/// elements a mutation touched.
#[derive(Debug, Clone)]
pub struct EdgeLengthGeometry {
    lengths: EdgeData<f64>,
    corner_angle: HalfedgeData<f64>,
    vector_in_face: HalfedgeData<Vector2<f64>>,
    vector_in_vertex: HalfedgeData<Vector2<f64>>,
    angle_sum: VertexData<f64>,
}

impl EdgeLengthGeometry {
    /// Build derived quantities from edge lengths.
    ///
    /// # Errors
    ///
    /// Returns an error if any length is not strictly positive or any face
    /// strictly violates the triangle inequality.
    pub fn new(mesh: &HalfedgeMesh, lengths: EdgeData<f64>) -> IntrinsicResult<Self> {
        let mut geometry = Self {
            lengths,
            corner_angle: HalfedgeData::new(mesh.n_halfedges_capacity(), 0.0),
            vector_in_face: HalfedgeData::new(mesh.n_halfedges_capacity(), Vector2::zeros()),
            vector_in_vertex: HalfedgeData::new(mesh.n_halfedges_capacity(), Vector2::zeros()),
            angle_sum: VertexData::new(mesh.n_vertices_capacity(), 0.0),
        };
        for e in mesh.edges() {
            let l = geometry.lengths[e];
            if !(l > 0.0) || !l.is_finite() {
                return Err(IntrinsicError::InvalidEdgeLength { edge: e, length: l });
            }
        }
        for f in mesh.faces() {
            if !geometry.satisfies_triangle_inequality(mesh, f) {
                return Err(IntrinsicError::TriangleInequality { face: f });
            }
            geometry.refresh_face(mesh, f);
        }
        for v in mesh.vertices() {
            geometry.refresh_vertex(mesh, v);
        }
        Ok(geometry)
    }

    /// Length of an edge.
    #[must_use]
    pub fn length(&self, e: EdgeId) -> f64 {
        self.lengths[e]
    }

    /// Overwrite the length of an edge. Derived quantities stay stale until
    /// the incident faces and vertices are refreshed.
    pub fn set_length(&mut self, e: EdgeId, length: f64) {
        self.lengths[e] = length;
    }

    /// Interior angle at `tail(h)` inside `face(h)`.
    #[must_use]
    pub fn corner_angle(&self, h: HalfedgeId) -> f64 {
        self.corner_angle[h]
    }

    /// Sum of interior corner angles around the vertex.
    #[must_use]
    pub fn angle_sum(&self, v: VertexId) -> f64 {
        self.angle_sum[v]
    }

    /// The half-edge as a 2D vector in its face's isometric layout.
    #[must_use]
    pub fn halfedge_vector_in_face(&self, h: HalfedgeId) -> Vector2<f64> {
        self.vector_in_face[h]
    }

    /// Unit direction of the half-edge in the rescaled tangent space at its
    /// tail vertex.
    #[must_use]
    pub fn halfedge_vector_in_vertex(&self, h: HalfedgeId) -> Vector2<f64> {
        self.vector_in_vertex[h]
    }

    /// Grow the attribute arrays to the mesh's current element capacity.
    pub fn resize(&mut self, mesh: &HalfedgeMesh) {
        self.lengths.resize(mesh.n_edges_capacity());
        self.corner_angle.resize(mesh.n_halfedges_capacity());
        self.vector_in_face.resize(mesh.n_halfedges_capacity());
        self.vector_in_vertex.resize(mesh.n_halfedges_capacity());
        self.angle_sum.resize(mesh.n_vertices_capacity());
    }

    /// Whether the face satisfies the strict triangle inequality.
    #[must_use]
    pub fn satisfies_triangle_inequality(&self, mesh: &HalfedgeMesh, f: FaceId) -> bool {
        let [l0, l1, l2] = mesh.face_halfedges(f).map(|h| self.lengths[h.edge()]);
        l0 < l1 + l2 && l1 < l2 + l0 && l2 < l0 + l1
    }

    /// Recompute corner angles and the isometric layout of one face.
    pub fn refresh_face(&mut self, mesh: &HalfedgeMesh, f: FaceId) {
        let hes = mesh.face_halfedges(f);
        let [l0, l1, l2] = hes.map(|h| self.lengths[h.edge()]);
        self.corner_angle[hes[0]] = corner_angle_from_lengths(l1, l0, l2);
        self.corner_angle[hes[1]] = corner_angle_from_lengths(l2, l1, l0);
        self.corner_angle[hes[2]] = corner_angle_from_lengths(l0, l2, l1);

        let corners = face_layout_from_lengths(l0, l1, l2);
        self.vector_in_face[hes[0]] = corners[1] - corners[0];
        self.vector_in_face[hes[1]] = corners[2] - corners[1];
        self.vector_in_face[hes[2]] = corners[0] - corners[2];
    }

    /// Recompute the angle sum and tangent-space directions at one vertex.
    /// Corner angles of the incident faces must already be current.
    pub fn refresh_vertex(&mut self, mesh: &HalfedgeMesh, v: VertexId) {
        let mut sum = 0.0;
        let mut boundary_out = None;
        for h in mesh.outgoing_halfedges(v) {
            if mesh.is_interior(h) {
                sum += self.corner_angle[h];
            } else {
                boundary_out = Some(h);
            }
        }
        self.angle_sum[v] = sum;

        let scale = if boundary_out.is_some() {
            std::f64::consts::PI / sum
        } else {
            std::f64::consts::TAU / sum
        };

        // The reference ray is the first surface wedge counterclockwise of
        // the boundary gap, or the vertex's reference half-edge when the
        // vertex is interior.
        let start = match boundary_out {
            Some(h) => mesh.next_outgoing(h),
            None => mesh.halfedge_of_vertex(v),
        };
        let mut theta = 0.0;
        let mut h = start;
        loop {
            self.vector_in_vertex[h] = Vector2::new((scale * theta).cos(), (scale * theta).sin());
            if !mesh.is_interior(h) {
                break;
            }
            theta += self.corner_angle[h];
            h = mesh.next_outgoing(h);
            if h == start {
                break;
            }
        }
    }

    /// Isometric corner positions of a face: first corner at the origin,
    /// second on the positive x-axis, third in the upper half-plane.
    #[must_use]
    pub fn vertex_coordinates_in_face(&self, mesh: &HalfedgeMesh, f: FaceId) -> [Vector2<f64>; 3] {
        let [l0, l1, l2] = mesh.face_halfedges(f).map(|h| self.lengths[h.edge()]);
        face_layout_from_lengths(l0, l1, l2)
    }

    /// Lay out the two faces adjacent to an interior half-edge as a planar
    /// quadrilateral `[a, b, c, d]`: `h` runs `a -> c`, `b` is the apex of
    /// `face(h)` (upper half-plane), `d` the apex across the twin (lower).
    ///
    /// Returns `None` if either side of the edge is a boundary loop.
    #[must_use]
    pub fn layout_diamond(&self, mesh: &HalfedgeMesh, h: HalfedgeId) -> Option<[Vector2<f64>; 4]> {
        if !mesh.is_interior(h) || !mesh.is_interior(h.twin()) {
            return None;
        }
        let t = h.twin();
        let pa = Vector2::zeros();
        let pc = Vector2::new(self.lengths[h.edge()], 0.0);
        let pb = place_third_vertex(
            pa,
            pc,
            self.lengths[mesh.prev(h).edge()],
            self.lengths[mesh.next(h).edge()],
        );
        let pd = place_third_vertex(
            pc,
            pa,
            self.lengths[mesh.prev(t).edge()],
            self.lengths[mesh.next(t).edge()],
        );
        Some([pa, pb, pc, pd])
    }

    /// Area of a face, by Heron's formula.
    #[must_use]
    pub fn face_area(&self, mesh: &HalfedgeMesh, f: FaceId) -> f64 {
        let [a, b, c] = mesh.face_halfedges(f).map(|h| self.lengths[h.edge()]);
        let s = 0.5 * (a + b + c);
        (s * (s - a) * (s - b) * (s - c)).max(0.0).sqrt()
    }

    /// Circumradius of a face.
    #[must_use]
    pub fn circumradius(&self, mesh: &HalfedgeMesh, f: FaceId) -> f64 {
        let [a, b, c] = mesh.face_halfedges(f).map(|h| self.lengths[h.edge()]);
        let area = self.face_area(mesh, f);
        if area < 1e-14 {
            return f64::INFINITY;
        }
        a * b * c / (4.0 * area)
    }

    /// Length of the shortest edge of a face.
    #[must_use]
    pub fn shortest_edge(&self, mesh: &HalfedgeMesh, f: FaceId) -> f64 {
        let [a, b, c] = mesh.face_halfedges(f).map(|h| self.lengths[h.edge()]);
        a.min(b).min(c)
    }

    /// Smallest corner angle of a face.
    #[must_use]
    pub fn min_corner_angle(&self, mesh: &HalfedgeMesh, f: FaceId) -> f64 {
        mesh.face_halfedges(f)
            .map(|h| self.corner_angle[h])
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    /// Smallest corner angle over all faces, in degrees.
    #[must_use]
    pub fn min_angle_degrees(&self, mesh: &HalfedgeMesh) -> f64 {
        mesh.faces()
            .map(|f| self.min_corner_angle(mesh, f))
            .fold(f64::INFINITY, f64::min)
            .to_degrees()
    }

    /// Barycentric coordinates of the face's circumcenter, in the corner
    /// order of `face_halfedges`. Coordinates are negative outside an obtuse
    /// face.
    #[must_use]
    pub fn circumcenter_barycentric(&self, mesh: &HalfedgeMesh, f: FaceId) -> [f64; 3] {
        let hes = mesh.face_halfedges(f);
        // Side opposite corner i is the edge of halfedge i + 1.
        let a = self.lengths[hes[1].edge()];
        let b = self.lengths[hes[2].edge()];
        let c = self.lengths[hes[0].edge()];
        let (a2, b2, c2) = (a * a, b * b, c * c);
        let w = [
            a2 * (b2 + c2 - a2),
            b2 * (c2 + a2 - b2),
            c2 * (a2 + b2 - c2),
        ];
        let total: f64 = w.iter().sum();
        [w[0] / total, w[1] / total, w[2] / total]
    }

    /// Sum of the cotangents of the two angles opposite an edge. For a
    /// boundary edge only the interior side contributes.
    #[must_use]
    pub fn edge_cotan_weight(&self, mesh: &HalfedgeMesh, e: EdgeId) -> f64 {
        let mut weight = 0.0;
        for h in [mesh.halfedge(e), mesh.halfedge(e).twin()] {
            if mesh.is_interior(h) {
                let l_ij = self.lengths[h.edge()];
                let l_jk = self.lengths[mesh.next(h).edge()];
                let l_ki = self.lengths[mesh.prev(h).edge()];
                weight += halfedge_cotan_weight(l_ij, l_jk, l_ki);
            }
        }
        weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_halfedge::HalfedgeMesh;

    fn unit_square() -> (HalfedgeMesh, EdgeLengthGeometry) {
        let mesh = HalfedgeMesh::from_faces(4, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let mut lengths = EdgeData::new(mesh.n_edges_capacity(), 0.0);
        let positions: [[f64; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for e in mesh.edges() {
            let h = mesh.halfedge(e);
            let (a, b) = (positions[mesh.tail(h).index()], positions[mesh.head(h).index()]);
            lengths[e] = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        }
        let geometry = EdgeLengthGeometry::new(&mesh, lengths).unwrap();
        (mesh, geometry)
    }

    fn equilateral() -> (HalfedgeMesh, EdgeLengthGeometry) {
        let mesh = HalfedgeMesh::from_faces(3, &[[0, 1, 2]]).unwrap();
        let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
        let geometry = EdgeLengthGeometry::new(&mesh, lengths).unwrap();
        (mesh, geometry)
    }

    #[test]
    fn test_equilateral_angles() {
        let (mesh, geometry) = equilateral();
        let f = mesh.faces().next().unwrap();
        for h in mesh.face_halfedges(f) {
            assert!((geometry.corner_angle(h) - std::f64::consts::FRAC_PI_3).abs() < 1e-12);
        }
        assert!((geometry.min_angle_degrees(&mesh) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_square_angle_sums() {
        let (mesh, geometry) = unit_square();
        // Corner vertices 1 and 3 carry one right angle, the diagonal
        // vertices 0 and 2 carry two half right angles.
        for v in mesh.vertices() {
            assert!((geometry.angle_sum(v) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_face_layout_matches_lengths() {
        let (mesh, geometry) = unit_square();
        for f in mesh.faces() {
            let corners = geometry.vertex_coordinates_in_face(&mesh, f);
            let hes = mesh.face_halfedges(f);
            for i in 0..3 {
                let measured = (corners[(i + 1) % 3] - corners[i]).norm();
                assert!((measured - geometry.length(hes[i].edge())).abs() < 1e-12);
                let vec = geometry.halfedge_vector_in_face(hes[i]);
                assert!((vec - (corners[(i + 1) % 3] - corners[i])).norm() < 1e-12);
            }
            // Third corner above the axis.
            assert!(corners[2].y > 0.0);
        }
    }

    #[test]
    fn test_layout_diamond_square() {
        let (mesh, geometry) = unit_square();
        let diagonal = mesh.edges().find(|&e| !mesh.is_boundary_edge(e)).unwrap();
        let h = mesh.halfedge(diagonal);
        let [pa, pb, pc, pd] = geometry.layout_diamond(&mesh, h).unwrap();

        let sqrt2 = std::f64::consts::SQRT_2;
        assert!((pc - pa).norm() - sqrt2 < 1e-12);
        assert!(pb.y > 0.0 && pd.y < 0.0);
        // Unit square: the two apexes are one unit from both diagonal ends,
        // so the other diagonal has unit... the flipped diagonal length is
        // the distance between opposite corners of the square, sqrt(2)
        // rotated: |pb - pd| = sqrt(2).
        assert!(((pb - pd).norm() - sqrt2).abs() < 1e-12);
    }

    #[test]
    fn test_layout_diamond_boundary_is_none() {
        let (mesh, geometry) = unit_square();
        let boundary = mesh.edges().find(|&e| mesh.is_boundary_edge(e)).unwrap();
        assert!(geometry.layout_diamond(&mesh, mesh.halfedge(boundary)).is_none());
    }

    #[test]
    fn test_circumcenter_equilateral_is_centroid() {
        let (mesh, geometry) = equilateral();
        let f = mesh.faces().next().unwrap();
        let bary = geometry.circumcenter_barycentric(&mesh, f);
        for b in bary {
            assert!((b - 1.0 / 3.0).abs() < 1e-12);
        }
        let third = 3f64.sqrt() / 3.0;
        assert!((geometry.circumradius(&mesh, f) - third).abs() < 1e-12);
    }

    #[test]
    fn test_cotan_weight_right_angle() {
        // Right isoceles triangle: angle opposite the hypotenuse is 90
        // degrees, cotan 0.
        let w = halfedge_cotan_weight(std::f64::consts::SQRT_2, 1.0, 1.0);
        assert!(w.abs() < 1e-12);
        // Angles opposite the legs are 45 degrees, cotan 1.
        let w = halfedge_cotan_weight(1.0, std::f64::consts::SQRT_2, 1.0);
        assert!((w - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_length_rejected() {
        let mesh = HalfedgeMesh::from_faces(3, &[[0, 1, 2]]).unwrap();
        let lengths = EdgeData::new(mesh.n_edges_capacity(), 0.0);
        assert!(matches!(
            EdgeLengthGeometry::new(&mesh, lengths),
            Err(IntrinsicError::InvalidEdgeLength { .. })
        ));
    }

    #[test]
    fn test_triangle_inequality_rejected() {
        let mesh = HalfedgeMesh::from_faces(3, &[[0, 1, 2]]).unwrap();
        let mut lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
        lengths[mesh.edges().next().unwrap()] = 5.0;
        assert!(matches!(
            EdgeLengthGeometry::new(&mesh, lengths),
            Err(IntrinsicError::TriangleInequality { .. })
        ));
    }

    #[test]
    fn test_tangent_vectors_unit_and_ordered() {
        let mesh =
            HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
        let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
        let geometry = EdgeLengthGeometry::new(&mesh, lengths).unwrap();
        for v in mesh.vertices() {
            // Regular tetrahedron: angle sum Pi at every vertex.
            assert!((geometry.angle_sum(v) - std::f64::consts::PI).abs() < 1e-12);
            for h in mesh.outgoing_halfedges(v) {
                assert!((geometry.halfedge_vector_in_vertex(h).norm() - 1.0).abs() < 1e-12);
            }
            // Rescaled wedges of an interior vertex sum to a full turn.
            let total: f64 = mesh
                .outgoing_halfedges(v)
                .map(|h| geometry.corner_angle(h))
                .sum();
            assert!((total - geometry.angle_sum(v)).abs() < 1e-12);
        }
    }
}
