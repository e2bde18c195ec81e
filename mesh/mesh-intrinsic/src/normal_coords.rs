//! Integer normal coordinates and roundabouts.
//!
//! Each intrinsic edge carries the number of input edges crossing it
//! transversally. An edge that runs along an input edge carries `-k`, where
//! `k` counts additional input arcs parallel to it (in practice zero, so
//! coincident edges carry 0 and the negative marker appears only through
//! degenerate flips). Every update here is exact integer arithmetic; no
//! floating-point predicate ever feeds these counts.
//!
//! Roundabouts orient the correspondence at vertices shared with the input
//! mesh: for an outgoing intrinsic half-edge `h`, `roundabout(h)` is the
//! index (counterclockwise around the shared input vertex) of the input
//! half-edge whose wedge contains the direction of `h`.

use mesh_halfedge::{EdgeData, HalfedgeData, HalfedgeId, HalfedgeMesh, VertexData};

/// Clamped count of arcs cutting the corner between two adjacent edges.
///
/// `n_adj1`, `n_adj2` cross the corner's two sides, `n_opp` the opposite
/// edge. Negative coordinates count as zero crossings.
#[must_use]
pub fn corner_arcs(n_adj1: i64, n_adj2: i64, n_opp: i64) -> i64 {
    let (a, b, o) = (n_adj1.max(0), n_adj2.max(0), n_opp.max(0));
    ((a + b - o) / 2).clamp(0, a.min(b))
}

/// Arcs emanating from the corner opposite `n_opp` and crossing it.
#[must_use]
pub fn emanating_arcs(n_opp: i64, n_adj1: i64, n_adj2: i64) -> i64 {
    (n_opp.max(0) - n_adj1.max(0) - n_adj2.max(0)).max(0)
}

/// Per-triangle decomposition of the arcs crossing one side of a flip or
/// split diagonal. The triangle is `(a, apex, c)` with the diagonal `a - c`;
/// `near` is the edge `a - apex`, `far` the edge `apex - c`.
///
/// Along the diagonal, counted from `a`, the crossing arcs appear in bands:
/// first `corner_a` arcs hugging `a`, then `emanating` arcs from the apex,
/// then `corner_c` arcs hugging `c`. Disjointness of the input edges forces
/// this nesting, which is what makes the flip rule exact.
#[derive(Debug, Clone, Copy)]
pub struct DiagonalSide {
    /// Arcs cutting the corner at the diagonal tail (cross diagonal + near).
    pub corner_a: i64,
    /// Arcs cutting the corner at the diagonal head (cross diagonal + far).
    pub corner_c: i64,
    /// Arcs cutting the apex corner (cross near + far, not the diagonal).
    pub corner_apex: i64,
    /// Arcs emanating from the apex across the diagonal.
    pub emanating: i64,
    /// Arcs emanating from the diagonal tail across `far`.
    pub from_a: i64,
    /// Arcs emanating from the diagonal head across `near`.
    pub from_c: i64,
}

impl DiagonalSide {
    /// Decompose one triangle given the diagonal coordinate and its two
    /// other edge coordinates.
    #[must_use]
    pub fn new(n_diag: i64, n_near: i64, n_far: i64) -> Self {
        Self {
            corner_a: corner_arcs(n_near, n_diag, n_far),
            corner_c: corner_arcs(n_far, n_diag, n_near),
            corner_apex: corner_arcs(n_near, n_far, n_diag),
            emanating: emanating_arcs(n_diag, n_near, n_far),
            from_a: emanating_arcs(n_far, n_near, n_diag),
            from_c: emanating_arcs(n_near, n_far, n_diag),
        }
    }
}

/// Normal coordinates of the quadrilateral around a flippable edge.
///
/// The quad has corners `a, b, c, d` with the old diagonal `a - c`; `b` is
/// the apex of the diagonal half-edge's face and `d` the apex across the
/// twin. After the flip the diagonal joins `b - d`.
#[derive(Debug, Clone, Copy)]
pub struct FlipQuad {
    /// Old diagonal coordinate.
    pub diagonal: i64,
    /// Whether the old diagonal runs along an input edge. A zero coordinate
    /// cannot distinguish a coincident edge from an uncrossed one, so the
    /// caller supplies this from vertex locations.
    pub diagonal_is_shared: bool,
    /// Edge `a - b`.
    pub ab: i64,
    /// Edge `b - c`.
    pub bc: i64,
    /// Edge `c - d`.
    pub cd: i64,
    /// Edge `d - a`.
    pub da: i64,
}

/// Result of a normal-coordinate flip.
#[derive(Debug, Clone, Copy)]
pub struct FlipUpdate {
    /// Coordinate of the new diagonal `b - d`. Negative when the new
    /// diagonal comes to lie along input arcs.
    pub new_diagonal: i64,
    /// Input arcs emanating from `b` strictly between the new diagonal and
    /// the quad side `b - c`, counterclockwise. Reindexes the roundabout of
    /// the half-edge `b -> d`.
    pub arcs_at_b: i64,
    /// Input arcs emanating from `d` strictly between the new diagonal and
    /// the quad side `d - a`. Reindexes the roundabout of `d -> b`.
    pub arcs_at_d: i64,
}

/// Compute the new diagonal coordinate for an edge flip.
///
/// The boundary coordinates of the quad are unchanged by a flip: input
/// edges cross them the same way however the quad is triangulated. Applying
/// the update twice returns the diagonal to its original value.
#[must_use]
pub fn flip_normal_coordinates(quad: &FlipQuad) -> FlipUpdate {
    let ne = quad.diagonal.max(0);
    // Arcs running along the old diagonal; each crosses the new one.
    let parallel = if quad.diagonal_is_shared {
        1 + (-quad.diagonal).max(0)
    } else {
        0
    };

    let t1 = DiagonalSide::new(quad.diagonal, quad.ab, quad.bc);
    let t2 = DiagonalSide::new(quad.diagonal, quad.da, quad.cd);

    // Band positions along the diagonal, counted from `a`. On each side:
    // corner-a arcs, then apex-emanating arcs, then corner-c arcs.
    let b_band = (t1.corner_a, t1.corner_a + t1.emanating);
    let d_band = (t2.corner_a, t2.corner_a + t2.emanating);

    // Quad-crossing arcs pairing a near band on one side with a far band on
    // the other cross the new diagonal.
    let p = (t1.corner_a + t2.corner_c - ne).max(0);
    let q = (t1.corner_c + t2.corner_a - ne).max(0);

    // Arcs from b pairing with arcs from d join them: the new diagonal runs
    // along this bundle instead of crossing it.
    let bd_bundle = (b_band.1.min(d_band.1) - b_band.0.max(d_band.0)).max(0);

    let arcs_at_b = (b_band.1 - b_band.0.max(d_band.1)).max(0);
    let arcs_at_d = (d_band.1.min(b_band.0) - d_band.0).max(0);

    let new_diagonal = if bd_bundle > 0 {
        -(bd_bundle - 1)
    } else {
        t1.corner_apex
            + t2.corner_apex
            + p
            + q
            + t1.from_a
            + t1.from_c
            + t2.from_a
            + t2.from_c
            + parallel
    };

    FlipUpdate {
        new_diagonal,
        arcs_at_b,
        arcs_at_d,
    }
}

/// Normal coordinates around an edge about to be split.
///
/// The split half-edge runs `a -> c` in face `(a, c, b)`; across the twin
/// lies face `(c, a, d)`. `front_*` edges bound the half-edge's own face,
/// `back_*` the twin's (absent on the boundary).
#[derive(Debug, Clone, Copy)]
pub struct SplitEdgePrism {
    /// Coordinate of the edge being split.
    pub edge: i64,
    /// Edge `b - a`.
    pub front_near: i64,
    /// Edge `c - b`.
    pub front_far: i64,
    /// Edge `a - d` and `d - c`, when the edge is interior.
    pub back: Option<(i64, i64)>,
}

/// Result of a normal-coordinate edge split.
#[derive(Debug, Clone, Copy)]
pub struct SplitUpdate {
    /// Coordinate of the tail-side child `a - v`.
    pub tail_side: i64,
    /// Coordinate of the head-side child `v - c`.
    pub head_side: i64,
    /// Coordinate of the spoke `v - b`.
    pub spoke_front: i64,
    /// Coordinate of the spoke `v - d`, when the edge is interior.
    pub spoke_back: Option<i64>,
    /// Arcs from `b` crossing the head-side child; reindexes the roundabout
    /// of the half-edge `b -> v` against `b -> c`.
    pub arcs_at_front_apex: i64,
    /// Arcs from `d` crossing the tail-side child; reindexes the roundabout
    /// of `d -> v` against `d -> a`.
    pub arcs_at_back_apex: i64,
}

/// Split an edge's crossings at parameter `t` from the tail.
///
/// Crossings distribute by position: the tail side keeps `floor(t * n)` of
/// them. A shared edge passes its negative marker to both children, and its
/// parallel arcs never cross the spokes.
#[must_use]
pub fn split_normal_coordinates(prism: &SplitEdgePrism, t: f64) -> SplitUpdate {
    let ne = prism.edge;
    let (tail_side, head_side) = if ne >= 0 {
        let tail = ((t * ne as f64).floor() as i64).clamp(0, ne);
        (tail, ne - tail)
    } else {
        (ne, ne)
    };
    let (tail_x, head_x) = (tail_side.max(0), head_side.max(0));

    let front = DiagonalSide::new(ne, prism.front_near, prism.front_far);
    let spoke_front = (front.corner_a - tail_x).max(0)
        + (front.corner_c - head_x).max(0)
        + front.corner_apex
        + front.from_a
        + front.from_c;
    let band_front = (front.corner_a, front.corner_a + front.emanating);
    let arcs_at_front_apex = (band_front.1 - band_front.0.max(tail_x)).max(0);

    let (spoke_back, arcs_at_back_apex) = match prism.back {
        Some((near_back, far_back)) => {
            let back = DiagonalSide::new(ne, near_back, far_back);
            let spoke = (back.corner_a - tail_x).max(0)
                + (back.corner_c - head_x).max(0)
                + back.corner_apex
                + back.from_a
                + back.from_c;
            let band = (back.corner_a, back.corner_a + back.emanating);
            let arcs = (band.1.min(tail_x) - band.0).max(0);
            (Some(spoke), arcs)
        }
        None => (None, 0),
    };

    SplitUpdate {
        tail_side,
        head_side,
        spoke_front,
        spoke_back,
        arcs_at_front_apex,
        arcs_at_back_apex,
    }
}

/// Result of inserting a vertex inside a face.
#[derive(Debug, Clone, Copy)]
pub struct InsertUpdate {
    /// Spoke coordinates toward the three corners, in face corner order.
    pub spokes: [i64; 3],
    /// Arcs emanating from each corner counterclockwise of the spoke from
    /// that corner, for roundabout reindexing.
    pub arcs_ccw_of_spoke: [i64; 3],
}

/// Compute spoke coordinates for a vertex inserted at barycentric
/// coordinates `bary` inside a face with edge coordinates `n` (edge `i`
/// joins corners `i` and `i + 1`).
///
/// Each spoke picks up the crossing count of its corner. An emanating
/// bundle, when present, splits between the two spokes it must cross by the
/// barycentric shadow of the new vertex, mirroring the floor rule used for
/// edge splits.
#[must_use]
pub fn insert_normal_coordinates(n: &[i64; 3], bary: [f64; 3]) -> InsertUpdate {
    // Corner i sits between edges i (outgoing) and i+2 (incoming).
    let corner = [
        corner_arcs(n[0], n[2], n[1]),
        corner_arcs(n[1], n[0], n[2]),
        corner_arcs(n[2], n[1], n[0]),
    ];
    // At most one corner can emanate arcs across its opposite edge.
    let emanating = [
        emanating_arcs(n[1], n[0], n[2]),
        emanating_arcs(n[2], n[1], n[0]),
        emanating_arcs(n[0], n[2], n[1]),
    ];

    let mut spokes = [corner[0], corner[1], corner[2]];
    let mut arcs_ccw = [0i64; 3];
    for i in 0..3 {
        if emanating[i] == 0 {
            continue;
        }
        // Arcs from corner i land on the opposite edge between corners
        // j = i+1 and k = i+2; those landing on k's side of the new
        // vertex's shadow cross the spoke toward k, the rest the spoke
        // toward j.
        let j = (i + 1) % 3;
        let k = (i + 2) % 3;
        let denom = bary[j] + bary[k];
        let toward_k = if denom > 0.0 {
            ((emanating[i] as f64) * (bary[j] / denom)).floor() as i64
        } else {
            0
        };
        let toward_k = toward_k.clamp(0, emanating[i]);
        spokes[k] += toward_k;
        spokes[j] += emanating[i] - toward_k;
        // Landing order on the opposite edge runs from j to k as the
        // direction turns counterclockwise at corner i.
        arcs_ccw[i] = toward_k;
    }

    InsertUpdate {
        spokes,
        arcs_ccw_of_spoke: arcs_ccw,
    }
}

/// The integer crossing field over an intrinsic mesh, with roundabouts.
#[derive(Debug, Clone)]
pub struct NormalCoordinates {
    /// Crossing count (or negative shared marker) per intrinsic edge.
    pub coords: EdgeData<i64>,
    /// Roundabout per intrinsic half-edge; meaningful only where the tail
    /// vertex is shared with the input mesh.
    pub roundabouts: HalfedgeData<u32>,
    /// Degree of the corresponding input vertex; zero for vertices the
    /// input mesh does not have.
    pub input_degree: VertexData<u32>,
}

impl NormalCoordinates {
    /// Identity coordinates for a triangulation that currently equals the
    /// input mesh: zero crossings everywhere, roundabouts matching each
    /// half-edge's own position around its tail vertex.
    #[must_use]
    pub fn identity(mesh: &HalfedgeMesh) -> Self {
        let coords = EdgeData::new(mesh.n_edges_capacity(), 0);
        let mut roundabouts = HalfedgeData::new(mesh.n_halfedges_capacity(), 0);
        let mut input_degree = VertexData::new(mesh.n_vertices_capacity(), 0);
        for v in mesh.vertices() {
            input_degree[v] = mesh.vertex_degree(v) as u32;
            for (i, h) in mesh.outgoing_halfedges(v).enumerate() {
                roundabouts[h] = i as u32;
            }
        }
        Self {
            coords,
            roundabouts,
            input_degree,
        }
    }

    /// Crossing count of an edge (negative for shared markers).
    #[must_use]
    pub fn coordinate(&self, e: mesh_halfedge::EdgeId) -> i64 {
        self.coords[e]
    }

    /// Roundabout of a half-edge.
    #[must_use]
    pub fn roundabout(&self, h: HalfedgeId) -> u32 {
        self.roundabouts[h]
    }

    /// Grow attribute arrays to the mesh's element capacity.
    pub fn resize(&mut self, mesh: &HalfedgeMesh) {
        self.coords.resize(mesh.n_edges_capacity());
        self.roundabouts.resize(mesh.n_halfedges_capacity());
        self.input_degree.resize(mesh.n_vertices_capacity());
    }

    /// Assign the roundabout of `h` from its counterclockwise neighbor `g`
    /// (the next outgoing half-edge at the same tail), given the number of
    /// input arcs emanating strictly between them.
    pub fn set_roundabout_from_ccw_neighbor(
        &mut self,
        mesh: &HalfedgeMesh,
        h: HalfedgeId,
        g: HalfedgeId,
        arcs_between: i64,
    ) {
        let v = mesh.tail(h);
        let degree = i64::from(self.input_degree[v]);
        if degree == 0 {
            self.roundabouts[h] = 0;
            return;
        }
        let r = (i64::from(self.roundabouts[g]) - arcs_between).rem_euclid(degree);
        self.roundabouts[h] = r as u32;
    }

    /// Whether every face satisfies the corner-crossing validity conditions:
    /// non-negative clamped corner counts by construction, and for faces
    /// whose vertices carry no emanating arcs, an even coordinate sum.
    #[must_use]
    pub fn face_is_valid(&self, mesh: &HalfedgeMesh, f: mesh_halfedge::FaceId) -> bool {
        let [n0, n1, n2] = mesh
            .face_halfedges(f)
            .map(|h| self.coords[h.edge()].max(0));
        let no_emanating = emanating_arcs(n0, n1, n2) == 0
            && emanating_arcs(n1, n2, n0) == 0
            && emanating_arcs(n2, n0, n1) == 0;
        !no_emanating || (n0 + n1 + n2) % 2 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_halfedge::VertexId;

    fn quad(diagonal: i64, shared: bool, sides: [i64; 4]) -> FlipQuad {
        FlipQuad {
            diagonal,
            diagonal_is_shared: shared,
            ab: sides[0],
            bc: sides[1],
            cd: sides[2],
            da: sides[3],
        }
    }

    #[test]
    fn test_generic_flip_formula() {
        // Two corner arcs at the quad's a and c corners: each crosses the
        // old diagonal once and avoids the new one.
        let q = quad(2, false, [1, 1, 1, 1]);
        let update = flip_normal_coordinates(&q);
        assert_eq!(update.new_diagonal, 0);
        assert_eq!(update.arcs_at_b, 0);
        assert_eq!(update.arcs_at_d, 0);
    }

    #[test]
    fn test_generic_flip_round_trip() {
        for q in [
            quad(2, false, [1, 1, 1, 1]),
            quad(0, false, [1, 1, 1, 1]),
            quad(3, false, [2, 1, 1, 2]),
            quad(1, false, [1, 0, 1, 0]),
            quad(5, false, [2, 3, 4, 1]),
        ] {
            let once = flip_normal_coordinates(&q);
            let back = quad(once.new_diagonal, false, [q.bc, q.cd, q.da, q.ab]);
            let twice = flip_normal_coordinates(&back);
            assert_eq!(
                twice.new_diagonal, q.diagonal,
                "round trip failed for {q:?}"
            );
        }
    }

    #[test]
    fn test_flip_coincident_diagonal() {
        // Flipping an edge that lies along an input edge: the input edge
        // now crosses the new diagonal once.
        let q = quad(0, true, [0, 0, 0, 0]);
        let update = flip_normal_coordinates(&q);
        assert_eq!(update.new_diagonal, 1);

        // Flipping back: the single crossing emanates from both apexes of
        // the rotated quad and the diagonal becomes coincident again.
        let back = quad(1, false, [0, 0, 0, 0]);
        let update = flip_normal_coordinates(&back);
        assert_eq!(update.new_diagonal, 0);
    }

    #[test]
    fn test_flip_parallel_bundle_marker() {
        // Two input arcs emanating from b and d pair up: the new diagonal
        // runs along them, one absorbed as the coincident edge, one marked.
        let back = quad(2, false, [0, 0, 0, 0]);
        let update = flip_normal_coordinates(&back);
        assert_eq!(update.new_diagonal, -1);

        // And a marked shared diagonal flips to two crossings.
        let q = quad(-1, true, [0, 0, 0, 0]);
        let update = flip_normal_coordinates(&q);
        assert_eq!(update.new_diagonal, 2);
    }

    #[test]
    fn test_flip_emanating_adjustments() {
        // Three arcs cross the diagonal; one emanates from b (beyond the
        // corner arcs) and exits through cd.
        let q = quad(3, false, [1, 0, 2, 1]);
        let t1 = DiagonalSide::new(3, 1, 0);
        assert_eq!(t1.corner_a, 1);
        assert_eq!(t1.emanating, 2);
        let update = flip_normal_coordinates(&q);
        // Band at b is (1, 3]; band at d is (1, 1] (t2: corner_a = 1,
        // emanating = 0): no pairing, both b-arcs exit through cd.
        assert_eq!(update.arcs_at_b, 2);
        assert_eq!(update.arcs_at_d, 0);
        // Crossings of the new diagonal: corner_apex terms and the
        // quad-crossers.
        let back = quad(update.new_diagonal, false, [q.bc, q.cd, q.da, q.ab]);
        assert_eq!(flip_normal_coordinates(&back).new_diagonal, 3);
    }

    #[test]
    fn test_split_distributes_by_parameter() {
        let prism = SplitEdgePrism {
            edge: 4,
            front_near: 2,
            front_far: 2,
            back: Some((2, 2)),
        };
        let update = split_normal_coordinates(&prism, 0.5);
        assert_eq!(update.tail_side, 2);
        assert_eq!(update.head_side, 2);
        // All crossings are corner arcs; the generic spoke count is the
        // apex corner count.
        assert_eq!(update.spoke_front, corner_arcs(2, 2, 4));
        assert_eq!(update.spoke_back, Some(corner_arcs(2, 2, 4)));

        let update = split_normal_coordinates(&prism, 0.05);
        assert_eq!(update.tail_side, 0);
        assert_eq!(update.head_side, 4);
        // Corner arcs at the tail now cross the spoke toward the apex.
        assert_eq!(update.spoke_front, 2);
    }

    #[test]
    fn test_split_shared_edge_keeps_marker() {
        let prism = SplitEdgePrism {
            edge: -2,
            front_near: 3,
            front_far: 1,
            back: None,
        };
        let update = split_normal_coordinates(&prism, 0.3);
        assert_eq!(update.tail_side, -2);
        assert_eq!(update.head_side, -2);
        assert!(update.spoke_back.is_none());
        // Parallel arcs do not cross the spoke; only the apex corner count
        // and emanating corrections do (here: from_c = 3 - 1 - 0 = 2).
        assert_eq!(update.spoke_front, corner_arcs(3, 1, 0) + 2);
    }

    #[test]
    fn test_split_emanating_band() {
        // Six crossings, two of them emanating from the apex b.
        let prism = SplitEdgePrism {
            edge: 6,
            front_near: 2,
            front_far: 2,
            back: Some((3, 3)),
        };
        let update = split_normal_coordinates(&prism, 0.5);
        assert_eq!(update.tail_side, 3);
        // Front side: corner_a = 2, emanating band (2, 4], corner_c = 2.
        // One emanating arc beyond position 3 stays on the head side.
        assert_eq!(update.arcs_at_front_apex, 1);
    }

    #[test]
    fn test_insert_spokes_are_corner_counts() {
        let update = insert_normal_coordinates(&[2, 2, 2], [1.0 / 3.0; 3]);
        assert_eq!(update.spokes, [1, 1, 1]);
        assert_eq!(update.arcs_ccw_of_spoke, [0, 0, 0]);
    }

    #[test]
    fn test_insert_with_emanating_bundle() {
        // Edge 1 (between corners 1 and 2) carries 4 crossings, 2 of which
        // emanate from corner 0.
        let n = [1, 4, 1];
        let update = insert_normal_coordinates(&n, [0.2, 0.4, 0.4]);
        // Corner counts: corner 1 and corner 2 keep their arcs; the two
        // emanating arcs split between the spokes toward corners 1 and 2.
        let total: i64 = update.spokes.iter().sum();
        assert_eq!(
            total,
            corner_arcs(n[0], n[2], n[1])
                + corner_arcs(n[1], n[0], n[2])
                + corner_arcs(n[2], n[1], n[0])
                + 2
        );
    }

    #[test]
    fn test_identity_roundabouts() {
        let mesh =
            HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
        let coords = NormalCoordinates::identity(&mesh);
        for v in mesh.vertices() {
            assert_eq!(coords.input_degree[v], 3);
            let rs: Vec<u32> = mesh
                .outgoing_halfedges(v)
                .map(|h| coords.roundabout(h))
                .collect();
            assert_eq!(rs, vec![0, 1, 2]);
        }
        for e in mesh.edges() {
            assert_eq!(coords.coordinate(e), 0);
        }
    }

    #[test]
    fn test_roundabout_from_neighbor_wraps() {
        let mesh =
            HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
        let mut coords = NormalCoordinates::identity(&mesh);
        let v = VertexId::from_index(0);
        let hs: Vec<_> = mesh.outgoing_halfedges(v).collect();
        // Neighbor has roundabout 0; two arcs between wrap to degree - 2.
        coords.set_roundabout_from_ccw_neighbor(&mesh, hs[1], hs[0], 2);
        assert_eq!(coords.roundabout(hs[1]), 1);
    }
}
