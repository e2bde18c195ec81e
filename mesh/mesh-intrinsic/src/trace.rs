//! Combinatorial curve tracing through normal coordinates.
//!
//! An input edge, seen from the intrinsic triangulation, is a curve that
//! emanates from a vertex, crosses a run of intrinsic edges, and ends at a
//! vertex (possibly passing through vertices inserted on it, where the
//! curve continues as a run along a shared intrinsic edge). Because the
//! crossing counts are exact, the entire walk is integer arithmetic: inside
//! each face the crossing bands along an edge determine whether the curve
//! exits near the tail, exits near the head, or terminates at the opposite
//! vertex. Any inconsistency encountered mid-walk means the coordinates are
//! corrupt, which is fatal.

use mesh_halfedge::{EdgeId, FaceId, HalfedgeId, HalfedgeMesh, SurfacePoint, VertexId};
use smallvec::SmallVec;

use crate::error::{IntrinsicError, IntrinsicResult};
use crate::normal_coords::{corner_arcs, emanating_arcs, NormalCoordinates};
use crate::triangulation::IntegerTriangulation;

/// One transversal crossing of a traced curve: the curve crosses
/// `edge(halfedge)` into `face(halfedge)`, at 1-based position `index`
/// among that edge's crossings counted from `tail(halfedge)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveCrossing {
    /// Half-edge whose face the curve enters.
    pub halfedge: HalfedgeId,
    /// Position of this crossing along the half-edge, 1-based from its
    /// tail.
    pub index: i64,
}

/// A maximal piece of a traced input edge.
#[derive(Debug, Clone, PartialEq)]
pub enum CurvePiece {
    /// A transversal run between two intrinsic vertices lying on the input
    /// edge.
    Arc {
        /// Intrinsic vertex the piece starts at.
        start: VertexId,
        /// Intrinsic vertex the piece ends at.
        end: VertexId,
        /// Ordered crossings between them; never empty.
        crossings: Vec<CurveCrossing>,
    },
    /// The curve runs along this intrinsic half-edge, which it cannot
    /// cross: a sub-segment of an input edge between two vertices of a
    /// common face is that face's connecting edge.
    Along(HalfedgeId),
}

/// A traced input edge: an ordered chain of pieces from the edge's tail
/// vertex to its head vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompoundCurve {
    /// Pieces in order along the input edge.
    pub pieces: Vec<CurvePiece>,
}

impl CompoundCurve {
    /// Total number of transversal crossings along the curve.
    #[must_use]
    pub fn crossing_count(&self) -> usize {
        self.pieces
            .iter()
            .map(|p| match p {
                CurvePiece::Arc { crossings, .. } => crossings.len(),
                CurvePiece::Along(_) => 0,
            })
            .sum()
    }

    /// Whether the curve never crosses an intrinsic edge transversally.
    #[must_use]
    pub fn is_uncrossed(&self) -> bool {
        self.crossing_count() == 0
    }
}

/// Where a curve goes after crossing into a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraceStep {
    /// It crosses the given half-edge's edge next, entering that
    /// half-edge's face at the given position.
    Exit { halfedge: HalfedgeId, index: i64 },
    /// It terminates at the vertex opposite the entered edge.
    End { vertex: VertexId },
}

/// Follow a curve that has just crossed `edge(h)` into `face(h)` at
/// position `index` (1-based from `tail(h)`).
///
/// The crossings along an edge are banded by disjointness: positions
/// nearest the tail belong to arcs cutting the tail corner, positions
/// nearest the head to arcs cutting the head corner, and the band between
/// them to arcs that emanate from the opposite vertex.
pub(crate) fn next_crossing(
    mesh: &HalfedgeMesh,
    coords: &NormalCoordinates,
    h: HalfedgeId,
    index: i64,
) -> IntrinsicResult<TraceStep> {
    let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
        halfedge: h,
        detail,
    };
    if !mesh.is_interior(h) {
        return Err(corrupt("curve crossed into a boundary loop"));
    }
    let n_h = coords.coords[h.edge()].max(0);
    let n_next = coords.coords[mesh.next(h).edge()].max(0);
    let n_prev = coords.coords[mesh.prev(h).edge()].max(0);
    if index < 1 || index > n_h {
        return Err(corrupt("crossing index out of range"));
    }

    let corner_tail = corner_arcs(n_h, n_prev, n_next);
    let corner_head = corner_arcs(n_h, n_next, n_prev);

    if index <= corner_tail {
        // Cuts the tail corner: crosses the previous edge, nested at the
        // same position from the shared vertex.
        Ok(TraceStep::Exit {
            halfedge: mesh.prev(h).twin(),
            index,
        })
    } else if index > n_h - corner_head {
        // Cuts the head corner: crosses the next edge.
        let out_index = n_next - n_h + index;
        if out_index < 1 {
            return Err(corrupt("head-corner crossing underflows neighbor"));
        }
        Ok(TraceStep::Exit {
            halfedge: mesh.next(h).twin(),
            index: out_index,
        })
    } else {
        Ok(TraceStep::End {
            vertex: mesh.opposite_vertex(h),
        })
    }
}

/// First crossing of a curve emanating from `tail(wedge)` through
/// `face(wedge)`, with 1-based `rank` among the arcs emanating through that
/// wedge (counterclockwise from the wedge's own direction).
pub(crate) fn first_crossing_from_wedge(
    mesh: &HalfedgeMesh,
    coords: &NormalCoordinates,
    wedge: HalfedgeId,
    rank: i64,
) -> IntrinsicResult<CurveCrossing> {
    let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
        halfedge: wedge,
        detail,
    };
    let opposite = mesh.next(wedge);
    let n_w = coords.coords[wedge.edge()].max(0);
    let n_opp = coords.coords[opposite.edge()].max(0);
    let n_far = coords.coords[mesh.prev(wedge).edge()].max(0);
    let emanating = emanating_arcs(n_opp, n_w, n_far);
    if rank < 1 || rank > emanating {
        return Err(corrupt("emanating rank out of range"));
    }
    // Along the opposite edge, counted from the wedge's head: first the
    // arcs cutting that corner, then the emanating band, counterclockwise
    // arcs landing closer to the head.
    let corner_head = corner_arcs(n_w, n_opp, n_far);
    let position_from_head = corner_head + rank;
    let out_index = n_opp + 1 - position_from_head;
    if out_index < 1 || out_index > n_opp {
        return Err(corrupt("first crossing out of range"));
    }
    Ok(CurveCrossing {
        halfedge: opposite.twin(),
        index: out_index,
    })
}

/// Invert [`first_crossing_from_wedge`]: given that a curve crossed into
/// `face(h)` at `index` and then terminated at the opposite vertex, recover
/// that vertex's wedge half-edge and the curve's rank among the arcs
/// emanating through it (seen from the end vertex, walking the curve
/// backward).
pub(crate) fn emanating_rank_at_end(
    mesh: &HalfedgeMesh,
    coords: &NormalCoordinates,
    h: HalfedgeId,
    index: i64,
) -> (HalfedgeId, i64) {
    // Seen from the end vertex, the curve emanates through the wedge whose
    // opposite edge is the one just crossed, and exits it by crossing
    // h.twin() at the mirrored position.
    let wedge = mesh.prev(h);
    let n_h = coords.coords[h.edge()].max(0);
    let n_w = coords.coords[wedge.edge()].max(0);
    let n_far = coords.coords[mesh.next(h).edge()].max(0);
    // Corner at the wedge's head (= tail of h) between the wedge edge and h.
    let corner_head = corner_arcs(n_w, n_h, n_far);
    let rank = index - corner_head;
    (wedge, rank)
}

impl IntegerTriangulation<'_> {
    /// Trace an input edge across the intrinsic triangulation as a chain of
    /// pieces: transversal arcs between vertices lying on the edge, and
    /// runs along shared intrinsic edges.
    ///
    /// # Errors
    ///
    /// Fails with [`IntrinsicError::CorruptNormalCoordinates`] if the
    /// crossing bookkeeping contradicts itself; the structure must then be
    /// considered poisoned.
    pub fn trace_input_edge(&self, e: EdgeId) -> IntrinsicResult<CompoundCurve> {
        let input = self.input_mesh();
        let forward = input.halfedge(e);
        let goal = input.head(forward);
        // Original vertices keep their handles across both meshes.
        let mut cursor = input.tail(forward);
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: forward,
            detail,
        };

        let mut curve = CompoundCurve::default();
        let mut arrival_face: Option<FaceId> = None;

        let budget = 4 * self.mesh().n_edges() + 8;
        for _ in 0..budget {
            if self.location(cursor) == SurfacePoint::Vertex(goal) {
                if curve.pieces.is_empty() {
                    return Err(corrupt("trace started at the goal vertex"));
                }
                return Ok(curve);
            }

            // A shared intrinsic half-edge continuing forward along the
            // input edge takes priority over a transversal run.
            if let Some(h) = self
                .mesh()
                .outgoing_halfedges(cursor)
                .find(|&h| self.shared_input_halfedge(h) == Some(forward))
            {
                cursor = self.mesh().head(h);
                curve.pieces.push(CurvePiece::Along(h));
                arrival_face = None;
                continue;
            }

            let (wedge, rank) = if self.is_original_vertex(cursor) {
                self.emanating_wedge_at_original(cursor, forward)?
            } else {
                (self.emanating_wedge_at_edge_point(cursor, arrival_face)?, 1)
            };

            let first = first_crossing_from_wedge(self.mesh(), &self.normal_coords, wedge, rank)?;
            let mut crossings = vec![first];
            let end = loop {
                let last = crossings[crossings.len() - 1];
                match next_crossing(self.mesh(), &self.normal_coords, last.halfedge, last.index)? {
                    TraceStep::Exit { halfedge, index } => {
                        crossings.push(CurveCrossing { halfedge, index });
                        if crossings.len() > budget {
                            return Err(corrupt("crossing run does not terminate"));
                        }
                    }
                    TraceStep::End { vertex } => break vertex,
                }
            };
            let last = crossings[crossings.len() - 1];
            let end_loc = self.location(end);
            if end_loc != SurfacePoint::Vertex(goal) && self.input_edge_param(end_loc, e).is_none()
            {
                return Err(corrupt("crossing run ended off the input edge"));
            }
            curve.pieces.push(CurvePiece::Arc {
                start: cursor,
                end,
                crossings,
            });
            arrival_face = self.mesh().face(last.halfedge);
            cursor = end;
        }
        Err(corrupt("input edge trace does not terminate"))
    }

    /// Identify the input half-edge an uncrossed traced curve came from:
    /// the inverse of [`trace_input_edge`](Self::trace_input_edge) for
    /// input edges no intrinsic edge crosses.
    #[must_use]
    pub fn identify_input_edge(&self, curve: &CompoundCurve) -> Option<HalfedgeId> {
        match curve.pieces.first()? {
            CurvePiece::Along(h) => self.shared_input_halfedge(*h),
            CurvePiece::Arc {
                start, crossings, ..
            } => {
                let first = crossings.first()?;
                // The first crossing pins down the emanating wedge and
                // rank; roundabouts convert those back to an input
                // direction at the start vertex.
                let entering = first.halfedge;
                let wedge = self.mesh().prev(entering.twin());
                let n_opp = self.normal_coords.coords[entering.edge()].max(0);
                let n_w = self.normal_coords.coords[wedge.edge()].max(0);
                let n_far = self.normal_coords.coords[self.mesh().prev(wedge).edge()].max(0);
                let corner_head = corner_arcs(n_w, n_opp, n_far);
                let position_from_head = n_opp + 1 - first.index;
                let rank = position_from_head - corner_head;
                self.input_direction_at(*start, wedge, rank)
            }
        }
    }

    /// Parameter of a surface point along the canonical half-edge of an
    /// input edge, when the point lies on that edge.
    pub(crate) fn input_edge_param(&self, loc: SurfacePoint, e: EdgeId) -> Option<f64> {
        let input = self.input_mesh();
        let h = input.halfedge(e);
        match loc {
            SurfacePoint::Vertex(v) if v == input.tail(h) => Some(0.0),
            SurfacePoint::Vertex(v) if v == input.head(h) => Some(1.0),
            SurfacePoint::Edge(le, t) if le == e => Some(t),
            _ => None,
        }
    }

    /// The input half-edge `rank` arc directions counterclockwise past the
    /// wedge half-edge's roundabout, at an original vertex.
    pub(crate) fn input_direction_at(
        &self,
        v: VertexId,
        wedge: HalfedgeId,
        rank: i64,
    ) -> Option<HalfedgeId> {
        let SurfacePoint::Vertex(u) = self.location(v) else {
            return None;
        };
        let degree = i64::from(self.normal_coords.input_degree[v]);
        if degree == 0 {
            return None;
        }
        let index = (i64::from(self.normal_coords.roundabouts[wedge]) + rank).rem_euclid(degree);
        self.input_mesh().outgoing_halfedges(u).nth(index as usize)
    }

    /// Find the intrinsic wedge through which the traced input half-edge
    /// emanates from an original vertex, and its rank among the wedge's
    /// emanating arcs. The roundabouts place every input direction in
    /// exactly one wedge.
    fn emanating_wedge_at_original(
        &self,
        v: VertexId,
        forward: HalfedgeId,
    ) -> IntrinsicResult<(HalfedgeId, i64)> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: forward,
            detail,
        };
        let SurfacePoint::Vertex(u) = self.location(v) else {
            return Err(corrupt("vertex location is not an input vertex"));
        };
        let degree = i64::from(self.normal_coords.input_degree[v]);
        let target = self
            .input_mesh()
            .outgoing_halfedges(u)
            .position(|ih| ih == forward)
            .ok_or_else(|| corrupt("input half-edge missing from its vertex"))?
            as i64;

        let outgoing: SmallVec<[HalfedgeId; 8]> = self.mesh().outgoing_halfedges(v).collect();
        for (k, &h) in outgoing.iter().enumerate() {
            if !self.mesh().is_interior(h) {
                continue;
            }
            let g = outgoing[(k + 1) % outgoing.len()];
            let r_h = i64::from(self.normal_coords.roundabouts[h]);
            let r_g = i64::from(self.normal_coords.roundabouts[g]);
            let span = (r_g - r_h).rem_euclid(degree);
            let rank = (target - r_h).rem_euclid(degree);
            if rank == 0 || rank > span {
                continue;
            }
            let n_opp = self.normal_coords.coords[self.mesh().next(h).edge()].max(0);
            let n_w = self.normal_coords.coords[h.edge()].max(0);
            let n_far = self.normal_coords.coords[self.mesh().prev(h).edge()].max(0);
            if rank > emanating_arcs(n_opp, n_w, n_far) {
                return Err(corrupt("wedge rank exceeds emanating arcs"));
            }
            return Ok((h, rank));
        }
        Err(corrupt("no wedge contains the input direction"))
    }

    /// Find the wedge carrying the forward arc at a vertex inserted on the
    /// traced input edge. Only that edge passes through such a vertex, so
    /// exactly one wedge other than the arrival face emanates an arc.
    fn emanating_wedge_at_edge_point(
        &self,
        v: VertexId,
        arrival_face: Option<FaceId>,
    ) -> IntrinsicResult<HalfedgeId> {
        let mesh = self.mesh();
        for h in mesh.outgoing_halfedges(v) {
            if mesh.face(h).is_none() || mesh.face(h) == arrival_face {
                continue;
            }
            let n_opp = self.normal_coords.coords[mesh.next(h).edge()].max(0);
            let n_w = self.normal_coords.coords[h.edge()].max(0);
            let n_far = self.normal_coords.coords[mesh.prev(h).edge()].max(0);
            if emanating_arcs(n_opp, n_w, n_far) >= 1 {
                return Ok(h);
            }
        }
        Err(IntrinsicError::CorruptNormalCoordinates {
            halfedge: mesh.halfedge_of_vertex(v),
            detail: "curve lost at an edge-point vertex",
        })
    }
}
