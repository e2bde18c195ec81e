//! Geometric correspondence between the meshes.
//!
//! The combinatorial traces fix which edges a curve crosses; this module
//! recovers where. Each crossed strip of faces is unfolded isometrically
//! into the plane, where the curve is a straight segment between its two
//! endpoints, so every crossing parameter is a line intersection rather
//! than an accumulation of per-face steps.

#![allow(clippy::similar_names)]

use mesh_halfedge::{
    EdgeId, FaceId, HalfedgeId, HalfedgeMesh, SurfacePoint, Vector2, VertexId,
};
use smallvec::SmallVec;

use crate::core::{walk_segment, FaceChart, WalkControl, WalkOutcome};
use crate::error::{IntrinsicError, IntrinsicResult};
use crate::geometry::EdgeLengthGeometry;
use crate::trace::{emanating_rank_at_end, next_crossing, CurvePiece, TraceStep};
use crate::triangulation::IntegerTriangulation;

/// Position of a surface point inside a chart of its containing face.
fn position_in_chart(
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

/// Intersection of segments `p0 -> p1` and `q0 -> q1` as parameters along
/// each.
fn segment_intersection(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    q0: Vector2<f64>,
    q1: Vector2<f64>,
) -> Option<(f64, f64)> {
    let d = p1 - p0;
    let e = q1 - q0;
    let denom = d.x * e.y - d.y * e.x;
    if denom.abs() < 1e-14 {
        return None;
    }
    let r = q0 - p0;
    let u = (r.x * e.y - r.y * e.x) / denom;
    let w = (r.x * d.y - r.y * d.x) / denom;
    Some((u, w))
}

/// An unfolded run of faces with the plane geometry of each crossing.
pub(crate) struct StripGeometry {
    /// One chart per face along the strip (crossing count + 1).
    pub charts: Vec<FaceChart>,
    /// Plane position of the curve's start.
    pub start: Vector2<f64>,
    /// Plane position of the curve's end.
    pub end: Vector2<f64>,
    /// Per crossing: the exit half-edge (of the chart it leaves), the
    /// canonical parameter along its edge, the plane point, and the
    /// parameter along the whole segment.
    pub crossings: Vec<StripCrossing>,
}

pub(crate) struct StripCrossing {
    pub halfedge: HalfedgeId,
    pub edge_param: f64,
    pub point: Vector2<f64>,
    pub segment_param: f64,
}

/// Unfold a strip crossing the given edges in order, starting from
/// `chart`. Returns the charts and the exit half-edge with its pinned
/// segment endpoints for each crossing.
#[allow(clippy::type_complexity)]
fn unfold_strip(
    mesh: &HalfedgeMesh,
    geometry: &EdgeLengthGeometry,
    mut chart: FaceChart,
    edges: &[EdgeId],
) -> IntrinsicResult<(Vec<FaceChart>, Vec<(HalfedgeId, Vector2<f64>, Vector2<f64>)>)> {
    let mut charts = vec![chart.clone()];
    let mut exits: Vec<(HalfedgeId, Vector2<f64>, Vector2<f64>)> = Vec::with_capacity(edges.len());
    let mut entered: Option<HalfedgeId> = None;
    for &e in edges {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: mesh.halfedge(e),
            detail,
        };
        let i = (0..3)
            .find(|&i| chart.hes[i].edge() == e && Some(chart.hes[i]) != entered)
            .ok_or_else(|| corrupt("strip face does not border the next crossed edge"))?;
        exits.push((chart.hes[i], chart.pos[i], chart.pos[(i + 1) % 3]));
        entered = Some(chart.hes[i].twin());
        chart = chart
            .across(mesh, geometry, i)
            .ok_or_else(|| corrupt("strip ran through the boundary"))?;
        charts.push(chart.clone());
    }
    Ok((charts, exits))
}

fn strip_geometry(
    mesh: &HalfedgeMesh,
    geometry: &EdgeLengthGeometry,
    first_chart: FaceChart,
    edges: &[EdgeId],
    start: Vector2<f64>,
    end_loc_resolver: impl FnOnce(&FaceChart) -> Option<Vector2<f64>>,
) -> IntrinsicResult<StripGeometry> {
    let (charts, exits) = unfold_strip(mesh, geometry, first_chart, edges)?;
    let corrupt = |h: HalfedgeId, detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
        halfedge: h,
        detail,
    };
    let last = charts
        .last()
        .ok_or_else(|| corrupt(HalfedgeId::from_index(0), "empty strip"))?;
    let end = end_loc_resolver(last)
        .ok_or_else(|| corrupt(last.hes[0], "strip end lies outside its final face"))?;

    let mut crossings = Vec::with_capacity(exits.len());
    let mut previous_u = 0.0_f64;
    for (h, q0, q1) in exits {
        let (u, w) = segment_intersection(start, end, q0, q1)
            .ok_or_else(|| corrupt(h, "curve runs parallel to a crossed edge"))?;
        if !(-1e-6..=1.0 + 1e-6).contains(&w) || u < previous_u - 1e-6 || u > 1.0 + 1e-6 {
            return Err(corrupt(h, "crossing parameter out of range"));
        }
        previous_u = u;
        let w = w.clamp(0.0, 1.0);
        let edge_param = if mesh.halfedge(h.edge()) == h { w } else { 1.0 - w };
        crossings.push(StripCrossing {
            halfedge: h,
            edge_param,
            point: q0 * (1.0 - w) + q1 * w,
            segment_param: u.clamp(0.0, 1.0),
        });
    }
    Ok(StripGeometry {
        charts,
        start,
        end,
        crossings,
    })
}

impl IntegerTriangulation<'_> {
    /// Trace an intrinsic half-edge along the input surface.
    ///
    /// The polyline starts at the tail's location, crosses exactly
    /// `max(0, n)` input edges, and ends at the head's location, so its
    /// length is always `max(0, n) + 2`.
    ///
    /// # Errors
    ///
    /// Fails with [`IntrinsicError::CorruptNormalCoordinates`] if the
    /// crossing bookkeeping contradicts the mesh.
    pub fn trace_halfedge(&self, h: HalfedgeId) -> IntrinsicResult<Vec<SurfacePoint>> {
        let tail_loc = self.location(self.mesh().tail(h));
        let head_loc = self.location(self.mesh().head(h));
        let n = self.normal_coords.coords[h.edge()];
        if n <= 0 {
            return Ok(vec![tail_loc, head_loc]);
        }
        let strip = self.halfedge_strip_geometry(h)?;
        let mut points = Vec::with_capacity(n as usize + 2);
        points.push(tail_loc);
        for crossing in &strip.crossings {
            points.push(SurfacePoint::Edge(
                crossing.halfedge.edge(),
                crossing.edge_param,
            ));
        }
        points.push(head_loc);
        Ok(points)
    }

    /// The surface point a fraction `t` of the way along an intrinsic
    /// half-edge with positive crossing count.
    pub(crate) fn point_along_halfedge(
        &self,
        h: HalfedgeId,
        t: f64,
    ) -> IntrinsicResult<SurfacePoint> {
        let strip = self.halfedge_strip_geometry(h)?;
        let q = strip.start + (strip.end - strip.start) * t;
        let band = strip
            .crossings
            .iter()
            .position(|c| c.segment_param > t)
            .unwrap_or(strip.crossings.len());
        let chart = &strip.charts[band];
        Ok(SurfacePoint::Face(chart.face, chart.barycentric(q)))
    }

    /// Identify which input edge each crossing of `h` belongs to, in order
    /// from the tail.
    fn crossing_input_edges(&self, h: HalfedgeId) -> IntrinsicResult<Vec<EdgeId>> {
        let n = self.normal_coords.coords[h.edge()].max(0);
        let mut edges = Vec::with_capacity(n as usize);
        for k in 1..=n {
            edges.push(self.crossing_input_edge(h, k)?);
        }
        Ok(edges)
    }

    /// Identify the input edge crossing `edge(h)` at position `k` from
    /// `tail(h)`, by walking the curve out to an endpoint on each side.
    fn crossing_input_edge(&self, h: HalfedgeId, k: i64) -> IntrinsicResult<EdgeId> {
        let n = self.normal_coords.coords[h.edge()].max(0);
        let (end_a, _last_a) = self.walk_to_curve_end(h, k)?;
        if let SurfacePoint::Edge(e, _) = self.location(end_a) {
            return Ok(e);
        }
        let (end_b, last_b) = self.walk_to_curve_end(h.twin(), n + 1 - k)?;
        if let SurfacePoint::Edge(e, _) = self.location(end_b) {
            return Ok(e);
        }
        // Both endpoints are input vertices; recover the direction at one
        // of them through the roundabouts.
        let (wedge, rank) =
            emanating_rank_at_end(self.mesh(), &self.normal_coords, last_b.0, last_b.1);
        self.input_direction_at(end_b, wedge, rank)
            .map(HalfedgeId::edge)
            .ok_or(IntrinsicError::CorruptNormalCoordinates {
                halfedge: h,
                detail: "curve endpoint direction not found",
            })
    }

    /// Walk a curve from a crossing to its endpoint on the side of
    /// `face(h)`. Returns the end vertex and the final crossing step.
    fn walk_to_curve_end(
        &self,
        h: HalfedgeId,
        index: i64,
    ) -> IntrinsicResult<(VertexId, (HalfedgeId, i64))> {
        let mut cursor = (h, index);
        let budget = 4 * self.mesh().n_edges() + 8;
        for _ in 0..budget {
            match next_crossing(self.mesh(), &self.normal_coords, cursor.0, cursor.1)? {
                TraceStep::Exit { halfedge, index } => cursor = (halfedge, index),
                TraceStep::End { vertex } => return Ok((vertex, cursor)),
            }
        }
        Err(IntrinsicError::CorruptNormalCoordinates {
            halfedge: h,
            detail: "curve walk does not terminate",
        })
    }

    /// Unfold the input-face strip under an intrinsic half-edge with
    /// positive crossing count.
    pub(crate) fn halfedge_strip_geometry(&self, h: HalfedgeId) -> IntrinsicResult<StripGeometry> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: h,
            detail,
        };
        let input = self.input_mesh();
        let tail_loc = self.location(self.mesh().tail(h));
        let head_loc = self.location(self.mesh().head(h));
        let edges = self.crossing_input_edges(h)?;
        let first_edge = *edges.first().ok_or_else(|| corrupt("empty strip"))?;

        // The first input face is the side of the first crossed edge whose
        // closure contains the tail.
        let candidates = [
            input.face(input.halfedge(first_edge)),
            input.face(input.halfedge(first_edge).twin()),
        ];
        let first_face = candidates
            .into_iter()
            .flatten()
            .find(|&f| self.input_faces_of(tail_loc).contains(&f))
            .ok_or_else(|| corrupt("tail location does not touch the first crossed edge"))?;
        let first_chart = FaceChart::new(input, &self.core.input_geometry, first_face);
        let start = position_in_chart(input, &first_chart, tail_loc)
            .ok_or_else(|| corrupt("tail location outside its face"))?;

        strip_geometry(
            input,
            &self.core.input_geometry,
            first_chart,
            &edges,
            start,
            |last| position_in_chart(input, last, head_loc),
        )
    }

    /// Unfold the intrinsic-face strip under one transversal arc of a
    /// traced input edge.
    pub(crate) fn arc_strip_geometry(
        &self,
        start: VertexId,
        end: VertexId,
        crossings: &[crate::trace::CurveCrossing],
    ) -> IntrinsicResult<StripGeometry> {
        let mesh = self.mesh();
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: mesh.halfedge_of_vertex(start),
            detail,
        };
        let first = crossings.first().ok_or_else(|| corrupt("empty arc"))?;
        let first_face = mesh
            .face(first.halfedge.twin())
            .ok_or_else(|| corrupt("arc starts in a boundary loop"))?;
        let first_chart = FaceChart::new(mesh, &self.core.geometry, first_face);
        let start_pos = position_in_chart(mesh, &first_chart, SurfacePoint::Vertex(start))
            .ok_or_else(|| corrupt("arc start is not a corner of its face"))?;
        let edges: Vec<EdgeId> = crossings.iter().map(|c| c.halfedge.edge()).collect();
        strip_geometry(
            mesh,
            &self.core.geometry,
            first_chart,
            &edges,
            start_pos,
            |last| position_in_chart(mesh, last, SurfacePoint::Vertex(end)),
        )
    }

    // ------------------------------------------------------------------
    // Point correspondence
    // ------------------------------------------------------------------

    /// Map a point on the intrinsic triangulation to the input surface.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption from the underlying traces.
    pub fn equivalent_point_on_input(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        match p {
            SurfacePoint::Vertex(v) => Ok(self.location(v)),
            SurfacePoint::Edge(e, t) => {
                let h = self.mesh().halfedge(e);
                self.edge_point_location(h, t)
            }
            SurfacePoint::Face(f, bary) => self.face_point_location(f, bary),
        }
    }

    /// Map a point on the input surface to the intrinsic triangulation.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption from the underlying traces.
    pub fn equivalent_point_on_intrinsic(&self, p: SurfacePoint) -> IntrinsicResult<SurfacePoint> {
        match p {
            SurfacePoint::Vertex(u) => Ok(SurfacePoint::Vertex(u)),
            SurfacePoint::Edge(e, t) => self.input_edge_point_on_intrinsic(e, t),
            SurfacePoint::Face(f, bary) => self.input_face_point_on_intrinsic(f, bary),
        }
    }

    /// Location on the input surface of the point at `t` along an
    /// intrinsic half-edge.
    pub(crate) fn edge_point_location(
        &self,
        h: HalfedgeId,
        t: f64,
    ) -> IntrinsicResult<SurfacePoint> {
        if let Some(ih) = self.shared_input_halfedge(h) {
            let e = ih.edge();
            let tail_param = self
                .input_edge_param(self.location(self.mesh().tail(h)), e)
                .unwrap_or(if self.input_mesh().halfedge(e) == ih { 0.0 } else { 1.0 });
            let head_param = self
                .input_edge_param(self.location(self.mesh().head(h)), e)
                .unwrap_or(if self.input_mesh().halfedge(e) == ih { 1.0 } else { 0.0 });
            return Ok(SurfacePoint::Edge(
                e,
                tail_param + (head_param - tail_param) * t,
            ));
        }
        if self.normal_coords.coords[h.edge()] <= 0 {
            // Uncrossed and not shared: the edge lies inside one input face.
            let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
                halfedge: h,
                detail,
            };
            let tail_loc = self.location(self.mesh().tail(h));
            let head_loc = self.location(self.mesh().head(h));
            let face = self
                .common_input_face(tail_loc, head_loc)
                .ok_or_else(|| corrupt("uncrossed edge spans no common input face"))?;
            let chart = FaceChart::new(self.input_mesh(), &self.core.input_geometry, face);
            let a = position_in_chart(self.input_mesh(), &chart, tail_loc)
                .ok_or_else(|| corrupt("tail outside common face"))?;
            let b = position_in_chart(self.input_mesh(), &chart, head_loc)
                .ok_or_else(|| corrupt("head outside common face"))?;
            let q = a + (b - a) * t;
            return Ok(SurfacePoint::Face(face, chart.barycentric(q)));
        }
        self.point_along_halfedge(h, t)
    }

    /// Location on the input surface of the split point at `t` along `h`.
    ///
    /// Unlike [`edge_point_location`](Self::edge_point_location) this keeps
    /// the point consistent with the combinatorial split rule: the tail
    /// side keeps `floor(t * n)` crossings, so the location is clamped into
    /// that band of the strip even when `t` falls geometrically on the
    /// other side of a crossing.
    pub(crate) fn split_point_location(
        &self,
        h: HalfedgeId,
        t: f64,
    ) -> IntrinsicResult<SurfacePoint> {
        let n = self.normal_coords.coords[h.edge()];
        if n <= 0 {
            return self.edge_point_location(h, t);
        }
        let strip = self.halfedge_strip_geometry(h)?;
        let band = ((t * n as f64).floor() as usize).min(n as usize);
        let lo = if band == 0 {
            0.0
        } else {
            strip.crossings[band - 1].segment_param
        };
        let hi = if band == n as usize {
            1.0
        } else {
            strip.crossings[band].segment_param
        };
        let margin = (hi - lo) * 1e-3;
        let u = t.clamp(lo + margin, hi - margin);
        let q = strip.start + (strip.end - strip.start) * u;
        let chart = &strip.charts[band];
        Ok(SurfacePoint::Face(chart.face, chart.barycentric(q)))
    }

    /// Location on the input surface of a barycentric point of an
    /// intrinsic face.
    pub(crate) fn face_point_location(
        &self,
        f: FaceId,
        bary: [f64; 3],
    ) -> IntrinsicResult<SurfacePoint> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: self.mesh().halfedge_of_face(f),
            detail,
        };
        if let Some(parent) = self.get_parent_face(f) {
            // Uncrossed face: affine map through the parent face's chart.
            let chart = FaceChart::new(self.input_mesh(), &self.core.input_geometry, parent);
            let hes = self.mesh().face_halfedges(f);
            let mut p = Vector2::zeros();
            for i in 0..3 {
                let corner_loc = self.location(self.mesh().tail(hes[i]));
                let pos = position_in_chart(self.input_mesh(), &chart, corner_loc)
                    .ok_or_else(|| corrupt("corner outside parent face"))?;
                p += pos * bary[i];
            }
            return Ok(SurfacePoint::Face(parent, chart.barycentric(p)));
        }

        // Crossed face: walk the geodesic from a corner toward the point
        // over the input surface.
        let hes = self.mesh().face_halfedges(f);
        let h0 = hes[0];
        let face_chart = FaceChart::new(self.mesh(), &self.core.geometry, f);
        let target = face_chart.pos[0] * bary[0]
            + face_chart.pos[1] * bary[1]
            + face_chart.pos[2] * bary[2];
        let segment = target - face_chart.pos[0];
        let distance = segment.norm();
        if distance < 1e-12 {
            return Ok(self.location(self.mesh().tail(h0)));
        }
        let along = face_chart.pos[1] - face_chart.pos[0];
        let alpha = angle_between(along, segment);

        let (chart, origin, direction) = self.halfedge_start_direction(h0)?;
        let (chart, direction) =
            self.rotate_direction_on_input(chart, origin, direction, alpha)?;
        let outcome = walk_segment(
            self.input_mesh(),
            &self.core.input_geometry,
            &chart,
            origin,
            origin + direction * distance,
            2 * self.input_mesh().n_faces() + 8,
            |_, _| WalkControl::Continue,
        );
        match outcome {
            WalkOutcome::Landed { face, bary } => Ok(SurfacePoint::Face(face, bary)),
            WalkOutcome::HitBoundary {
                halfedge,
                edge_param,
            } => Ok(SurfacePoint::Edge(halfedge.edge(), edge_param)),
            _ => Err(corrupt("face point walk failed")),
        }
    }

    /// The input-surface direction in which an intrinsic half-edge leaves
    /// its tail: an input face chart, the tail's position in it, and a unit
    /// direction.
    pub(crate) fn halfedge_start_direction(
        &self,
        h: HalfedgeId,
    ) -> IntrinsicResult<(FaceChart, Vector2<f64>, Vector2<f64>)> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: h,
            detail,
        };
        let input = self.input_mesh();
        let tail_loc = self.location(self.mesh().tail(h));
        let n = self.normal_coords.coords[h.edge()];
        if n > 0 {
            let strip = self.halfedge_strip_geometry(h)?;
            let first = strip
                .crossings
                .first()
                .map_or(strip.end, |c| c.point);
            let direction = (first - strip.start)
                .try_normalize(1e-12)
                .ok_or_else(|| corrupt("degenerate start direction"))?;
            return Ok((strip.charts[0].clone(), strip.start, direction));
        }

        let head_loc = self.location(self.mesh().head(h));
        let face = if let Some(ih) = self.shared_input_halfedge(h) {
            input
                .face(ih)
                .or_else(|| input.face(ih.twin()))
                .ok_or_else(|| corrupt("shared edge with no adjacent face"))?
        } else {
            self.common_input_face(tail_loc, head_loc)
                .ok_or_else(|| corrupt("uncrossed edge spans no common input face"))?
        };
        let chart = FaceChart::new(input, &self.core.input_geometry, face);
        let a = position_in_chart(input, &chart, tail_loc)
            .ok_or_else(|| corrupt("tail outside start face"))?;
        let b = position_in_chart(input, &chart, head_loc)
            .ok_or_else(|| corrupt("head outside start face"))?;
        let direction = (b - a)
            .try_normalize(1e-12)
            .ok_or_else(|| corrupt("degenerate start direction"))?;
        Ok((chart, a, direction))
    }

    /// A common input face whose closure contains both surface points.
    pub(crate) fn common_input_face(&self, a: SurfacePoint, b: SurfacePoint) -> Option<FaceId> {
        let fa = self.input_faces_of(a);
        let fb = self.input_faces_of(b);
        fa.into_iter().find(|f| fb.contains(f))
    }

    pub(crate) fn input_faces_of(&self, loc: SurfacePoint) -> SmallVec<[FaceId; 8]> {
        let input = self.input_mesh();
        match loc {
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
            SurfacePoint::Face(f, _) => SmallVec::from_slice(&[f]),
        }
    }

    /// Rotate a direction counterclockwise by `alpha` (clockwise when
    /// negative) about a point of the input surface, unfolding across input
    /// faces when the rotation sweeps past a wedge boundary at a vertex or
    /// an edge.
    fn rotate_direction_on_input(
        &self,
        chart: FaceChart,
        pivot: Vector2<f64>,
        direction: Vector2<f64>,
        alpha: f64,
    ) -> IntrinsicResult<(FaceChart, Vector2<f64>)> {
        rotate_direction(
            self.input_mesh(),
            &self.core.input_geometry,
            chart,
            pivot,
            direction,
            alpha,
        )
    }

    // ------------------------------------------------------------------
    // Input-to-intrinsic point queries
    // ------------------------------------------------------------------

    fn input_edge_point_on_intrinsic(&self, e: EdgeId, t: f64) -> IntrinsicResult<SurfacePoint> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: self.input_mesh().halfedge(e),
            detail,
        };
        let curve = self.trace_input_edge(e)?;
        let mut piece_start = 0.0_f64;
        for piece in &curve.pieces {
            let (start_v, end_v) = match piece {
                CurvePiece::Arc { start, end, .. } => (*start, *end),
                CurvePiece::Along(h) => (self.mesh().tail(*h), self.mesh().head(*h)),
            };
            let piece_end = self
                .input_edge_param(self.location(end_v), e)
                .unwrap_or(1.0);
            if t <= piece_end + 1e-12 {
                let local = if piece_end > piece_start {
                    ((t - piece_start) / (piece_end - piece_start)).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                return match piece {
                    CurvePiece::Along(h) => {
                        let canonical = self.mesh().halfedge(h.edge());
                        let param = if canonical == *h { local } else { 1.0 - local };
                        Ok(SurfacePoint::Edge(h.edge(), param))
                    }
                    CurvePiece::Arc { crossings, .. } => {
                        let strip = self.arc_strip_geometry(start_v, end_v, crossings)?;
                        let q = strip.start + (strip.end - strip.start) * local;
                        let band = strip
                            .crossings
                            .iter()
                            .position(|c| c.segment_param > local)
                            .unwrap_or(strip.crossings.len());
                        let chart = &strip.charts[band];
                        Ok(SurfacePoint::Face(chart.face, chart.barycentric(q)))
                    }
                };
            }
            piece_start = piece_end;
        }
        Err(corrupt("edge parameter beyond the traced curve"))
    }

    fn input_face_point_on_intrinsic(
        &self,
        f: FaceId,
        bary: [f64; 3],
    ) -> IntrinsicResult<SurfacePoint> {
        let corrupt = |detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
            halfedge: self.input_mesh().halfedge_of_face(f),
            detail,
        };
        let input = self.input_mesh();
        let chart = FaceChart::new(input, &self.core.input_geometry, f);
        let target = chart.pos[0] * bary[0] + chart.pos[1] * bary[1] + chart.pos[2] * bary[2];
        // Walk from the face's first corner, an original vertex present in
        // both meshes.
        let u = input.tail(chart.hes[0]);
        let origin = chart.pos[0];
        let segment = target - origin;
        let distance = segment.norm();
        if distance < 1e-12 {
            return Ok(SurfacePoint::Vertex(u));
        }

        // Angle of the target direction in the input cone at `u`.
        let theta_target = self.input_angle_at_vertex(u, f, segment)?;

        // Pick the intrinsic wedge whose start direction is the last not
        // past the target angle.
        let mut best: Option<(HalfedgeId, f64)> = None;
        let cone = self.core.input_geometry.angle_sum(u);
        for h in self.mesh().outgoing_halfedges(u) {
            if !self.mesh().is_interior(h) {
                continue;
            }
            let (h_chart, h_origin, h_dir) = self.halfedge_start_direction(h)?;
            let theta_h = self.input_angle_at_vertex_from_chart(u, &h_chart, h_origin, h_dir)?;
            let offset = (theta_target - theta_h).rem_euclid(cone);
            if best.map_or(true, |(_, o)| offset < o) {
                best = Some((h, offset));
            }
        }
        let (h, offset) = best.ok_or_else(|| corrupt("no intrinsic wedge at input vertex"))?;

        let face = self
            .mesh()
            .face(h)
            .ok_or_else(|| corrupt("wedge face missing"))?;
        let intrinsic_chart = FaceChart::new(self.mesh(), &self.core.geometry, face);
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
            self.mesh(),
            &self.core.geometry,
            intrinsic_chart,
            pivot,
            along,
            offset,
        )?;
        let outcome = walk_segment(
            self.mesh(),
            &self.core.geometry,
            &walk_chart,
            pivot,
            pivot + direction * distance,
            2 * self.mesh().n_faces() + 8,
            |_, _| WalkControl::Continue,
        );
        match outcome {
            WalkOutcome::Landed { face, bary } => Ok(SurfacePoint::Face(face, bary)),
            WalkOutcome::HitBoundary {
                halfedge,
                edge_param,
            } => Ok(SurfacePoint::Edge(halfedge.edge(), edge_param)),
            _ => Err(corrupt("input point walk failed")),
        }
    }

    /// Angle coordinate of a direction at input vertex `u`, measured
    /// counterclockwise from the vertex's reference outgoing half-edge,
    /// where the direction lies in the chart of input face `f` starting at
    /// `u`'s corner.
    fn input_angle_at_vertex(
        &self,
        u: VertexId,
        f: FaceId,
        direction: Vector2<f64>,
    ) -> IntrinsicResult<f64> {
        let input = self.input_mesh();
        let chart = FaceChart::new(input, &self.core.input_geometry, f);
        let i = (0..3)
            .find(|&i| input.tail(chart.hes[i]) == u)
            .ok_or(IntrinsicError::CorruptNormalCoordinates {
                halfedge: input.halfedge_of_face(f),
                detail: "vertex is not a corner of the face",
            })?;
        let wedge_start = chart.pos[(i + 1) % 3] - chart.pos[i];
        let within = angle_between(wedge_start, direction).rem_euclid(std::f64::consts::TAU);
        Ok(self.input_wedge_base_angle(u, chart.hes[i]) + within)
    }

    /// As [`input_angle_at_vertex`], with the direction given in an
    /// arbitrary chart anchored at `u`'s position.
    fn input_angle_at_vertex_from_chart(
        &self,
        u: VertexId,
        chart: &FaceChart,
        origin: Vector2<f64>,
        direction: Vector2<f64>,
    ) -> IntrinsicResult<f64> {
        let input = self.input_mesh();
        let i = (0..3)
            .find(|&i| (chart.pos[i] - origin).norm() < 1e-9 && input.tail(chart.hes[i]) == u)
            .ok_or(IntrinsicError::CorruptNormalCoordinates {
                halfedge: input.halfedge_of_face(chart.face),
                detail: "direction chart is not anchored at the vertex",
            })?;
        let wedge_start = chart.pos[(i + 1) % 3] - chart.pos[i];
        let within = angle_between(wedge_start, direction).rem_euclid(std::f64::consts::TAU);
        Ok(self.input_wedge_base_angle(u, chart.hes[i]) + within)
    }

    /// Cumulative interior angle at `u` from its reference outgoing
    /// half-edge to the given outgoing half-edge, in the input metric.
    fn input_wedge_base_angle(&self, u: VertexId, target: HalfedgeId) -> f64 {
        let input = self.input_mesh();
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
}

/// Signed counterclockwise angle from `a` to `b`.
pub(crate) fn angle_between(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    let cross = a.x * b.y - a.y * b.x;
    let dot = a.x * b.x + a.y * b.y;
    cross.atan2(dot)
}

/// Rotate `direction` about `pivot` by `alpha` (counterclockwise when
/// positive), unfolding across faces whenever the rotation leaves the
/// current wedge. Works on either mesh.
pub(crate) fn rotate_direction(
    mesh: &HalfedgeMesh,
    geometry: &EdgeLengthGeometry,
    mut chart: FaceChart,
    pivot: Vector2<f64>,
    mut direction: Vector2<f64>,
    alpha: f64,
) -> IntrinsicResult<(FaceChart, Vector2<f64>)> {
    let corrupt = |h: HalfedgeId, detail: &'static str| IntrinsicError::CorruptNormalCoordinates {
        halfedge: h,
        detail,
    };
    let rotate = |v: Vector2<f64>, a: f64| {
        let (sin, cos) = a.sin_cos();
        Vector2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
    };

    let corner = (0..3).find(|&i| (chart.pos[i] - pivot).norm() < 1e-9);
    let Some(mut corner) = corner else {
        // Interior or edge-interior pivot: a plain rotation suffices; the
        // subsequent walk unfolds as the segment leaves the face.
        return Ok((chart, rotate(direction, alpha)));
    };

    let mut remaining = alpha;
    for _ in 0..4 * mesh.n_faces() + 8 {
        let to_next = chart.pos[(corner + 1) % 3] - chart.pos[corner];
        let to_far = chart.pos[(corner + 2) % 3] - chart.pos[corner];
        if remaining >= 0.0 {
            // Rotating counterclockwise sweeps from the current direction
            // toward the far corner's edge.
            let room = angle_between(direction, to_far).rem_euclid(std::f64::consts::TAU);
            if remaining <= room + 1e-12 {
                return Ok((chart, rotate(direction, remaining)));
            }
            remaining -= room;
            direction = to_far.normalize();
            let exit = (corner + 2) % 3;
            let he = chart.hes[exit];
            chart = chart
                .across(mesh, geometry, exit)
                .ok_or_else(|| corrupt(he, "rotation swept past the boundary"))?;
            corner = (0..3)
                .find(|&i| (chart.pos[i] - pivot).norm() < 1e-9)
                .ok_or_else(|| corrupt(he, "pivot lost while unfolding"))?;
        } else {
            let room = angle_between(to_next, direction).rem_euclid(std::f64::consts::TAU);
            if -remaining <= room + 1e-12 {
                return Ok((chart, rotate(direction, remaining)));
            }
            remaining += room;
            direction = to_next.normalize();
            let exit = corner;
            let he = chart.hes[exit];
            chart = chart
                .across(mesh, geometry, exit)
                .ok_or_else(|| corrupt(he, "rotation swept past the boundary"))?;
            corner = (0..3)
                .find(|&i| (chart.pos[i] - pivot).norm() < 1e-9)
                .ok_or_else(|| corrupt(he, "pivot lost while unfolding"))?;
        }
    }
    Err(corrupt(chart.hes[0], "rotation does not terminate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_halfedge::{EdgeData, HalfedgeMesh};

    /// Unit square split along the 0-2 diagonal, with exact edge lengths.
    fn unit_square() -> (HalfedgeMesh, EdgeLengthGeometry) {
        let mesh = HalfedgeMesh::from_faces(4, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let positions: [[f64; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let mut lengths = EdgeData::new(mesh.n_edges_capacity(), 0.0);
        for e in mesh.edges() {
            let h = mesh.halfedge(e);
            let a = positions[mesh.tail(h).index()];
            let b = positions[mesh.head(h).index()];
            lengths[e] = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        }
        let geometry = EdgeLengthGeometry::new(&mesh, lengths).unwrap();
        (mesh, geometry)
    }

    fn tetrahedron() -> (HalfedgeMesh, EdgeLengthGeometry) {
        let mesh =
            HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
        let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
        let geometry = EdgeLengthGeometry::new(&mesh, lengths).unwrap();
        (mesh, geometry)
    }

    #[test]
    fn test_segment_intersection_crossing() {
        let (u, w) = segment_intersection(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.5, -1.0),
            Vector2::new(0.5, 1.0),
        )
        .unwrap();
        assert!((u - 0.5).abs() < 1e-12);
        assert!((w - 0.5).abs() < 1e-12);

        // An off-center crossing has distinct parameters along each segment.
        let (u, w) = segment_intersection(
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 2.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 4.0),
        )
        .unwrap();
        assert!((u - 0.5).abs() < 1e-12);
        assert!((w - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_segment_intersection_parallel_is_none() {
        assert!(segment_intersection(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
        )
        .is_none());
    }

    #[test]
    fn test_angle_between_signed() {
        let right = Vector2::new(1.0, 0.0);
        assert!((angle_between(right, Vector2::new(0.0, 1.0)) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((angle_between(right, Vector2::new(0.0, -1.0)) + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((angle_between(right, Vector2::new(-1.0, 0.0)) - std::f64::consts::PI).abs() < 1e-12);
        assert!(angle_between(right, right).abs() < 1e-12);
    }

    #[test]
    fn test_rotate_direction_within_a_wedge() {
        let (mesh, geometry) = tetrahedron();
        let f = mesh.faces().next().unwrap();
        let chart = FaceChart::new(&mesh, &geometry, f);
        let pivot = chart.pos[0];
        let along = (chart.pos[1] - chart.pos[0]).normalize();

        // A rotation smaller than the corner angle stays in the same face.
        let alpha = std::f64::consts::FRAC_PI_6;
        let (rotated_chart, direction) =
            rotate_direction(&mesh, &geometry, chart, pivot, along, alpha).unwrap();
        assert_eq!(rotated_chart.face, f);
        let expected = Vector2::new(alpha.cos(), alpha.sin());
        assert!((direction - expected).norm() < 1e-12);
    }

    #[test]
    fn test_rotate_direction_crosses_a_wedge() {
        let (mesh, geometry) = tetrahedron();
        let f = mesh.faces().next().unwrap();
        let chart = FaceChart::new(&mesh, &geometry, f);
        let pivot = chart.pos[0];
        let along = (chart.pos[1] - chart.pos[0]).normalize();

        // Equilateral corners span 60 degrees; 90 degrees lands in the next
        // face around the pivot, still unit length and still anchored there.
        let (rotated_chart, direction) =
            rotate_direction(&mesh, &geometry, chart, pivot, along, std::f64::consts::FRAC_PI_2)
                .unwrap();
        assert_ne!(rotated_chart.face, f);
        assert!((direction.norm() - 1.0).abs() < 1e-12);
        assert!(rotated_chart
            .pos
            .iter()
            .any(|p| (p - pivot).norm() < 1e-9));
    }

    #[test]
    fn test_unfold_strip_across_the_square_diagonal() {
        let (mesh, geometry) = unit_square();
        let diagonal = mesh.edges().find(|&e| !mesh.is_boundary_edge(e)).unwrap();
        let f0 = mesh
            .faces()
            .find(|&f| mesh.face_vertices(f).contains(&mesh_halfedge::VertexId::from_index(1)))
            .unwrap();
        let chart = FaceChart::new(&mesh, &geometry, f0);

        let (charts, exits) = unfold_strip(&mesh, &geometry, chart, &[diagonal]).unwrap();
        assert_eq!(charts.len(), 2);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].0.edge(), diagonal);

        // The unfolded neighbor keeps the shared diagonal pinned and places
        // vertex 3 at the reflected corner of the square.
        let p3 = position_in_chart(
            &mesh,
            &charts[1],
            SurfacePoint::Vertex(mesh_halfedge::VertexId::from_index(3)),
        )
        .unwrap();
        assert!((p3 - Vector2::new(0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_strip_geometry_midpoint_crossing() {
        let (mesh, geometry) = unit_square();
        let diagonal = mesh.edges().find(|&e| !mesh.is_boundary_edge(e)).unwrap();
        let f0 = mesh
            .faces()
            .find(|&f| mesh.face_vertices(f).contains(&mesh_halfedge::VertexId::from_index(1)))
            .unwrap();
        let chart = FaceChart::new(&mesh, &geometry, f0);
        let start = position_in_chart(
            &mesh,
            &chart,
            SurfacePoint::Vertex(mesh_halfedge::VertexId::from_index(1)),
        )
        .unwrap();

        // The segment from corner 1 to corner 3 crosses the diagonal at its
        // midpoint, halfway along the segment.
        let strip = strip_geometry(&mesh, &geometry, chart, &[diagonal], start, |last| {
            position_in_chart(
                &mesh,
                last,
                SurfacePoint::Vertex(mesh_halfedge::VertexId::from_index(3)),
            )
        })
        .unwrap();
        assert_eq!(strip.crossings.len(), 1);
        let crossing = &strip.crossings[0];
        assert_eq!(crossing.halfedge.edge(), diagonal);
        assert!((crossing.edge_param - 0.5).abs() < 1e-12);
        assert!((crossing.segment_param - 0.5).abs() < 1e-12);
        assert!((crossing.point - Vector2::new(0.5, 0.5)).norm() < 1e-12);
    }
}
