//! The common subdivision: the overlay of both triangulations.
//!
//! Every intrinsic vertex and every transversal crossing becomes an overlay
//! vertex; the pieces of input and intrinsic edges between them bound
//! polygonal overlay faces, each contained in exactly one face of either
//! mesh. Construction walks every input edge's trace and threads the
//! crossings together; since input edges never cross each other, the arcs
//! inside one intrinsic face are disjoint chords and the face's polygons
//! fall out of a recursive chord split.

use hashbrown::HashMap;
use mesh_halfedge::{EdgeId, FaceId, SurfacePoint, VertexData, VertexId};

use crate::error::{IntrinsicError, IntrinsicResult};
use crate::trace::CurvePiece;
use crate::triangulation::IntegerTriangulation;

/// Why an overlay vertex exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdivisionPointSource {
    /// An intrinsic vertex (original input vertices included).
    IntrinsicVertex(VertexId),
    /// A transversal crossing of an input edge with an intrinsic edge.
    Crossing {
        /// The crossed intrinsic edge.
        intrinsic_edge: EdgeId,
        /// The crossing input edge.
        input_edge: EdgeId,
    },
}

/// A vertex of the common subdivision, located on both meshes.
#[derive(Debug, Clone, Copy)]
pub struct SubdivisionPoint {
    /// Position on the input mesh.
    pub on_input: SurfacePoint,
    /// Position on the intrinsic mesh.
    pub on_intrinsic: SurfacePoint,
    /// Provenance.
    pub source: SubdivisionPointSource,
}

/// A polygonal face of the overlay.
#[derive(Debug, Clone)]
pub struct SubdivisionFace {
    /// The intrinsic face containing this polygon.
    pub intrinsic_face: FaceId,
    /// The input face containing this polygon.
    pub input_face: FaceId,
    /// Counterclockwise vertex indices into the subdivision's point list.
    pub vertices: Vec<usize>,
}

/// The planar overlay of the input and intrinsic triangulations.
#[derive(Debug, Clone, Default)]
pub struct CommonSubdivision {
    /// Overlay vertices.
    pub points: Vec<SubdivisionPoint>,
    /// Overlay faces.
    pub faces: Vec<SubdivisionFace>,
    /// Crossing points on each intrinsic edge, ordered along its canonical
    /// half-edge (endpoints excluded).
    pub points_on_intrinsic_edge: HashMap<EdgeId, Vec<usize>>,
    /// Points along each input edge in trace order, endpoints included.
    pub points_on_input_edge: HashMap<EdgeId, Vec<usize>>,
    /// Transversal input-edge segments (excludes runs along shared edges).
    input_arc_segments: usize,
    /// Segments of intrinsic edges (crossings + 1 per live edge).
    intrinsic_segments: usize,
}

impl CommonSubdivision {
    /// Number of overlay vertices.
    #[must_use]
    pub fn n_vertices(&self) -> usize {
        self.points.len()
    }

    /// Number of overlay edge segments.
    #[must_use]
    pub fn n_edges(&self) -> usize {
        // Each intrinsic edge breaks into crossings + 1 segments; each
        // transversal arc of an input edge adds its own crossings + 1
        // (shared runs coincide with intrinsic segments and are not double
        // counted).
        self.intrinsic_segments + self.input_arc_segments
    }

    /// Number of overlay faces.
    #[must_use]
    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    /// Interpolate per-vertex input data to every overlay vertex.
    #[must_use]
    pub fn interpolate_across_input(
        &self,
        input: &mesh_halfedge::HalfedgeMesh,
        values: &VertexData<[f64; 3]>,
    ) -> Vec<[f64; 3]> {
        self.points
            .iter()
            .map(|p| match p.on_input {
                SurfacePoint::Vertex(v) => values[v],
                SurfacePoint::Edge(e, t) => {
                    let h = input.halfedge(e);
                    let a = values[input.tail(h)];
                    let b = values[input.head(h)];
                    [
                        a[0] + (b[0] - a[0]) * t,
                        a[1] + (b[1] - a[1]) * t,
                        a[2] + (b[2] - a[2]) * t,
                    ]
                }
                SurfacePoint::Face(f, bary) => {
                    let [va, vb, vc] = input.face_vertices(f);
                    let (a, b, c) = (values[va], values[vb], values[vc]);
                    [
                        a[0] * bary[0] + b[0] * bary[1] + c[0] * bary[2],
                        a[1] * bary[0] + b[1] * bary[1] + c[1] * bary[2],
                        a[2] * bary[0] + b[2] * bary[1] + c[2] * bary[2],
                    ]
                }
            })
            .collect()
    }
}

impl IntegerTriangulation<'_> {
    /// Extract the common subdivision of the input and intrinsic
    /// triangulations.
    ///
    /// # Errors
    ///
    /// Fails if the crossing bookkeeping is corrupt, including when the
    /// threaded crossing count disagrees with the normal coordinates.
    pub fn extract_common_subdivision(&self) -> IntrinsicResult<CommonSubdivision> {
        let mesh = self.mesh();
        let input = self.input_mesh();
        let mut cs = CommonSubdivision::default();

        // Intrinsic vertices become overlay vertices.
        let mut vertex_point: HashMap<VertexId, usize> = HashMap::new();
        for v in mesh.vertices() {
            vertex_point.insert(v, cs.points.len());
            cs.points.push(SubdivisionPoint {
                on_input: self.location(v),
                on_intrinsic: SurfacePoint::Vertex(v),
                source: SubdivisionPointSource::IntrinsicVertex(v),
            });
        }

        // Thread every input edge's trace, creating crossing points and the
        // chords each face will be split along.
        let mut edge_crossings: HashMap<EdgeId, Vec<(f64, usize)>> = HashMap::new();
        let mut chords: HashMap<FaceId, Vec<(usize, usize, EdgeId)>> = HashMap::new();
        let mut arc_segments = 0usize;
        for e in input.edges() {
            let curve = self.trace_input_edge(e)?;
            let mut chain: Vec<usize> = Vec::new();
            for piece in &curve.pieces {
                match piece {
                    CurvePiece::Along(h) => {
                        let tail = vertex_point[&mesh.tail(*h)];
                        let head = vertex_point[&mesh.head(*h)];
                        if chain.is_empty() {
                            chain.push(tail);
                        }
                        chain.push(head);
                    }
                    CurvePiece::Arc {
                        start,
                        end,
                        crossings,
                    } => {
                        arc_segments += crossings.len() + 1;
                        let strip = self.arc_strip_geometry(*start, *end, crossings)?;
                        let t_start = self
                            .input_edge_param(self.location(*start), e)
                            .unwrap_or(0.0);
                        let t_end = self.input_edge_param(self.location(*end), e).unwrap_or(1.0);
                        if chain.is_empty() {
                            chain.push(vertex_point[start]);
                        }
                        let mut previous = vertex_point[start];
                        let mut previous_face = mesh.face(crossings[0].halfedge.twin());
                        for (crossing, geometry) in crossings.iter().zip(&strip.crossings) {
                            let point = cs.points.len();
                            let intrinsic_edge = crossing.halfedge.edge();
                            let t_input =
                                t_start + (t_end - t_start) * geometry.segment_param;
                            cs.points.push(SubdivisionPoint {
                                on_input: SurfacePoint::Edge(e, t_input),
                                on_intrinsic: SurfacePoint::Edge(
                                    intrinsic_edge,
                                    geometry.edge_param,
                                ),
                                source: SubdivisionPointSource::Crossing {
                                    intrinsic_edge,
                                    input_edge: e,
                                },
                            });
                            edge_crossings
                                .entry(intrinsic_edge)
                                .or_default()
                                .push((geometry.edge_param, point));
                            if let Some(face) = previous_face {
                                chords.entry(face).or_default().push((previous, point, e));
                            }
                            previous = point;
                            previous_face = mesh.face(crossing.halfedge);
                            chain.push(point);
                        }
                        if let Some(face) = previous_face {
                            chords
                                .entry(face)
                                .or_default()
                                .push((previous, vertex_point[end], e));
                        }
                        chain.push(vertex_point[end]);
                    }
                }
            }
            cs.points_on_input_edge.insert(e, chain);
        }

        // Consistency: threaded crossings must reproduce the coordinates.
        for e in mesh.edges() {
            let expected = self.normal_coords.coords[e].max(0) as usize;
            let found = edge_crossings.get(&e).map_or(0, Vec::len);
            if expected != found {
                return Err(IntrinsicError::CorruptNormalCoordinates {
                    halfedge: mesh.halfedge(e),
                    detail: "threaded crossings disagree with normal coordinates",
                });
            }
        }

        for (e, mut list) in edge_crossings {
            list.sort_by(|a, b| a.0.total_cmp(&b.0));
            cs.points_on_intrinsic_edge
                .insert(e, list.into_iter().map(|(_, p)| p).collect());
        }

        // Assemble each intrinsic face's polygons from its boundary cycle
        // and chords.
        for f in mesh.faces() {
            let mut boundary: Vec<usize> = Vec::new();
            for h in mesh.face_halfedges(f) {
                boundary.push(vertex_point[&mesh.tail(h)]);
                let e = h.edge();
                if let Some(points) = cs.points_on_intrinsic_edge.get(&e) {
                    if mesh.halfedge(e) == h {
                        boundary.extend(points.iter().copied());
                    } else {
                        boundary.extend(points.iter().rev().copied());
                    }
                }
            }
            let face_chords = chords.remove(&f).unwrap_or_default();
            let polygons = split_polygon(
                &boundary,
                &face_chords
                    .iter()
                    .map(|&(a, b, _)| (a, b))
                    .collect::<Vec<_>>(),
            );
            for polygon in polygons {
                let input_face = self.polygon_input_face(&polygon, &cs).ok_or(
                    IntrinsicError::CorruptNormalCoordinates {
                        halfedge: mesh.halfedge_of_face(f),
                        detail: "overlay polygon spans no single input face",
                    },
                )?;
                cs.faces.push(SubdivisionFace {
                    intrinsic_face: f,
                    input_face,
                    vertices: polygon,
                });
            }
        }

        cs.input_arc_segments = arc_segments;
        cs.intrinsic_segments = mesh
            .edges()
            .map(|e| self.normal_coords.coords[e].max(0) as usize + 1)
            .sum();
        Ok(cs)
    }

    /// The single input face containing an overlay polygon.
    fn polygon_input_face(&self, polygon: &[usize], cs: &CommonSubdivision) -> Option<FaceId> {
        let mut candidates: Option<Vec<FaceId>> = None;
        for &p in polygon {
            let faces = self.input_faces_of(cs.points[p].on_input);
            candidates = Some(match candidates {
                None => faces.to_vec(),
                Some(previous) => previous.into_iter().filter(|f| faces.contains(f)).collect(),
            });
        }
        candidates.and_then(|c| c.first().copied())
    }
}

/// Split a convex-boundary cycle along non-crossing chords into the faces
/// of the induced arrangement.
fn split_polygon(boundary: &[usize], chords: &[(usize, usize)]) -> Vec<Vec<usize>> {
    if chords.is_empty() {
        return vec![boundary.to_vec()];
    }
    let (a, b) = chords[0];
    let rest = &chords[1..];
    let pos_a = boundary.iter().position(|&p| p == a);
    let pos_b = boundary.iter().position(|&p| p == b);
    let (Some(pos_a), Some(pos_b)) = (pos_a, pos_b) else {
        // Chord endpoints not on this sub-polygon's boundary (consumed by a
        // sibling); drop it and continue.
        return split_polygon(boundary, rest);
    };
    let (i, j) = if pos_a <= pos_b {
        (pos_a, pos_b)
    } else {
        (pos_b, pos_a)
    };
    let side_one: Vec<usize> = boundary[i..=j].to_vec();
    let mut side_two: Vec<usize> = boundary[j..].to_vec();
    side_two.extend_from_slice(&boundary[..=i]);

    let mut polygons = Vec::new();
    let belongs = |side: &[usize], (x, y): (usize, usize)| {
        side.contains(&x) && side.contains(&y)
    };
    let chords_one: Vec<(usize, usize)> =
        rest.iter().copied().filter(|&c| belongs(&side_one, c)).collect();
    let chords_two: Vec<(usize, usize)> =
        rest.iter().copied().filter(|&c| belongs(&side_two, c)).collect();
    polygons.extend(split_polygon(&side_one, &chords_one));
    polygons.extend(split_polygon(&side_two, &chords_two));
    polygons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_polygon_no_chords() {
        let polygons = split_polygon(&[0, 1, 2], &[]);
        assert_eq!(polygons, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_split_polygon_single_chord() {
        // Square 0-1-2-3 with chord (0, 2).
        let polygons = split_polygon(&[0, 1, 2, 3], &[(0, 2)]);
        assert_eq!(polygons.len(), 2);
        assert!(polygons.contains(&vec![0, 1, 2]));
        assert!(polygons.contains(&vec![2, 3, 0]));
    }

    #[test]
    fn test_split_polygon_chords_sharing_a_vertex() {
        // Hexagon with chords (0, 3) and (0, 4).
        let polygons = split_polygon(&[0, 1, 2, 3, 4, 5], &[(0, 3), (0, 4)]);
        assert_eq!(polygons.len(), 3);
        assert!(polygons.contains(&vec![0, 1, 2, 3]));
        let total: usize = polygons.iter().map(Vec::len).sum();
        // Each chord duplicates its two endpoints across the split.
        assert_eq!(total, 6 + 4);
    }
}
