//! Half-edge connectivity and atomic topology mutations.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::{MeshError, MeshResult};
use crate::handles::{EdgeId, FaceId, HalfedgeId, VertexId, INVALID};

#[derive(Debug, Clone, Copy)]
struct HalfedgeRecord {
    next: u32,
    prev: u32,
    /// Tail vertex.
    vertex: u32,
    /// Incident face, `INVALID` on boundary half-edges.
    face: u32,
}

impl HalfedgeRecord {
    fn unset() -> Self {
        Self {
            next: INVALID,
            prev: INVALID,
            vertex: INVALID,
            face: INVALID,
        }
    }
}

/// Result of splitting an edge with a new vertex.
#[derive(Debug, Clone, Copy)]
pub struct SplitEdgeResult {
    /// The vertex inserted on the edge.
    pub new_vertex: VertexId,
    /// Half-edge from the new vertex to the split half-edge's head. Its edge
    /// is newly allocated (the head-side child).
    pub he_to_head: HalfedgeId,
    /// Half-edge from the new vertex to the split half-edge's tail. Its edge
    /// reuses the original edge handle (the tail-side child).
    pub he_to_tail: HalfedgeId,
    /// New edge joining the new vertex to the apex of the split half-edge's
    /// face.
    pub spoke_front: EdgeId,
    /// New edge joining the new vertex to the apex across the twin, when the
    /// split edge is interior.
    pub spoke_back: Option<EdgeId>,
}

/// Result of inserting a vertex inside a face.
#[derive(Debug, Clone, Copy)]
pub struct InsertVertexResult {
    /// The inserted vertex.
    pub new_vertex: VertexId,
    /// New spoke edges to the three face corners, in `face_vertices` order.
    pub spokes: [EdgeId; 3],
    /// The three faces of the subdivided triangle, in loop order. The first
    /// reuses the original face handle.
    pub faces: [FaceId; 3],
}

/// An oriented 2-manifold triangle mesh, possibly with boundary.
///
/// Half-edges are stored in twin pairs (`twin(h) = h ^ 1`, `edge(h) = h / 2`).
/// Boundary is represented by half-edges with no face whose `next` pointers
/// run along each boundary loop. Deleted elements are tombstoned; capacities
/// never shrink, so attribute arrays stay index-stable across mutations.
#[derive(Debug, Clone)]
pub struct HalfedgeMesh {
    halfedges: Vec<HalfedgeRecord>,
    /// One outgoing half-edge per vertex; `INVALID` marks a dead vertex.
    vertex_halfedge: Vec<u32>,
    /// One half-edge per face; `INVALID` marks a dead face.
    face_halfedge: Vec<u32>,
    edge_alive: Vec<bool>,
    n_vertices: usize,
    n_edges: usize,
    n_faces: usize,
}

impl HalfedgeMesh {
    /// Build connectivity from triangles over `n_vertices` vertices.
    ///
    /// Faces are counterclockwise vertex triples. Vertices not referenced by
    /// any face are dropped as dead slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the face list is empty, a face is degenerate or
    /// out of range, or the surface is not an oriented 2-manifold.
    pub fn from_faces(n_vertices: usize, faces: &[[u32; 3]]) -> MeshResult<Self> {
        if faces.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        for (fi, face) in faces.iter().enumerate() {
            for i in 0..3 {
                if face[i] as usize >= n_vertices {
                    return Err(MeshError::VertexOutOfRange {
                        face: fi,
                        vertex: face[i],
                        n_vertices,
                    });
                }
                if face[i] == face[(i + 1) % 3] {
                    return Err(MeshError::DegenerateFace {
                        face: fi,
                        vertex: face[i],
                    });
                }
            }
        }

        // Pass 1: pair directed edges into twin slots keyed by the
        // undirected edge. Mask bit 0: low-to-high direction seen; bit 1:
        // high-to-low. Canonical half-edge 2e runs low-to-high.
        let mut edge_slots: HashMap<(u32, u32), (u32, u8)> = HashMap::new();
        let mut n_edges = 0u32;
        let mut face_hes: Vec<[u32; 3]> = Vec::with_capacity(faces.len());
        for face in faces {
            let mut hes = [0u32; 3];
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                let key = if a < b { (a, b) } else { (b, a) };
                let bit = u8::from(a >= b);
                let entry = edge_slots.entry(key).or_insert_with(|| {
                    n_edges += 1;
                    (n_edges - 1, 0)
                });
                if entry.1 & (1 << bit) != 0 {
                    return if entry.1 == 1 << bit {
                        Err(MeshError::InconsistentOrientation { a, b })
                    } else {
                        Err(MeshError::NonManifoldEdge { a: key.0, b: key.1 })
                    };
                }
                entry.1 |= 1 << bit;
                hes[i] = entry.0 * 2 + u32::from(bit);
            }
            face_hes.push(hes);
        }
        drop(edge_slots);

        // Pass 2: fill interior records.
        let mut halfedges = vec![HalfedgeRecord::unset(); n_edges as usize * 2];
        let mut face_halfedge: Vec<u32> = Vec::with_capacity(faces.len());
        for (fi, (face, hes)) in faces.iter().zip(&face_hes).enumerate() {
            for i in 0..3 {
                halfedges[hes[i] as usize] = HalfedgeRecord {
                    next: hes[(i + 1) % 3],
                    prev: hes[(i + 2) % 3],
                    vertex: face[i],
                    face: fi as u32,
                };
            }
            face_halfedge.push(hes[0]);
        }

        // Pass 3: fill tails of boundary half-edges (slots never claimed by
        // a face) from their interior twins, then link boundary loops.
        for h in 0..halfedges.len() {
            if halfedges[h].face == INVALID {
                let twin_next = halfedges[h ^ 1].next;
                halfedges[h].vertex = halfedges[twin_next as usize].vertex;
            }
        }
        let mut boundary_out: Vec<u32> = vec![INVALID; n_vertices];
        for (h, rec) in halfedges.iter().enumerate() {
            if rec.face == INVALID {
                let v = rec.vertex as usize;
                if boundary_out[v] != INVALID {
                    return Err(MeshError::NonManifoldVertex { vertex: rec.vertex });
                }
                boundary_out[v] = h as u32;
            }
        }
        for h in 0..halfedges.len() {
            if halfedges[h].face == INVALID {
                let head = halfedges[h ^ 1].vertex;
                let next = boundary_out[head as usize];
                if next == INVALID {
                    return Err(MeshError::NonManifoldVertex { vertex: head });
                }
                halfedges[h].next = next;
                halfedges[next as usize].prev = h as u32;
            }
        }

        // Reference half-edge per vertex, preferring the boundary one.
        let mut vertex_halfedge: Vec<u32> = vec![INVALID; n_vertices];
        let mut degree: Vec<u32> = vec![0; n_vertices];
        for (h, rec) in halfedges.iter().enumerate() {
            let v = rec.vertex as usize;
            degree[v] += 1;
            if vertex_halfedge[v] == INVALID || rec.face == INVALID {
                vertex_halfedge[v] = h as u32;
            }
        }

        let n_live_vertices = degree.iter().filter(|&&d| d > 0).count();
        let mesh = Self {
            halfedges,
            vertex_halfedge,
            face_halfedge,
            edge_alive: vec![true; n_edges as usize],
            n_vertices: n_live_vertices,
            n_edges: n_edges as usize,
            n_faces: faces.len(),
        };

        // Umbrella check: the rotation orbit at each vertex must cover every
        // outgoing half-edge.
        for v in 0..n_vertices {
            if degree[v] == 0 {
                continue;
            }
            let orbit = mesh.outgoing_halfedges(VertexId::new(v)).count();
            if orbit != degree[v] as usize {
                return Err(MeshError::NonManifoldVertex { vertex: v as u32 });
            }
        }

        Ok(mesh)
    }

    // ------------------------------------------------------------------
    // Counts and capacities
    // ------------------------------------------------------------------

    /// Number of live vertices.
    #[must_use]
    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    /// Number of live edges.
    #[must_use]
    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    /// Number of live half-edges (including boundary half-edges).
    #[must_use]
    pub fn n_halfedges(&self) -> usize {
        self.n_edges * 2
    }

    /// Number of live faces.
    #[must_use]
    pub fn n_faces(&self) -> usize {
        self.n_faces
    }

    /// `V - E + F` over live elements.
    #[must_use]
    pub fn euler_characteristic(&self) -> i64 {
        self.n_vertices as i64 - self.n_edges as i64 + self.n_faces as i64
    }

    /// Vertex slots ever allocated; size attribute arrays to this.
    #[must_use]
    pub fn n_vertices_capacity(&self) -> usize {
        self.vertex_halfedge.len()
    }

    /// Edge slots ever allocated; size attribute arrays to this.
    #[must_use]
    pub fn n_edges_capacity(&self) -> usize {
        self.edge_alive.len()
    }

    /// Half-edge slots ever allocated; size attribute arrays to this.
    #[must_use]
    pub fn n_halfedges_capacity(&self) -> usize {
        self.halfedges.len()
    }

    /// Face slots ever allocated; size attribute arrays to this.
    #[must_use]
    pub fn n_faces_capacity(&self) -> usize {
        self.face_halfedge.len()
    }

    // ------------------------------------------------------------------
    // Element liveness and iteration
    // ------------------------------------------------------------------

    /// Whether the vertex handle refers to a live vertex.
    #[must_use]
    pub fn vertex_is_live(&self, v: VertexId) -> bool {
        v.index() < self.vertex_halfedge.len() && self.vertex_halfedge[v.index()] != INVALID
    }

    /// Whether the edge handle refers to a live edge.
    #[must_use]
    pub fn edge_is_live(&self, e: EdgeId) -> bool {
        e.index() < self.edge_alive.len() && self.edge_alive[e.index()]
    }

    /// Whether the face handle refers to a live face.
    #[must_use]
    pub fn face_is_live(&self, f: FaceId) -> bool {
        f.index() < self.face_halfedge.len() && self.face_halfedge[f.index()] != INVALID
    }

    /// Iterate live vertices.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.vertex_halfedge.len())
            .filter(|&i| self.vertex_halfedge[i] != INVALID)
            .map(VertexId::new)
    }

    /// Iterate live edges.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edge_alive.len())
            .filter(|&i| self.edge_alive[i])
            .map(EdgeId::new)
    }

    /// Iterate live half-edges, boundary half-edges included.
    pub fn halfedges(&self) -> impl Iterator<Item = HalfedgeId> + '_ {
        (0..self.halfedges.len())
            .filter(|&i| self.edge_alive[i >> 1])
            .map(HalfedgeId::new)
    }

    /// Iterate live faces.
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        (0..self.face_halfedge.len())
            .filter(|&i| self.face_halfedge[i] != INVALID)
            .map(FaceId::new)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Next half-edge around the face (or boundary loop).
    #[must_use]
    pub fn next(&self, h: HalfedgeId) -> HalfedgeId {
        HalfedgeId(self.halfedges[h.index()].next)
    }

    /// Previous half-edge around the face (or boundary loop).
    #[must_use]
    pub fn prev(&self, h: HalfedgeId) -> HalfedgeId {
        HalfedgeId(self.halfedges[h.index()].prev)
    }

    /// Tail vertex.
    #[must_use]
    pub fn tail(&self, h: HalfedgeId) -> VertexId {
        VertexId(self.halfedges[h.index()].vertex)
    }

    /// Head vertex.
    #[must_use]
    pub fn head(&self, h: HalfedgeId) -> VertexId {
        VertexId(self.halfedges[h.twin().index()].vertex)
    }

    /// Incident face; `None` on boundary half-edges.
    #[must_use]
    pub fn face(&self, h: HalfedgeId) -> Option<FaceId> {
        let f = self.halfedges[h.index()].face;
        (f != INVALID).then_some(FaceId(f))
    }

    /// Whether the half-edge has an incident face.
    #[must_use]
    pub fn is_interior(&self, h: HalfedgeId) -> bool {
        self.halfedges[h.index()].face != INVALID
    }

    /// Canonical half-edge of an edge.
    #[must_use]
    pub fn halfedge(&self, e: EdgeId) -> HalfedgeId {
        HalfedgeId(e.0 * 2)
    }

    /// An outgoing half-edge of the vertex. For boundary vertices this is
    /// the outgoing boundary half-edge whenever one survived mutation.
    #[must_use]
    pub fn halfedge_of_vertex(&self, v: VertexId) -> HalfedgeId {
        HalfedgeId(self.vertex_halfedge[v.index()])
    }

    /// A half-edge of the face.
    #[must_use]
    pub fn halfedge_of_face(&self, f: FaceId) -> HalfedgeId {
        HalfedgeId(self.face_halfedge[f.index()])
    }

    /// The vertex opposite `h` in its face.
    #[must_use]
    pub fn opposite_vertex(&self, h: HalfedgeId) -> VertexId {
        self.head(self.next(h))
    }

    /// Whether the edge lies on the boundary.
    #[must_use]
    pub fn is_boundary_edge(&self, e: EdgeId) -> bool {
        let h = self.halfedge(e);
        !self.is_interior(h) || !self.is_interior(h.twin())
    }

    /// Whether any incident edge lies on the boundary.
    #[must_use]
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        self.outgoing_halfedges(v)
            .any(|h| self.is_boundary_edge(h.edge()))
    }

    /// Rotate counterclockwise to the next outgoing half-edge at the same
    /// tail vertex.
    #[must_use]
    pub fn next_outgoing(&self, h: HalfedgeId) -> HalfedgeId {
        self.prev(h).twin()
    }

    /// Number of incident edges.
    #[must_use]
    pub fn vertex_degree(&self, v: VertexId) -> usize {
        self.outgoing_halfedges(v).count()
    }

    /// Iterate outgoing half-edges counterclockwise, starting at the
    /// vertex's reference half-edge.
    pub fn outgoing_halfedges(&self, v: VertexId) -> OutgoingHalfedges<'_> {
        let start = self.halfedge_of_vertex(v);
        OutgoingHalfedges {
            mesh: self,
            start,
            current: (start.0 != INVALID).then_some(start),
        }
    }

    /// The three half-edges of a face, in loop order from its reference
    /// half-edge.
    #[must_use]
    pub fn face_halfedges(&self, f: FaceId) -> [HalfedgeId; 3] {
        let h0 = self.halfedge_of_face(f);
        let h1 = self.next(h0);
        let h2 = self.next(h1);
        [h0, h1, h2]
    }

    /// The three vertices of a face, tails of `face_halfedges`.
    #[must_use]
    pub fn face_vertices(&self, f: FaceId) -> [VertexId; 3] {
        self.face_halfedges(f).map(|h| self.tail(h))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Flip an interior edge, replacing the diagonal of its two-face
    /// quadrilateral. Returns `false` (mesh unchanged) if the edge is on the
    /// boundary, its faces coincide, or an endpoint would be disconnected.
    ///
    /// After a successful flip the edge handle survives; its half-edges
    /// connect the two former apex vertices.
    pub fn flip_edge(&mut self, e: EdgeId) -> bool {
        let h0 = self.halfedge(e);
        let h1 = h0.twin();
        let (Some(f0), Some(f1)) = (self.face(h0), self.face(h1)) else {
            return false;
        };
        if f0 == f1 {
            return false;
        }
        let a = self.tail(h0);
        let c = self.tail(h1);
        if self.vertex_degree(a) < 3 || self.vertex_degree(c) < 3 {
            return false;
        }

        let h2 = self.next(h0); // c -> b
        let h3 = self.next(h2); // b -> a
        let h4 = self.next(h1); // a -> d
        let h5 = self.next(h4); // d -> c
        let b = self.tail(h3);
        let d = self.tail(h5);

        // New loops: f0 = (b -> d -> c), f1 = (d -> b -> a).
        self.set_halfedge(h0, h5, h2, b, f0.0);
        self.set_halfedge(h5, h2, h0, d, f0.0);
        self.set_halfedge(h2, h0, h5, c, f0.0);
        self.set_halfedge(h1, h3, h4, d, f1.0);
        self.set_halfedge(h3, h4, h1, b, f1.0);
        self.set_halfedge(h4, h1, h3, a, f1.0);

        self.face_halfedge[f0.index()] = h0.0;
        self.face_halfedge[f1.index()] = h1.0;
        self.repoint_vertex(a, h4);
        self.repoint_vertex(c, h2);
        true
    }

    /// Split the edge under an interior half-edge `h` with a new vertex.
    ///
    /// The original edge handle becomes the tail-side child (between
    /// `tail(h)` and the new vertex); a new edge forms the head side. One or
    /// two spoke edges join the new vertex to the apexes of the incident
    /// faces. Returns `None` (mesh unchanged) if `h` has no face.
    pub fn split_edge(&mut self, h: HalfedgeId) -> Option<SplitEdgeResult> {
        let f0 = self.face(h)?;
        let h0 = h; // a -> c
        let h1 = h0.twin(); // c -> a, possibly boundary
        let h2 = self.next(h0); // c -> b
        let h3 = self.next(h2); // b -> a
        let back_face = self.face(h1);

        let a = self.tail(h0);
        let c = self.tail(h1);
        let b = self.tail(h3);

        let v = self.new_vertex();
        // Head-side child edge: v -> c and c -> v.
        let (hv_c, hc_v) = self.new_halfedge_pair();
        // Front spoke: v -> b and b -> v.
        let (hv_b, hb_v) = self.new_halfedge_pair();
        let f_front = self.new_face();

        // Tail-side face (a, v, b) reuses f0; head-side face (v, c, b).
        self.set_halfedge(h0, hv_b, h3, a, f0.0);
        self.set_halfedge(hv_b, h3, h0, v, f0.0);
        self.set_halfedge(h3, h0, hv_b, b, f0.0);

        self.set_halfedge(hv_c, h2, hb_v, v, f_front.0);
        self.set_halfedge(h2, hb_v, hv_c, c, f_front.0);
        self.set_halfedge(hb_v, hv_c, h2, b, f_front.0);

        self.face_halfedge[f0.index()] = h0.0;
        self.face_halfedge[f_front.index()] = hv_c.0;

        let spoke_back = if let Some(f1) = back_face {
            let h4 = self.next(h1); // a -> d
            let h5 = self.next(h4); // d -> c
            let d = self.tail(h5);

            // Back spoke: v -> d and d -> v.
            let (hv_d, hd_v) = self.new_halfedge_pair();
            let f_back = self.new_face();

            // (c, v, d) reuses f1; (v, a, d) is new.
            self.set_halfedge(hc_v, hv_d, h5, c, f1.0);
            self.set_halfedge(hv_d, h5, hc_v, v, f1.0);
            self.set_halfedge(h5, hc_v, hv_d, d, f1.0);

            self.set_halfedge(h1, h4, hd_v, v, f_back.0);
            self.set_halfedge(h4, hd_v, h1, a, f_back.0);
            self.set_halfedge(hd_v, h1, h4, d, f_back.0);

            self.face_halfedge[f1.index()] = hc_v.0;
            self.face_halfedge[f_back.index()] = h1.0;
            Some(hv_d.edge())
        } else {
            // Boundary: thread c -> v -> a into the boundary loop.
            let bprev = self.prev(h1);
            self.halfedges[hc_v.index()] = HalfedgeRecord {
                next: h1.0,
                prev: bprev.0,
                vertex: c.0,
                face: INVALID,
            };
            self.halfedges[bprev.index()].next = hc_v.0;
            self.halfedges[h1.index()].prev = hc_v.0;
            self.halfedges[h1.index()].vertex = v.0;
            None
        };

        self.vertex_halfedge[v.index()] = if spoke_back.is_none() {
            h1.0 // keep the boundary-outgoing convention
        } else {
            hv_c.0
        };
        self.repoint_vertex(c, hc_v);

        Some(SplitEdgeResult {
            new_vertex: v,
            he_to_head: hv_c,
            he_to_tail: h1,
            spoke_front: hv_b.edge(),
            spoke_back,
        })
    }

    /// Insert a vertex inside a face, splitting it into three.
    pub fn insert_vertex_in_face(&mut self, f: FaceId) -> InsertVertexResult {
        let [ha, hb, hc] = self.face_halfedges(f); // a->b, b->c, c->a
        let [a, b, c] = [self.tail(ha), self.tail(hb), self.tail(hc)];

        let v = self.new_vertex();
        let (ha_v, hv_a) = self.new_halfedge_pair(); // a -> v, v -> a
        let (hb_v, hv_b) = self.new_halfedge_pair(); // b -> v, v -> b
        let (hc_v, hv_c) = self.new_halfedge_pair(); // c -> v, v -> c
        let fb = self.new_face();
        let fc = self.new_face();

        // (a, b, v) reuses f; (b, c, v); (c, a, v).
        self.set_halfedge(ha, hb_v, hv_a, a, f.0);
        self.set_halfedge(hb_v, hv_a, ha, b, f.0);
        self.set_halfedge(hv_a, ha, hb_v, v, f.0);

        self.set_halfedge(hb, hc_v, hv_b, b, fb.0);
        self.set_halfedge(hc_v, hv_b, hb, c, fb.0);
        self.set_halfedge(hv_b, hb, hc_v, v, fb.0);

        self.set_halfedge(hc, ha_v, hv_c, c, fc.0);
        self.set_halfedge(ha_v, hv_c, hc, a, fc.0);
        self.set_halfedge(hv_c, hc, ha_v, v, fc.0);

        self.face_halfedge[f.index()] = ha.0;
        self.face_halfedge[fb.index()] = hb.0;
        self.face_halfedge[fc.index()] = hc.0;
        self.vertex_halfedge[v.index()] = hv_a.0;

        InsertVertexResult {
            new_vertex: v,
            spokes: [ha_v.edge(), hb_v.edge(), hc_v.edge()],
            faces: [f, fb, fc],
        }
    }

    /// Remove an interior degree-3 vertex, merging its three faces into one.
    ///
    /// This is the inverse of [`insert_vertex_in_face`](Self::insert_vertex_in_face).
    /// Returns the surviving face, or `None` (mesh unchanged) if the vertex
    /// is on the boundary or has degree other than three.
    pub fn remove_insertion_tripod(&mut self, v: VertexId) -> Option<FaceId> {
        let spokes: SmallVec<[HalfedgeId; 4]> = self.outgoing_halfedges(v).collect();
        if spokes.len() != 3 {
            return None;
        }
        if spokes
            .iter()
            .any(|&h| !self.is_interior(h) || !self.is_interior(h.twin()))
        {
            return None;
        }

        // Outer ring half-edges: next of each spoke, in rotation order they
        // already chain head-to-tail.
        let outer: [HalfedgeId; 3] = [
            self.next(spokes[0]),
            self.next(spokes[1]),
            self.next(spokes[2]),
        ];
        let keep = self.face(spokes[0])?;
        let dead_faces: SmallVec<[FaceId; 4]> = spokes
            .iter()
            .filter_map(|&s| self.face(s))
            .filter(|&f| f != keep)
            .collect();

        for i in 0..3 {
            let j = (i + 1) % 3;
            let (ni, nj) = (outer[i].index(), outer[j].index());
            self.halfedges[ni].next = nj as u32;
            self.halfedges[nj].prev = ni as u32;
            self.halfedges[ni].face = keep.0;
            let tail = self.tail(outer[i]);
            self.repoint_vertex(tail, outer[i]);
        }
        self.face_halfedge[keep.index()] = outer[0].0;

        for f in dead_faces {
            self.kill_face(f);
        }
        for &spoke in &spokes {
            self.kill_edge(spoke.edge());
        }
        self.kill_vertex(v);
        Some(keep)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check structural invariants: involutions, triangle loops, and
    /// element cross-references. Intended for tests and debug assertions.
    ///
    /// # Errors
    ///
    /// Returns a [`MeshError`] naming the first violated element.
    pub fn validate(&self) -> MeshResult<()> {
        for h in self.halfedges() {
            let rec = &self.halfedges[h.index()];
            let bad = || MeshError::NonManifoldVertex { vertex: rec.vertex };
            if self.next(self.prev(h)) != h || self.prev(self.next(h)) != h {
                return Err(bad());
            }
            if rec.face != INVALID {
                if self.next(self.next(self.next(h))) != h {
                    return Err(bad());
                }
                if !self.face_is_live(FaceId(rec.face)) {
                    return Err(bad());
                }
            }
            // next preserves continuity: head of h is tail of next(h).
            if self.head(h) != self.tail(self.next(h)) {
                return Err(bad());
            }
        }
        for f in self.faces() {
            let h = self.halfedge_of_face(f);
            if self.face(h) != Some(f) {
                return Err(MeshError::NonManifoldVertex {
                    vertex: self.tail(h).0,
                });
            }
        }
        for v in self.vertices() {
            let h = self.halfedge_of_vertex(v);
            if !self.edge_is_live(h.edge()) || self.tail(h) != v {
                return Err(MeshError::NonManifoldVertex { vertex: v.0 });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn set_halfedge(
        &mut self,
        h: HalfedgeId,
        next: HalfedgeId,
        prev: HalfedgeId,
        vertex: VertexId,
        face: u32,
    ) {
        self.halfedges[h.index()] = HalfedgeRecord {
            next: next.0,
            prev: prev.0,
            vertex: vertex.0,
            face,
        };
    }

    /// Ensure the vertex's reference half-edge is a live outgoing one.
    fn repoint_vertex(&mut self, v: VertexId, fallback: HalfedgeId) {
        let current = self.vertex_halfedge[v.index()];
        let stale = current == INVALID
            || !self.edge_alive[(current >> 1) as usize]
            || self.halfedges[current as usize].vertex != v.0;
        if stale {
            self.vertex_halfedge[v.index()] = fallback.0;
        }
    }

    fn new_vertex(&mut self) -> VertexId {
        self.vertex_halfedge.push(INVALID);
        self.n_vertices += 1;
        VertexId::new(self.vertex_halfedge.len() - 1)
    }

    fn new_halfedge_pair(&mut self) -> (HalfedgeId, HalfedgeId) {
        let h0 = self.halfedges.len();
        self.halfedges.push(HalfedgeRecord::unset());
        self.halfedges.push(HalfedgeRecord::unset());
        self.edge_alive.push(true);
        self.n_edges += 1;
        (HalfedgeId::new(h0), HalfedgeId::new(h0 + 1))
    }

    fn new_face(&mut self) -> FaceId {
        self.face_halfedge.push(INVALID);
        self.n_faces += 1;
        FaceId::new(self.face_halfedge.len() - 1)
    }

    fn kill_vertex(&mut self, v: VertexId) {
        self.vertex_halfedge[v.index()] = INVALID;
        self.n_vertices -= 1;
    }

    fn kill_edge(&mut self, e: EdgeId) {
        self.edge_alive[e.index()] = false;
        self.n_edges -= 1;
    }

    fn kill_face(&mut self, f: FaceId) {
        self.face_halfedge[f.index()] = INVALID;
        self.n_faces -= 1;
    }
}

/// Iterator over the outgoing half-edges of a vertex, counterclockwise.
pub struct OutgoingHalfedges<'a> {
    mesh: &'a HalfedgeMesh,
    start: HalfedgeId,
    current: Option<HalfedgeId>,
}

impl Iterator for OutgoingHalfedges<'_> {
    type Item = HalfedgeId;

    fn next(&mut self) -> Option<HalfedgeId> {
        let current = self.current?;
        let next = self.mesh.next_outgoing(current);
        self.current = (next != self.start).then_some(next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> HalfedgeMesh {
        HalfedgeMesh::from_faces(4, &[[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    fn tetrahedron() -> HalfedgeMesh {
        HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap()
    }

    #[test]
    fn test_square_counts() {
        let mesh = square();
        assert_eq!(mesh.n_vertices(), 4);
        assert_eq!(mesh.n_edges(), 5);
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.euler_characteristic(), 1);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_tetrahedron_counts() {
        let mesh = tetrahedron();
        assert_eq!(mesh.n_vertices(), 4);
        assert_eq!(mesh.n_edges(), 6);
        assert_eq!(mesh.n_faces(), 4);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(!mesh.is_boundary_vertex(VertexId(0)));
        mesh.validate().unwrap();
    }

    #[test]
    fn test_boundary_structure() {
        let mesh = square();
        // Diagonal edge 0-2 is interior, the other four are boundary.
        let interior: Vec<EdgeId> = mesh
            .edges()
            .filter(|&e| !mesh.is_boundary_edge(e))
            .collect();
        assert_eq!(interior.len(), 1);
        let h = mesh.halfedge(interior[0]);
        let ends = [mesh.tail(h).index(), mesh.head(h).index()];
        assert!(ends.contains(&0) && ends.contains(&2));
        assert!(mesh.is_boundary_vertex(VertexId(1)));
    }

    #[test]
    fn test_vertex_orbits() {
        let mesh = tetrahedron();
        for v in mesh.vertices() {
            assert_eq!(mesh.vertex_degree(v), 3);
            for h in mesh.outgoing_halfedges(v) {
                assert_eq!(mesh.tail(h), v);
            }
        }
    }

    #[test]
    fn test_non_manifold_edge_rejected() {
        let result = HalfedgeMesh::from_faces(5, &[[0, 1, 2], [1, 0, 3], [0, 1, 4]]);
        assert!(matches!(
            result,
            Err(MeshError::InconsistentOrientation { .. }) | Err(MeshError::NonManifoldEdge { .. })
        ));
    }

    #[test]
    fn test_inconsistent_orientation_rejected() {
        // Second face traverses edge (0, 1) in the same direction.
        let result = HalfedgeMesh::from_faces(4, &[[0, 1, 2], [0, 1, 3]]);
        assert!(matches!(
            result,
            Err(MeshError::InconsistentOrientation { .. })
        ));
    }

    #[test]
    fn test_degenerate_face_rejected() {
        let result = HalfedgeMesh::from_faces(3, &[[0, 0, 1]]);
        assert!(matches!(result, Err(MeshError::DegenerateFace { .. })));
    }

    #[test]
    fn test_flip_square_diagonal() {
        let mut mesh = square();
        let diagonal = mesh
            .edges()
            .find(|&e| !mesh.is_boundary_edge(e))
            .unwrap();
        assert!(mesh.flip_edge(diagonal));
        mesh.validate().unwrap();

        // The diagonal now joins vertices 1 and 3.
        let h = mesh.halfedge(diagonal);
        let ends = [mesh.tail(h).index(), mesh.head(h).index()];
        assert!(ends.contains(&1) && ends.contains(&3));
        assert_eq!(mesh.n_edges(), 5);
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.euler_characteristic(), 1);

        // Flipping back restores the original diagonal.
        assert!(mesh.flip_edge(diagonal));
        mesh.validate().unwrap();
        let h = mesh.halfedge(diagonal);
        let ends = [mesh.tail(h).index(), mesh.head(h).index()];
        assert!(ends.contains(&0) && ends.contains(&2));
    }

    #[test]
    fn test_flip_boundary_rejected() {
        let mut mesh = square();
        let boundary = mesh.edges().find(|&e| mesh.is_boundary_edge(e)).unwrap();
        assert!(!mesh.flip_edge(boundary));
        mesh.validate().unwrap();
    }

    #[test]
    fn test_split_interior_edge() {
        let mut mesh = square();
        let diagonal = mesh
            .edges()
            .find(|&e| !mesh.is_boundary_edge(e))
            .unwrap();
        let h = mesh.halfedge(diagonal);
        let (a, c) = (mesh.tail(h), mesh.head(h));

        let result = mesh.split_edge(h).unwrap();
        mesh.validate().unwrap();

        assert_eq!(mesh.n_vertices(), 5);
        assert_eq!(mesh.n_edges(), 8);
        assert_eq!(mesh.n_faces(), 4);
        assert_eq!(mesh.euler_characteristic(), 1);

        let v = result.new_vertex;
        assert_eq!(mesh.tail(result.he_to_head), v);
        assert_eq!(mesh.head(result.he_to_head), c);
        assert_eq!(mesh.tail(result.he_to_tail), v);
        assert_eq!(mesh.head(result.he_to_tail), a);
        assert!(result.spoke_back.is_some());
        assert_eq!(mesh.vertex_degree(v), 4);
    }

    #[test]
    fn test_split_boundary_edge() {
        let mut mesh = square();
        let boundary = mesh.edges().find(|&e| mesh.is_boundary_edge(e)).unwrap();
        let h = mesh.halfedge(boundary);
        let h = if mesh.is_interior(h) { h } else { h.twin() };

        let result = mesh.split_edge(h).unwrap();
        mesh.validate().unwrap();

        assert_eq!(mesh.n_vertices(), 5);
        assert_eq!(mesh.n_edges(), 7);
        assert_eq!(mesh.n_faces(), 3);
        assert_eq!(mesh.euler_characteristic(), 1);
        assert!(result.spoke_back.is_none());
        assert!(mesh.is_boundary_vertex(result.new_vertex));
        assert_eq!(mesh.vertex_degree(result.new_vertex), 3);
    }

    #[test]
    fn test_insert_and_remove_vertex() {
        let mut mesh = tetrahedron();
        let f = mesh.faces().next().unwrap();

        let result = mesh.insert_vertex_in_face(f);
        mesh.validate().unwrap();
        assert_eq!(mesh.n_vertices(), 5);
        assert_eq!(mesh.n_edges(), 9);
        assert_eq!(mesh.n_faces(), 6);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert_eq!(mesh.vertex_degree(result.new_vertex), 3);

        let kept = mesh.remove_insertion_tripod(result.new_vertex).unwrap();
        mesh.validate().unwrap();
        assert!(mesh.face_is_live(kept));
        assert_eq!(mesh.n_vertices(), 4);
        assert_eq!(mesh.n_edges(), 6);
        assert_eq!(mesh.n_faces(), 4);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(!mesh.vertex_is_live(result.new_vertex));
    }

    #[test]
    fn test_remove_vertex_rejected() {
        let mut mesh = square();
        // The interior vertex created by splitting the diagonal has degree
        // four and cannot be removed as a tripod.
        let diagonal = mesh
            .edges()
            .find(|&e| !mesh.is_boundary_edge(e))
            .unwrap();
        let result = mesh.split_edge(mesh.halfedge(diagonal)).unwrap();
        assert!(mesh.remove_insertion_tripod(result.new_vertex).is_none());
        // A boundary vertex of degree 3 is also rejected.
        let corner = mesh
            .vertices()
            .find(|&v| mesh.is_boundary_vertex(v) && mesh.vertex_degree(v) == 3)
            .unwrap();
        assert!(mesh.remove_insertion_tripod(corner).is_none());
        mesh.validate().unwrap();
    }

    #[test]
    fn test_flip_preserves_euler_characteristic() {
        let mut mesh = tetrahedron();
        for e in mesh.edges().collect::<Vec<_>>() {
            mesh.flip_edge(e);
            assert_eq!(mesh.euler_characteristic(), 2);
            mesh.validate().unwrap();
        }
    }

    #[test]
    fn test_split_keeps_boundary_loop_intact() {
        let mut mesh = square();
        let boundary = mesh.edges().find(|&e| mesh.is_boundary_edge(e)).unwrap();
        let h = mesh.halfedge(boundary);
        let h = if mesh.is_interior(h) { h } else { h.twin() };
        mesh.split_edge(h).unwrap();

        // Walk the boundary loop; it must close and now have 5 half-edges.
        let start = mesh
            .halfedges()
            .find(|&h| !mesh.is_interior(h))
            .unwrap();
        let mut len = 0;
        let mut cur = start;
        loop {
            len += 1;
            cur = mesh.next(cur);
            if cur == start || len > 10 {
                break;
            }
        }
        assert_eq!(len, 5);
    }
}
