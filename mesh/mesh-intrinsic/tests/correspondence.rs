//! Tracing, point correspondence, and the common subdivision.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use mesh_halfedge::{EdgeData, HalfedgeMesh, SurfacePoint};
use mesh_intrinsic::{CurvePiece, IntegerTriangulation, IntrinsicError, SignpostTriangulation};

fn tetrahedron() -> (HalfedgeMesh, EdgeData<f64>) {
    let mesh = HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
    let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
    (mesh, lengths)
}

fn sheared_strip(quads: usize) -> (HalfedgeMesh, EdgeData<f64>) {
    let n = quads + 1;
    let position = |v: usize| -> [f64; 2] {
        if v < n {
            [10.0 * v as f64, 0.0]
        } else {
            [10.0 * (v - n) as f64 + 1.0, 1.0]
        }
    };
    let mut faces = Vec::new();
    for i in 0..quads {
        let (b0, b1) = (i as u32, i as u32 + 1);
        let (t0, t1) = (n as u32 + i as u32, n as u32 + i as u32 + 1);
        faces.push([b0, b1, t1]);
        faces.push([b0, t1, t0]);
    }
    let mesh = HalfedgeMesh::from_faces(2 * n, &faces).unwrap();
    let mut lengths = EdgeData::new(mesh.n_edges_capacity(), 0.0);
    for e in mesh.edges() {
        let h = mesh.halfedge(e);
        let a = position(mesh.tail(h).index());
        let b = position(mesh.head(h).index());
        lengths[e] = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
    }
    (mesh, lengths)
}

#[test]
fn identity_traces_are_trivial() {
    let (mesh, lengths) = tetrahedron();
    let tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    for h in tri.mesh().halfedges() {
        let trace = tri.trace_halfedge(h).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0], tri.location(tri.mesh().tail(h)));
        assert_eq!(trace[1], tri.location(tri.mesh().head(h)));
    }
}

#[test]
fn input_edge_round_trip_identity() {
    let (mesh, lengths) = tetrahedron();
    let tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    for e in mesh.edges() {
        let curve = tri.trace_input_edge(e).unwrap();
        assert!(curve.is_uncrossed());
        assert_eq!(curve.pieces.len(), 1);
        let identified = tri.identify_input_edge(&curve).unwrap();
        assert_eq!(identified, mesh.halfedge(e));
    }
}

#[test]
fn traces_after_flipping_count_crossings() {
    let (mesh, lengths) = sheared_strip(5);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    for h in tri.mesh().halfedges() {
        let n = tri.normal_coordinates().coordinate(h.edge()).max(0) as usize;
        let trace = tri.trace_halfedge(h).unwrap();
        assert_eq!(trace.len(), n + 2);
        assert!(trace.len() >= 2);
        // Interior points are input edge crossings with sane parameters.
        for point in &trace[1..trace.len() - 1] {
            let (_, t) = point.as_edge().expect("crossing must lie on an input edge");
            assert!((0.0..=1.0).contains(&t));
        }
    }

    // The crossings threaded from the input side reproduce the counts.
    let total: i64 = tri
        .mesh()
        .edges()
        .map(|e| tri.normal_coordinates().coordinate(e).max(0))
        .sum();
    let crossed: usize = mesh
        .edges()
        .map(|e| tri.trace_input_edge(e).unwrap().crossing_count())
        .sum();
    assert_eq!(total as usize, crossed);
}

#[test]
fn uncrossed_input_edges_still_identify_after_flipping() {
    let (mesh, lengths) = sheared_strip(5);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    for e in mesh.edges() {
        let curve = tri.trace_input_edge(e).unwrap();
        if curve.is_uncrossed() {
            let identified = tri.identify_input_edge(&curve).unwrap();
            assert_eq!(identified.edge(), e);
        }
    }
}

#[test]
fn common_subdivision_counts_match_formula() {
    let (mesh, lengths) = sheared_strip(5);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    let crossings: i64 = tri
        .mesh()
        .edges()
        .map(|e| tri.normal_coordinates().coordinate(e).max(0))
        .sum();
    assert!(crossings > 0);

    let cs = tri.extract_common_subdivision().unwrap();
    assert_eq!(
        cs.n_vertices(),
        tri.mesh().n_vertices() + crossings as usize
    );
    assert_eq!(cs.n_vertices(), tri.n_subdivided_vertices());
    assert!(cs.n_vertices() > mesh.n_vertices());
    assert!(cs.n_vertices() > tri.mesh().n_vertices());

    // Every overlay face sits in one face of each mesh.
    for face in &cs.faces {
        assert!(tri.mesh().face_is_live(face.intrinsic_face));
        assert!(mesh.face_is_live(face.input_face));
        assert!(face.vertices.len() >= 3);
    }

    // Overlay Euler characteristic matches the surface.
    let euler = cs.n_vertices() as i64 - cs.n_edges() as i64 + cs.n_faces() as i64;
    assert_eq!(euler, mesh.euler_characteristic());
}

#[test]
fn split_shared_edge_stays_on_input_edge() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let e = mesh.edges().next().unwrap();
    let v = tri.split_edge(e, 0.25).unwrap().unwrap();
    match tri.location(v) {
        SurfacePoint::Edge(input_edge, t) => {
            assert_eq!(input_edge, e);
            assert!((t - 0.25).abs() < 1e-9);
        }
        other => panic!("split vertex should sit on the input edge, got {other:?}"),
    }

    // Tracing the input edge now passes through the new vertex as two
    // shared runs.
    let curve = tri.trace_input_edge(e).unwrap();
    assert!(curve.is_uncrossed());
    assert_eq!(curve.pieces.len(), 2);
    for piece in &curve.pieces {
        assert!(matches!(piece, CurvePiece::Along(_)));
    }

    tri.mesh().validate().unwrap();
    assert_eq!(tri.mesh().euler_characteristic(), 2);
}

#[test]
fn insert_and_remove_round_trip() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let f = tri.mesh().faces().next().unwrap();
    let v = tri
        .insert_vertex(SurfacePoint::Face(f, [0.4, 0.3, 0.3]))
        .unwrap()
        .unwrap();
    assert_eq!(tri.mesh().n_vertices(), 5);
    assert_eq!(tri.mesh().euler_characteristic(), 2);
    assert!(!tri.is_original_vertex(v));
    for face in tri.mesh().faces() {
        assert!(tri.geometry().satisfies_triangle_inequality(tri.mesh(), face));
    }
    // The new vertex sits inside the matching input face.
    match tri.location(v) {
        SurfacePoint::Face(parent, bary) => {
            assert_eq!(parent, f);
            for b in bary {
                assert!(b > 0.0 && b < 1.0);
            }
        }
        other => panic!("inserted vertex should sit in a face, got {other:?}"),
    }

    let kept = tri.remove_inserted_vertex(v).unwrap().unwrap();
    assert!(tri.mesh().face_is_live(kept));
    assert_eq!(tri.mesh().n_vertices(), 4);
    assert_eq!(tri.mesh().n_edges(), 6);
    assert_eq!(tri.mesh().euler_characteristic(), 2);
    tri.mesh().validate().unwrap();
}

#[test]
fn removing_an_original_vertex_is_an_error() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let v = tri.mesh().vertices().next().unwrap();
    assert!(matches!(
        tri.remove_inserted_vertex(v),
        Err(IntrinsicError::RemoveOriginalVertex { .. })
    ));
}

#[test]
fn inserting_at_a_vertex_is_an_error() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let v = tri.mesh().vertices().next().unwrap();
    assert!(matches!(
        tri.insert_vertex(SurfacePoint::Vertex(v)),
        Err(IntrinsicError::InsertAtVertex { .. })
    ));
}

#[test]
fn equivalent_points_round_trip_at_vertices() {
    let (mesh, lengths) = sheared_strip(4);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    for v in mesh.vertices() {
        let on_intrinsic = tri
            .equivalent_point_on_intrinsic(SurfacePoint::Vertex(v))
            .unwrap();
        assert_eq!(on_intrinsic, SurfacePoint::Vertex(v));
        let back = tri.equivalent_point_on_input(on_intrinsic).unwrap();
        assert_eq!(back, SurfacePoint::Vertex(v));
    }
}

#[test]
fn parent_faces_exist_exactly_for_uncrossed_faces() {
    let (mesh, lengths) = sheared_strip(4);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    for f in tri.mesh().faces() {
        let crossed = tri
            .mesh()
            .face_halfedges(f)
            .iter()
            .any(|&h| tri.normal_coordinates().coordinate(h.edge()) > 0);
        if crossed {
            assert_eq!(tri.get_parent_face(f), None);
        } else {
            assert!(tri.get_parent_face(f).is_some());
        }
    }
}

#[test]
fn shared_edges_identify_their_input_halfedge() {
    let (mesh, lengths) = tetrahedron();
    let tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    for h in tri.mesh().halfedges() {
        let ih = tri.identify_shared_input_edge(h).unwrap();
        assert_eq!(ih.edge(), h.edge());
        assert_eq!(mesh.tail(ih), tri.mesh().tail(h));
    }
}

#[test]
fn face_points_round_trip_between_meshes() {
    let (mesh, lengths) = tetrahedron();
    let tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let f = tri.mesh().faces().next().unwrap();
    let point = SurfacePoint::Face(f, [0.5, 0.3, 0.2]);

    // With the identity correspondence the mapping is the identity.
    let on_input = tri.equivalent_point_on_input(point).unwrap();
    let (parent, bary) = on_input.as_face().expect("face point maps to a face point");
    assert_eq!(parent, f);
    for (b, expected) in bary.iter().zip([0.5, 0.3, 0.2]) {
        assert!((b - expected).abs() < 1e-9);
    }

    let back = tri.equivalent_point_on_intrinsic(on_input).unwrap();
    let (face, bary) = back.as_face().expect("maps back to a face point");
    assert_eq!(face, f);
    for (b, expected) in bary.iter().zip([0.5, 0.3, 0.2]) {
        assert!((b - expected).abs() < 1e-6);
    }
}

#[test]
fn move_vertex_relocates_an_inserted_vertex() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let f = tri.mesh().faces().next().unwrap();
    let v = tri
        .insert_vertex(SurfacePoint::Face(f, [1.0 / 3.0; 3]))
        .unwrap()
        .unwrap();

    let moved = tri
        .move_vertex(v, mesh_halfedge::Vector2::new(0.05, 0.0))
        .unwrap();
    if let Some(new_vertex) = moved {
        assert!(!tri.mesh().vertex_is_live(v));
        assert!(tri.mesh().vertex_is_live(new_vertex));
        assert_eq!(tri.mesh().n_vertices(), 5);
    } else {
        // An infeasible move must leave the triangulation unchanged.
        assert!(tri.mesh().vertex_is_live(v));
        assert_eq!(tri.mesh().n_vertices(), 5);
    }
    assert_eq!(tri.mesh().euler_characteristic(), 2);
    tri.mesh().validate().unwrap();
}

#[test]
fn moving_an_original_vertex_is_an_error() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let v = tri.mesh().vertices().next().unwrap();
    assert!(matches!(
        tri.move_vertex(v, mesh_halfedge::Vector2::new(0.1, 0.0)),
        Err(IntrinsicError::RemoveOriginalVertex { .. })
    ));
}

#[test]
fn signpost_traces_have_endpoints_on_locations() {
    let (mesh, lengths) = sheared_strip(5);
    let mut tri = SignpostTriangulation::new(&mesh, &lengths).unwrap();
    tri.flip_to_delaunay();

    for h in tri.mesh().halfedges() {
        let trace = tri.trace_halfedge(h).unwrap();
        assert!(trace.len() >= 2);
        assert_eq!(trace[0], tri.location(tri.mesh().tail(h)));
        assert_eq!(trace[trace.len() - 1], tri.location(tri.mesh().head(h)));
        // Interior points are input edge crossings with sane parameters.
        for point in &trace[1..trace.len() - 1] {
            let (e, t) = point.as_edge().expect("crossing must lie on an input edge");
            assert!(mesh.edge_is_live(e));
            assert!((0.0..=1.0).contains(&t));
        }
        // Original edges trace to their two endpoints alone.
        if tri.edge_is_original(h.edge()) {
            assert_eq!(trace.len(), 2);
        }
    }
}

#[test]
fn signpost_face_points_round_trip_between_meshes() {
    let (mesh, lengths) = tetrahedron();
    let tri = SignpostTriangulation::new(&mesh, &lengths).unwrap();

    let f = tri.mesh().faces().next().unwrap();
    let point = SurfacePoint::Face(f, [0.5, 0.3, 0.2]);

    // With the identity correspondence the mapping is the identity, up to
    // the float tracing error of the representation.
    let on_input = tri.equivalent_point_on_input(point).unwrap();
    let (parent, bary) = on_input.as_face().expect("face point maps to a face point");
    assert_eq!(parent, f);
    for (b, expected) in bary.iter().zip([0.5, 0.3, 0.2]) {
        assert!((b - expected).abs() < 1e-6);
    }

    let back = tri.equivalent_point_on_intrinsic(on_input).unwrap();
    let (face, bary) = back.as_face().expect("maps back to a face point");
    assert_eq!(face, f);
    for (b, expected) in bary.iter().zip([0.5, 0.3, 0.2]) {
        assert!((b - expected).abs() < 1e-6);
    }
}

#[test]
fn signpost_insert_split_and_remove() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = SignpostTriangulation::new(&mesh, &lengths).unwrap();

    // Splitting an edge that still coincides with the input stays on it.
    let e = mesh.edges().next().unwrap();
    let split = tri.split_edge(e, 0.25).unwrap().unwrap();
    match tri.location(split) {
        SurfacePoint::Edge(input_edge, t) => {
            assert_eq!(input_edge, e);
            assert!((t - 0.25).abs() < 1e-9);
        }
        other => panic!("split vertex should sit on the input edge, got {other:?}"),
    }
    assert_eq!(tri.mesh().n_vertices(), 5);
    assert_eq!(tri.mesh().euler_characteristic(), 2);

    // A face insertion lands inside the matching input face.
    let f = tri.mesh().faces().next().unwrap();
    let inserted = tri
        .insert_vertex(SurfacePoint::Face(f, [0.4, 0.3, 0.3]))
        .unwrap()
        .unwrap();
    match tri.location(inserted) {
        SurfacePoint::Face(parent, bary) => {
            assert!(mesh.face_is_live(parent));
            for b in bary {
                assert!(b > -1e-9 && b < 1.0 + 1e-9);
            }
        }
        other => panic!("inserted vertex should sit in a face, got {other:?}"),
    }
    assert_eq!(tri.mesh().n_vertices(), 6);
    tri.mesh().validate().unwrap();

    // And it can be taken back out.
    let before_edges = tri.mesh().n_edges();
    let kept = tri.remove_inserted_vertex(inserted).unwrap().unwrap();
    assert!(tri.mesh().face_is_live(kept));
    assert_eq!(tri.mesh().n_vertices(), 5);
    assert_eq!(tri.mesh().n_edges(), before_edges - 3);
    assert_eq!(tri.mesh().euler_characteristic(), 2);
    tri.mesh().validate().unwrap();
}
