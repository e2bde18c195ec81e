//! Delaunay flipping and refinement over concrete meshes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use mesh_halfedge::{EdgeData, HalfedgeMesh, SurfacePoint};
use mesh_intrinsic::{IntegerTriangulation, RefineParams, SignpostTriangulation};

/// Regular unit tetrahedron.
fn tetrahedron() -> (HalfedgeMesh, EdgeData<f64>) {
    let mesh = HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
    let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
    (mesh, lengths)
}

/// Regular octahedron with unit edges: every face equilateral.
fn octahedron() -> (HalfedgeMesh, EdgeData<f64>) {
    // Vertices: 0, 1 poles; 2..6 equator.
    let faces = [
        [0, 2, 3],
        [0, 3, 4],
        [0, 4, 5],
        [0, 5, 2],
        [1, 3, 2],
        [1, 4, 3],
        [1, 5, 4],
        [1, 2, 5],
    ];
    let mesh = HalfedgeMesh::from_faces(6, &faces).unwrap();
    let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
    (mesh, lengths)
}

/// A long thin sheared strip whose forward diagonals are not Delaunay.
///
/// Bottom row at (10 i, 0), top row at (10 i + 1, 1); each quad is split
/// along the long forward diagonal, which the opposite apex's circumcircle
/// contains.
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
fn tetrahedron_is_already_delaunay() {
    let (mesh, lengths) = tetrahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let outcome = tri.flip_to_delaunay();
    assert_eq!(outcome.flips, 0);
    assert!(tri.is_delaunay());
    for e in tri.mesh().edges() {
        assert_eq!(tri.normal_coordinates().coordinate(e), 0);
    }
}

#[test]
fn octahedron_refine_inserts_nothing() {
    let (mesh, lengths) = octahedron();
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let outcome = tri
        .delaunay_refine(&RefineParams::with_angle_threshold(25.0))
        .unwrap();
    assert_eq!(outcome.insertions(), 0);
    assert!(tri.min_angle_degrees() >= 25.0);
    assert_eq!(tri.mesh().n_vertices(), 6);
}

#[test]
fn strip_flips_to_delaunay() {
    let (mesh, lengths) = sheared_strip(5);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    assert!(!tri.is_delaunay());

    let outcome = tri.flip_to_delaunay();
    assert!(outcome.flips > 0);
    assert!(tri.is_delaunay());

    // Flips preserve the manifold and its metric validity.
    assert_eq!(tri.mesh().euler_characteristic(), 1);
    tri.mesh().validate().unwrap();
    for f in tri.mesh().faces() {
        assert!(tri.geometry().satisfies_triangle_inequality(tri.mesh(), f));
        assert!(tri.normal_coordinates().face_is_valid(tri.mesh(), f));
    }
    // At least one flipped edge crosses its former diagonal.
    let total: i64 = tri
        .mesh()
        .edges()
        .map(|e| tri.normal_coordinates().coordinate(e).max(0))
        .sum();
    assert!(total > 0);
}

#[test]
fn flipping_an_edge_twice_restores_coordinates() {
    let (mesh, lengths) = sheared_strip(3);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let diagonal = tri
        .mesh()
        .edges()
        .find(|&e| !tri.is_fixed(e))
        .unwrap();
    let quad_edges: Vec<_> = {
        let h = tri.mesh().halfedge(diagonal);
        [
            tri.mesh().next(h),
            tri.mesh().prev(h),
            tri.mesh().next(h.twin()),
            tri.mesh().prev(h.twin()),
        ]
        .iter()
        .map(|he| he.edge())
        .collect()
    };
    let before: Vec<i64> = quad_edges
        .iter()
        .map(|&e| tri.normal_coordinates().coordinate(e))
        .collect();
    let diag_before = tri.normal_coordinates().coordinate(diagonal);
    let length_before = tri.geometry().length(diagonal);

    assert!(tri.flip_edge_if_possible(diagonal));
    assert_eq!(tri.normal_coordinates().coordinate(diagonal), 1);
    assert!(tri.flip_edge_if_possible(diagonal));

    assert_eq!(tri.normal_coordinates().coordinate(diagonal), diag_before);
    let after: Vec<i64> = quad_edges
        .iter()
        .map(|&e| tri.normal_coordinates().coordinate(e))
        .collect();
    assert_eq!(before, after);
    assert!((tri.geometry().length(diagonal) - length_before).abs() < 1e-9);
}

#[test]
fn marked_edges_never_flip() {
    let (mesh, lengths) = sheared_strip(4);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let diagonal = tri.mesh().edges().find(|&e| !tri.is_fixed(e)).unwrap();
    tri.mark_edge(diagonal);
    assert!(tri.is_fixed(diagonal));
    assert!(!tri.flip_edge_if_possible(diagonal));

    let h = tri.mesh().halfedge(diagonal);
    let (a, c) = (tri.mesh().tail(h), tri.mesh().head(h));
    tri.flip_to_delaunay();
    // The marked diagonal survives with its endpoints.
    let h = tri.mesh().halfedge(diagonal);
    assert_eq!(tri.mesh().tail(h), a);
    assert_eq!(tri.mesh().head(h), c);
}

#[test]
fn integer_and_signpost_agree_on_delaunay_lengths() {
    let (mesh, lengths) = sheared_strip(5);
    let mut integer = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    let mut signpost = SignpostTriangulation::new(&mesh, &lengths).unwrap();

    integer.flip_to_delaunay();
    signpost.flip_to_delaunay();

    assert!(integer.is_delaunay());
    assert!(signpost.is_delaunay());
    assert_eq!(integer.mesh().n_edges(), signpost.mesh().n_edges());

    let mut a: Vec<f64> = integer
        .mesh()
        .edges()
        .map(|e| integer.geometry().length(e))
        .collect();
    let mut b: Vec<f64> = signpost
        .mesh()
        .edges()
        .map(|e| signpost.geometry().length(e))
        .collect();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    for (la, lb) in a.iter().zip(&b) {
        assert!((la - lb).abs() < 1e-5, "{la} vs {lb}");
    }
}

#[test]
fn refinement_improves_the_strip() {
    let (mesh, lengths) = sheared_strip(4);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();
    let initial_min = tri.min_angle_degrees();

    let params = RefineParams::with_angle_threshold(25.0).max_insertions(200);
    let outcome = tri.delaunay_refine(&params).unwrap();

    assert!(outcome.insertions() > 0);
    assert!(tri.is_delaunay());
    assert!(tri.mesh().n_vertices() > mesh.n_vertices());
    assert!(outcome.final_min_angle_degrees >= initial_min);
    assert_eq!(tri.mesh().euler_characteristic(), 1);
    tri.mesh().validate().unwrap();
    for f in tri.mesh().faces() {
        assert!(tri.geometry().satisfies_triangle_inequality(tri.mesh(), f));
        assert!(tri.normal_coordinates().face_is_valid(tri.mesh(), f));
    }
}

#[test]
fn signpost_refinement_improves_the_strip() {
    let (mesh, lengths) = sheared_strip(4);
    let mut tri = SignpostTriangulation::new(&mesh, &lengths).unwrap();
    let initial_min = tri.min_angle_degrees();

    let params = RefineParams::with_angle_threshold(25.0).max_insertions(200);
    let outcome = tri.delaunay_refine(&params).unwrap();

    assert!(outcome.insertions() > 0);
    assert!(tri.is_delaunay());
    assert!(tri.mesh().n_vertices() > mesh.n_vertices());
    assert!(outcome.final_min_angle_degrees >= initial_min);
    assert_eq!(tri.mesh().euler_characteristic(), 1);
    tri.mesh().validate().unwrap();
    for f in tri.mesh().faces() {
        assert!(tri.geometry().satisfies_triangle_inequality(tri.mesh(), f));
    }
    // Every inserted vertex received a location on the input surface.
    for v in tri.mesh().vertices() {
        match tri.location(v) {
            SurfacePoint::Vertex(u) => assert!(mesh.vertex_is_live(u)),
            SurfacePoint::Edge(e, t) => {
                assert!(mesh.edge_is_live(e));
                assert!((0.0..=1.0).contains(&t));
            }
            SurfacePoint::Face(f, bary) => {
                assert!(mesh.face_is_live(f));
                assert!(bary.iter().all(|&b| (-1e-3..=1.0 + 1e-3).contains(&b)));
            }
        }
    }
}

#[test]
fn refinement_respects_insertion_cap() {
    let (mesh, lengths) = sheared_strip(6);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let params = RefineParams::with_angle_threshold(25.0).max_insertions(2);
    let outcome = tri.delaunay_refine(&params).unwrap();
    assert!(outcome.insertions() <= 2);
}

#[test]
fn callbacks_fire_on_flip_and_split() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let (mesh, lengths) = sheared_strip(3);
    let mut tri = IntegerTriangulation::new(&mesh, &lengths).unwrap();

    let flips = Rc::new(RefCell::new(Vec::new()));
    let splits = Rc::new(RefCell::new(Vec::new()));
    let flips_in = Rc::clone(&flips);
    let splits_in = Rc::clone(&splits);
    let _flip_token = tri
        .callbacks()
        .on_edge_flip(move |e| flips_in.borrow_mut().push(e));
    let _split_token = tri
        .callbacks()
        .on_edge_split(move |e, _, _| splits_in.borrow_mut().push(e));

    let diagonal = tri.mesh().edges().find(|&e| !tri.is_fixed(e)).unwrap();
    assert!(tri.flip_edge_if_possible(diagonal));
    assert_eq!(flips.borrow().as_slice(), &[diagonal]);

    let interior = tri.mesh().edges().find(|&e| !tri.is_fixed(e)).unwrap();
    tri.split_edge(interior, 0.5).unwrap().unwrap();
    assert_eq!(splits.borrow().as_slice(), &[interior]);
}
