//! Intrinsic triangulations over a fixed input surface.
//!
//! An intrinsic triangulation keeps its own connectivity and per-edge
//! lengths while staying in exact correspondence with an immutable input
//! mesh. This crate provides:
//!
//! - [`IntegerTriangulation`] - the integer-coordinate representation:
//!   every intrinsic edge counts the input edges crossing it, so
//!   correspondence queries are exact
//! - [`SignpostTriangulation`] - the floating-point alternative encoding
//!   per-half-edge direction angles
//! - [`IntrinsicTriangulation`] - the capability trait both satisfy
//! - [`flip_to_delaunay`] / [`delaunay_refine`] - Delaunay flipping and
//!   Chew-style intrinsic refinement over either representation
//! - [`CommonSubdivision`] - the planar overlay of both triangulations
//!
//! Topology changes (edge flips, edge splits, vertex insertion and
//! removal) update connectivity, lengths, normal coordinates, roundabouts,
//! and vertex locations in lockstep, and invoke registered callbacks after
//! committing. Normal-coordinate updates are exact integer arithmetic;
//! floating point only enters through lengths and layouts.
//!
//! # Example
//!
//! ```
//! use mesh_halfedge::{EdgeData, HalfedgeMesh};
//! use mesh_intrinsic::{IntegerTriangulation, RefineParams};
//!
//! // A unit tetrahedron: already intrinsically Delaunay.
//! let mesh =
//!     HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
//! let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
//!
//! let mut tri = IntegerTriangulation::new(&mesh, &lengths)?;
//! let outcome = tri.flip_to_delaunay();
//!
//! assert_eq!(outcome.flips, 0);
//! assert!(tri.is_delaunay());
//! # Ok::<(), mesh_intrinsic::IntrinsicError>(())
//! ```
//!
//! `RefineParams` drives Chew-style refinement the same way:
//!
//! ```
//! # use mesh_halfedge::{EdgeData, HalfedgeMesh};
//! # use mesh_intrinsic::{IntegerTriangulation, RefineParams};
//! # let mesh =
//! #     HalfedgeMesh::from_faces(4, &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
//! # let lengths = EdgeData::new(mesh.n_edges_capacity(), 1.0);
//! let mut tri = IntegerTriangulation::new(&mesh, &lengths)?;
//! let params = RefineParams::with_angle_threshold(25.0).max_insertions(100);
//! let outcome = tri.delaunay_refine(&params)?;
//! assert!(tri.min_angle_degrees() >= 25.0);
//! # let _ = outcome;
//! # Ok::<(), mesh_intrinsic::IntrinsicError>(())
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod callbacks;
mod core;
mod correspond;
mod delaunay;
mod error;
mod geometry;
mod normal_coords;
mod params;
mod result;
mod signpost;
mod subdivision;
mod trace;
mod traits;
mod triangulation;

pub use callbacks::{CallbackRegistry, CallbackToken};
pub use self::core::TRIANGLE_TEST_EPS;
pub use delaunay::{delaunay_refine, flip_edges_to_delaunay, flip_to_delaunay};
pub use error::{IntrinsicError, IntrinsicResult};
pub use geometry::{
    barycentric_of_point, corner_angle_from_lengths, face_layout_from_lengths,
    halfedge_cotan_weight, place_third_vertex, point_from_barycentric, EdgeLengthGeometry,
};
pub use normal_coords::{
    corner_arcs, emanating_arcs, flip_normal_coordinates, insert_normal_coordinates,
    split_normal_coordinates, FlipQuad, FlipUpdate, InsertUpdate, NormalCoordinates,
    SplitEdgePrism, SplitUpdate,
};
pub use params::RefineParams;
pub use result::{FlipOutcome, RefineOutcome};
pub use signpost::SignpostTriangulation;
pub use subdivision::{
    CommonSubdivision, SubdivisionFace, SubdivisionPoint, SubdivisionPointSource,
};
pub use trace::{CompoundCurve, CurveCrossing, CurvePiece};
pub use traits::IntrinsicTriangulation;
pub use triangulation::{IntegerTriangulation, RefinementInsertion};

// Re-export the surface-point type alongside the triangulations that speak
// it.
pub use mesh_halfedge::SurfacePoint;
