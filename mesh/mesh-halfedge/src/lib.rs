//! Manifold half-edge triangle mesh connectivity.
//!
//! This crate provides the combinatorial foundation for surface processing:
//!
//! - [`HalfedgeMesh`] - An oriented 2-manifold triangle mesh, possibly with
//!   boundary, stored as half-edges
//! - [`VertexId`], [`EdgeId`], [`HalfedgeId`], [`FaceId`] - Typed element
//!   handles
//! - [`VertexData`], [`EdgeData`], [`HalfedgeData`], [`FaceData`] - Growable
//!   per-element attribute arrays
//! - [`SurfacePoint`] - A point on a mesh, located on a vertex, an edge, or
//!   inside a face
//!
//! The container supports the atomic topology mutations needed by
//! incremental triangulation algorithms: edge flips, edge splits, vertex
//! insertion into a face, and removal of a previously inserted vertex.
//! Each mutation either commits completely or leaves the mesh unchanged.
//!
//! Connectivity is index-based: half-edges are stored in twin pairs, so edge
//! `e` owns half-edges `2e` and `2e + 1` and `twin(h) = h ^ 1`. Deleted
//! elements are tombstoned and skipped by the iterators; indices are only
//! reused by explicit compaction, which this crate does not perform.
//!
//! # Example
//!
//! ```
//! use mesh_halfedge::HalfedgeMesh;
//!
//! // A triangulated square.
//! let mesh = HalfedgeMesh::from_faces(4, &[[0, 1, 2], [0, 2, 3]])?;
//!
//! assert_eq!(mesh.n_vertices(), 4);
//! assert_eq!(mesh.n_edges(), 5);
//! assert_eq!(mesh.n_faces(), 2);
//! assert_eq!(mesh.euler_characteristic(), 1);
//! # Ok::<(), mesh_halfedge::MeshError>(())
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod data;
mod error;
mod handles;
mod mesh;
mod surface_point;

pub use data::{EdgeData, FaceData, HalfedgeData, VertexData};
pub use error::{MeshError, MeshResult};
pub use handles::{EdgeId, FaceId, HalfedgeId, VertexId};
pub use mesh::{HalfedgeMesh, InsertVertexResult, SplitEdgeResult};
pub use surface_point::SurfacePoint;

// Re-export nalgebra types for convenience
pub use nalgebra::Vector2;
