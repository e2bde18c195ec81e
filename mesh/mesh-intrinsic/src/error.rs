//! Error types for intrinsic triangulation operations.

use mesh_halfedge::{EdgeId, FaceId, HalfedgeId, VertexId};
use thiserror::Error;

/// Result type for intrinsic triangulation operations.
pub type IntrinsicResult<T> = Result<T, IntrinsicError>;

/// Errors that can occur while building or mutating an intrinsic
/// triangulation.
///
/// Data-dependent geometric infeasibility (a non-convex flip quadrilateral,
/// a split violating the triangle inequality, an irreducible vertex star) is
/// not an error: those operations return `false` or `None` and leave the
/// triangulation unchanged. Errors are reserved for caller bugs and for
/// invariant corruption, after which the structure must be discarded.
#[derive(Debug, Error)]
pub enum IntrinsicError {
    /// An edge length is zero, negative, or breaks the triangle inequality.
    #[error("edge {edge:?} has invalid length {length}")]
    InvalidEdgeLength {
        /// The offending edge.
        edge: EdgeId,
        /// The offending length.
        length: f64,
    },

    /// A face of the input breaks the strict triangle inequality.
    #[error("input face {face:?} violates the triangle inequality")]
    TriangleInequality {
        /// The offending face.
        face: FaceId,
    },

    /// Attempted to remove a vertex of the original input mesh.
    #[error("vertex {vertex:?} belongs to the input mesh and cannot be removed")]
    RemoveOriginalVertex {
        /// The offending vertex.
        vertex: VertexId,
    },

    /// Attempted to insert at a vertex surface point.
    #[error("cannot insert a vertex at an existing vertex {vertex:?}")]
    InsertAtVertex {
        /// The offending vertex.
        vertex: VertexId,
    },

    /// Queried the shared input edge of a half-edge that does not run along
    /// one.
    #[error("halfedge {halfedge:?} does not lie along an input edge")]
    NotASharedEdge {
        /// The offending half-edge.
        halfedge: HalfedgeId,
    },

    /// The integer crossing bookkeeping contradicted itself mid-trace. The
    /// triangulation is poisoned and must be rebuilt.
    #[error("normal coordinates are corrupt near {halfedge:?}: {detail}")]
    CorruptNormalCoordinates {
        /// Half-edge at which the inconsistency surfaced.
        halfedge: HalfedgeId,
        /// What went wrong.
        detail: &'static str,
    },

    /// The operation is not available on this representation.
    #[error("operation not supported by this representation: {operation}")]
    Unsupported {
        /// Name of the unavailable operation.
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IntrinsicError::RemoveOriginalVertex {
            vertex: VertexId::from_index(2),
        };
        assert!(format!("{err}").contains("v2"));

        let err = IntrinsicError::CorruptNormalCoordinates {
            halfedge: HalfedgeId::from_index(5),
            detail: "crossing count went negative",
        };
        assert!(format!("{err}").contains("negative"));
    }
}
