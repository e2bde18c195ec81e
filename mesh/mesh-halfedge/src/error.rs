//! Error types for mesh construction and mutation.

use thiserror::Error;

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur while building or mutating a half-edge mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A face references a vertex index outside the declared vertex range.
    #[error("face {face} references vertex {vertex}, but only {n_vertices} vertices exist")]
    VertexOutOfRange {
        /// Index of the offending face in the input list.
        face: usize,
        /// The out-of-range vertex index.
        vertex: u32,
        /// Number of vertices declared.
        n_vertices: usize,
    },

    /// A face repeats a vertex.
    #[error("face {face} is degenerate: repeated vertex {vertex}")]
    DegenerateFace {
        /// Index of the offending face in the input list.
        face: usize,
        /// The repeated vertex index.
        vertex: u32,
    },

    /// More than two faces share an edge.
    #[error("edge ({a}, {b}) is non-manifold: more than two incident faces")]
    NonManifoldEdge {
        /// First endpoint.
        a: u32,
        /// Second endpoint.
        b: u32,
    },

    /// Two faces traverse an edge in the same direction.
    #[error("inconsistent orientation across edge ({a}, {b})")]
    InconsistentOrientation {
        /// First endpoint.
        a: u32,
        /// Second endpoint.
        b: u32,
    },

    /// A vertex's incident faces do not form a single fan or disk.
    #[error("vertex {vertex} is non-manifold: incident faces do not form a single umbrella")]
    NonManifoldVertex {
        /// The offending vertex index.
        vertex: u32,
    },

    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshError::NonManifoldEdge { a: 3, b: 7 };
        assert_eq!(
            format!("{err}"),
            "edge (3, 7) is non-manifold: more than two incident faces"
        );

        let err = MeshError::EmptyMesh;
        assert_eq!(format!("{err}"), "mesh has no faces");
    }
}
