//! Typed handles for mesh elements.
//!
//! Handles are thin `u32` newtypes. They are only meaningful for the mesh
//! that issued them, and become invalid when the element is deleted.

use std::fmt;

pub(crate) const INVALID: u32 = u32::MAX;

/// Handle to a vertex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) u32);

/// Handle to an undirected edge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

/// Handle to a directed half-edge.
///
/// Edge `e` owns the half-edge pair `2e` (the canonical half-edge) and
/// `2e + 1`; twins differ in the lowest bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalfedgeId(pub(crate) u32);

/// Handle to a triangular face.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub(crate) u32);

impl VertexId {
    /// Handle for the element at dense position `i`.
    #[must_use]
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    /// Position of this vertex in dense element order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn new(i: usize) -> Self {
        Self(i as u32)
    }
}

impl EdgeId {
    /// Handle for the element at dense position `i`.
    #[must_use]
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    /// Position of this edge in dense element order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn new(i: usize) -> Self {
        Self(i as u32)
    }
}

impl HalfedgeId {
    /// Handle for the element at dense position `i`.
    #[must_use]
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    /// Position of this half-edge in dense element order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The undirected edge this half-edge belongs to.
    #[must_use]
    pub fn edge(self) -> EdgeId {
        EdgeId(self.0 >> 1)
    }

    /// The oppositely directed half-edge of the same edge.
    #[must_use]
    pub fn twin(self) -> HalfedgeId {
        HalfedgeId(self.0 ^ 1)
    }

    pub(crate) fn new(i: usize) -> Self {
        Self(i as u32)
    }
}

impl FaceId {
    /// Handle for the element at dense position `i`.
    #[must_use]
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    /// Position of this face in dense element order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn new(i: usize) -> Self {
        Self(i as u32)
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Debug for HalfedgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl fmt::Debug for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halfedge_edge_twin() {
        let h = HalfedgeId(6);
        assert_eq!(h.edge(), EdgeId(3));
        assert_eq!(h.twin(), HalfedgeId(7));
        assert_eq!(h.twin().twin(), h);
        assert_eq!(h.twin().edge(), EdgeId(3));
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", VertexId(4)), "v4");
        assert_eq!(format!("{:?}", EdgeId(0)), "e0");
        assert_eq!(format!("{:?}", HalfedgeId(9)), "h9");
        assert_eq!(format!("{:?}", FaceId(2)), "f2");
    }
}
