//! Mutation callbacks with scoped registration.
//!
//! Callers register closures to keep derived per-element data consistent
//! across mutations. Registration hands back a [`CallbackToken`]; dropping
//! the token deregisters the callback, so a consumer cannot outlive its
//! interest. Callbacks fire in registration order after a mutation has
//! fully committed and must not register or deregister callbacks
//! themselves.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use mesh_halfedge::{EdgeId, FaceId, HalfedgeId, VertexId};

type EdgeFlipFn = Box<dyn FnMut(EdgeId)>;
type FaceInsertionFn = Box<dyn FnMut(FaceId, VertexId)>;
type EdgeSplitFn = Box<dyn FnMut(EdgeId, HalfedgeId, HalfedgeId)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    EdgeFlip,
    FaceInsertion,
    EdgeSplit,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    edge_flip: Vec<(u64, EdgeFlipFn)>,
    face_insertion: Vec<(u64, FaceInsertionFn)>,
    edge_split: Vec<(u64, EdgeSplitFn)>,
}

/// Registry of mutation callbacks. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CallbackRegistry")
            .field("edge_flip", &inner.edge_flip.len())
            .field("face_insertion", &inner.face_insertion.len())
            .field("edge_split", &inner.edge_split.len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after every edge flip, with the flipped edge.
    #[must_use = "dropping the token deregisters the callback"]
    pub fn on_edge_flip(&self, callback: impl FnMut(EdgeId) + 'static) -> CallbackToken {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.edge_flip.push((id, Box::new(callback)));
        self.token(id, Kind::EdgeFlip)
    }

    /// Run `callback` after every face insertion, with the split face and
    /// the new vertex.
    #[must_use = "dropping the token deregisters the callback"]
    pub fn on_face_insertion(
        &self,
        callback: impl FnMut(FaceId, VertexId) + 'static,
    ) -> CallbackToken {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.face_insertion.push((id, Box::new(callback)));
        self.token(id, Kind::FaceInsertion)
    }

    /// Run `callback` after every edge split, with the split edge and the
    /// two half-edges leaving the new vertex along the original edge.
    #[must_use = "dropping the token deregisters the callback"]
    pub fn on_edge_split(
        &self,
        callback: impl FnMut(EdgeId, HalfedgeId, HalfedgeId) + 'static,
    ) -> CallbackToken {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.edge_split.push((id, Box::new(callback)));
        self.token(id, Kind::EdgeSplit)
    }

    fn token(&self, id: u64, kind: Kind) -> CallbackToken {
        CallbackToken {
            registry: Rc::downgrade(&self.inner),
            id,
            kind,
        }
    }

    pub(crate) fn fire_edge_flip(&self, e: EdgeId) {
        for (_, callback) in &mut self.inner.borrow_mut().edge_flip {
            callback(e);
        }
    }

    pub(crate) fn fire_face_insertion(&self, f: FaceId, v: VertexId) {
        for (_, callback) in &mut self.inner.borrow_mut().face_insertion {
            callback(f, v);
        }
    }

    pub(crate) fn fire_edge_split(&self, e: EdgeId, he1: HalfedgeId, he2: HalfedgeId) {
        for (_, callback) in &mut self.inner.borrow_mut().edge_split {
            callback(e, he1, he2);
        }
    }
}

/// Scoped registration handle; dropping it removes the callback.
#[derive(Debug)]
pub struct CallbackToken {
    registry: Weak<RefCell<Inner>>,
    id: u64,
    kind: Kind,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner").finish_non_exhaustive()
    }
}

impl Drop for CallbackToken {
    fn drop(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        match self.kind {
            Kind::EdgeFlip => inner.edge_flip.retain(|(id, _)| *id != self.id),
            Kind::FaceInsertion => inner.face_insertion.retain(|(id, _)| *id != self.id),
            Kind::EdgeSplit => inner.edge_split.retain(|(id, _)| *id != self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let registry = CallbackRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = Rc::clone(&log);
        let _t1 = registry.on_edge_flip(move |e| log1.borrow_mut().push((1, e)));
        let log2 = Rc::clone(&log);
        let _t2 = registry.on_edge_flip(move |e| log2.borrow_mut().push((2, e)));

        registry.fire_edge_flip(EdgeId::from_index(7));
        assert_eq!(
            *log.borrow(),
            vec![(1, EdgeId::from_index(7)), (2, EdgeId::from_index(7))]
        );
    }

    #[test]
    fn test_token_drop_deregisters() {
        let registry = CallbackRegistry::new();
        let count = Rc::new(Cell::new(0));

        let c = Rc::clone(&count);
        let token = registry.on_edge_split(move |_, _, _| c.set(c.get() + 1));
        registry.fire_edge_split(
            EdgeId::from_index(0),
            HalfedgeId::from_index(0),
            HalfedgeId::from_index(1),
        );
        assert_eq!(count.get(), 1);

        drop(token);
        registry.fire_edge_split(
            EdgeId::from_index(0),
            HalfedgeId::from_index(0),
            HalfedgeId::from_index(1),
        );
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_token_outliving_registry_is_harmless() {
        let registry = CallbackRegistry::new();
        let token = registry.on_face_insertion(|_, _| {});
        drop(registry);
        drop(token);
    }
}
