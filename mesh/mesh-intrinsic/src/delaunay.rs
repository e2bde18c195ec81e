//! Delaunay flipping and Chew-style intrinsic refinement.
//!
//! Both drivers are written against the [`IntrinsicTriangulation`] trait
//! and run identically over the integer and signpost representations.

use std::collections::VecDeque;

use hashbrown::HashSet;
use mesh_halfedge::{EdgeId, FaceId};
use tracing::{debug, warn};

use crate::error::IntrinsicResult;
use crate::params::RefineParams;
use crate::result::{FlipOutcome, RefineOutcome};
use crate::traits::IntrinsicTriangulation;
use crate::triangulation::RefinementInsertion;

/// Flip edges to the intrinsic Delaunay criterion, starting from the given
/// seed edges and propagating to the neighborhoods of every flip.
///
/// Termination is safeguarded by `max_flips`; in practice each edge is
/// queued a bounded number of times, but the loop is not proven to
/// terminate absolutely.
pub fn flip_edges_to_delaunay<T: IntrinsicTriangulation>(
    tri: &mut T,
    seeds: impl IntoIterator<Item = EdgeId>,
    max_flips: usize,
    mut on_flip: impl FnMut(EdgeId),
) -> FlipOutcome {
    let mut outcome = FlipOutcome::default();
    let mut queue: VecDeque<EdgeId> = VecDeque::new();
    let mut queued: HashSet<EdgeId> = HashSet::new();
    for e in seeds {
        if queued.insert(e) {
            queue.push_back(e);
        }
    }

    while let Some(e) = queue.pop_front() {
        queued.remove(&e);
        if !tri.mesh().edge_is_live(e) {
            continue;
        }
        outcome.examined += 1;
        if !tri.flip_edge_if_not_delaunay(e) {
            continue;
        }
        outcome.flips += 1;
        on_flip(e);
        if outcome.flips >= max_flips {
            warn!("Delaunay flipping stopped at the {} flip cap", max_flips);
            outcome.hit_flip_cap = true;
            break;
        }
        // The four boundary edges of the flip quadrilateral may have lost
        // the criterion.
        let h = tri.mesh().halfedge(e);
        for he in [h, h.twin()] {
            let mut around = tri.mesh().next(he);
            for _ in 0..2 {
                let neighbor = around.edge();
                if queued.insert(neighbor) {
                    queue.push_back(neighbor);
                }
                around = tri.mesh().next(around);
            }
        }
    }
    outcome
}

/// Flip every non-Delaunay edge of the triangulation until none remain.
pub fn flip_to_delaunay<T: IntrinsicTriangulation>(tri: &mut T, max_flips: usize) -> FlipOutcome {
    let seeds: Vec<EdgeId> = tri.mesh().edges().collect();
    debug!(
        "Flipping to Delaunay: {} edges, {} faces",
        seeds.len(),
        tri.mesh().n_faces()
    );
    let outcome = flip_edges_to_delaunay(tri, seeds, max_flips, |_| {});
    debug!(
        "Delaunay flipping done: {} flips over {} examinations",
        outcome.flips, outcome.examined
    );
    outcome
}

/// Whether the face violates the refinement criteria and is eligible for
/// a circumcenter insertion.
fn needs_refinement<T: IntrinsicTriangulation>(
    tri: &T,
    f: FaceId,
    params: &RefineParams,
) -> bool {
    let mesh = tri.mesh();
    let geometry = tri.geometry();
    if geometry.circumradius(mesh, f) > params.circumradius_threshold {
        return true;
    }
    let threshold = params.angle_threshold_radians();
    if threshold <= 0.0 {
        return false;
    }
    let hes = mesh.face_halfedges(f);
    let mut worst = hes[0];
    for &h in &hes[1..] {
        if geometry.corner_angle(h) < geometry.corner_angle(worst) {
            worst = h;
        }
    }
    if geometry.corner_angle(worst) >= threshold {
        return false;
    }
    // Small-input-angle exemptions: a corner pinched between two fixed
    // edges, or at a cone too tight for any triangulation to open up, will
    // never satisfy the bound and must not drive insertions forever.
    let pinched = tri.is_fixed(worst.edge()) && tri.is_fixed(mesh.prev(worst).edge());
    let tight_cone = geometry.angle_sum(mesh.tail(worst)) < 2.0 * threshold;
    !(pinched || tight_cone)
}

/// Chew's second algorithm, intrinsic variant: repeatedly insert the
/// circumcenter of a violating face (or split the fixed edge blocking it),
/// restoring the Delaunay property locally after every insertion.
///
/// Angle thresholds above 30 degrees may not terminate; `max_insertions`
/// bounds the run regardless.
///
/// # Errors
///
/// Propagates invariant corruption from the mutations.
pub fn delaunay_refine<T: IntrinsicTriangulation>(
    tri: &mut T,
    params: &RefineParams,
) -> IntrinsicResult<RefineOutcome> {
    let mut outcome = RefineOutcome::default();
    let flip = flip_to_delaunay(tri, params.max_flips);
    outcome.flips += flip.flips;

    debug!(
        "Refining: {} faces, angle threshold {:.1} deg, circumradius threshold {:.3}",
        tri.mesh().n_faces(),
        params.angle_threshold_degrees,
        params.circumradius_threshold
    );

    let mut queue: VecDeque<FaceId> = tri.mesh().faces().collect();
    while let Some(f) = queue.pop_front() {
        if !tri.mesh().face_is_live(f) || !needs_refinement(tri, f, params) {
            continue;
        }
        if outcome.insertions() >= params.max_insertions {
            outcome.hit_insertion_cap = true;
            break;
        }
        let Some(insertion) = tri.insert_circumcenter_or_split_segment(f)? else {
            // Geometrically stuck; leave the face as it is.
            continue;
        };
        let new_vertex = insertion.vertex();
        match insertion {
            RefinementInsertion::Circumcenter(_) => outcome.circumcenters_inserted += 1,
            RefinementInsertion::SegmentSplit(..) => outcome.segment_splits += 1,
        }

        // Restore Delaunay around the insertion, re-queueing every face a
        // flip touches.
        let star: Vec<EdgeId> = tri
            .mesh()
            .outgoing_halfedges(new_vertex)
            .flat_map(|h| {
                let opposite = tri.mesh().next(h).edge();
                [h.edge(), opposite]
            })
            .collect();
        let mut touched: Vec<EdgeId> = Vec::new();
        let local = flip_edges_to_delaunay(tri, star, params.max_flips, |e| touched.push(e));
        outcome.flips += local.flips;

        for h in tri.mesh().outgoing_halfedges(new_vertex) {
            if let Some(face) = tri.mesh().face(h) {
                queue.push_back(face);
            }
        }
        for e in touched {
            if tri.mesh().edge_is_live(e) {
                let h = tri.mesh().halfedge(e);
                for he in [h, h.twin()] {
                    if let Some(face) = tri.mesh().face(he) {
                        queue.push_back(face);
                    }
                }
            }
        }
    }

    outcome.final_min_angle_degrees = tri.min_angle_degrees();
    debug!(
        "Refinement done: {} circumcenters, {} segment splits, {} flips, min angle {:.2} deg",
        outcome.circumcenters_inserted,
        outcome.segment_splits,
        outcome.flips,
        outcome.final_min_angle_degrees
    );
    Ok(outcome)
}

impl crate::IntegerTriangulation<'_> {
    /// Flip every non-Delaunay edge until none remain.
    pub fn flip_to_delaunay(&mut self) -> FlipOutcome {
        flip_to_delaunay(self, usize::MAX)
    }

    /// Run intrinsic Delaunay refinement with the given parameters.
    ///
    /// # Errors
    ///
    /// Propagates invariant corruption from the mutations.
    pub fn delaunay_refine(&mut self, params: &RefineParams) -> IntrinsicResult<RefineOutcome> {
        delaunay_refine(self, params)
    }
}

impl crate::SignpostTriangulation<'_> {
    /// Flip every non-Delaunay edge until none remain.
    pub fn flip_to_delaunay(&mut self) -> FlipOutcome {
        flip_to_delaunay(self, usize::MAX)
    }

    /// Run intrinsic Delaunay refinement with the given parameters.
    ///
    /// # Errors
    ///
    /// Propagates tracing failures from the mutations.
    pub fn delaunay_refine(&mut self, params: &RefineParams) -> IntrinsicResult<RefineOutcome> {
        delaunay_refine(self, params)
    }
}
