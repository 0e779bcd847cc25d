//! Node classification: find the points where ring membership changes.
//!
//! Walking a ring, each consecutive pair of canonical points is compared.
//! If the current point carries a ring the previous one does not, a new
//! ring joins the boundary here, so the current point is a node. If the
//! previous point carries a ring the current one does not, a ring leaves
//! the boundary at the previous point, so that one is a node. A single
//! differing ring is enough, and any ring passing through a point may be
//! the one that marks it.
//!
//! Marking is monotonic and the comparison symmetric, so the result does
//! not depend on the order rings are visited in, and a second pass marks
//! nothing new.

use geo::LineString;

use crate::registry::CoordinateRegistry;
use crate::types::{PointId, TopologyError};

/// Classify the points of one ring, returning how many were newly marked.
///
/// # Errors
///
/// Returns [`TopologyError::MissingCanonicalPoint`] if any coordinate of
/// the ring was not registered first.
pub fn classify_ring(
    registry: &mut CoordinateRegistry,
    ring: &LineString<f64>,
) -> Result<usize, TopologyError> {
    let mut marked = 0;
    let mut prev: Option<PointId> = None;
    for &coord in &ring.0 {
        let curr = registry.lookup(coord)?;
        if let Some(prev) = prev {
            marked += classify_pair(registry, prev, curr);
        }
        prev = Some(curr);
    }
    Ok(marked)
}

/// Apply the membership rule to one consecutive pair.
fn classify_pair(registry: &mut CoordinateRegistry, prev: PointId, curr: PointId) -> usize {
    let (ring_joins, ring_leaves) = {
        let p = registry.point(prev);
        let c = registry.point(curr);
        (c.has_ring_absent_from(p), p.has_ring_absent_from(c))
    };

    let mut marked = 0;
    if ring_joins && registry.point_mut(curr).mark_node() {
        marked += 1;
    }
    if ring_leaves && registry.point_mut(prev).mark_node() {
        marked += 1;
    }
    marked
}
