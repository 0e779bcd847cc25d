//! Ring reconstruction: stitch simplified edges back into closed rings.
//!
//! A ring is rebuilt by walking its edge sequence and appending each
//! edge's coordinates, reversed when the ring traverses the edge against
//! its canonical direction. Consecutive edges share an endpoint, so the
//! first coordinate of every edge after the first is dropped. Because
//! simplification never moves endpoints, adjacent edges still meet
//! exactly; a gap means the edge sequence is corrupt.

use geo::{Coord, LineString, Polygon};

use crate::edge::{EdgeSet, RingEdge};
use crate::types::TopologyError;

/// Rebuild one ring from its edge sequence.
///
/// # Errors
///
/// - [`TopologyError::EmptyEdgeSequence`] if `sequence` is empty.
/// - [`TopologyError::EmptyEdge`] if a referenced edge has no coordinates.
/// - [`TopologyError::Reconstruction`] if an edge does not start where
///   the previous one ended, or if the finished ring does not close.
pub fn reconstruct_ring(
    edges: &EdgeSet,
    sequence: &[RingEdge],
) -> Result<LineString<f64>, TopologyError> {
    let Some(last) = sequence.last() else {
        return Err(TopologyError::EmptyEdgeSequence);
    };

    let mut coords: Vec<Coord<f64>> = Vec::new();
    for (position, ring_edge) in sequence.iter().enumerate() {
        let arc = edges.get(ring_edge.edge).coords();
        let oriented: Vec<Coord<f64>> = if ring_edge.forward {
            arc.to_vec()
        } else {
            arc.iter().rev().copied().collect()
        };
        let Some(&leading) = oriented.first() else {
            return Err(TopologyError::EmptyEdge(ring_edge.edge));
        };

        match coords.last() {
            None => coords.extend(oriented),
            Some(&tail) if tail == leading => coords.extend(oriented.into_iter().skip(1)),
            Some(&tail) => {
                return Err(TopologyError::Reconstruction {
                    position,
                    edge: ring_edge.edge,
                    forward: ring_edge.forward,
                    expected: tail,
                    found: leading,
                });
            }
        }
    }

    if let (Some(&first), Some(&end)) = (coords.first(), coords.last())
        && first != end
    {
        return Err(TopologyError::Reconstruction {
            position: sequence.len(),
            edge: last.edge,
            forward: last.forward,
            expected: first,
            found: end,
        });
    }

    Ok(LineString::new(coords))
}

/// Rebuild a polygon from the edge sequences of its exterior and holes.
///
/// # Errors
///
/// Propagates any error from [`reconstruct_ring`].
pub fn reconstruct_polygon(
    edges: &EdgeSet,
    exterior: &[RingEdge],
    interiors: &[Vec<RingEdge>],
) -> Result<Polygon<f64>, TopologyError> {
    let exterior = reconstruct_ring(edges, exterior)?;
    let interiors = interiors
        .iter()
        .map(|sequence| reconstruct_ring(edges, sequence))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
