//! Edge extraction: split rings into shared arcs between nodes.
//!
//! Each ring is cut at its nodes. The arc between two consecutive nodes
//! is an [`Edge`]; rings that share a border produce the same arc, often
//! in opposite directions, and the [`EdgeSet`] collapses them onto one
//! canonical edge. Every ring keeps an ordered list of [`RingEdge`]s
//! recording which edges it traverses and in which direction, which is
//! all the reconstructor needs once the edges have been simplified.
//!
//! # Edge identity
//!
//! Two arcs are the same edge when their endpoints match in either order,
//! they have the same number of coordinates, and the coordinate next to
//! the first endpoint matches correspondingly. The interior coordinate
//! tells apart two different arcs joining the same pair of nodes, such as
//! the two sides of a lake. Arcs that agree on that coordinate but
//! diverge further along are still treated as one edge.

use std::collections::HashMap;

use geo::{Coord, LineString};

use crate::registry::CoordinateRegistry;
use crate::types::{EdgeId, PointId, TopologyError};

/// An arc of coordinates between two nodes.
///
/// `endpoint_a` and `endpoint_b` coincide for a ring that closes on a
/// single node.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    a: PointId,
    b: PointId,
    coords: Vec<Coord<f64>>,
    ring_count: usize,
}

impl Edge {
    /// Create an edge from `a` to `b` following `coords`.
    ///
    /// `coords` is expected to start at `a`'s location and end at `b`'s.
    #[must_use]
    pub const fn new(a: PointId, b: PointId, coords: Vec<Coord<f64>>) -> Self {
        Self {
            a,
            b,
            coords,
            ring_count: 0,
        }
    }

    /// The node the canonical direction starts from.
    #[must_use]
    pub const fn endpoint_a(&self) -> PointId {
        self.a
    }

    /// The node the canonical direction ends at.
    #[must_use]
    pub const fn endpoint_b(&self) -> PointId {
        self.b
    }

    /// The edge's coordinates in canonical direction.
    #[must_use]
    pub fn coords(&self) -> &[Coord<f64>] {
        &self.coords
    }

    /// The edge as a line string in canonical direction.
    #[must_use]
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(self.coords.clone())
    }

    /// Whether the edge starts and ends at the same node.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.a == self.b
    }

    /// Number of ring traversals recorded against this edge.
    #[must_use]
    pub const fn ring_count(&self) -> usize {
        self.ring_count
    }

    /// Whether more than one ring traverses this edge.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.ring_count > 1
    }

    /// Direction-invariant equality: see the [module docs](self#edge-identity).
    #[must_use]
    pub fn same_edge(&self, other: &Self) -> bool {
        let len = self.coords.len();
        if len != other.coords.len() {
            return false;
        }
        let own_second = self.coords.get(1);
        if self.a == other.a && self.b == other.b && own_second == other.coords.get(1) {
            return true;
        }
        let other_penultimate = len.checked_sub(2).and_then(|i| other.coords.get(i));
        self.a == other.b && self.b == other.a && own_second == other_penultimate
    }

    /// Whether `other` runs in this edge's canonical direction.
    ///
    /// For a closed edge both endpoints coincide, so direction is read
    /// from the first interior coordinate instead.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DegenerateEdgeComparison`] if `other` is
    /// not the same edge.
    pub fn is_forward(&self, other: &Self) -> Result<bool, TopologyError> {
        if !self.same_edge(other) {
            return Err(TopologyError::DegenerateEdgeComparison {
                left: format!("{}->{}", self.a, self.b),
                right: format!("{}->{}", other.a, other.b),
            });
        }
        if self.is_closed() {
            Ok(self.coords.get(1) == other.coords.get(1))
        } else {
            Ok(self.a == other.a)
        }
    }

    pub(crate) fn replace_coords(&mut self, coords: Vec<Coord<f64>>) {
        self.coords = coords;
    }
}

/// How one ring traverses one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEdge {
    /// The traversed edge.
    pub edge: EdgeId,
    /// `true` when the ring follows the edge's canonical direction.
    pub forward: bool,
}

/// The unique edges of a batch, with insert-or-fetch by edge identity.
///
/// Edges live in an arena addressed by [`EdgeId`]. The index is keyed by
/// the unordered endpoint pair; candidates under one key are compared
/// with [`Edge::same_edge`].
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: Vec<Edge>,
    index: HashMap<(PointId, PointId), Vec<EdgeId>>,
}

impl EdgeSet {
    /// Create an empty edge set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing edge equal to `candidate`, or insert it as a
    /// new canonical edge, along with the candidate's orientation.
    ///
    /// # Errors
    ///
    /// Propagates [`TopologyError::DegenerateEdgeComparison`], which
    /// cannot occur for a match found by this method.
    pub fn insert_or_fetch(&mut self, candidate: Edge) -> Result<RingEdge, TopologyError> {
        let key = if candidate.a <= candidate.b {
            (candidate.a, candidate.b)
        } else {
            (candidate.b, candidate.a)
        };
        let bucket = self.index.entry(key).or_default();

        for &id in bucket.iter() {
            let existing = &mut self.edges[id.0];
            if existing.same_edge(&candidate) {
                let forward = existing.is_forward(&candidate)?;
                existing.ring_count += 1;
                return Ok(RingEdge { edge: id, forward });
            }
        }

        let id = EdgeId(self.edges.len());
        let mut edge = candidate;
        edge.ring_count = 1;
        self.edges.push(edge);
        bucket.push(id);
        Ok(RingEdge {
            edge: id,
            forward: true,
        })
    }

    /// The edge behind `id`.
    #[must_use]
    pub fn get(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0]
    }

    /// Iterate `(id, edge)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i), e))
    }

    /// Number of unique edges.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no edges have been extracted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of edges traversed by more than one ring.
    #[must_use]
    pub fn shared_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_shared()).count()
    }

    /// Total coordinates held across all edges.
    #[must_use]
    pub fn coord_count(&self) -> usize {
        self.edges.iter().map(|e| e.coords.len()).sum()
    }
}

/// Result of extracting one ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The ring was cut at one or more existing nodes.
    Edges(Vec<RingEdge>),
    /// The ring had no node; its first point was promoted to a node and
    /// the whole ring became one closed edge.
    Island(Vec<RingEdge>),
    /// The ring had no node and island construction was not requested.
    ///
    /// This is a normal signal, not an error: the caller decides whether
    /// the ring is worth keeping.
    NoPolygonProduced,
}

impl ExtractOutcome {
    /// The ring's edge sequence, if one was produced.
    #[must_use]
    pub fn into_sequence(self) -> Option<Vec<RingEdge>> {
        match self {
            Self::Edges(sequence) | Self::Island(sequence) => Some(sequence),
            Self::NoPolygonProduced => None,
        }
    }
}

/// Cut the closed `ring` at its nodes, adding new edges to `edges`.
///
/// Coordinates before the first node belong to the arc that wraps around
/// the ring's seam; that arc is completed after the main walk by resuming
/// from the start of the ring up to the first node. A ring without any
/// node is turned into a single closed edge when `construct_island` is
/// set, and reported as [`ExtractOutcome::NoPolygonProduced`] otherwise.
///
/// # Errors
///
/// Returns [`TopologyError::MissingCanonicalPoint`] if the ring holds an
/// unregistered coordinate.
pub fn extract_ring(
    registry: &mut CoordinateRegistry,
    edges: &mut EdgeSet,
    ring: &LineString<f64>,
    construct_island: bool,
) -> Result<ExtractOutcome, TopologyError> {
    let mut sequence = Vec::new();
    let mut from: Option<PointId> = None;
    let mut arc: Vec<Coord<f64>> = Vec::new();
    let mut orphans = 0_usize;

    for &coord in &ring.0 {
        let id = registry.lookup(coord)?;
        let is_node = registry.point(id).is_node();
        match from {
            None if is_node => {
                from = Some(id);
                arc.push(coord);
            }
            None => orphans += 1,
            Some(start) => {
                arc.push(coord);
                if is_node {
                    let coords = std::mem::replace(&mut arc, vec![coord]);
                    sequence.push(edges.insert_or_fetch(Edge::new(start, id, coords))?);
                    from = Some(id);
                }
            }
        }
    }

    let Some(last_node) = from else {
        return extract_island(registry, edges, ring, construct_island);
    };

    if orphans > 0 {
        // The closing coordinate repeats the first one and is already in `arc`.
        for &coord in ring.0.iter().skip(1) {
            let id = registry.lookup(coord)?;
            arc.push(coord);
            if registry.point(id).is_node() {
                sequence.push(edges.insert_or_fetch(Edge::new(last_node, id, arc))?);
                break;
            }
        }
    }

    Ok(ExtractOutcome::Edges(sequence))
}

fn extract_island(
    registry: &mut CoordinateRegistry,
    edges: &mut EdgeSet,
    ring: &LineString<f64>,
    construct_island: bool,
) -> Result<ExtractOutcome, TopologyError> {
    if !construct_island {
        return Ok(ExtractOutcome::NoPolygonProduced);
    }
    let Some(&first) = ring.0.first() else {
        return Ok(ExtractOutcome::NoPolygonProduced);
    };
    let node = registry.lookup(first)?;
    registry.point_mut(node).mark_node();
    let ring_edge = edges.insert_or_fetch(Edge::new(node, node, ring.0.clone()))?;
    Ok(ExtractOutcome::Island(vec![ring_edge]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use geo::line_string;

    use super::*;
    use crate::node::classify_ring;
    use crate::types::RingId;

    fn build(rings: &[LineString<f64>]) -> CoordinateRegistry {
        let mut registry = CoordinateRegistry::default();
        for (i, ring) in rings.iter().enumerate() {
            for &coord in &ring.0 {
                registry.register(coord, RingId(i));
            }
        }
        for ring in rings {
            classify_ring(&mut registry, ring).unwrap();
        }
        registry
    }

    /// Two squares sharing the segment (1,0)-(1,1), both counter-clockwise,
    /// so they traverse the shared segment in opposite directions.
    fn squares() -> Vec<LineString<f64>> {
        vec![
            line_string![
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
            ],
            line_string![
                (x: 1.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 1.0),
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 0.0),
            ],
        ]
    }

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn shared_arc_is_one_edge_with_opposite_orientation() {
        let rings = squares();
        let mut registry = build(&rings);
        let mut edges = EdgeSet::new();

        let left = extract_ring(&mut registry, &mut edges, &rings[0], false)
            .unwrap()
            .into_sequence()
            .unwrap();
        let right = extract_ring(&mut registry, &mut edges, &rings[1], false)
            .unwrap()
            .into_sequence()
            .unwrap();

        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
        // Shared segment plus one outer arc per square.
        assert_eq!(edges.len(), 3);
        assert_eq!(edges.shared_count(), 1);

        let shared = left
            .iter()
            .find(|re| edges.get(re.edge).is_shared())
            .unwrap();
        let other = right.iter().find(|re| re.edge == shared.edge).unwrap();
        assert_ne!(shared.forward, other.forward);
        assert_eq!(edges.get(shared.edge).coords(), &[c(1.0, 0.0), c(1.0, 1.0)]);
    }

    #[test]
    fn orphan_coordinates_close_the_wraparound_arc() {
        // Start the first square away from any node.
        let rings = vec![
            line_string![
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
            ],
            squares().remove(1),
        ];
        let mut registry = build(&rings);
        let mut edges = EdgeSet::new();
        let sequence = extract_ring(&mut registry, &mut edges, &rings[0], false)
            .unwrap()
            .into_sequence()
            .unwrap();

        assert_eq!(sequence.len(), 2);
        let wrap = edges.get(sequence[1].edge);
        // (1,1) -> (0,1) -> (0,0) -> (1,0) without repeating the seam.
        assert_eq!(
            wrap.coords(),
            &[c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0), c(1.0, 0.0)]
        );
    }

    #[test]
    fn ring_without_nodes_is_rejected_unless_island_requested() {
        let ring = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let mut registry = build(std::slice::from_ref(&ring));
        let mut edges = EdgeSet::new();

        let outcome = extract_ring(&mut registry, &mut edges, &ring, false).unwrap();
        assert_eq!(outcome, ExtractOutcome::NoPolygonProduced);
        assert!(edges.is_empty());

        let outcome = extract_ring(&mut registry, &mut edges, &ring, true).unwrap();
        let ExtractOutcome::Island(sequence) = outcome else {
            panic!("expected an island, got {outcome:?}");
        };
        assert_eq!(sequence.len(), 1);
        let edge = edges.get(sequence[0].edge);
        assert!(edge.is_closed());
        assert_eq!(edge.coords(), ring.0.as_slice());
        assert!(registry.point(edge.endpoint_a()).is_node());
    }

    #[test]
    fn island_shared_by_lake_is_one_edge_in_reverse() {
        let island = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let mut lake = island.clone();
        lake.0.reverse();
        let mut registry = build(&[island.clone(), lake.clone()]);
        let mut edges = EdgeSet::new();

        let first = extract_ring(&mut registry, &mut edges, &island, true).unwrap();
        let second = extract_ring(&mut registry, &mut edges, &lake, true).unwrap();
        assert!(matches!(first, ExtractOutcome::Island(_)));
        // The island's forced node now cuts the lake ring too.
        let ExtractOutcome::Edges(lake_edges) = second else {
            panic!("expected edges, got {second:?}");
        };
        assert_eq!(edges.len(), 1);
        assert_eq!(lake_edges.len(), 1);
        assert!(!lake_edges[0].forward);
    }

    #[test]
    fn same_endpoints_different_paths_are_distinct() {
        let a = PointId(0);
        let b = PointId(1);
        let north = Edge::new(a, b, vec![c(0.0, 0.0), c(0.5, 1.0), c(1.0, 0.0)]);
        let south = Edge::new(a, b, vec![c(0.0, 0.0), c(0.5, -1.0), c(1.0, 0.0)]);
        assert!(!north.same_edge(&south));

        let mut north_reversed = north.clone();
        north_reversed.coords.reverse();
        north_reversed.a = b;
        north_reversed.b = a;
        assert!(north.same_edge(&north_reversed));
        assert!(!north.is_forward(&north_reversed).unwrap());
        assert!(north.is_forward(&north).unwrap());
    }

    #[test]
    fn orientation_of_unequal_edges_is_an_error() {
        let north = Edge::new(PointId(0), PointId(1), vec![c(0.0, 0.0), c(0.5, 1.0), c(1.0, 0.0)]);
        let south = Edge::new(PointId(0), PointId(1), vec![c(0.0, 0.0), c(0.5, -1.0), c(1.0, 0.0)]);
        assert!(matches!(
            north.is_forward(&south),
            Err(TopologyError::DegenerateEdgeComparison { .. })
        ));
    }

    #[test]
    fn insert_or_fetch_counts_traversals() {
        let mut edges = EdgeSet::new();
        let edge = Edge::new(PointId(0), PointId(1), vec![c(0.0, 0.0), c(1.0, 0.0)]);
        let first = edges.insert_or_fetch(edge.clone()).unwrap();
        let second = edges.insert_or_fetch(edge).unwrap();
        assert_eq!(first, second);
        assert!(first.forward);
        assert_eq!(edges.get(first.edge).ring_count(), 2);
        assert_eq!(edges.coord_count(), 2);
    }
}
