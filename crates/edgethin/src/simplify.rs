//! Edge simplification: reduce the vertex count of each unique edge.
//!
//! This module defines the [`EdgeSimplifier`] trait for pluggable
//! simplification strategies and the [`SimplifierKind`] enum for
//! selecting a built-in one at runtime. The topology model calls the
//! simplifier exactly once per unique edge, so every ring sharing that
//! edge receives the identical simplified arc.
//!
//! # Tolerance
//!
//! Each edge is simplified with a tolerance proportional to its own
//! length, capped at a maximum. Short arcs are thinned gently so they
//! keep their shape; long arcs are thinned harder, but never beyond the
//! cap.

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line, LineString};
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject};
use serde::{Deserialize, Serialize};

use crate::types::EdgeId;

/// Per-edge information handed to a simplifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyContext {
    /// The edge being simplified.
    pub edge: EdgeId,
    /// Length of the unsimplified arc.
    pub length: f64,
    /// Distance tolerance for this arc.
    pub tolerance: f64,
}

impl SimplifyContext {
    /// Build the context for `arc`, deriving its tolerance from the
    /// arc's length.
    #[must_use]
    pub fn for_arc(
        edge: EdgeId,
        arc: &LineString<f64>,
        length_factor: f64,
        max_tolerance: f64,
    ) -> Self {
        let length = arc_length(arc);
        Self {
            edge,
            length,
            tolerance: tolerance_for(length, length_factor, max_tolerance),
        }
    }
}

/// Selects which simplification strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplifierKind {
    /// Douglas-Peucker that refuses any shortcut crossing another segment
    /// of the same arc.
    #[default]
    TopologyPreserving,

    /// Leave every arc untouched.
    Identity,
}

impl SimplifierKind {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TopologyPreserving => "topology-preserving",
            Self::Identity => "identity",
        }
    }
}

/// Trait for edge simplification strategies.
///
/// Implementations must return an arc that starts and ends at exactly
/// the input's first and last coordinates; the topology model rejects
/// any result that moves an endpoint.
pub trait EdgeSimplifier {
    /// Simplify one arc.
    fn simplify(&self, arc: &LineString<f64>, context: &SimplifyContext) -> LineString<f64>;
}

impl EdgeSimplifier for SimplifierKind {
    fn simplify(&self, arc: &LineString<f64>, context: &SimplifyContext) -> LineString<f64> {
        match *self {
            Self::TopologyPreserving => simplify_preserving_topology(arc, context.tolerance),
            Self::Identity => arc.clone(),
        }
    }
}

/// Euclidean length of an arc, in coordinate units.
#[must_use]
pub fn arc_length(arc: &LineString<f64>) -> f64 {
    arc.lines().map(|line| line.dx().hypot(line.dy())).sum()
}

/// Tolerance for an arc of `length`: `length * length_factor`, capped at
/// `max_tolerance`.
#[must_use]
pub fn tolerance_for(length: f64, length_factor: f64, max_tolerance: f64) -> f64 {
    (length * length_factor).min(max_tolerance)
}

/// Simplify an arc without introducing self-intersections.
///
/// Runs Douglas-Peucker, but a span is only replaced by its chord when
/// the chord crosses no other segment of the current result. Blocked
/// spans are split at their farthest vertex as if they exceeded the
/// tolerance. Both endpoints are always kept. A closed arc (a whole
/// island ring) keeps at least four coordinates so it remains a valid
/// ring.
#[must_use = "returns the simplified arc"]
pub fn simplify_preserving_topology(arc: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    let points = arc.0.as_slice();
    let n = points.len();
    let closed = arc.is_closed();
    if n < 3 || (closed && n <= 4) || tolerance.is_nan() || tolerance <= 0.0 {
        return arc.clone();
    }

    let mut state = Reducer::new(points, tolerance);
    if closed {
        // Anchor the vertex farthest from the seam so the ring cannot
        // collapse onto its start point.
        let anchor = farthest_from_start(points);
        state.kept[anchor] = true;
        state.reduce(0, anchor);
        state.reduce(anchor, n - 1);
        while state.kept_count() < 4 && state.reinstate_farthest() {}
    } else {
        state.reduce(0, n - 1);
    }

    let simplified: Vec<Coord<f64>> = points
        .iter()
        .zip(&state.kept)
        .filter(|&(_, k)| *k)
        .map(|(&c, _)| c)
        .collect();
    LineString::new(simplified)
}

/// Index range `start..=end` of the input arc covered by a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// A result segment tagged with the input span it replaces.
type IndexedSegment = GeomWithData<Line<f64>, Span>;

/// Working state of one topology-preserving reduction.
struct Reducer<'a> {
    points: &'a [Coord<f64>],
    tolerance: f64,
    kept: Vec<bool>,
    /// Segments of the current result: original segments not yet
    /// replaced, plus accepted chords.
    segments: RTree<IndexedSegment>,
}

impl<'a> Reducer<'a> {
    fn new(points: &'a [Coord<f64>], tolerance: f64) -> Self {
        let mut kept = vec![false; points.len()];
        kept[0] = true;
        kept[points.len() - 1] = true;
        let segments = points
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                GeomWithData::new(
                    Line::new(w[0], w[1]),
                    Span {
                        start: i,
                        end: i + 1,
                    },
                )
            })
            .collect();
        Self {
            points,
            tolerance,
            kept,
            segments: RTree::bulk_load(segments),
        }
    }

    fn kept_count(&self) -> usize {
        self.kept.iter().filter(|&&k| k).count()
    }

    /// Recursive Douglas-Peucker step over `start..=end`.
    fn reduce(&mut self, start: usize, end: usize) {
        if end <= start + 1 {
            return;
        }

        let mut max_dist = -1.0;
        let mut max_idx = start + 1;
        for i in (start + 1)..end {
            let d = perpendicular_distance(self.points[i], self.points[start], self.points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist <= self.tolerance && self.try_flatten(start, end) {
            return;
        }
        self.kept[max_idx] = true;
        self.reduce(start, max_idx);
        self.reduce(max_idx, end);
    }

    /// Replace `start..=end` by its chord unless the chord would cross
    /// another segment of the result.
    fn try_flatten(&mut self, start: usize, end: usize) -> bool {
        let from = self.points[start];
        let to = self.points[end];
        if from == to {
            return false;
        }
        let chord = Line::new(from, to);

        let blocked = self
            .segments
            .locate_in_envelope_intersecting(&chord.envelope())
            .any(|segment| {
                let span = segment.data;
                let inside = span.start >= start && span.end <= end;
                !inside && crosses(chord, *segment.geom())
            });
        if blocked {
            return false;
        }

        for i in start..end {
            let original = GeomWithData::new(
                Line::new(self.points[i], self.points[i + 1]),
                Span {
                    start: i,
                    end: i + 1,
                },
            );
            self.segments.remove(&original);
        }
        self.segments.insert(GeomWithData::new(chord, Span { start, end }));
        true
    }

    /// Keep the dropped vertex farthest from the chord of the kept
    /// vertices around it. Returns `false` when nothing is left to keep.
    fn reinstate_farthest(&mut self) -> bool {
        let mut best: Option<(usize, f64)> = None;
        let mut prev_kept = 0;
        for i in 1..self.points.len() {
            if self.kept[i] {
                prev_kept = i;
                continue;
            }
            let next_kept = (i + 1..self.points.len())
                .find(|&j| self.kept[j])
                .unwrap_or(self.points.len() - 1);
            let d = perpendicular_distance(
                self.points[i],
                self.points[prev_kept],
                self.points[next_kept],
            );
            if best.is_none_or(|(_, best_d)| d > best_d) {
                best = Some((i, d));
            }
        }
        match best {
            Some((i, _)) => {
                self.kept[i] = true;
                true
            }
            None => false,
        }
    }
}

/// Index of the vertex farthest from the first one, excluding both ends.
fn farthest_from_start(points: &[Coord<f64>]) -> usize {
    let origin = points[0];
    let mut max_dist = -1.0;
    let mut max_idx = 1;
    for (i, &p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = (p.x - origin.x).hypot(p.y - origin.y);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }
    max_idx
}

/// Whether `chord` and `other` meet anywhere except at one of the
/// chord's own endpoints.
fn crosses(chord: Line<f64>, other: Line<f64>) -> bool {
    let at_chord_end = |c: Coord<f64>| c == chord.start || c == chord.end;
    match line_intersection(chord, other) {
        None => false,
        Some(LineIntersection::SinglePoint {
            intersection,
            is_proper,
        }) => is_proper || !at_chord_end(intersection),
        Some(LineIntersection::Collinear { intersection }) => {
            intersection.start != intersection.end || !at_chord_end(intersection.start)
        }
    }
}

/// Perpendicular distance from point `p` to the line through `a` and `b`.
///
/// Uses the formula: |cross(b-a, p-a)| / |b-a|.
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use geo::{coord, line_string};

    use super::*;

    fn context(tolerance: f64) -> SimplifyContext {
        SimplifyContext {
            edge: EdgeId(0),
            length: 0.0,
            tolerance,
        }
    }

    #[test]
    fn default_is_topology_preserving() {
        assert_eq!(SimplifierKind::default(), SimplifierKind::TopologyPreserving);
        assert_eq!(SimplifierKind::default().name(), "topology-preserving");
    }

    #[test]
    fn identity_returns_arc_unchanged() {
        let arc = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.001), (x: 2.0, y: 0.0)];
        assert_eq!(SimplifierKind::Identity.simplify(&arc, &context(10.0)), arc);
    }

    #[test]
    fn tolerance_scales_with_length_until_capped() {
        assert!((tolerance_for(0.1, 0.02, 0.01) - 0.002).abs() < 1e-12);
        assert!((tolerance_for(5.0, 0.02, 0.01) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn context_measures_arc() {
        let arc = line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 4.0), (x: 3.0, y: 5.0)];
        let ctx = SimplifyContext::for_arc(EdgeId(2), &arc, 0.1, 10.0);
        assert!((ctx.length - 6.0).abs() < 1e-12);
        assert!((ctx.tolerance - 0.6).abs() < 1e-12);
        assert_eq!(ctx.edge, EdgeId(2));
    }

    #[test]
    fn short_arcs_unchanged() {
        let arc = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        assert_eq!(simplify_preserving_topology(&arc, 1.0), arc);
    }

    #[test]
    fn zero_tolerance_preserves_all_points() {
        let arc = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.1),
            (x: 2.0, y: 0.0),
            (x: 3.0, y: 0.05),
        ];
        assert_eq!(simplify_preserving_topology(&arc, 0.0), arc);
    }

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let arc = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 3.0, y: 3.0),
        ];
        let result = simplify_preserving_topology(&arc, 0.1);
        assert_eq!(result.0, vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 3.0, y: 3.0 }]);
    }

    #[test]
    fn zigzag_retains_peaks() {
        let arc = line_string![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 5.0),
            (x: 4.0, y: 0.0),
            (x: 6.0, y: 5.0),
            (x: 8.0, y: 0.0),
        ];
        assert_eq!(simplify_preserving_topology(&arc, 1.0).0.len(), 5);
    }

    #[test]
    fn unobstructed_bump_is_flattened() {
        let arc = line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.4), (x: 10.0, y: 0.0)];
        assert_eq!(simplify_preserving_topology(&arc, 0.5).0.len(), 2);
    }

    #[test]
    fn chord_crossing_the_arc_is_refused() {
        // The bump at (5, 0.4) is within tolerance of the chord
        // (0,0)-(10,0), but the return leg dips through that chord.
        let arc = line_string![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.4),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: -1.0),
            (x: 5.0, y: 0.1),
            (x: 0.0, y: -1.0),
        ];
        let result = simplify_preserving_topology(&arc, 0.5);
        assert!(result.0.contains(&coord! { x: 5.0, y: 0.4 }));
        assert_eq!(result.0.first(), arc.0.first());
        assert_eq!(result.0.last(), arc.0.last());
    }

    #[test]
    fn closed_ring_stays_a_valid_ring() {
        let arc = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let result = simplify_preserving_topology(&arc, 10.0);
        assert!(result.0.len() >= 4, "got {:?}", result.0);
        assert!(result.is_closed());
    }

    #[test]
    fn closed_polygonal_circle_keeps_four_points() {
        let n = 64;
        let mut coords: Vec<Coord<f64>> = (0..n)
            .map(|i| {
                let t = f64::from(i) / f64::from(n) * std::f64::consts::TAU;
                coord! { x: t.cos(), y: t.sin() }
            })
            .collect();
        coords.push(coords[0]);
        let arc = LineString::new(coords);
        let result = simplify_preserving_topology(&arc, 100.0);
        assert!(result.0.len() >= 4);
        assert!(result.0.len() < arc.0.len());
        assert_eq!(result.0.first(), arc.0.first());
        assert_eq!(result.0.last(), arc.0.last());
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            coord! { x: 1.0, y: 3.0 },
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 2.0, y: 0.0 },
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            coord! { x: 3.0, y: 4.0 },
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 0.0 },
        );
        assert!((d - 5.0).abs() < 1e-10);
    }

    #[test]
    fn crossing_detection_allows_shared_endpoints() {
        let chord = Line::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 0.0 });
        let touching = Line::new(coord! { x: 10.0, y: 0.0 }, coord! { x: 10.0, y: 5.0 });
        let crossing = Line::new(coord! { x: 5.0, y: -1.0 }, coord! { x: 5.0, y: 1.0 });
        let resting = Line::new(coord! { x: 5.0, y: 0.0 }, coord! { x: 5.0, y: 1.0 });
        assert!(!crosses(chord, touching));
        assert!(crosses(chord, crossing));
        assert!(crosses(chord, resting));
    }

    #[test]
    fn kind_serde_names() {
        let json = serde_json::to_string(&SimplifierKind::TopologyPreserving).unwrap_or_default();
        assert_eq!(json, "\"topology_preserving\"");
    }
}
