//! Shared types for the edgethin topology pipeline.

use std::fmt;

use geo::{Coord, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::simplify::SimplifierKind;

/// Identifies one ring (exterior or interior) of one polygon in the batch.
///
/// Assigned sequentially while rows are loaded. Canonical points record
/// the set of rings passing through them by this id, never by the
/// address of the ring's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingId(pub(crate) usize);

impl RingId {
    /// Position of this ring in load order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring#{}", self.0)
    }
}

/// Handle to a canonical point owned by the
/// [`CoordinateRegistry`](crate::registry::CoordinateRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub(crate) usize);

impl PointId {
    /// Position of this point in the registry's point arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "point#{}", self.0)
    }
}

/// Handle to a unique edge owned by the [`EdgeSet`](crate::edge::EdgeSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Position of this edge in the edge arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

/// One source feature: an identifying code and name plus its geometry.
///
/// Before thinning `geometry` holds the source multi-polygon; after
/// [`create_thinned_polygons`](crate::topology::EdgesSimplified::create_thinned_polygons)
/// it holds the rebuilt, thinned multi-polygon. Coordinates use `x` for
/// longitude and `y` for latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Identifying code (e.g. a region or postcode identifier).
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// The feature's multi-polygon.
    pub geometry: MultiPolygon<f64>,
}

impl FeatureRow {
    /// Create a new feature row.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            geometry,
        }
    }

    /// Total number of coordinates across every ring of the geometry.
    #[must_use]
    pub fn coord_count(&self) -> usize {
        self.geometry
            .iter()
            .map(|polygon| {
                polygon.exterior().0.len()
                    + polygon
                        .interiors()
                        .iter()
                        .map(|ring| ring.0.len())
                        .sum::<usize>()
            })
            .sum()
    }
}

/// A named group of feature rows, such as one administrative level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name, unique within a batch.
    pub name: String,
    /// Rows in load order.
    pub rows: Vec<FeatureRow>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }
}

/// Configuration for a thinning run.
///
/// Tolerances are in the same units as the input coordinates; for
/// geographic degrees the default cap of `0.01` is roughly one kilometre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinConfig {
    /// Simplification tolerance as a fraction of each edge's own length.
    pub length_factor: f64,

    /// Upper bound on the per-edge simplification tolerance.
    pub max_tolerance: f64,

    /// Which simplification strategy to apply to each unique edge.
    pub simplifier: SimplifierKind,

    /// Low bits taken from each axis when bucketing coordinates.
    ///
    /// The registry allocates `4^bucket_bits` buckets. Must lie within
    /// [`MIN_BUCKET_BITS`](Self::MIN_BUCKET_BITS)..=[`MAX_BUCKET_BITS`](Self::MAX_BUCKET_BITS).
    pub bucket_bits: u32,

    /// Keep detached island polygons of a row that also has connected
    /// polygons, instead of discarding them.
    pub keep_detached_islands: bool,
}

impl ThinConfig {
    /// Default length factor.
    pub const DEFAULT_LENGTH_FACTOR: f64 = 0.02;
    /// Default tolerance cap.
    pub const DEFAULT_MAX_TOLERANCE: f64 = 0.01;
    /// Default simplification strategy.
    pub const DEFAULT_SIMPLIFIER: SimplifierKind = SimplifierKind::TopologyPreserving;
    /// Default bucket bits per axis (256 buckets).
    pub const DEFAULT_BUCKET_BITS: u32 = 4;
    /// Smallest accepted bucket bit count.
    pub const MIN_BUCKET_BITS: u32 = 1;
    /// Largest accepted bucket bit count (about one million buckets).
    pub const MAX_BUCKET_BITS: u32 = 10;

    /// Check every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidConfig`] if a tolerance parameter is
    /// negative or not finite, or if `bucket_bits` is out of range.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if !self.length_factor.is_finite() || self.length_factor < 0.0 {
            return Err(TopologyError::InvalidConfig(format!(
                "length_factor must be finite and non-negative, got {}",
                self.length_factor
            )));
        }
        if !self.max_tolerance.is_finite() || self.max_tolerance < 0.0 {
            return Err(TopologyError::InvalidConfig(format!(
                "max_tolerance must be finite and non-negative, got {}",
                self.max_tolerance
            )));
        }
        if !(Self::MIN_BUCKET_BITS..=Self::MAX_BUCKET_BITS).contains(&self.bucket_bits) {
            return Err(TopologyError::InvalidConfig(format!(
                "bucket_bits must be within {}..={}, got {}",
                Self::MIN_BUCKET_BITS,
                Self::MAX_BUCKET_BITS,
                self.bucket_bits
            )));
        }
        Ok(())
    }
}

impl Default for ThinConfig {
    fn default() -> Self {
        Self {
            length_factor: Self::DEFAULT_LENGTH_FACTOR,
            max_tolerance: Self::DEFAULT_MAX_TOLERANCE,
            simplifier: Self::DEFAULT_SIMPLIFIER,
            bucket_bits: Self::DEFAULT_BUCKET_BITS,
            keep_detached_islands: false,
        }
    }
}

/// Errors that abort a thinning run.
///
/// Every variant is fatal: the batch is a one-shot job over a fixed
/// snapshot, and continuing past an inconsistency would emit corrupted
/// geometry. A ring without nodes is not an error; see
/// [`ExtractOutcome::NoPolygonProduced`](crate::edge::ExtractOutcome::NoPolygonProduced).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    /// Consecutive edges of a rebuilt ring do not meet.
    #[error(
        "invalid edge sequence at position {position} ({edge}, forward={forward}): \
         expected {expected:?}, found {found:?}"
    )]
    Reconstruction {
        /// Index into the ring's edge sequence; equal to the sequence
        /// length when the ring fails to close.
        position: usize,
        /// The edge whose leading coordinate did not match.
        edge: EdgeId,
        /// Orientation recorded for that edge.
        forward: bool,
        /// The last coordinate already emitted.
        expected: Coord<f64>,
        /// The coordinate the edge would have continued from.
        found: Coord<f64>,
    },

    /// A ring was rebuilt from an empty edge sequence.
    #[error("cannot rebuild a ring from an empty edge sequence")]
    EmptyEdgeSequence,

    /// An edge holds no coordinates at all.
    #[error("{0} has no coordinates")]
    EmptyEdge(EdgeId),

    /// Orientation was requested between two edges that are not the same edge.
    #[error("edges unequal: {left} and {right} are different physical edges")]
    DegenerateEdgeComparison {
        /// Endpoints of the receiving edge.
        left: String,
        /// Endpoints of the compared edge.
        right: String,
    },

    /// A coordinate was looked up before it was registered.
    #[error("no canonical point registered at ({x}, {y})")]
    MissingCanonicalPoint {
        /// Longitude.
        x: f64,
        /// Latitude.
        y: f64,
    },

    /// A simplifier moved or dropped an edge endpoint.
    #[error("simplifier moved an endpoint of {0}")]
    EndpointMoved(EdgeId),

    /// Configuration is invalid.
    #[error("invalid thinning configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    #[test]
    fn config_defaults() {
        let config = ThinConfig::default();
        assert!((config.length_factor - 0.02).abs() < f64::EPSILON);
        assert!((config.max_tolerance - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.simplifier, SimplifierKind::TopologyPreserving);
        assert_eq!(config.bucket_bits, 4);
        assert!(!config.keep_detached_islands);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_negative_factor() {
        let config = ThinConfig {
            length_factor: -0.1,
            ..ThinConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TopologyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_rejects_nan_tolerance() {
        let config = ThinConfig {
            max_tolerance: f64::NAN,
            ..ThinConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_bucket_bits_out_of_range() {
        for bits in [0, 11] {
            let config = ThinConfig {
                bucket_bits: bits,
                ..ThinConfig::default()
            };
            assert!(config.validate().is_err(), "bits={bits} should be rejected");
        }
    }

    #[test]
    fn config_partial_json_fills_defaults() {
        let config: ThinConfig = serde_json::from_str(r#"{"length_factor": 0.05}"#).unwrap();
        assert!((config.length_factor - 0.05).abs() < f64::EPSILON);
        assert!((config.max_tolerance - ThinConfig::DEFAULT_MAX_TOLERANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = ThinConfig {
            length_factor: 0.04,
            max_tolerance: 0.5,
            simplifier: SimplifierKind::Identity,
            bucket_bits: 8,
            keep_detached_islands: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ThinConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn feature_row_coord_count_includes_holes() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0)]],
        );
        let row = FeatureRow::new("1", "one", MultiPolygon::new(vec![poly]));
        // Both rings are closed by `polygon!`: 5 + 4.
        assert_eq!(row.coord_count(), 9);
    }

    #[test]
    fn error_display_missing_point() {
        let err = TopologyError::MissingCanonicalPoint { x: 1.5, y: -2.0 };
        assert_eq!(err.to_string(), "no canonical point registered at (1.5, -2)");
    }

    #[test]
    fn error_display_endpoint_moved() {
        let err = TopologyError::EndpointMoved(EdgeId(7));
        assert_eq!(err.to_string(), "simplifier moved an endpoint of edge#7");
    }

    #[test]
    fn ids_display() {
        assert_eq!(RingId(3).to_string(), "ring#3");
        assert_eq!(PointId(4).to_string(), "point#4");
        assert_eq!(EdgeId(5).index(), 5);
    }
}
