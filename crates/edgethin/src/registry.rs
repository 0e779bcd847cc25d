//! Coordinate registry: deduplicates coordinates into canonical points.
//!
//! Every coordinate of every ring is registered once per occurrence.
//! Occurrences at the same `(lat, lon)` collapse onto a single
//! [`CanonicalPoint`], which accumulates the set of rings passing
//! through it. Node classification and edge extraction then work on
//! those shared points instead of on raw coordinates.
//!
//! # Bucketing
//!
//! Coordinates are scaled to fixed point (`2^23` units per degree) and
//! the low `bits` of each axis are combined into a bucket key. Real
//! coordinate sets cluster heavily, but low bits vary quickly, so the
//! key spreads points evenly enough to keep each bucket short. Exact
//! equality is always re-checked inside the bucket, so key collisions
//! only cost a few comparisons.

use std::fmt;

use geo::Coord;

use crate::types::{PointId, RingId, ThinConfig, TopologyError};

/// Fixed-point units per degree used for the bucket key.
pub const DEGREE_SCALE: f64 = 8_388_608.0;

/// A deduplicated coordinate plus its ring membership and node flag.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPoint {
    coord: Coord<f64>,
    rings: Vec<RingId>,
    node: bool,
}

impl CanonicalPoint {
    /// The point's coordinate (`x` = longitude, `y` = latitude).
    #[must_use]
    pub const fn coord(&self) -> Coord<f64> {
        self.coord
    }

    /// Latitude.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.coord.y
    }

    /// Longitude.
    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.coord.x
    }

    /// Rings that pass through this point, in first-seen order.
    #[must_use]
    pub fn rings(&self) -> &[RingId] {
        &self.rings
    }

    /// Whether this point splits rings into separate edges.
    #[must_use]
    pub const fn is_node(&self) -> bool {
        self.node
    }

    /// Whether this point carries a ring that `other` does not.
    #[must_use]
    pub fn has_ring_absent_from(&self, other: &Self) -> bool {
        self.rings.iter().any(|ring| !other.rings.contains(ring))
    }

    /// Set the node flag, returning `true` if it was not already set.
    pub(crate) const fn mark_node(&mut self) -> bool {
        let newly = !self.node;
        self.node = true;
        newly
    }
}

impl fmt::Display for CanonicalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} {:.6}", self.lat(), self.lon())?;
        if self.node {
            write!(f, " *")?;
        }
        Ok(())
    }
}

/// Occupancy figures for the registry's buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    /// Total number of buckets.
    pub buckets: usize,
    /// Buckets holding at least one point.
    pub occupied: usize,
    /// Length of the fullest bucket.
    pub longest: usize,
}

/// Owns every canonical point of a batch and maps coordinates onto them.
#[derive(Debug, Clone)]
pub struct CoordinateRegistry {
    bits: u32,
    buckets: Vec<Vec<PointId>>,
    points: Vec<CanonicalPoint>,
    registered: usize,
}

impl Default for CoordinateRegistry {
    fn default() -> Self {
        Self::with_bucket_bits(ThinConfig::DEFAULT_BUCKET_BITS)
    }
}

impl CoordinateRegistry {
    /// Create an empty registry using `bits` low bits per axis.
    ///
    /// `bits` is clamped to
    /// [`ThinConfig::MIN_BUCKET_BITS`]..=[`ThinConfig::MAX_BUCKET_BITS`].
    #[must_use]
    pub fn with_bucket_bits(bits: u32) -> Self {
        let bits = bits.clamp(ThinConfig::MIN_BUCKET_BITS, ThinConfig::MAX_BUCKET_BITS);
        Self {
            bits,
            buckets: vec![Vec::new(); 1 << (2 * bits)],
            points: Vec::new(),
            registered: 0,
        }
    }

    /// Bucket key for a coordinate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bucket_key(&self, coord: Coord<f64>) -> usize {
        let mask = (1_i64 << self.bits) - 1;
        let lat = (coord.y * DEGREE_SCALE) as i64 & mask;
        let lon = (coord.x * DEGREE_SCALE) as i64 & mask;
        ((lat << self.bits) | lon) as usize
    }

    /// Insert or fetch the canonical point at `coord` and record that
    /// `ring` passes through it.
    pub fn register(&mut self, coord: Coord<f64>, ring: RingId) -> PointId {
        self.registered += 1;
        let key = self.bucket_key(coord);
        if let Some(id) = self.find_in_bucket(key, coord) {
            let point = &mut self.points[id.0];
            if !point.rings.contains(&ring) {
                point.rings.push(ring);
            }
            return id;
        }

        let id = PointId(self.points.len());
        self.points.push(CanonicalPoint {
            coord,
            rings: vec![ring],
            node: false,
        });
        self.buckets[key].push(id);
        id
    }

    /// Find the canonical point at `coord`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingCanonicalPoint`] if the coordinate
    /// was never registered.
    pub fn lookup(&self, coord: Coord<f64>) -> Result<PointId, TopologyError> {
        self.find_in_bucket(self.bucket_key(coord), coord)
            .ok_or(TopologyError::MissingCanonicalPoint {
                x: coord.x,
                y: coord.y,
            })
    }

    fn find_in_bucket(&self, key: usize, coord: Coord<f64>) -> Option<PointId> {
        self.buckets[key]
            .iter()
            .copied()
            .find(|id| self.points[id.0].coord == coord)
    }

    /// The canonical point behind `id`.
    #[must_use]
    pub fn point(&self, id: PointId) -> &CanonicalPoint {
        &self.points[id.0]
    }

    pub(crate) fn point_mut(&mut self, id: PointId) -> &mut CanonicalPoint {
        &mut self.points[id.0]
    }

    /// Iterate every canonical point in creation order.
    pub fn points(&self) -> impl Iterator<Item = &CanonicalPoint> {
        self.points.iter()
    }

    /// Number of distinct canonical points.
    #[must_use]
    pub const fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of coordinates registered, duplicates included.
    #[must_use]
    pub const fn registered_count(&self) -> usize {
        self.registered
    }

    /// Number of points flagged as nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.points.iter().filter(|p| p.node).count()
    }

    /// Bucket occupancy, for diagnostics.
    #[must_use]
    pub fn bucket_stats(&self) -> BucketStats {
        BucketStats {
            buckets: self.buckets.len(),
            occupied: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            longest: self.buckets.iter().map(Vec::len).max().unwrap_or(0),
        }
    }
}
