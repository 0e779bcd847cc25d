//! Topology model: drive a batch through the five thinning phases.
//!
//! ```rust
//! # use edgethin::{Table, ThinConfig, Topology, TopologyError};
//! # fn run(tables: Vec<Table>) -> Result<(), TopologyError> {
//! let mut loading = Topology::new(ThinConfig::default())?;
//! for table in tables {
//!     loading.add_table(table);
//! }
//! let thinned = loading
//!     .find_nodes()?
//!     .create_edges()?
//!     .simplify_edges()?
//!     .create_thinned_polygons()?;
//! let tables = thinned.into_tables();
//! # Ok(())
//! # }
//! ```
//!
//! Each phase method consumes the current state and returns the next,
//! so phases cannot be skipped, reordered or repeated. Node
//! classification depends on the ring membership of every coordinate in
//! the batch, which is why all rows must be loaded before
//! [`Loading::find_nodes`] is called.
//!
//! # Detached polygons
//!
//! A polygon whose exterior touches no other ring yields no edges. When
//! at least one polygon of the same row is connected, such detached
//! polygons are dropped, unless
//! [`ThinConfig::keep_detached_islands`] is set. When none of a row's
//! polygons is connected, the polygon with the largest area is kept as a
//! single-edge island so the feature stays represented.

use geo::{Area, LineString, MultiPolygon, Polygon};

use crate::diagnostics::{PhaseMetrics, ThinSummary};
use crate::edge::{EdgeSet, ExtractOutcome, RingEdge, extract_ring};
use crate::node::classify_ring;
use crate::reconstruct::reconstruct_polygon;
use crate::registry::CoordinateRegistry;
use crate::simplify::{EdgeSimplifier, SimplifyContext};
use crate::types::{EdgeId, FeatureRow, RingId, Table, ThinConfig, TopologyError};

/// Edge sequences of one polygon: its exterior and each of its holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoPolygon {
    /// Edge sequence of the exterior ring.
    pub exterior: Vec<RingEdge>,
    /// Edge sequences of the interior rings, in source order.
    pub interiors: Vec<Vec<RingEdge>>,
}

/// Counts gathered while loading rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LoadStats {
    rows: usize,
    polygons: usize,
    rings: usize,
}

/// Counts gathered while extracting edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeStats {
    /// Rings turned into a single closed edge because they had no node.
    pub islands: usize,
    /// Rows where no polygon was connected and the largest was kept.
    pub fallback_rows: usize,
    /// Detached polygons discarded from rows that also had connected ones.
    pub dropped_polygons: usize,
}

// ───────────────────────── Stage 0: Loading ─────────────────────────

/// Model state while rows are being loaded.
///
/// Every coordinate of every added row is registered with the
/// [`CoordinateRegistry`] as it arrives. Call
/// [`find_nodes`](Self::find_nodes) once all rows are in.
#[must_use = "topology phases are consumed by advancing: call .find_nodes() to continue"]
pub struct Loading {
    config: ThinConfig,
    registry: CoordinateRegistry,
    tables: Vec<Table>,
    next_ring: usize,
    stats: LoadStats,
}

impl Loading {
    /// Register a row's coordinates and file it under `table`.
    ///
    /// Tables are created on first use and keep their first-seen order.
    /// Unclosed rings are closed by repeating their first coordinate.
    pub fn add_row(&mut self, table: &str, mut row: FeatureRow) {
        for polygon in &mut row.geometry.0 {
            close_rings(polygon);
        }
        for polygon in &row.geometry {
            self.stats.polygons += 1;
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                let id = RingId(self.next_ring);
                self.next_ring += 1;
                self.stats.rings += 1;
                for &coord in &ring.0 {
                    self.registry.register(coord, id);
                }
            }
        }
        self.stats.rows += 1;

        let index = match self.tables.iter().position(|t| t.name == table) {
            Some(index) => index,
            None => {
                self.tables.push(Table::new(table));
                self.tables.len() - 1
            }
        };
        self.tables[index].rows.push(row);
    }

    /// Add every row of `table`.
    pub fn add_table(&mut self, table: Table) {
        let Table { name, rows } = table;
        if rows.is_empty() && !self.tables.iter().any(|t| t.name == name) {
            self.tables.push(Table::new(name));
            return;
        }
        for row in rows {
            self.add_row(&name, row);
        }
    }

    /// Tables loaded so far.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// The registry holding every loaded coordinate.
    #[must_use]
    pub const fn registry(&self) -> &CoordinateRegistry {
        &self.registry
    }

    /// Number of distinct canonical points registered.
    #[must_use]
    pub const fn point_count(&self) -> usize {
        self.registry.point_count()
    }

    /// Number of coordinates registered, duplicates included.
    #[must_use]
    pub const fn registered_count(&self) -> usize {
        self.registry.registered_count()
    }

    /// Classify every ring of every row and advance to [`NodesFound`].
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingCanonicalPoint`] if a ring holds a
    /// coordinate that was never registered, which indicates a bug.
    pub fn find_nodes(mut self) -> Result<NodesFound, TopologyError> {
        let mut marked = 0;
        for row in self.tables.iter().flat_map(|t| &t.rows) {
            for polygon in &row.geometry {
                for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                    marked += classify_ring(&mut self.registry, ring)?;
                }
            }
        }
        tracing::info!(
            points = self.registry.point_count(),
            nodes = marked,
            "found nodes"
        );
        Ok(NodesFound {
            config: self.config,
            registry: self.registry,
            tables: self.tables,
            load: self.stats,
            marked,
        })
    }
}

// ─────────────────────── Stage 1: NodesFound ────────────────────────

/// Model state after node classification.
///
/// Call [`create_edges`](Self::create_edges) to advance.
#[must_use = "topology phases are consumed by advancing: call .create_edges() to continue"]
pub struct NodesFound {
    config: ThinConfig,
    registry: CoordinateRegistry,
    tables: Vec<Table>,
    load: LoadStats,
    marked: usize,
}

impl NodesFound {
    /// The registry with node flags set.
    #[must_use]
    pub const fn registry(&self) -> &CoordinateRegistry {
        &self.registry
    }

    /// Number of points classified as nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.marked
    }

    /// Cut every ring into edges and advance to [`EdgesCreated`].
    ///
    /// Exteriors are extracted first without island construction; holes
    /// always become islands when they touch nothing. See the
    /// [module docs](self#detached-polygons) for how rows without any
    /// connected polygon are handled.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingCanonicalPoint`] if a ring holds an
    /// unregistered coordinate.
    pub fn create_edges(mut self) -> Result<EdgesCreated, TopologyError> {
        let mut edges = EdgeSet::new();
        let mut stats = EdgeStats::default();
        let mut topology = Vec::with_capacity(self.tables.len());

        for table in &self.tables {
            let mut rows = Vec::with_capacity(table.rows.len());
            for row in &table.rows {
                let polygons = extract_row(
                    &mut self.registry,
                    &mut edges,
                    row,
                    self.config.keep_detached_islands,
                    &mut stats,
                )?;
                rows.push(polygons);
            }
            topology.push(rows);
        }

        tracing::info!(
            edges = edges.len(),
            shared = edges.shared_count(),
            islands = stats.islands,
            dropped = stats.dropped_polygons,
            "created edges"
        );
        Ok(EdgesCreated {
            config: self.config,
            registry: self.registry,
            tables: self.tables,
            load: self.load,
            edges,
            topology,
            stats,
        })
    }
}

/// Extract every polygon of one row.
fn extract_row(
    registry: &mut CoordinateRegistry,
    edges: &mut EdgeSet,
    row: &FeatureRow,
    keep_detached: bool,
    stats: &mut EdgeStats,
) -> Result<Vec<TopoPolygon>, TopologyError> {
    let mut slots: Vec<Option<TopoPolygon>> = Vec::with_capacity(row.geometry.0.len());
    for polygon in &row.geometry {
        let exterior = extract_ring(registry, edges, polygon.exterior(), false)?;
        let polygon = match exterior.into_sequence() {
            Some(exterior) => Some(TopoPolygon {
                exterior,
                interiors: extract_interiors(registry, edges, polygon, stats)?,
            }),
            None => None,
        };
        slots.push(polygon);
    }

    let connected = slots.iter().filter(|slot| slot.is_some()).count();
    if connected == 0 {
        if let Some(largest) = largest_polygon(&row.geometry) {
            tracing::debug!(
                code = %row.code,
                polygons = row.geometry.0.len(),
                kept = largest,
                "no connected polygon, keeping the largest as an island"
            );
            stats.fallback_rows += 1;
            slots[largest] = force_island(registry, edges, &row.geometry.0[largest], stats)?;
        }
    } else if keep_detached {
        for (slot, polygon) in slots.iter_mut().zip(&row.geometry) {
            if slot.is_none() {
                *slot = force_island(registry, edges, polygon, stats)?;
            }
        }
    } else if connected < slots.len() {
        let dropped = slots.len() - connected;
        tracing::debug!(code = %row.code, dropped, "dropping detached polygons");
        stats.dropped_polygons += dropped;
    }

    Ok(slots.into_iter().flatten().collect())
}

fn extract_interiors(
    registry: &mut CoordinateRegistry,
    edges: &mut EdgeSet,
    polygon: &Polygon<f64>,
    stats: &mut EdgeStats,
) -> Result<Vec<Vec<RingEdge>>, TopologyError> {
    let mut interiors = Vec::with_capacity(polygon.interiors().len());
    for ring in polygon.interiors() {
        let outcome = extract_ring(registry, edges, ring, true)?;
        if matches!(outcome, ExtractOutcome::Island(_)) {
            stats.islands += 1;
        }
        if let Some(sequence) = outcome.into_sequence() {
            interiors.push(sequence);
        }
    }
    Ok(interiors)
}

/// Extract a polygon whose exterior has no node, promoting it to an island.
fn force_island(
    registry: &mut CoordinateRegistry,
    edges: &mut EdgeSet,
    polygon: &Polygon<f64>,
    stats: &mut EdgeStats,
) -> Result<Option<TopoPolygon>, TopologyError> {
    let outcome = extract_ring(registry, edges, polygon.exterior(), true)?;
    if matches!(outcome, ExtractOutcome::Island(_)) {
        stats.islands += 1;
    }
    let Some(exterior) = outcome.into_sequence() else {
        return Ok(None);
    };
    Ok(Some(TopoPolygon {
        exterior,
        interiors: extract_interiors(registry, edges, polygon, stats)?,
    }))
}

fn close_rings(polygon: &mut Polygon<f64>) {
    polygon.exterior_mut(LineString::close);
    polygon.interiors_mut(|interiors| interiors.iter_mut().for_each(LineString::close));
}

/// Index of the polygon with the largest area; the first one wins ties.
fn largest_polygon(geometry: &MultiPolygon<f64>) -> Option<usize> {
    geometry
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, polygon)| {
            let area = polygon.unsigned_area();
            match best {
                Some((_, best_area)) if area <= best_area => best,
                _ => Some((index, area)),
            }
        })
        .map(|(index, _)| index)
}

// ────────────────────── Stage 2: EdgesCreated ───────────────────────

/// Model state after edge extraction.
///
/// Call [`simplify_edges`](Self::simplify_edges) to advance.
#[must_use = "topology phases are consumed by advancing: call .simplify_edges() to continue"]
pub struct EdgesCreated {
    config: ThinConfig,
    registry: CoordinateRegistry,
    tables: Vec<Table>,
    load: LoadStats,
    edges: EdgeSet,
    topology: Vec<Vec<Vec<TopoPolygon>>>,
    stats: EdgeStats,
}

impl EdgesCreated {
    /// The unique edges of the batch.
    #[must_use]
    pub const fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    /// Edge sequences of one row, by table and row position.
    #[must_use]
    pub fn row_topology(&self, table: usize, row: usize) -> Option<&[TopoPolygon]> {
        self.topology
            .get(table)
            .and_then(|rows| rows.get(row))
            .map(Vec::as_slice)
    }

    /// Island and fallback counts from extraction.
    #[must_use]
    pub const fn stats(&self) -> EdgeStats {
        self.stats
    }

    /// Simplify every unique edge with the configured strategy.
    ///
    /// # Errors
    ///
    /// See [`simplify_edges_with`](Self::simplify_edges_with).
    pub fn simplify_edges(self) -> Result<EdgesSimplified, TopologyError> {
        let simplifier = self.config.simplifier;
        self.simplify_edges_with(&simplifier)
    }

    /// Simplify every unique edge exactly once with `simplifier`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::EndpointMoved`] if the simplifier returns
    /// an arc that does not start and end where the input did.
    pub fn simplify_edges_with(
        mut self,
        simplifier: &dyn EdgeSimplifier,
    ) -> Result<EdgesSimplified, TopologyError> {
        let coords_before = self.edges.coord_count();
        for index in 0..self.edges.len() {
            let id = EdgeId(index);
            let arc = self.edges.get(id).to_line_string();
            let context = SimplifyContext::for_arc(
                id,
                &arc,
                self.config.length_factor,
                self.config.max_tolerance,
            );
            let simplified = simplifier.simplify(&arc, &context);
            let kept_ends = simplified.0.len() >= 2
                && simplified.0.first() == arc.0.first()
                && simplified.0.last() == arc.0.last();
            if !kept_ends {
                return Err(TopologyError::EndpointMoved(id));
            }
            self.edges.get_mut(id).replace_coords(simplified.0);
        }
        let coords_after = self.edges.coord_count();

        tracing::info!(
            edges = self.edges.len(),
            coords_before,
            coords_after,
            "simplified edges"
        );
        Ok(EdgesSimplified {
            config: self.config,
            registry: self.registry,
            tables: self.tables,
            load: self.load,
            edges: self.edges,
            topology: self.topology,
            coords_before,
            coords_after,
        })
    }
}

// ───────────────────── Stage 3: EdgesSimplified ─────────────────────

/// Model state after simplification.
///
/// Call [`create_thinned_polygons`](Self::create_thinned_polygons) to
/// advance.
#[must_use = "topology phases are consumed by advancing: call .create_thinned_polygons() to continue"]
pub struct EdgesSimplified {
    config: ThinConfig,
    registry: CoordinateRegistry,
    tables: Vec<Table>,
    load: LoadStats,
    edges: EdgeSet,
    topology: Vec<Vec<Vec<TopoPolygon>>>,
    coords_before: usize,
    coords_after: usize,
}

impl EdgesSimplified {
    /// The simplified edges.
    #[must_use]
    pub const fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    /// Rebuild every row's geometry from the simplified edges and advance
    /// to [`Thinned`].
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Reconstruction`] if an edge sequence no
    /// longer joins up, which indicates a bug.
    pub fn create_thinned_polygons(mut self) -> Result<Thinned, TopologyError> {
        let mut polygon_count = 0;
        let mut ring_count = 0;
        for (table, rows) in self.tables.iter_mut().zip(&self.topology) {
            for (row, polygons) in table.rows.iter_mut().zip(rows) {
                let rebuilt = polygons
                    .iter()
                    .map(|p| reconstruct_polygon(&self.edges, &p.exterior, &p.interiors))
                    .collect::<Result<Vec<_>, _>>()?;
                polygon_count += rebuilt.len();
                ring_count += polygons.iter().map(|p| 1 + p.interiors.len()).sum::<usize>();
                row.geometry = MultiPolygon::new(rebuilt);
            }
        }

        let coords_out = self
            .tables
            .iter()
            .flat_map(|t| &t.rows)
            .map(FeatureRow::coord_count)
            .sum();
        tracing::info!(
            polygons = polygon_count,
            rings = ring_count,
            coords_out,
            "created thinned polygons"
        );
        Ok(Thinned {
            registry: self.registry,
            tables: self.tables,
            load: self.load,
            edges: self.edges,
            polygon_count,
            ring_count,
            coords_out,
        })
    }
}

// ───────────────────────── Stage 4: Thinned ─────────────────────────

/// Final model state: every row holds its thinned geometry.
pub struct Thinned {
    registry: CoordinateRegistry,
    tables: Vec<Table>,
    load: LoadStats,
    edges: EdgeSet,
    polygon_count: usize,
    ring_count: usize,
    coords_out: usize,
}

impl Thinned {
    /// The thinned tables.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// The simplified edges every ring was rebuilt from.
    #[must_use]
    pub const fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    /// Row, coordinate, node and edge counts for the whole run.
    #[must_use]
    pub fn summary(&self) -> ThinSummary {
        ThinSummary {
            rows: self.load.rows,
            coords_in: self.registry.registered_count(),
            coords_out: self.coords_out,
            nodes: self.registry.node_count(),
            edges: self.edges.len(),
        }
    }

    /// Consume the model, returning the thinned tables.
    #[must_use]
    pub fn into_tables(self) -> Vec<Table> {
        self.tables
    }
}

// ────────────────────────── ThinPhase trait ─────────────────────────

/// Total number of phases, [`Loading`] through [`Thinned`].
pub const PHASE_COUNT: usize = 5;

/// Trait implemented by every model state, for uniform diagnostics.
pub trait ThinPhase: Sized {
    /// Human-readable name of the phase that produced this state.
    const NAME: &str;

    /// Zero-based index of this state (`0` for [`Loading`] through `4`
    /// for [`Thinned`]).
    const INDEX: usize;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> PhaseMetrics;

    /// Run all remaining phases.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError`] if any remaining phase fails.
    fn complete(self) -> Result<Thinned, TopologyError>;
}

impl ThinPhase for Loading {
    const NAME: &str = "load";
    const INDEX: usize = 0;

    fn metrics(&self) -> PhaseMetrics {
        let buckets = self.registry.bucket_stats();
        PhaseMetrics::Load {
            tables: self.tables.len(),
            rows: self.stats.rows,
            polygons: self.stats.polygons,
            rings: self.stats.rings,
            registered_coords: self.registry.registered_count(),
            unique_points: self.registry.point_count(),
            buckets: buckets.buckets,
            occupied_buckets: buckets.occupied,
            longest_bucket: buckets.longest,
        }
    }

    fn complete(self) -> Result<Thinned, TopologyError> {
        self.find_nodes()?.complete()
    }
}

impl ThinPhase for NodesFound {
    const NAME: &str = "nodes";
    const INDEX: usize = 1;

    fn metrics(&self) -> PhaseMetrics {
        PhaseMetrics::Nodes {
            unique_points: self.registry.point_count(),
            node_count: self.marked,
        }
    }

    fn complete(self) -> Result<Thinned, TopologyError> {
        self.create_edges()?.complete()
    }
}

impl ThinPhase for EdgesCreated {
    const NAME: &str = "edges";
    const INDEX: usize = 2;

    fn metrics(&self) -> PhaseMetrics {
        edge_metrics(&self.edges, self.stats, self.registry.node_count())
    }

    fn complete(self) -> Result<Thinned, TopologyError> {
        self.simplify_edges()?.complete()
    }
}

impl ThinPhase for EdgesSimplified {
    const NAME: &str = "simplify";
    const INDEX: usize = 3;

    fn metrics(&self) -> PhaseMetrics {
        simplify_metrics(&self.config, self.edges.len(), self.coords_before, self.coords_after)
    }

    fn complete(self) -> Result<Thinned, TopologyError> {
        self.create_thinned_polygons()
    }
}

impl ThinPhase for Thinned {
    const NAME: &str = "reconstruct";
    const INDEX: usize = 4;

    fn metrics(&self) -> PhaseMetrics {
        PhaseMetrics::Reconstruct {
            rows: self.load.rows,
            polygons: self.polygon_count,
            rings: self.ring_count,
            coords_out: self.coords_out,
        }
    }

    fn complete(self) -> Result<Thinned, TopologyError> {
        Ok(self)
    }
}

fn edge_metrics(edges: &EdgeSet, stats: EdgeStats, node_count: usize) -> PhaseMetrics {
    PhaseMetrics::Edges {
        edge_count: edges.len(),
        shared_edges: edges.shared_count(),
        closed_edges: edges.iter().filter(|(_, e)| e.is_closed()).count(),
        islands: stats.islands,
        fallback_rows: stats.fallback_rows,
        dropped_polygons: stats.dropped_polygons,
        node_count,
    }
}

#[allow(clippy::cast_precision_loss)]
fn simplify_metrics(
    config: &ThinConfig,
    edge_count: usize,
    coords_before: usize,
    coords_after: usize,
) -> PhaseMetrics {
    let reduction_ratio = if coords_before > 0 {
        1.0 - (coords_after as f64 / coords_before as f64)
    } else {
        0.0
    };
    PhaseMetrics::Simplify {
        simplifier: config.simplifier.name().to_string(),
        edge_count,
        coords_before,
        coords_after,
        reduction_ratio,
    }
}

// ───────────────────────── Entry point ──────────────────────────────

/// Topology-preserving thinning model.
///
/// Created via [`Topology::new`], which validates the config and returns
/// an empty [`Loading`] state.
pub struct Topology;

impl Topology {
    /// Start a new model.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidConfig`] if `config` fails
    /// [`ThinConfig::validate`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(config: ThinConfig) -> Result<Loading, TopologyError> {
        config.validate()?;
        Ok(Loading {
            registry: CoordinateRegistry::with_bucket_bits(config.bucket_bits),
            config,
            tables: Vec::new(),
            next_ring: 0,
            stats: LoadStats::default(),
        })
    }
}
