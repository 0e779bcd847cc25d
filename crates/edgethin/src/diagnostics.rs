//! Thinning diagnostics: timing and counts for each phase.
//!
//! [`thin_with_diagnostics`] runs the same phases as
//! [`thin`](crate::thin) and records how long each one took alongside
//! the counts that matter when tuning tolerances and bucket sizes.
//!
//! Durations use [`std::time::Duration`]. Timestamps are taken with the
//! `web-time` crate, which falls back to `std::time::Instant` on native
//! targets. Durations are serialized as fractional seconds (`f64`),
//! since `Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::topology::{ThinPhase, Topology};
use crate::types::{Table, ThinConfig, TopologyError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single thinning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinDiagnostics {
    /// Phase 1: registering every coordinate.
    pub load: PhaseDiagnostics,
    /// Phase 2: node classification.
    pub nodes: PhaseDiagnostics,
    /// Phase 3: edge extraction.
    pub edges: PhaseDiagnostics,
    /// Phase 4: per-edge simplification.
    pub simplify: PhaseDiagnostics,
    /// Phase 5: ring and polygon reconstruction.
    pub reconstruct: PhaseDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all phases.
    pub summary: ThinSummary,
}

/// Diagnostics for a single phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDiagnostics {
    /// Wall-clock duration of this phase (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Phase-specific metrics.
    pub metrics: PhaseMetrics,
}

/// Phase-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhaseMetrics {
    /// Coordinate registration.
    Load {
        /// Number of tables.
        tables: usize,
        /// Number of rows across all tables.
        rows: usize,
        /// Number of polygons across all rows.
        polygons: usize,
        /// Number of rings, exteriors and holes together.
        rings: usize,
        /// Coordinates registered, duplicates included.
        registered_coords: usize,
        /// Distinct canonical points.
        unique_points: usize,
        /// Buckets allocated by the registry.
        buckets: usize,
        /// Buckets holding at least one point.
        occupied_buckets: usize,
        /// Points in the fullest bucket.
        longest_bucket: usize,
    },
    /// Node classification.
    Nodes {
        /// Distinct canonical points.
        unique_points: usize,
        /// Points classified as nodes.
        node_count: usize,
    },
    /// Edge extraction.
    Edges {
        /// Unique edges.
        edge_count: usize,
        /// Edges traversed by more than one ring.
        shared_edges: usize,
        /// Edges starting and ending at the same node.
        closed_edges: usize,
        /// Rings promoted to a single-edge island.
        islands: usize,
        /// Rows where only the largest polygon survived.
        fallback_rows: usize,
        /// Detached polygons discarded.
        dropped_polygons: usize,
        /// Nodes, including those promoted for islands.
        node_count: usize,
    },
    /// Edge simplification.
    Simplify {
        /// Strategy name.
        simplifier: String,
        /// Edges simplified (each exactly once).
        edge_count: usize,
        /// Edge coordinates before simplification.
        coords_before: usize,
        /// Edge coordinates after simplification.
        coords_after: usize,
        /// Reduction ratio: `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Ring reconstruction.
    Reconstruct {
        /// Rows rebuilt.
        rows: usize,
        /// Polygons rebuilt.
        polygons: usize,
        /// Rings rebuilt.
        rings: usize,
        /// Coordinates in the thinned geometry.
        coords_out: usize,
    },
}

/// High-level counts for an entire run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinSummary {
    /// Rows processed.
    pub rows: usize,
    /// Coordinates in the source geometry.
    pub coords_in: usize,
    /// Coordinates in the thinned geometry.
    pub coords_out: usize,
    /// Points classified as nodes.
    pub nodes: usize,
    /// Unique edges.
    pub edges: usize,
}

impl ThinDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Thinning Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Rows: {}  |  Nodes: {}  |  Edges: {}",
            self.summary.rows, self.summary.nodes, self.summary.edges,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Phase", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.phases() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Coordinates: {} -> {}",
            self.summary.coords_in, self.summary.coords_out,
        ));

        lines.join("\n")
    }

    /// Each phase with its display name, in execution order.
    #[must_use]
    pub fn phases(&self) -> [(&'static str, &PhaseDiagnostics); 5] {
        [
            ("Load", &self.load),
            ("Find Nodes", &self.nodes),
            ("Create Edges", &self.edges),
            ("Simplify", &self.simplify),
            ("Reconstruct", &self.reconstruct),
        ]
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format phase metrics into a compact detail string.
fn format_metrics(metrics: &PhaseMetrics) -> String {
    match metrics {
        PhaseMetrics::Load {
            tables,
            rows,
            rings,
            registered_coords,
            unique_points,
            occupied_buckets,
            buckets,
            longest_bucket,
            ..
        } => format!(
            "{tables} tables, {rows} rows, {rings} rings, {registered_coords} coords -> {unique_points} points (buckets {occupied_buckets}/{buckets}, longest={longest_bucket})",
        ),
        PhaseMetrics::Nodes {
            unique_points,
            node_count,
        } => format!("{node_count} nodes of {unique_points} points"),
        PhaseMetrics::Edges {
            edge_count,
            shared_edges,
            closed_edges,
            islands,
            fallback_rows,
            dropped_polygons,
            ..
        } => format!(
            "{edge_count} edges ({shared_edges} shared, {closed_edges} closed), islands={islands} fallback={fallback_rows} dropped={dropped_polygons}",
        ),
        PhaseMetrics::Simplify {
            simplifier,
            coords_before,
            coords_after,
            reduction_ratio,
            ..
        } => format!(
            "{simplifier} {coords_before}->{coords_after} pts ({:.1}% reduction)",
            reduction_ratio * 100.0,
        ),
        PhaseMetrics::Reconstruct {
            polygons,
            rings,
            coords_out,
            ..
        } => format!("{polygons} polygons, {rings} rings, {coords_out} pts"),
    }
}

fn measure<S: ThinPhase>(started: Instant, stage: &S) -> PhaseDiagnostics {
    PhaseDiagnostics {
        duration: started.elapsed(),
        metrics: stage.metrics(),
    }
}

/// Thin `tables` like [`thin`](crate::thin), also returning per-phase
/// diagnostics.
///
/// # Errors
///
/// Returns [`TopologyError`] if any phase fails.
pub fn thin_with_diagnostics(
    tables: Vec<Table>,
    config: &ThinConfig,
) -> Result<(Vec<Table>, ThinDiagnostics), TopologyError> {
    let run_start = Instant::now();

    let t = Instant::now();
    let mut loading = Topology::new(config.clone())?;
    for table in tables {
        loading.add_table(table);
    }
    let load = measure(t, &loading);

    let t = Instant::now();
    let nodes_found = loading.find_nodes()?;
    let nodes = measure(t, &nodes_found);

    let t = Instant::now();
    let edges_created = nodes_found.create_edges()?;
    let edges = measure(t, &edges_created);

    let t = Instant::now();
    let simplified = edges_created.simplify_edges()?;
    let simplify = measure(t, &simplified);

    let t = Instant::now();
    let thinned = simplified.create_thinned_polygons()?;
    let reconstruct = measure(t, &thinned);

    let diagnostics = ThinDiagnostics {
        load,
        nodes,
        edges,
        simplify,
        reconstruct,
        total_duration: run_start.elapsed(),
        summary: thinned.summary(),
    };
    Ok((thinned.into_tables(), diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;
    use crate::types::FeatureRow;

    fn two_squares() -> Vec<Table> {
        let mut table = Table::new("regions");
        table.rows.push(FeatureRow::new(
            "1",
            "left",
            MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
            ]]),
        ));
        table.rows.push(FeatureRow::new(
            "2",
            "right",
            MultiPolygon::new(vec![polygon![
                (x: 1.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 1.0),
                (x: 1.0, y: 1.0),
            ]]),
        ));
        vec![table]
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        assert!((duration_ms(d) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_count_the_run() {
        let (tables, diag) = thin_with_diagnostics(two_squares(), &ThinConfig::default()).unwrap();
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(
            diag.summary,
            ThinSummary {
                rows: 2,
                coords_in: 10,
                coords_out: 10,
                nodes: 2,
                edges: 3,
            }
        );
        assert!(matches!(
            diag.load.metrics,
            PhaseMetrics::Load {
                registered_coords: 10,
                unique_points: 6,
                ..
            }
        ));
        assert!(diag.total_duration >= diag.load.duration);
    }

    #[test]
    fn report_lists_every_phase() {
        let (_, diag) = thin_with_diagnostics(two_squares(), &ThinConfig::default()).unwrap();
        let report = diag.report();
        assert!(report.contains("Thinning Diagnostics Report"));
        for (name, _) in diag.phases() {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("topology-preserving"));
    }

    #[test]
    fn diagnostics_serde_round_trip() {
        let (_, diag) = thin_with_diagnostics(two_squares(), &ThinConfig::default()).unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: ThinDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary, diag.summary);
        assert_eq!(back.simplify.metrics, diag.simplify.metrics);
    }

    #[test]
    fn invalid_config_fails_before_loading() {
        let config = ThinConfig {
            length_factor: f64::INFINITY,
            ..ThinConfig::default()
        };
        assert!(thin_with_diagnostics(two_squares(), &config).is_err());
    }
}
