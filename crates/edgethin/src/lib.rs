//! edgethin: topology-preserving thinning of polygons that share borders
//! (sans-IO).
//!
//! Simplifying each polygon of a set of adjoining regions on its own
//! opens gaps and slivers along their common borders, because each copy
//! of a border is thinned differently. This crate instead finds every
//! unique boundary arc once, simplifies it once, and rebuilds every
//! polygon from the simplified arcs:
//!
//! coordinate registry -> node classification -> edge extraction ->
//! per-edge simplification -> ring reconstruction.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! [`geo`] geometry and returns structured data. Reading and writing
//! batches lives in `edgethin-bench`.

pub mod diagnostics;
pub mod edge;
pub mod node;
pub mod reconstruct;
pub mod registry;
pub mod simplify;
pub mod topology;
pub mod types;

pub use edge::{Edge, EdgeSet, ExtractOutcome, RingEdge};
pub use registry::{CanonicalPoint, CoordinateRegistry};
pub use simplify::{EdgeSimplifier, SimplifierKind, SimplifyContext};
pub use topology::{Topology, TopoPolygon};
pub use types::{EdgeId, FeatureRow, PointId, RingId, Table, ThinConfig, TopologyError};

/// Thin every row of every table, keeping shared borders identical.
///
/// # Phases
///
/// 1. Register every coordinate of every ring
/// 2. Classify nodes, where ring membership changes
/// 3. Cut rings into unique edges between nodes
/// 4. Simplify each unique edge once
/// 5. Rebuild each row's multi-polygon from the simplified edges
///
/// Table and row order is preserved. Detached polygons follow
/// [`ThinConfig::keep_detached_islands`].
///
/// # Errors
///
/// Returns [`TopologyError::InvalidConfig`] if `config` is invalid.
/// Other variants indicate an internal inconsistency and abort the run.
pub fn thin(tables: Vec<Table>, config: &ThinConfig) -> Result<Vec<Table>, TopologyError> {
    let mut loading = Topology::new(config.clone())?;
    for table in tables {
        loading.add_table(table);
    }
    let thinned = loading
        .find_nodes()?
        .create_edges()?
        .simplify_edges()?
        .create_thinned_polygons()?;
    Ok(thinned.into_tables())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    #[test]
    fn thin_empty_batch() {
        let tables = thin(Vec::new(), &ThinConfig::default()).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn thin_rejects_invalid_config() {
        let config = ThinConfig {
            max_tolerance: -1.0,
            ..ThinConfig::default()
        };
        assert!(matches!(
            thin(Vec::new(), &config),
            Err(TopologyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn thin_preserves_table_and_row_order() {
        let square = |x: f64| {
            MultiPolygon::new(vec![polygon![
                (x: x, y: 0.0),
                (x: x + 1.0, y: 0.0),
                (x: x + 1.0, y: 1.0),
                (x: x, y: 1.0),
            ]])
        };
        let mut first = Table::new("first");
        first.rows.push(FeatureRow::new("b", "B", square(1.0)));
        first.rows.push(FeatureRow::new("a", "A", square(0.0)));
        let mut second = Table::new("second");
        second.rows.push(FeatureRow::new("c", "C", square(2.0)));

        let tables = thin(vec![first, second], &ThinConfig::default()).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        let codes: Vec<_> = tables[0].rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, ["b", "a"]);
        assert_eq!(tables[1].rows[0].name, "C");
    }
}
