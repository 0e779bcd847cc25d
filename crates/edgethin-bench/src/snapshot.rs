//! JSON batch snapshots: the tables of one thinning run.
//!
//! ```json
//! { "tables": [ { "name": "regions", "rows": [
//!     { "code": "1", "name": "North", "geometry": [ ... ] }
//! ] } ] }
//! ```
//!
//! `geometry` uses the `geo` serde layout for `MultiPolygon`.

use std::path::Path;

use edgethin::Table;
use serde::{Deserialize, Serialize};

/// A batch of tables as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tables in processing order.
    pub tables: Vec<Table>,
}

impl Snapshot {
    /// Total rows across all tables.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Total coordinates across all rows.
    #[must_use]
    pub fn coord_count(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|t| &t.rows)
            .map(edgethin::FeatureRow::coord_count)
            .sum()
    }
}

/// Read a snapshot from a JSON file.
pub fn read(path: &Path) -> Result<Snapshot, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

/// Write a snapshot as pretty-printed JSON, returning the byte count.
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<usize, String> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| format!("Error serializing snapshot: {e}"))?;
    std::fs::write(path, &json).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    Ok(json.len())
}
