//! FILENAME: pivot-engine/src/metrics.rs
//! Performance metrics recorded for each computation and stored in its result.

use std::mem::size_of;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::PivotValue;
use crate::view::{HeaderAxis, HeaderNode, PivotCell};

/// Phase timings and size figures of one computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub source_count: usize,
    pub filtered_count: usize,
    pub filter_time_ms: f64,
    pub hierarchy_time_ms: f64,
    pub aggregation_time_ms: f64,
    /// Hierarchy plus aggregation.
    pub processing_time_ms: f64,
    pub total_time_ms: f64,
    pub row_header_count: usize,
    pub column_header_count: usize,
    pub cell_count: usize,
    /// Approximate heap footprint of the headers and cells.
    pub estimated_memory_bytes: usize,
    /// The result came from the result cache; hierarchy and aggregation
    /// times are zero and the counts describe the cached run.
    #[serde(default)]
    pub cache_hit: bool,
}

pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn value_bytes(value: &PivotValue) -> usize {
    match value {
        PivotValue::Text(s) => s.capacity(),
        _ => 0,
    }
}

fn node_bytes(node: &HeaderNode) -> usize {
    size_of::<HeaderNode>()
        + value_bytes(&node.value)
        + node.formatted_value.capacity()
        + node.field_key.as_ref().map_or(0, String::capacity)
        + node.children.capacity() * size_of::<usize>()
}

/// Estimates the memory held by a result's headers and cells.
pub fn estimate_memory<'a>(
    rows: &HeaderAxis,
    columns: &HeaderAxis,
    cells: impl Iterator<Item = (&'a String, &'a PivotCell)>,
) -> usize {
    let headers: usize = rows.nodes.iter().chain(columns.nodes.iter()).map(node_bytes).sum();
    let cells: usize = cells
        .map(|(key, cell)| {
            key.capacity()
                + size_of::<PivotCell>()
                + value_bytes(&cell.value)
                + cell.formatted_value.capacity()
                + cell.measure_key.capacity()
        })
        .sum();
    headers + cells
}
