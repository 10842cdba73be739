//! FILENAME: pivot-engine/src/view.rs
//! Pivot View - The computed cross-tab handed to renderers.
//!
//! This module holds the output of one computation:
//! - `HeaderAxis`: a header tree stored as a pre-order vector; parent and
//!   children are indices into that same vector
//! - `PivotCell`: one aggregated (row, column, measure) intersection
//! - `PivotResult`: both axes, the sparse cell map and run metadata
//!
//! Consumers treat a result as read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::DefinitionSnapshot;
use crate::metrics::PerformanceMetrics;
use crate::value::PivotValue;

/// Index of a header within its axis.
pub type HeaderId = usize;

// ============================================================================
// HEADERS
// ============================================================================

/// What a header node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderKind {
    /// A distinct value of the field at this level.
    Group,
    /// Summary of its parent's branch, appended as the last child.
    Subtotal,
    /// Whole-dataset total, last root of the axis.
    GrandTotal,
    /// The only header of an axis without fields.
    AxisTotal,
}

/// One node of a row or column header tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderNode {
    /// Group value; `Empty` for the "(Empty)" group, the label text for totals.
    pub value: PivotValue,

    pub formatted_value: String,

    /// Field that produced the grouping. `None` for grand and axis totals.
    pub field_key: Option<String>,

    /// Depth in the tree (0 = root level).
    pub level: usize,

    pub kind: HeaderKind,

    pub is_row_axis: bool,

    /// Records grouped under this node.
    pub record_count: usize,

    pub parent: Option<HeaderId>,

    pub children: Vec<HeaderId>,
}

impl HeaderNode {
    pub fn is_subtotal(&self) -> bool {
        self.kind == HeaderKind::Subtotal
    }

    pub fn is_grand_total(&self) -> bool {
        self.kind == HeaderKind::GrandTotal
    }

    /// Subtotal, grand total or axis total.
    pub fn is_total(&self) -> bool {
        self.kind != HeaderKind::Group
    }

    pub fn label(&self) -> &str {
        &self.formatted_value
    }
}

/// A flattened header tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderAxis {
    pub is_row: bool,
    /// Pre-order: every parent precedes its children.
    pub nodes: Vec<HeaderNode>,
}

impl HeaderAxis {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: HeaderId) -> Option<&HeaderNode> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HeaderId, &HeaderNode)> {
        self.nodes.iter().enumerate()
    }

    /// Ids of the level-0 nodes, in order.
    pub fn roots(&self) -> Vec<HeaderId> {
        self.iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn grand_total(&self) -> Option<HeaderId> {
        self.nodes.iter().position(|n| n.is_grand_total())
    }

    /// The node followed by its ancestors, innermost first.
    pub fn ancestry(&self, id: HeaderId) -> Ancestry<'_> {
        Ancestry { axis: self, next: Some(id) }
    }

    /// Labels from the root down to `id`.
    pub fn path_labels(&self, id: HeaderId) -> Vec<&str> {
        let mut labels: Vec<&str> = self.ancestry(id).map(|(_, n)| n.label()).collect();
        labels.reverse();
        labels
    }

    /// Path segment string used in cell keys. Segments are joined with `/`.
    /// Group segments render the group value with a type tag (see
    /// `GroupKey::tagged`), so siblings with equal labels still differ; total
    /// segments are their label in brackets. `\ / | [` are escaped.
    pub fn path_key(&self, id: HeaderId) -> String {
        let mut segments: SmallVec<[String; 4]> = self
            .ancestry(id)
            .map(|(_, n)| {
                if n.is_total() {
                    format!("[{}]", escape_segment(n.label()))
                } else {
                    escape_segment(&n.value.group_key().tagged())
                }
            })
            .collect();
        segments.reverse();
        segments.join("/")
    }

    /// Finds a header by its label path, e.g. `["East", "Seattle"]`.
    pub fn find(&self, labels: &[&str]) -> Option<HeaderId> {
        self.iter()
            .find(|(id, _)| self.path_labels(*id) == labels)
            .map(|(id, _)| id)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestry<'a> {
    axis: &'a HeaderAxis,
    next: Option<HeaderId>,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = (HeaderId, &'a HeaderNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.axis.nodes.get(id)?;
        self.next = node.parent;
        Some((id, node))
    }
}

fn escape_segment(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if matches!(c, '\\' | '/' | '|' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Composite key of a cell: `rowPath|columnPath|measureKey`.
pub fn cell_key(rows: &HeaderAxis, row: HeaderId, columns: &HeaderAxis, column: HeaderId, measure_key: &str) -> String {
    format!("{}|{}|{}", rows.path_key(row), columns.path_key(column), measure_key)
}

// ============================================================================
// CELLS
// ============================================================================

/// A single aggregated intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotCell {
    pub value: PivotValue,
    pub formatted_value: String,
    pub measure_key: String,
    pub row: HeaderId,
    pub column: HeaderId,
    /// No record matched both headers.
    pub is_empty: bool,
    pub is_subtotal_row: bool,
    pub is_subtotal_column: bool,
    /// Either header is a grand total.
    pub is_grand_total: bool,
    pub record_count: usize,
}

// ============================================================================
// RESULT
// ============================================================================

/// Output of one pivot computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotResult {
    /// The configuration this result was computed from.
    pub definition: DefinitionSnapshot,

    pub rows: HeaderAxis,

    pub columns: HeaderAxis,

    /// Sparse cell map keyed by `cell_key`.
    pub cells: BTreeMap<String, PivotCell>,

    pub source_count: usize,

    pub filtered_count: usize,

    pub elapsed_ms: f64,

    pub warnings: Vec<String>,

    pub errors: Vec<String>,

    pub metrics: PerformanceMetrics,
}

impl PivotResult {
    pub fn cell(&self, row: HeaderId, column: HeaderId, measure_key: &str) -> Option<&PivotCell> {
        self.cells.get(&cell_key(&self.rows, row, &self.columns, column, measure_key))
    }

    /// Copy of a cached result carrying the timings of the call that
    /// fetched it instead of the run that computed it.
    pub fn served_from_cache(&self, filter_time_ms: f64, total_time_ms: f64) -> PivotResult {
        let mut result = self.clone();
        result.elapsed_ms = total_time_ms;
        result.metrics.filter_time_ms = filter_time_ms;
        result.metrics.hierarchy_time_ms = 0.0;
        result.metrics.aggregation_time_ms = 0.0;
        result.metrics.processing_time_ms = 0.0;
        result.metrics.total_time_ms = total_time_ms;
        result.metrics.cache_hit = true;
        result
    }

    /// Looks a cell up by header label paths.
    pub fn cell_at(&self, row_labels: &[&str], column_labels: &[&str], measure_key: &str) -> Option<&PivotCell> {
        let row = self.rows.find(row_labels)?;
        let column = self.columns.find(column_labels)?;
        self.cell(row, column, measure_key)
    }

    /// Cells in display order: rows outer, columns inner, measures innermost.
    pub fn cells_in_order(&self) -> Vec<&PivotCell> {
        let mut ordered = Vec::with_capacity(self.cells.len());
        for row in 0..self.rows.len() {
            for column in 0..self.columns.len() {
                for measure in &self.definition.value_fields {
                    if let Some(cell) = self.cell(row, column, &measure.key) {
                        ordered.push(cell);
                    }
                }
            }
        }
        ordered
    }
}
