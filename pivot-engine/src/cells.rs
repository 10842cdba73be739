//! FILENAME: pivot-engine/src/cells.rs
//! Cell Calculator - fills the cross-tab of two finished header axes.
//!
//! Each header gets the sorted list of record indices it covers:
//! - Group: its parent's records whose value equals the group value
//! - Subtotal: its parent's records (every ancestor above its own level)
//! - Grand and axis totals: every record
//!
//! A cell aggregates the intersection of its row and column lists.

use std::collections::BTreeMap;
use std::mem;

use tokio_util::sync::CancellationToken;

use crate::aggregate::{aggregate_indices, WarningLog};
use crate::cache::SourceCache;
use crate::definition::{PivotField, PivotOptions};
use crate::error::PivotError;
use crate::value::{GroupKey, PivotValue};
use crate::view::{cell_key, HeaderAxis, HeaderKind, PivotCell};

/// Record indices covered by every header of `axis`, indexed like its nodes.
pub fn header_members<R>(source: &SourceCache<'_, R>, axis: &HeaderAxis, fields: &[PivotField<R>]) -> Vec<Vec<u32>> {
    let all: Vec<u32> = (0..source.len() as u32).collect();
    let mut members: Vec<Vec<u32>> = Vec::with_capacity(axis.len());

    for node in &axis.nodes {
        let set = match node.kind {
            HeaderKind::GrandTotal | HeaderKind::AxisTotal => all.clone(),
            HeaderKind::Subtotal => node.parent.map_or_else(|| all.clone(), |p| members[p].clone()),
            HeaderKind::Group => {
                let scope = node.parent.map_or(all.as_slice(), |p| members[p].as_slice());
                match fields.get(node.level) {
                    Some(field) => {
                        let values = source.values(field);
                        let key = node.value.group_key();
                        scope
                            .iter()
                            .copied()
                            .filter(|&i| values.get(i as usize).is_some_and(|v| header_matches(&key, &node.value, v)))
                            .collect()
                    }
                    None => Vec::new(),
                }
            }
        };
        members.push(set);
    }

    members
}

/// Direct key equality, else equal text across differing value types.
fn header_matches(key: &GroupKey, header_value: &PivotValue, value: &PivotValue) -> bool {
    let candidate = value.group_key();
    if candidate == *key {
        return true;
    }
    if candidate.is_empty() || key.is_empty() || mem::discriminant(&candidate) == mem::discriminant(key) {
        return false;
    }
    value.to_text() == header_value.to_text()
}

/// Intersection of two ascending index lists.
pub fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Computes every cell of one pivot.
pub struct CellCalculator<'s, 'a, R> {
    source: &'s SourceCache<'a, R>,
    value_fields: &'s [PivotField<R>],
    options: &'s PivotOptions,
    cancel: &'s CancellationToken,
}

impl<'s, 'a, R> CellCalculator<'s, 'a, R> {
    pub fn new(
        source: &'s SourceCache<'a, R>,
        value_fields: &'s [PivotField<R>],
        options: &'s PivotOptions,
        cancel: &'s CancellationToken,
    ) -> Self {
        CellCalculator {
            source,
            value_fields,
            options,
            cancel,
        }
    }

    /// Rows outer, columns inner, measures innermost. Cells whose subset is
    /// empty are left out unless one of their headers is a total.
    pub fn calculate(
        &self,
        rows: &HeaderAxis,
        row_members: &[Vec<u32>],
        columns: &HeaderAxis,
        column_members: &[Vec<u32>],
        warnings: &mut WarningLog,
    ) -> Result<BTreeMap<String, PivotCell>, PivotError> {
        let mut cells = BTreeMap::new();

        for (row_id, row) in rows.iter() {
            for (col_id, column) in columns.iter() {
                let subset = intersect_sorted(&row_members[row_id], &column_members[col_id]);
                let keep = !subset.is_empty() || row.is_total() || column.is_total();

                for field in self.value_fields {
                    if self.cancel.is_cancelled() {
                        return Err(PivotError::Cancelled);
                    }
                    if !keep {
                        continue;
                    }

                    let value = aggregate_indices(
                        self.source,
                        field,
                        field.descriptor.aggregation,
                        &subset,
                        warnings,
                    );
                    let mut formatted_value = field.format(&value);
                    if value.is_blank() && formatted_value.is_empty() {
                        formatted_value = self.options.empty_cell_text.clone();
                    }

                    let key = cell_key(rows, row_id, columns, col_id, field.key());
                    cells.insert(
                        key,
                        PivotCell {
                            value,
                            formatted_value,
                            measure_key: field.key().to_string(),
                            row: row_id,
                            column: col_id,
                            is_empty: subset.is_empty(),
                            is_subtotal_row: row.is_subtotal(),
                            is_subtotal_column: column.is_subtotal(),
                            is_grand_total: row.is_grand_total() || column.is_grand_total(),
                            record_count: subset.len(),
                        },
                    );
                }
            }
        }

        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::PivotDefinition;
    use crate::hierarchy::HierarchyBuilder;

    type Sale = (&'static str, &'static str, f64);

    fn data() -> Vec<Sale> {
        vec![
            ("East", "Q1", 10.0),
            ("East", "Q2", 20.0),
            ("West", "Q1", 5.0),
        ]
    }

    fn definition() -> PivotDefinition<Sale> {
        PivotDefinition::new(1)
            .with_row(PivotField::dimension("region", "Region", |s: &Sale| PivotValue::text(s.0)))
            .with_column(PivotField::dimension("quarter", "Quarter", |s: &Sale| PivotValue::text(s.1)))
            .with_value(PivotField::measure("amount", "Amount", |s: &Sale| PivotValue::Number(s.2)))
    }

    #[test]
    fn number_header_matches_numeric_text() {
        let header = PivotValue::Number(1.0);
        let key = header.group_key();
        assert!(header_matches(&key, &header, &PivotValue::Number(1.0)));
        assert!(header_matches(&key, &header, &PivotValue::text("1")));
        assert!(!header_matches(&key, &header, &PivotValue::Number(2.0)));
        assert!(!header_matches(&key, &header, &PivotValue::Empty));
    }

    #[test]
    fn intersection_of_sorted_lists() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
        assert!(intersect_sorted(&[], &[1]).is_empty());
    }

    #[test]
    fn fills_groups_and_totals_but_skips_empty_intersections() {
        let records = data();
        let def = definition();
        let source = SourceCache::new(records.iter().collect(), &def);
        let cancel = CancellationToken::new();
        let rows = HierarchyBuilder::new(&source, &def.row_fields, &def.options, true, &cancel)
            .build()
            .unwrap();
        let columns = HierarchyBuilder::new(&source, &def.column_fields, &def.options, false, &cancel)
            .build()
            .unwrap();
        let row_members = header_members(&source, &rows, &def.row_fields);
        let column_members = header_members(&source, &columns, &def.column_fields);

        let mut warnings = WarningLog::new();
        let cells = CellCalculator::new(&source, &def.value_fields, &def.options, &cancel)
            .calculate(&rows, &row_members, &columns, &column_members, &mut warnings)
            .unwrap();

        // 3x3 grid minus West/Q2
        assert_eq!(cells.len(), 8);
        assert!(!cells.contains_key("t:West|t:Q2|amount"));
        assert_eq!(cells["t:East|t:Q2|amount"].value, PivotValue::Number(20.0));
        let corner = &cells["[Grand Total]|[Grand Total]|amount"];
        assert_eq!(corner.value, PivotValue::Number(35.0));
        assert!(corner.is_grand_total);
        assert_eq!(corner.record_count, 3);
        assert!(warnings.is_empty());
    }
}
