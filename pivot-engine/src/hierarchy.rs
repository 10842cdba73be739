//! FILENAME: pivot-engine/src/hierarchy.rs
//! Hierarchy Builder - turns the filtered records into one header axis.
//!
//! Algorithm (run once for rows, once for columns):
//! 1. No fields: a single "Total" axis header covering every record
//! 2. Group recursively, one field per level, groups sorted ascending
//! 3. Bottom-up, append a "{label} Total" subtotal child to each branch node
//! 4. Append "Grand Total" after the roots when enabled
//! 5. Flatten the arena in pre-order, remapping parent/child indices

use log::debug;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::cache::SourceCache;
use crate::definition::{PivotField, PivotOptions};
use crate::error::PivotError;
use crate::value::{GroupKey, PivotValue};
use crate::view::{HeaderAxis, HeaderId, HeaderKind, HeaderNode};

pub const GRAND_TOTAL_LABEL: &str = "Grand Total";
pub const AXIS_TOTAL_LABEL: &str = "Total";

/// Builds one header axis.
pub struct HierarchyBuilder<'s, 'a, R> {
    source: &'s SourceCache<'a, R>,
    fields: &'s [PivotField<R>],
    options: &'s PivotOptions,
    is_row: bool,
    cancel: &'s CancellationToken,
    /// Nodes in creation order; indices are arena ids until flattening.
    arena: Vec<HeaderNode>,
}

impl<'s, 'a, R> HierarchyBuilder<'s, 'a, R> {
    pub fn new(
        source: &'s SourceCache<'a, R>,
        fields: &'s [PivotField<R>],
        options: &'s PivotOptions,
        is_row: bool,
        cancel: &'s CancellationToken,
    ) -> Self {
        HierarchyBuilder {
            source,
            fields,
            options,
            is_row,
            cancel,
            arena: Vec::new(),
        }
    }

    /// Executes the build and returns the flattened axis.
    pub fn build(mut self) -> Result<HeaderAxis, PivotError> {
        let total_records = self.source.len();

        if self.fields.is_empty() {
            let total = self.total_node(AXIS_TOTAL_LABEL, HeaderKind::AxisTotal, total_records);
            self.arena.push(total);
            return Ok(self.flatten(vec![0]));
        }

        let all: Vec<u32> = (0..total_records as u32).collect();
        let mut roots = self.build_level(0, &all, None)?;

        self.insert_subtotals();

        if self.options.enable_grand_totals && self.fields.iter().any(|f| f.descriptor.show_grand_total) {
            let grand = self.total_node(GRAND_TOTAL_LABEL, HeaderKind::GrandTotal, total_records);
            roots.push(self.arena.len());
            self.arena.push(grand);
        }

        let axis = self.flatten(roots);
        debug!(
            "built {} axis: {} headers over {} records",
            if axis.is_row { "row" } else { "column" },
            axis.len(),
            total_records
        );
        Ok(axis)
    }

    /// Recursively builds one level; returns the new node ids in sort order.
    fn build_level(
        &mut self,
        level: usize,
        indices: &[u32],
        parent: Option<HeaderId>,
    ) -> Result<Vec<HeaderId>, PivotError> {
        if self.cancel.is_cancelled() {
            return Err(PivotError::Cancelled);
        }

        let fields = self.fields;
        let field = &fields[level];
        let groups = {
            let values = self.source.values(field);
            let mut groups: FxHashMap<GroupKey, Vec<u32>> = FxHashMap::default();
            for &i in indices {
                let key = values
                    .get(i as usize)
                    .map_or(GroupKey::Empty, PivotValue::group_key);
                groups.entry(key).or_default().push(i);
            }
            let mut groups: Vec<(GroupKey, Vec<u32>)> = groups.into_iter().collect();
            groups.sort_by(|a, b| a.0.cmp(&b.0));
            groups
        };

        let is_leaf_level = level + 1 >= self.fields.len();
        let mut ids = Vec::with_capacity(groups.len());

        for (key, members) in groups {
            let value = key.to_value();
            let id = self.arena.len();
            self.arena.push(HeaderNode {
                formatted_value: field.header_label(&value),
                value,
                field_key: Some(field.key().to_string()),
                level,
                kind: HeaderKind::Group,
                is_row_axis: self.is_row,
                record_count: members.len(),
                parent,
                children: Vec::new(),
            });

            if !is_leaf_level {
                let children = self.build_level(level + 1, &members, Some(id))?;
                self.arena[id].children = children;
            }

            ids.push(id);
        }

        Ok(ids)
    }

    /// Appends a subtotal as the last child of every branch node.
    fn insert_subtotals(&mut self) {
        if !self.options.enable_subtotals {
            return;
        }
        let deepest = self.fields.len() - 1;

        // Reverse creation order visits children before their parents.
        for id in (0..self.arena.len()).rev() {
            let node = &self.arena[id];
            if node.kind != HeaderKind::Group || node.children.is_empty() || node.level >= deepest {
                continue;
            }
            let wants_subtotal = self.fields[node.level].descriptor.show_subtotals;
            if !wants_subtotal {
                continue;
            }

            let label = format!("{} Total", node.formatted_value);
            let subtotal = HeaderNode {
                value: PivotValue::Text(label.clone()),
                formatted_value: label,
                field_key: node.field_key.clone(),
                level: node.level + 1,
                kind: HeaderKind::Subtotal,
                is_row_axis: self.is_row,
                record_count: node.record_count,
                parent: Some(id),
                children: Vec::new(),
            };
            let subtotal_id = self.arena.len();
            self.arena.push(subtotal);
            self.arena[id].children.push(subtotal_id);
        }
    }

    fn total_node(&self, label: &str, kind: HeaderKind, record_count: usize) -> HeaderNode {
        HeaderNode {
            value: PivotValue::text(label),
            formatted_value: label.to_string(),
            field_key: None,
            level: 0,
            kind,
            is_row_axis: self.is_row,
            record_count,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Pre-order flattening with index remapping.
    fn flatten(self, roots: Vec<HeaderId>) -> HeaderAxis {
        let mut order: Vec<HeaderId> = Vec::with_capacity(self.arena.len());
        let mut stack: Vec<HeaderId> = roots.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.arena[id].children.iter().rev().copied());
        }

        let mut new_index = vec![0usize; self.arena.len()];
        for (position, &id) in order.iter().enumerate() {
            new_index[id] = position;
        }

        let mut slots: Vec<Option<HeaderNode>> = self.arena.into_iter().map(Some).collect();
        let nodes = order
            .iter()
            .filter_map(|&id| slots[id].take())
            .map(|mut node| {
                node.parent = node.parent.map(|p| new_index[p]);
                node.children = node.children.iter().map(|&c| new_index[c]).collect();
                node
            })
            .collect();

        HeaderAxis { is_row: self.is_row, nodes }
    }
}
