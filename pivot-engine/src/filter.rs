//! FILENAME: pivot-engine/src/filter.rs
//! Filter Stage - reduces the source records before grouping.
//!
//! Every row, column and filter field may carry an include list, an exclude
//! list and a search string. They combine as logical AND, across fields and
//! within a field. The source slice is never modified.

use crate::definition::{FieldDescriptor, PivotDefinition, PivotField};
use crate::value::PivotValue;

/// Returns references to the records that pass every field filter.
pub fn apply_filters<'a, R>(records: &'a [R], definition: &PivotDefinition<R>) -> Vec<&'a R> {
    let active: Vec<(&PivotField<R>, Option<String>)> = definition
        .filterable_fields()
        .filter(|f| f.descriptor.has_filter())
        .map(|f| (f, normalized_search(&f.descriptor)))
        .collect();

    if active.is_empty() {
        return records.iter().collect();
    }

    records
        .iter()
        .filter(|record| {
            active.iter().all(|(field, search)| {
                let value = field.value_of(record);
                value_passes(&field.descriptor, search.as_deref(), &value)
            })
        })
        .collect()
}

/// Checks one value against one field's include/exclude/search settings.
/// `search` must already be lowercased.
pub fn value_passes(descriptor: &FieldDescriptor, search: Option<&str>, value: &PivotValue) -> bool {
    if !descriptor.include_values.is_empty()
        && !descriptor.include_values.iter().any(|v| v.matches(value))
    {
        return false;
    }

    if descriptor.exclude_values.iter().any(|v| v.matches(value)) {
        return false;
    }

    match search {
        Some(needle) => value.to_text().to_lowercase().contains(needle),
        None => true,
    }
}

fn normalized_search(descriptor: &FieldDescriptor) -> Option<String> {
    descriptor
        .search
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
