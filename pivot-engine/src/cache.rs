//! FILENAME: pivot-engine/src/cache.rs
//! Source Cache - the per-computation view of the filtered records.
//!
//! The cache is designed for:
//! - Extracting each field's value at most once per record
//! - Lazy extraction: a column is only built when a stage asks for it
//! - Content fingerprinting for the result cache key
//!
//! Columns are indexed like `records`: `values(field)[i]` belongs to
//! `records()[i]`.

use std::borrow::Cow;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use rustc_hash::{FxHashMap, FxHasher};

use crate::definition::{PivotDefinition, PivotField};
use crate::value::PivotValue;

/// Filtered records plus memoized value columns.
pub struct SourceCache<'a, R> {
    records: Vec<&'a R>,
    columns: FxHashMap<String, OnceLock<Vec<PivotValue>>>,
}

impl<'a, R> SourceCache<'a, R> {
    /// Creates a cache with a lazy column slot for every field of the definition.
    pub fn new(records: Vec<&'a R>, definition: &PivotDefinition<R>) -> Self {
        Self::with_fields(records, definition.all_fields())
    }

    pub fn with_fields<'f>(records: Vec<&'a R>, fields: impl Iterator<Item = &'f PivotField<R>>) -> Self
    where
        R: 'f,
    {
        let columns = fields
            .map(|f| (f.key().to_string(), OnceLock::new()))
            .collect();
        SourceCache { records, columns }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[&'a R] {
        &self.records
    }

    /// The field's value for every record, extracted on first use.
    /// Fields unknown to the cache are extracted without memoization.
    pub fn values(&self, field: &PivotField<R>) -> Cow<'_, [PivotValue]> {
        match self.columns.get(field.key()) {
            Some(slot) => Cow::Borrowed(slot.get_or_init(|| self.extract(field)).as_slice()),
            None => Cow::Owned(self.extract(field)),
        }
    }

    /// Records at the given indices, in index order.
    pub fn subset(&self, indices: &[u32]) -> Vec<&'a R> {
        indices
            .iter()
            .filter_map(|&i| self.records.get(i as usize).copied())
            .collect()
    }

    /// Hash of every field's values over the filtered records.
    pub fn content_hash(&self, definition: &PivotDefinition<R>) -> u64 {
        let mut hasher = FxHasher::default();
        self.records.len().hash(&mut hasher);
        for field in definition.all_fields() {
            field.key().hash(&mut hasher);
            for value in self.values(field).iter() {
                value.group_key().hash(&mut hasher);
                if let PivotValue::Text(s) = value {
                    s.hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }

    fn extract(&self, field: &PivotField<R>) -> Vec<PivotValue> {
        self.records.iter().map(|r| field.value_of(r)).collect()
    }
}
