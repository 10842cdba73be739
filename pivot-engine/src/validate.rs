//! FILENAME: pivot-engine/src/validate.rs
//! Configuration checks run before any computation.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::definition::{AggregationType, PivotDefinition, SizeLimitPolicy};

/// Outcome of `validate`. `is_valid` is true exactly when `errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Checks a pivot configuration. Never panics; `None` is reported as an error.
pub fn validate<R>(definition: Option<&PivotDefinition<R>>) -> ValidationResult {
    let Some(definition) = definition else {
        return ValidationResult::from_parts(vec!["Pivot configuration is missing".to_string()], Vec::new());
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if definition.value_fields.is_empty() {
        errors.push("At least one measure (value field) is required".to_string());
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut reported: FxHashSet<&str> = FxHashSet::default();

    for field in definition.all_fields() {
        let key = field.key();
        if key.trim().is_empty() {
            errors.push(format!("Field '{}' has an empty key", field.name()));
            continue;
        }
        if !seen.insert(key) && reported.insert(key) {
            errors.push(format!("Duplicate field key '{}'", key));
        }

        if field.is_calculated() {
            if !field.has_compute() {
                errors.push(format!("Calculated field '{}' has no computation", key));
            }
        } else if !field.has_extractor() {
            errors.push(format!("Field '{}' has no value extractor", key));
        }

        let aggregation = field.descriptor.aggregation;
        if !field.supports(aggregation) {
            warnings.push(format!(
                "Field '{}' uses {} which is not in its supported aggregations",
                key,
                aggregation.label()
            ));
        }
        if aggregation == AggregationType::Custom && field.custom_aggregate().is_none() {
            warnings.push(format!(
                "Field '{}' requests a custom aggregation but none is attached; Sum will be used",
                key
            ));
        }

        let descriptor = &field.descriptor;
        let overlaps = descriptor
            .include_values
            .iter()
            .any(|inc| descriptor.exclude_values.iter().any(|exc| inc.matches(exc)));
        if overlaps {
            warnings.push(format!(
                "Field '{}' has values that are both included and excluded",
                key
            ));
        }
    }

    let limit = definition.options.max_cells;
    if limit == 0 {
        errors.push("Maximum cell count must be greater than zero".to_string());
    } else {
        let estimate = definition.estimated_cell_count();
        if estimate > limit {
            let message = format!(
                "Estimated {} cells exceeds the limit of {}",
                estimate, limit
            );
            match definition.options.size_limit {
                SizeLimitPolicy::Warn => warnings.push(message),
                SizeLimitPolicy::Reject => errors.push(message),
            }
        }
    }

    ValidationResult::from_parts(errors, warnings)
}
