//! FILENAME: pivot-engine/src/aggregate.rs
//! Aggregation Engine - reduces a record subset to one value for one measure.
//!
//! Numeric kinds run through `AggregateAccumulator` (single pass, Welford
//! variance). `Custom` hands the raw records to the field's closure.
//! Every failure is recovered locally: the cell gets an empty or zero value
//! and a warning is recorded.

use log::warn;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::cache::SourceCache;
use crate::definition::{AggregationType, PivotField};
use crate::value::PivotValue;

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for computing aggregates incrementally.
/// Stores intermediate state needed for all numeric aggregation types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateAccumulator {
    pub sum: f64,
    /// Every record seen, whatever its value.
    pub count: u64,
    pub count_numbers: u64,
    /// Non-blank values with no numeric reading.
    pub unconvertible: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub product: f64,
    pub has_product: bool,
    /// For variance/stddev: sum of squared differences from mean.
    pub m2: f64,
    pub mean: f64,
}

impl Default for AggregateAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        AggregateAccumulator {
            sum: 0.0,
            count: 0,
            count_numbers: 0,
            unconvertible: 0,
            min: None,
            max: None,
            product: 1.0,
            has_product: false,
            m2: 0.0,
            mean: 0.0,
        }
    }

    /// Adds one record's value.
    pub fn add(&mut self, value: &PivotValue) {
        self.count += 1;
        match value.as_number() {
            Some(n) => self.add_number(n),
            None if !value.is_blank() => self.unconvertible += 1,
            None => {}
        }
    }

    fn add_number(&mut self, value: f64) {
        self.count_numbers += 1;
        self.sum += value;

        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));

        if self.has_product {
            self.product *= value;
        } else {
            self.has_product = true;
            self.product = value;
        }

        // Welford's algorithm for variance
        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Computes the final aggregate value. `Custom` is not numeric and
    /// falls back to `Sum` here.
    pub fn compute(&self, aggregation: AggregationType) -> PivotValue {
        let n = self.count_numbers as f64;
        let number = match aggregation {
            AggregationType::Sum | AggregationType::Custom => self.sum,
            AggregationType::Count => self.count as f64,
            AggregationType::CountNumbers => n,
            AggregationType::Average => {
                if self.count > 0 {
                    self.sum / (self.count as f64)
                } else {
                    0.0
                }
            }
            AggregationType::Min => return self.min.map_or(PivotValue::Empty, PivotValue::Number),
            AggregationType::Max => return self.max.map_or(PivotValue::Empty, PivotValue::Number),
            AggregationType::Product => {
                if self.has_product {
                    self.product
                } else {
                    0.0
                }
            }
            AggregationType::Var => {
                if self.count_numbers > 1 {
                    self.m2 / (n - 1.0)
                } else {
                    0.0
                }
            }
            AggregationType::VarP => {
                if self.count_numbers > 0 {
                    self.m2 / n
                } else {
                    0.0
                }
            }
            AggregationType::StdDev => {
                if self.count_numbers > 1 {
                    (self.m2 / (n - 1.0)).sqrt()
                } else {
                    0.0
                }
            }
            AggregationType::StdDevP => {
                if self.count_numbers > 0 {
                    (self.m2 / n).sqrt()
                } else {
                    0.0
                }
            }
        };
        PivotValue::Number(number)
    }
}

// ============================================================================
// WARNINGS
// ============================================================================

/// Deduplicated, ordered warning list. Each new message is logged once.
#[derive(Debug, Default, Clone)]
pub struct WarningLog {
    messages: Vec<String>,
    seen: FxHashSet<String>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: String) {
        if self.seen.insert(message.clone()) {
            warn!("{}", message);
            self.messages.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

// ============================================================================
// AGGREGATION ENTRY POINTS
// ============================================================================

/// Aggregates the records at `indices` of the source cache.
pub fn aggregate_indices<R>(
    source: &SourceCache<'_, R>,
    field: &PivotField<R>,
    aggregation: AggregationType,
    indices: &[u32],
    warnings: &mut WarningLog,
) -> PivotValue {
    if !field.supports(aggregation) {
        warnings.push(format!(
            "Field '{}' does not list {} as a supported aggregation; computing it anyway",
            field.key(),
            aggregation.label()
        ));
    }

    if aggregation == AggregationType::Custom {
        match field.custom_aggregate() {
            Some(custom) => {
                let subset = source.subset(indices);
                return match custom(subset.as_slice()) {
                    Ok(value) => value,
                    Err(e) => {
                        warnings.push(format!(
                            "Custom aggregation for field '{}' failed: {}",
                            field.key(),
                            e
                        ));
                        PivotValue::Empty
                    }
                };
            }
            None => warnings.push(format!(
                "Field '{}' requests a custom aggregation but has none; using Sum",
                field.key()
            )),
        }
    }

    let values = source.values(field);
    let mut acc = AggregateAccumulator::new();
    for &i in indices {
        if let Some(value) = values.get(i as usize) {
            acc.add(value);
        }
    }

    if acc.unconvertible > 0 && counts_numeric_values(aggregation) {
        warnings.push(format!(
            "Field '{}' has values that could not be converted to a number; they were treated as 0",
            field.key()
        ));
    }

    acc.compute(aggregation)
}

/// Standalone aggregation over a whole record slice.
pub fn aggregate<R>(records: &[R], field: &PivotField<R>, aggregation: AggregationType) -> PivotValue {
    let source = SourceCache::with_fields(records.iter().collect(), std::iter::once(field));
    let indices: Vec<u32> = (0..source.len() as u32).collect();
    let mut warnings = WarningLog::new();
    aggregate_indices(&source, field, aggregation, &indices, &mut warnings)
}

fn counts_numeric_values(aggregation: AggregationType) -> bool {
    !matches!(aggregation, AggregationType::Count)
}
