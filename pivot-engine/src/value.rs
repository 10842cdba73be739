//! FILENAME: pivot-engine/src/value.rs
//! Pivot Values - The tagged scalar produced by every field extractor.
//!
//! Records are opaque to the engine; fields turn them into `PivotValue`s.
//! This module defines:
//! - `PivotValue`: the value itself plus its total numeric coercion rules
//! - `GroupKey`: a hashable, totally ordered projection used for grouping
//! - `OrderedFloat`: f64 wrapper that implements Eq/Ord/Hash

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::format::format_general;

/// Label used for the group that collects null/blank values.
pub const EMPTY_LABEL: &str = "(Empty)";

// ============================================================================
// PIVOT VALUE
// ============================================================================

/// A single scalar value extracted from a source record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PivotValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Boolean(bool),
}

impl PivotValue {
    pub fn text(s: impl Into<String>) -> Self {
        PivotValue::Text(s.into())
    }

    /// True for `Empty` and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            PivotValue::Empty => true,
            PivotValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric coercion used by aggregation.
    ///
    /// Returns `None` when the value has no numeric reading. Blank values
    /// also return `None`; callers decide whether that is worth a warning.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PivotValue::Number(n) if n.is_nan() => None,
            PivotValue::Number(n) => Some(*n),
            PivotValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            PivotValue::Text(s) => parse_numeric_text(s),
            PivotValue::Empty | PivotValue::Date(_) => None,
        }
    }

    /// Plain text conversion (no format string applied).
    pub fn to_text(&self) -> String {
        match self {
            PivotValue::Empty => String::new(),
            PivotValue::Number(n) => format_general(*n),
            PivotValue::Text(s) => s.clone(),
            PivotValue::Date(d) => {
                if d.num_seconds_from_midnight() == 0 && d.nanosecond() == 0 {
                    d.format("%Y-%m-%d").to_string()
                } else {
                    d.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            PivotValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    /// Projects the value onto its grouping key. Blank values collapse
    /// into `GroupKey::Empty`.
    pub fn group_key(&self) -> GroupKey {
        if self.is_blank() {
            return GroupKey::Empty;
        }
        match self {
            PivotValue::Number(n) => GroupKey::Number(OrderedFloat(*n)),
            PivotValue::Text(s) => GroupKey::Text(s.clone()),
            PivotValue::Date(d) => GroupKey::Date(*d),
            PivotValue::Boolean(b) => GroupKey::Boolean(*b),
            PivotValue::Empty => GroupKey::Empty,
        }
    }

    /// Equality used for header matching and value-list filters:
    /// direct comparison first, then the textual forms.
    pub fn matches(&self, other: &PivotValue) -> bool {
        let (a_blank, b_blank) = (self.is_blank(), other.is_blank());
        if a_blank || b_blank {
            return a_blank && b_blank;
        }
        self.group_key() == other.group_key() || self.to_text() == other.to_text()
    }

    /// Deterministic total order used for header sorting.
    pub fn compare(&self, other: &PivotValue) -> Ordering {
        self.group_key().cmp(&other.group_key())
    }
}

impl fmt::Display for PivotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Parses text as a number: trims, drops `,` thousands separators and
/// reads a trailing `%` as a percentage.
fn parse_numeric_text(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (body, scale) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), 0.01),
        None => (trimmed, 1.0),
    };
    let cleaned: String = body.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
        .map(|n| n * scale)
}

impl From<f64> for PivotValue {
    fn from(value: f64) -> Self {
        PivotValue::Number(value)
    }
}

impl From<i64> for PivotValue {
    fn from(value: i64) -> Self {
        PivotValue::Number(value as f64)
    }
}

impl From<i32> for PivotValue {
    fn from(value: i32) -> Self {
        PivotValue::Number(value as f64)
    }
}

impl From<u32> for PivotValue {
    fn from(value: u32) -> Self {
        PivotValue::Number(value as f64)
    }
}

impl From<bool> for PivotValue {
    fn from(value: bool) -> Self {
        PivotValue::Boolean(value)
    }
}

impl From<&str> for PivotValue {
    fn from(value: &str) -> Self {
        PivotValue::Text(value.to_string())
    }
}

impl From<String> for PivotValue {
    fn from(value: String) -> Self {
        PivotValue::Text(value)
    }
}

impl From<NaiveDateTime> for PivotValue {
    fn from(value: NaiveDateTime) -> Self {
        PivotValue::Date(value)
    }
}

impl From<NaiveDate> for PivotValue {
    fn from(value: NaiveDate) -> Self {
        PivotValue::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<PivotValue>> From<Option<T>> for PivotValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PivotValue::Empty, Into::into)
    }
}

// ============================================================================
// GROUP KEY
// ============================================================================

/// Hashable projection of a `PivotValue`.
///
/// Variant order defines the cross-type sort order:
/// Empty < Number < Date < Text < Boolean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupKey {
    Empty,
    Number(OrderedFloat),
    Date(NaiveDateTime),
    Text(String),
    Boolean(bool),
}

impl GroupKey {
    pub fn is_empty(&self) -> bool {
        matches!(self, GroupKey::Empty)
    }

    /// Type-tagged text that differs for every distinct key, whatever the
    /// display format: `e:`, `n:1.2`, `d:2024-03-09 00:00:00`, `t:East`,
    /// `b:true`.
    pub fn tagged(&self) -> String {
        match self {
            GroupKey::Empty => "e:".to_string(),
            GroupKey::Number(n) => format!("n:{}", n.0),
            GroupKey::Date(d) => format!("d:{}", d),
            GroupKey::Text(s) => format!("t:{}", s),
            GroupKey::Boolean(b) => format!("b:{}", b),
        }
    }

    pub fn to_value(&self) -> PivotValue {
        match self {
            GroupKey::Empty => PivotValue::Empty,
            GroupKey::Number(n) => PivotValue::Number(n.0),
            GroupKey::Date(d) => PivotValue::Date(*d),
            GroupKey::Text(s) => PivotValue::Text(s.clone()),
            GroupKey::Boolean(b) => PivotValue::Boolean(*b),
        }
    }
}

// ============================================================================
// ORDERED FLOAT
// ============================================================================

/// Wrapper around f64 that implements Eq, Ord and Hash.
/// NaN values are equal to each other; -0.0 and 0.0 are the same key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl OrderedFloat {
    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            Ordering::Equal
        } else {
            self.0.total_cmp(&other.0)
        }
    }
}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}
