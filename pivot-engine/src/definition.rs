//! FILENAME: pivot-engine/src/definition.rs
//! Pivot Definition - What the pivot table IS.
//!
//! This module contains all the types needed to DESCRIBE a pivot:
//! - `PivotField<R>`: one dimension or measure, with its extractor closures
//! - `PivotDefinition<R>`: the four field areas plus global options
//! - `FieldDescriptor` / `DefinitionSnapshot`: the closure-free, serializable
//!   image of the above, stored in every result and usable to rebuild a
//!   definition over `DataRecord`s

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::format::format_with_pattern;
use crate::value::{PivotValue, EMPTY_LABEL};

/// Unique identifier for a pivot definition.
pub type PivotId = u32;

/// Generic record type: a field key to value map.
pub type DataRecord = FxHashMap<String, PivotValue>;

/// Extracts (or computes) one value from a record.
pub type ExtractFn<R> = Arc<dyn Fn(&R) -> PivotValue + Send + Sync>;

/// Aggregates a record subset into a single value.
pub type CustomAggregateFn<R> = Arc<dyn Fn(&[&R]) -> Result<PivotValue, String> + Send + Sync>;

/// Renders a value as display text.
pub type FormatFn = Arc<dyn Fn(&PivotValue) -> String + Send + Sync>;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for measure fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AggregationType {
    #[default]
    Sum,
    Count,
    Average,
    Min,
    Max,
    Custom,
    CountNumbers,
    Product,
    StdDev,
    StdDevP,
    Var,
    VarP,
}

impl AggregationType {
    /// Every kind that works on numeric coercion alone.
    pub const NUMERIC: [AggregationType; 11] = [
        AggregationType::Sum,
        AggregationType::Count,
        AggregationType::Average,
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::CountNumbers,
        AggregationType::Product,
        AggregationType::StdDev,
        AggregationType::StdDevP,
        AggregationType::Var,
        AggregationType::VarP,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AggregationType::Sum => "Sum",
            AggregationType::Count => "Count",
            AggregationType::Average => "Average",
            AggregationType::Min => "Min",
            AggregationType::Max => "Max",
            AggregationType::Custom => "Custom",
            AggregationType::CountNumbers => "Count Numbers",
            AggregationType::Product => "Product",
            AggregationType::StdDev => "StdDev",
            AggregationType::StdDevP => "StdDevP",
            AggregationType::Var => "Var",
            AggregationType::VarP => "VarP",
        }
    }
}

// ============================================================================
// FIELD DESCRIPTOR
// ============================================================================

/// Role of a field in the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldKind {
    #[default]
    Dimension,
    Measure,
    Calculated,
    Filter,
}

/// Data type tag; drives the default display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Text,
    Number,
    Currency,
    Percentage,
    Date,
    DateTime,
    Boolean,
    Custom,
}

impl DataType {
    /// Format string used when the field does not set one.
    pub fn default_format(&self) -> Option<&'static str> {
        match self {
            DataType::Currency => Some("C2"),
            DataType::Percentage => Some("P2"),
            DataType::Date => Some("%Y-%m-%d"),
            DataType::DateTime => Some("%Y-%m-%d %H:%M:%S"),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The serializable part of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Unique key across the whole definition.
    pub key: String,

    /// Display name (e.g., "Sum of Sales").
    pub name: String,

    #[serde(default)]
    pub kind: FieldKind,

    #[serde(default)]
    pub data_type: DataType,

    /// Aggregation used when the field sits in the data area.
    #[serde(default)]
    pub aggregation: AggregationType,

    /// Aggregations this field advertises. Others still run (fail-soft).
    #[serde(default)]
    pub supported_aggregations: Vec<AggregationType>,

    /// Number format string (e.g., "N2", "#,##0.00", "0%") or strftime pattern.
    #[serde(default)]
    pub format: Option<String>,

    /// Text shown for empty values.
    #[serde(default)]
    pub empty_text: String,

    /// Keep only records whose value is in this list (when non-empty).
    #[serde(default)]
    pub include_values: Vec<PivotValue>,

    /// Drop records whose value is in this list.
    #[serde(default)]
    pub exclude_values: Vec<PivotValue>,

    /// Case-insensitive substring filter.
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default = "default_true")]
    pub show_subtotals: bool,

    #[serde(default = "default_true")]
    pub show_grand_total: bool,

    /// Keys a calculated field reads.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(key: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        let supported_aggregations = match kind {
            FieldKind::Measure | FieldKind::Calculated => AggregationType::NUMERIC.to_vec(),
            FieldKind::Dimension | FieldKind::Filter => vec![AggregationType::Count],
        };
        let aggregation = match kind {
            FieldKind::Measure | FieldKind::Calculated => AggregationType::Sum,
            FieldKind::Dimension | FieldKind::Filter => AggregationType::Count,
        };
        FieldDescriptor {
            key: key.into(),
            name: name.into(),
            kind,
            data_type: DataType::Text,
            aggregation,
            supported_aggregations,
            format: None,
            empty_text: String::new(),
            include_values: Vec::new(),
            exclude_values: Vec::new(),
            search: None,
            show_subtotals: true,
            show_grand_total: true,
            depends_on: Vec::new(),
        }
    }

    pub fn has_filter(&self) -> bool {
        !self.include_values.is_empty()
            || !self.exclude_values.is_empty()
            || self.search.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// ============================================================================
// PIVOT FIELD
// ============================================================================

/// A field bound to a record type through closures.
pub struct PivotField<R> {
    pub descriptor: FieldDescriptor,
    extractor: Option<ExtractFn<R>>,
    compute: Option<ExtractFn<R>>,
    custom_aggregate: Option<CustomAggregateFn<R>>,
    formatter: Option<FormatFn>,
}

impl<R> Clone for PivotField<R> {
    fn clone(&self) -> Self {
        PivotField {
            descriptor: self.descriptor.clone(),
            extractor: self.extractor.clone(),
            compute: self.compute.clone(),
            custom_aggregate: self.custom_aggregate.clone(),
            formatter: self.formatter.clone(),
        }
    }
}

impl<R> fmt::Debug for PivotField<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PivotField")
            .field("descriptor", &self.descriptor)
            .field("has_extractor", &self.extractor.is_some())
            .field("has_compute", &self.compute.is_some())
            .field("has_custom_aggregate", &self.custom_aggregate.is_some())
            .field("has_formatter", &self.formatter.is_some())
            .finish()
    }
}

impl<R> PivotField<R> {
    /// A field with no closures attached yet.
    pub fn new(descriptor: FieldDescriptor) -> Self {
        PivotField {
            descriptor,
            extractor: None,
            compute: None,
            custom_aggregate: None,
            formatter: None,
        }
    }

    pub fn dimension(
        key: impl Into<String>,
        name: impl Into<String>,
        extractor: impl Fn(&R) -> PivotValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(FieldDescriptor::new(key, name, FieldKind::Dimension)).with_extractor(extractor)
    }

    pub fn measure(
        key: impl Into<String>,
        name: impl Into<String>,
        extractor: impl Fn(&R) -> PivotValue + Send + Sync + 'static,
    ) -> Self {
        let mut field = Self::new(FieldDescriptor::new(key, name, FieldKind::Measure))
            .with_extractor(extractor);
        field.descriptor.data_type = DataType::Number;
        field
    }

    pub fn filter(
        key: impl Into<String>,
        name: impl Into<String>,
        extractor: impl Fn(&R) -> PivotValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(FieldDescriptor::new(key, name, FieldKind::Filter)).with_extractor(extractor)
    }

    /// A calculated field: `compute` derives the value from the record,
    /// reading the fields named in `depends_on`.
    pub fn calculated(
        key: impl Into<String>,
        name: impl Into<String>,
        depends_on: &[&str],
        compute: impl Fn(&R) -> PivotValue + Send + Sync + 'static,
    ) -> Self {
        let mut field = Self::new(FieldDescriptor::new(key, name, FieldKind::Calculated));
        field.descriptor.data_type = DataType::Number;
        field.descriptor.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
        field.compute = Some(Arc::new(compute));
        field
    }

    pub fn with_extractor(mut self, extractor: impl Fn(&R) -> PivotValue + Send + Sync + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn with_compute(mut self, compute: impl Fn(&R) -> PivotValue + Send + Sync + 'static) -> Self {
        self.compute = Some(Arc::new(compute));
        self
    }

    /// Attaches a custom aggregation and makes it the field's default.
    pub fn with_custom_aggregation(
        mut self,
        aggregate: impl Fn(&[&R]) -> Result<PivotValue, String> + Send + Sync + 'static,
    ) -> Self {
        self.custom_aggregate = Some(Arc::new(aggregate));
        self.descriptor.aggregation = AggregationType::Custom;
        if !self.descriptor.supported_aggregations.contains(&AggregationType::Custom) {
            self.descriptor.supported_aggregations.push(AggregationType::Custom);
        }
        self
    }

    pub fn with_formatter(mut self, formatter: impl Fn(&PivotValue) -> String + Send + Sync + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.descriptor.format = Some(format.into());
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.descriptor.data_type = data_type;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationType) -> Self {
        self.descriptor.aggregation = aggregation;
        self
    }

    pub fn with_empty_text(mut self, text: impl Into<String>) -> Self {
        self.descriptor.empty_text = text.into();
        self
    }

    pub fn include(mut self, values: impl IntoIterator<Item = PivotValue>) -> Self {
        self.descriptor.include_values.extend(values);
        self
    }

    pub fn exclude(mut self, values: impl IntoIterator<Item = PivotValue>) -> Self {
        self.descriptor.exclude_values.extend(values);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.descriptor.search = Some(text.into());
        self
    }

    pub fn with_subtotals(mut self, show: bool) -> Self {
        self.descriptor.show_subtotals = show;
        self
    }

    pub fn with_grand_total(mut self, show: bool) -> Self {
        self.descriptor.show_grand_total = show;
        self
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> FieldKind {
        self.descriptor.kind
    }

    pub fn is_calculated(&self) -> bool {
        self.descriptor.kind == FieldKind::Calculated
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn has_compute(&self) -> bool {
        self.compute.is_some()
    }

    pub fn custom_aggregate(&self) -> Option<&CustomAggregateFn<R>> {
        self.custom_aggregate.as_ref()
    }

    pub fn supports(&self, aggregation: AggregationType) -> bool {
        self.descriptor.supported_aggregations.contains(&aggregation)
    }

    /// Extracts the field's value from a record. Missing closures yield `Empty`.
    pub fn value_of(&self, record: &R) -> PivotValue {
        let f = if self.is_calculated() { &self.compute } else { &self.extractor };
        match f {
            Some(f) => f(record),
            None => PivotValue::Empty,
        }
    }

    /// Display text: custom formatter, then format string, then the data
    /// type's default format, then plain text.
    pub fn format(&self, value: &PivotValue) -> String {
        if let Some(formatter) = &self.formatter {
            return formatter(value);
        }
        if value.is_blank() {
            return self.descriptor.empty_text.clone();
        }
        let pattern = self
            .descriptor
            .format
            .as_deref()
            .or_else(|| self.descriptor.data_type.default_format());
        pattern
            .and_then(|p| format_with_pattern(value, p))
            .unwrap_or_else(|| value.to_text())
    }

    /// Header label for a group value; blank values show the sentinel.
    pub fn header_label(&self, value: &PivotValue) -> String {
        if value.is_blank() {
            EMPTY_LABEL.to_string()
        } else {
            self.format(value)
        }
    }
}

impl PivotField<DataRecord> {
    /// A field that reads the record entry named by its key.
    pub fn column(key: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        Self::from_descriptor(FieldDescriptor::new(key, name, kind))
    }

    /// Binds a deserialized descriptor to `DataRecord`s. Calculated fields
    /// get no computation (there is nothing to derive it from) and will fail
    /// validation until one is attached.
    pub fn from_descriptor(descriptor: FieldDescriptor) -> Self {
        let lookup_key = descriptor.key.clone();
        let is_calculated = descriptor.kind == FieldKind::Calculated;
        let field = PivotField::new(descriptor);
        if is_calculated {
            field
        } else {
            field.with_extractor(move |record: &DataRecord| {
                record.get(&lookup_key).cloned().unwrap_or_default()
            })
        }
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// What happens when a pivot would exceed `max_cells`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeLimitPolicy {
    /// Report a validation warning and compute anyway.
    Warn,
    /// Fail validation on the estimate and fail processing on the real size.
    #[default]
    Reject,
}

fn default_max_cells() -> usize {
    1_000_000
}

/// Global flags for one pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotOptions {
    #[serde(default = "default_true")]
    pub enable_subtotals: bool,

    #[serde(default = "default_true")]
    pub enable_grand_totals: bool,

    /// Cell budget checked by the validator and the engine.
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,

    #[serde(default)]
    pub size_limit: SizeLimitPolicy,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    /// Text for cells whose aggregate is empty.
    #[serde(default)]
    pub empty_cell_text: String,
}

impl Default for PivotOptions {
    fn default() -> Self {
        PivotOptions {
            enable_subtotals: true,
            enable_grand_totals: true,
            max_cells: default_max_cells(),
            size_limit: SizeLimitPolicy::Reject,
            enable_caching: true,
            empty_cell_text: String::new(),
        }
    }
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete definition of a pivot over records of type `R`.
pub struct PivotDefinition<R> {
    pub id: PivotId,

    /// User-friendly name for this pivot.
    pub name: Option<String>,

    /// Version for cache invalidation. Bump it whenever a closure changes,
    /// since closures cannot take part in the cache key.
    pub version: u64,

    /// Fields placed in the Row area (ordered from outer to inner).
    pub row_fields: Vec<PivotField<R>>,

    /// Fields placed in the Column area (ordered from outer to inner).
    pub column_fields: Vec<PivotField<R>>,

    /// Fields placed in the Values area.
    pub value_fields: Vec<PivotField<R>>,

    /// Fields placed in the Filter area.
    pub filter_fields: Vec<PivotField<R>>,

    pub options: PivotOptions,
}

impl<R> Clone for PivotDefinition<R> {
    fn clone(&self) -> Self {
        PivotDefinition {
            id: self.id,
            name: self.name.clone(),
            version: self.version,
            row_fields: self.row_fields.clone(),
            column_fields: self.column_fields.clone(),
            value_fields: self.value_fields.clone(),
            filter_fields: self.filter_fields.clone(),
            options: self.options.clone(),
        }
    }
}

impl<R> fmt::Debug for PivotDefinition<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PivotDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("row_fields", &self.row_fields)
            .field("column_fields", &self.column_fields)
            .field("value_fields", &self.value_fields)
            .field("filter_fields", &self.filter_fields)
            .field("options", &self.options)
            .finish()
    }
}

impl<R> PivotDefinition<R> {
    pub fn new(id: PivotId) -> Self {
        PivotDefinition {
            id,
            name: None,
            version: 0,
            row_fields: Vec::new(),
            column_fields: Vec::new(),
            value_fields: Vec::new(),
            filter_fields: Vec::new(),
            options: PivotOptions::default(),
        }
    }

    pub fn with_row(mut self, field: PivotField<R>) -> Self {
        self.row_fields.push(field);
        self
    }

    pub fn with_column(mut self, field: PivotField<R>) -> Self {
        self.column_fields.push(field);
        self
    }

    pub fn with_value(mut self, field: PivotField<R>) -> Self {
        self.value_fields.push(field);
        self
    }

    pub fn with_filter(mut self, field: PivotField<R>) -> Self {
        self.filter_fields.push(field);
        self
    }

    pub fn with_options(mut self, options: PivotOptions) -> Self {
        self.options = options;
        self
    }

    /// Increments the version (for cache invalidation).
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// All fields in area order: rows, columns, values, filters.
    pub fn all_fields(&self) -> impl Iterator<Item = &PivotField<R>> {
        self.row_fields
            .iter()
            .chain(self.column_fields.iter())
            .chain(self.value_fields.iter())
            .chain(self.filter_fields.iter())
    }

    /// Fields whose filters apply to the source: rows, columns, filters.
    pub fn filterable_fields(&self) -> impl Iterator<Item = &PivotField<R>> {
        self.row_fields
            .iter()
            .chain(self.column_fields.iter())
            .chain(self.filter_fields.iter())
    }

    pub fn axis_fields(&self, is_row: bool) -> &[PivotField<R>] {
        if is_row {
            &self.row_fields
        } else {
            &self.column_fields
        }
    }

    /// Rough size estimate: ten items per axis field.
    pub fn estimated_cell_count(&self) -> usize {
        let rows = (self.row_fields.len() * 10).max(1);
        let cols = (self.column_fields.len() * 10).max(1);
        rows.saturating_mul(cols).saturating_mul(self.value_fields.len())
    }

    /// Closure-free copy of the definition.
    pub fn snapshot(&self) -> DefinitionSnapshot {
        let descriptors = |fields: &[PivotField<R>]| -> Vec<FieldDescriptor> {
            fields.iter().map(|f| f.descriptor.clone()).collect()
        };
        DefinitionSnapshot {
            id: self.id,
            name: self.name.clone(),
            version: self.version,
            row_fields: descriptors(&self.row_fields),
            column_fields: descriptors(&self.column_fields),
            value_fields: descriptors(&self.value_fields),
            filter_fields: descriptors(&self.filter_fields),
            options: self.options.clone(),
        }
    }
}

impl PivotDefinition<DataRecord> {
    /// Rebuilds a definition over `DataRecord`s from a snapshot.
    pub fn from_snapshot(snapshot: &DefinitionSnapshot) -> Self {
        let bind = |fields: &[FieldDescriptor]| -> Vec<PivotField<DataRecord>> {
            fields.iter().cloned().map(PivotField::from_descriptor).collect()
        };
        PivotDefinition {
            id: snapshot.id,
            name: snapshot.name.clone(),
            version: snapshot.version,
            row_fields: bind(&snapshot.row_fields),
            column_fields: bind(&snapshot.column_fields),
            value_fields: bind(&snapshot.value_fields),
            filter_fields: bind(&snapshot.filter_fields),
            options: snapshot.options.clone(),
        }
    }
}

/// Serializable image of a `PivotDefinition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSnapshot {
    pub id: PivotId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub row_fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub column_fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub value_fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub filter_fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub options: PivotOptions,
}
