//! FILENAME: pivot-engine/src/lib.rs
//! Pivot engine: cross-tabulation of in-memory records.
//!
//! Given records of any type and a definition naming row, column, value and
//! filter fields, the engine builds hierarchical row and column headers with
//! subtotals and grand totals, and aggregates a measure for every
//! intersection.
//!
//! Layers:
//! - `definition`: Configuration (what the pivot IS), fields bound by closures
//! - `cache`: Filtered records with memoized value columns (HOW we compute)
//! - `view`: Computed result for renderers (WHAT we display)
//! - `engine`: Pipeline, shared engine handle and public entry points
//! - `hierarchy`, `cells`, `aggregate`, `filter`, `validate`: pipeline stages
//! - `result_cache`, `metrics`, `export`: around the pipeline

pub mod aggregate;
pub mod cache;
pub mod cells;
pub mod definition;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod format;
pub mod hierarchy;
pub mod metrics;
pub mod result_cache;
pub mod validate;
pub mod value;
pub mod view;

pub use aggregate::{aggregate, AggregateAccumulator};
pub use definition::*;
pub use engine::{calculate_pivot, distinct_values, drill_down, DrillDownResult, PivotCalculator, PivotEngine};
pub use error::{ExportError, PivotError};
pub use export::{export, ExportConfig, ExportFormat};
pub use metrics::PerformanceMetrics;
pub use result_cache::{CacheStatsSnapshot, EngineOptions};
pub use validate::{validate, ValidationResult};
pub use value::{GroupKey, PivotValue, EMPTY_LABEL};
pub use view::*;

pub use tokio_util::sync::CancellationToken;
