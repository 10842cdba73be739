//! FILENAME: pivot-engine/src/engine.rs
//! Pivot Engine - The calculation core that transforms records into a cross-tab.
//!
//! This module takes a PivotDefinition (configuration) and a record slice
//! and produces a PivotResult (headers plus sparse cell map).
//!
//! Algorithm:
//! 1. Validate the definition; errors abort before any work
//! 2. Apply include/exclude/search filters
//! 3. Look the fingerprint up in the result cache
//! 4. Build the row and column header axes
//! 5. Cross-tabulate: for each (row, column, measure), aggregate the records
//!    matching both headers
//! 6. Assemble the result with warnings and per-run metrics, then cache it

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::aggregate::WarningLog;
use crate::cache::SourceCache;
use crate::cells::{header_members, intersect_sorted, CellCalculator};
use crate::definition::{PivotDefinition, PivotField, SizeLimitPolicy};
use crate::error::PivotError;
use crate::filter::apply_filters;
use crate::hierarchy::HierarchyBuilder;
use crate::metrics::{estimate_memory, millis, PerformanceMetrics};
use crate::result_cache::{cache_key, CacheStatsSnapshot, EngineOptions, ResultCache};
use crate::validate::{validate, ValidationResult};
use crate::value::{GroupKey, PivotValue};
use crate::view::{HeaderId, PivotResult};

// ============================================================================
// PIVOT CALCULATOR
// ============================================================================

/// Runs one computation of one definition.
pub struct PivotCalculator<'a, R> {
    definition: &'a PivotDefinition<R>,
    cache: Option<&'a ResultCache>,
    cancel: &'a CancellationToken,
}

impl<'a, R> PivotCalculator<'a, R> {
    /// Creates a new calculator instance.
    pub fn new(definition: &'a PivotDefinition<R>, cancel: &'a CancellationToken) -> Self {
        PivotCalculator {
            definition,
            cache: None,
            cancel,
        }
    }

    /// Reads from and stores into `cache` when the definition enables caching.
    pub fn with_cache(mut self, cache: &'a ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Executes the full calculation.
    pub fn calculate(&self, records: &[R]) -> Result<Arc<PivotResult>, PivotError> {
        let definition = self.definition;
        let started = Instant::now();

        // Step 1: Configuration errors are fatal
        let validation = validate(Some(definition));
        if !validation.is_valid {
            return Err(PivotError::InvalidConfiguration(validation.errors));
        }

        info!(
            "computing pivot {} (v{}) over {} records",
            definition.id,
            definition.version,
            records.len()
        );

        // Step 2: Filter
        let filter_started = Instant::now();
        let filtered = apply_filters(records, definition);
        let filter_time_ms = millis(filter_started.elapsed());
        let source = SourceCache::new(filtered, definition);

        // Step 3: Cache lookup
        let cache = self.cache.filter(|_| definition.options.enable_caching);
        let key = cache.and_then(|_| cache_key(definition, &source));
        if let (Some(cache), Some(key)) = (cache, key) {
            if let Some(hit) = cache.get(key) {
                info!("pivot {} served from cache", definition.id);
                let stamped = hit.served_from_cache(filter_time_ms, millis(started.elapsed()));
                return Ok(Arc::new(stamped));
            }
        }

        if self.cancel.is_cancelled() {
            return Err(PivotError::Cancelled);
        }

        // Step 4: Header axes
        let hierarchy_started = Instant::now();
        let options = &definition.options;
        let rows = HierarchyBuilder::new(&source, &definition.row_fields, options, true, self.cancel).build()?;
        let columns =
            HierarchyBuilder::new(&source, &definition.column_fields, options, false, self.cancel).build()?;
        let hierarchy_time_ms = millis(hierarchy_started.elapsed());

        let cell_slots = rows
            .len()
            .saturating_mul(columns.len())
            .saturating_mul(definition.value_fields.len());
        if options.size_limit == SizeLimitPolicy::Reject && cell_slots > options.max_cells {
            return Err(PivotError::CellBudgetExceeded {
                cells: cell_slots,
                limit: options.max_cells,
            });
        }

        // Step 5: Cells
        let aggregation_started = Instant::now();
        let mut warnings = WarningLog::new();
        for warning in validation.warnings {
            warnings.push(warning);
        }
        let row_members = header_members(&source, &rows, &definition.row_fields);
        let column_members = header_members(&source, &columns, &definition.column_fields);
        let cells = CellCalculator::new(&source, &definition.value_fields, options, self.cancel).calculate(
            &rows,
            &row_members,
            &columns,
            &column_members,
            &mut warnings,
        )?;
        let aggregation_time_ms = millis(aggregation_started.elapsed());

        debug!(
            "pivot {}: filter {:.2}ms, hierarchy {:.2}ms, aggregation {:.2}ms",
            definition.id, filter_time_ms, hierarchy_time_ms, aggregation_time_ms
        );

        // Step 6: Assemble
        let total_time_ms = millis(started.elapsed());
        let metrics = PerformanceMetrics {
            source_count: records.len(),
            filtered_count: source.len(),
            filter_time_ms,
            hierarchy_time_ms,
            aggregation_time_ms,
            processing_time_ms: hierarchy_time_ms + aggregation_time_ms,
            total_time_ms,
            row_header_count: rows.len(),
            column_header_count: columns.len(),
            cell_count: cells.len(),
            estimated_memory_bytes: estimate_memory(&rows, &columns, cells.iter()),
            cache_hit: false,
        };

        let result = Arc::new(PivotResult {
            definition: definition.snapshot(),
            rows,
            columns,
            cells,
            source_count: records.len(),
            filtered_count: source.len(),
            elapsed_ms: total_time_ms,
            warnings: warnings.into_messages(),
            errors: Vec::new(),
            metrics,
        });

        info!(
            "pivot {} computed: {} cells in {:.2}ms",
            definition.id,
            result.cells.len(),
            total_time_ms
        );

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.insert(key, Arc::clone(&result));
        }

        Ok(result)
    }
}

// ============================================================================
// PIVOT ENGINE
// ============================================================================

/// Long-lived entry point owning the shared result cache. Clones share it.
#[derive(Clone)]
pub struct PivotEngine {
    cache: Arc<ResultCache>,
    options: EngineOptions,
}

impl Default for PivotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PivotEngine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        PivotEngine {
            cache: Arc::new(ResultCache::new(&options)),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Computes (or fetches from cache) the pivot of `records`.
    ///
    /// A cache hit returns a copy of the stored result whose `elapsed_ms` and
    /// `metrics` time this call, with `metrics.cache_hit` set.
    pub fn process<R>(
        &self,
        records: &[R],
        definition: &PivotDefinition<R>,
        cancel: &CancellationToken,
    ) -> Result<Arc<PivotResult>, PivotError> {
        PivotCalculator::new(definition, cancel)
            .with_cache(&self.cache)
            .calculate(records)
    }

    /// Runs `process` on tokio's blocking pool.
    pub async fn process_async<R>(
        &self,
        records: Arc<Vec<R>>,
        definition: Arc<PivotDefinition<R>>,
        cancel: CancellationToken,
    ) -> Result<Arc<PivotResult>, PivotError>
    where
        R: Send + Sync + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.process(&records, &definition, &cancel))
            .await
            .map_err(|e| PivotError::Join(e.to_string()))?
    }

    pub fn validate<R>(&self, definition: Option<&PivotDefinition<R>>) -> ValidationResult {
        validate(definition)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("pivot result cache cleared");
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

// ============================================================================
// DRILL DOWN
// ============================================================================

/// Source records behind one cell.
#[derive(Debug)]
pub struct DrillDownResult<'a, R> {
    /// Matching records in source order, at most `max_records`.
    pub records: Vec<&'a R>,
    pub total_count: usize,
    pub is_truncated: bool,
    pub max_records: usize,
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Calculates a pivot without caching or cancellation.
pub fn calculate_pivot<R>(records: &[R], definition: &PivotDefinition<R>) -> Result<PivotResult, PivotError> {
    let cancel = CancellationToken::new();
    let result = PivotCalculator::new(definition, &cancel).calculate(records)?;
    Ok(Arc::try_unwrap(result).unwrap_or_else(|shared| (*shared).clone()))
}

/// Distinct values of `field` over `records`, sorted in header order.
/// Blank values collapse into a single `Empty`.
pub fn distinct_values<R>(records: &[R], field: &PivotField<R>) -> Vec<PivotValue> {
    let keys: BTreeSet<GroupKey> = records.iter().map(|r| field.value_of(r).group_key()).collect();
    keys.iter().map(GroupKey::to_value).collect()
}

/// Performs a drill-down operation to get the source records for a cell of
/// `result`. Returns `None` when either header id is out of range.
pub fn drill_down<'a, R>(
    records: &'a [R],
    definition: &PivotDefinition<R>,
    result: &PivotResult,
    row: HeaderId,
    column: HeaderId,
    max_records: usize,
) -> Option<DrillDownResult<'a, R>> {
    if row >= result.rows.len() || column >= result.columns.len() {
        return None;
    }

    let source = SourceCache::new(apply_filters(records, definition), definition);
    let row_members = header_members(&source, &result.rows, &definition.row_fields);
    let column_members = header_members(&source, &result.columns, &definition.column_fields);
    let matching = intersect_sorted(&row_members[row], &column_members[column]);

    let kept = &matching[..matching.len().min(max_records)];
    Some(DrillDownResult {
        records: source.subset(kept),
        total_count: matching.len(),
        is_truncated: matching.len() > max_records,
        max_records,
    })
}
