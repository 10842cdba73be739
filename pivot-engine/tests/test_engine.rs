//! FILENAME: tests/test_engine.rs
//! Integration tests for the shared engine: caching, cancellation, the async
//! entry point, size limits and serialized definitions.

mod common;

use std::sync::Arc;

use common::{assert_cell_number, record, Sale, SalesFixture};
use pivot_engine::{
    CancellationToken, DataRecord, DefinitionSnapshot, EngineOptions, PivotDefinition,
    PivotEngine, PivotError, PivotOptions, PivotValue, SizeLimitPolicy,
};

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn test_repeated_process_hits_cache() {
    let engine = PivotEngine::new();
    let data = SalesFixture::data();
    let def = SalesFixture::definition();
    let cancel = CancellationToken::new();

    let first = engine.process(&data, &def, &cancel).unwrap();
    let second = engine.process(&data, &def, &cancel).unwrap();

    assert!(!first.metrics.cache_hit);
    assert!(second.metrics.cache_hit);
    assert_eq!(first.cells, second.cells);
    assert_eq!(first.rows, second.rows);
    let stats = engine.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(engine.cache_len(), 1);

    engine.clear_cache();
    assert_eq!(engine.cache_len(), 0);
    let third = engine.process(&data, &def, &cancel).unwrap();
    assert!(!third.metrics.cache_hit);
    assert_eq!(first.cells, third.cells);
}

#[test]
fn test_cache_hit_reports_its_own_timing() {
    let engine = PivotEngine::new();
    let data = SalesFixture::data();
    let def = SalesFixture::definition();
    let cancel = CancellationToken::new();

    let computed = engine.process(&data, &def, &cancel).unwrap();
    let cached = engine.process(&data, &def, &cancel).unwrap();

    assert!(cached.metrics.cache_hit);
    assert_eq!(cached.metrics.hierarchy_time_ms, 0.0);
    assert_eq!(cached.metrics.aggregation_time_ms, 0.0);
    assert_eq!(cached.metrics.processing_time_ms, 0.0);
    assert_eq!(cached.elapsed_ms, cached.metrics.total_time_ms);
    assert_eq!(cached.metrics.cell_count, computed.metrics.cell_count);
    assert_eq!(cached.metrics.filtered_count, computed.metrics.filtered_count);

    // Every hit is stamped, not only the first
    let again = engine.process(&data, &def, &cancel).unwrap();
    assert!(again.metrics.cache_hit);
    assert_eq!(engine.cache_stats().hits, 2);
}

#[test]
fn test_cache_key_tracks_version_and_data() {
    let engine = PivotEngine::new();
    let cancel = CancellationToken::new();
    let mut data = SalesFixture::data();
    let mut def = SalesFixture::definition();

    engine.process(&data, &def, &cancel).unwrap();

    def.bump_version();
    engine.process(&data, &def, &cancel).unwrap();
    assert_eq!(engine.cache_len(), 2);

    data[0].3 += 1.0;
    let changed = engine.process(&data, &def, &cancel).unwrap();
    assert_eq!(engine.cache_len(), 3);
    assert_cell_number(&changed, &["North"], &["Q1"], "sales", 18001.0);
    assert_eq!(engine.cache_stats().hits, 0);
}

#[test]
fn test_caching_can_be_disabled_per_definition() {
    let engine = PivotEngine::new();
    let cancel = CancellationToken::new();
    let def = SalesFixture::definition().with_options(PivotOptions {
        enable_caching: false,
        ..PivotOptions::default()
    });

    engine.process(&SalesFixture::data(), &def, &cancel).unwrap();
    engine.process(&SalesFixture::data(), &def, &cancel).unwrap();
    assert_eq!(engine.cache_len(), 0);
}

#[test]
fn test_cache_capacity_is_bounded() {
    let engine = PivotEngine::with_options(EngineOptions {
        cache_capacity: 2,
        cache_ttl_secs: None,
    });
    let cancel = CancellationToken::new();
    let data = SalesFixture::data();
    let mut def = SalesFixture::definition();

    for _ in 0..4 {
        engine.process(&data, &def, &cancel).unwrap();
        def.bump_version();
    }
    assert_eq!(engine.cache_len(), 2);
    assert_eq!(engine.cache_stats().evictions, 2);
}

#[test]
fn test_engine_clones_share_the_cache() {
    let engine = PivotEngine::new();
    let clone = engine.clone();
    let cancel = CancellationToken::new();

    engine.process(&SalesFixture::data(), &SalesFixture::definition(), &cancel).unwrap();
    assert_eq!(clone.cache_len(), 1);
}

// ============================================================================
// CANCELLATION AND ASYNC
// ============================================================================

#[test]
fn test_cancelled_token_aborts() {
    let engine = PivotEngine::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .process(&SalesFixture::data(), &SalesFixture::definition(), &cancel)
        .unwrap_err();
    assert!(matches!(err, PivotError::Cancelled));
    assert_eq!(engine.cache_len(), 0);
}

#[tokio::test]
async fn test_process_async() {
    let engine = PivotEngine::new();
    let data = Arc::new(SalesFixture::data());
    let def = Arc::new(SalesFixture::definition());

    let result = engine
        .process_async(Arc::clone(&data), Arc::clone(&def), CancellationToken::new())
        .await
        .unwrap();
    assert_cell_number(&result, &["Grand Total"], &["Grand Total"], "sales", SalesFixture::total_sales());

    // Second call is served from the shared cache
    let again = engine
        .process_async(data, def, CancellationToken::new())
        .await
        .unwrap();
    assert!(again.metrics.cache_hit);
    assert_eq!(result.cells, again.cells);
}

#[tokio::test]
async fn test_process_async_cancelled() {
    let engine = PivotEngine::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .process_async(Arc::new(SalesFixture::data()), Arc::new(SalesFixture::definition()), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PivotError::Cancelled));
}

// ============================================================================
// SIZE LIMITS
// ============================================================================

#[test]
fn test_estimated_size_rejected_by_default() {
    let engine = PivotEngine::new();
    let def = SalesFixture::definition()
        .with_row(SalesFixture::product())
        .with_options(PivotOptions {
            max_cells: 100,
            ..PivotOptions::default()
        });

    // 20 x 10 x 1 estimated cells
    let err = engine
        .process(&SalesFixture::data(), &def, &CancellationToken::new())
        .unwrap_err();
    match err {
        PivotError::InvalidConfiguration(errors) => {
            assert!(errors.iter().any(|e| e.contains("exceeds")));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_estimated_size_warns_under_warn_policy() {
    let engine = PivotEngine::new();
    let def = SalesFixture::definition()
        .with_row(SalesFixture::product())
        .with_options(PivotOptions {
            max_cells: 100,
            size_limit: SizeLimitPolicy::Warn,
            ..PivotOptions::default()
        });

    let result = engine
        .process(&SalesFixture::data(), &def, &CancellationToken::new())
        .unwrap();
    assert!(result.warnings.iter().any(|w| w.contains("exceeds")));
    assert_cell_number(&result, &["North", "Widget"], &["Q1"], "sales", 10000.0);
}

// ============================================================================
// SERIALIZED DEFINITIONS
// ============================================================================

#[test]
fn test_definition_from_json_snapshot() {
    let json = r#"{
        "id": 9,
        "row_fields": [{
            "key": "region",
            "name": "Region",
            "aggregation": "Count",
            "supported_aggregations": ["Count"]
        }],
        "value_fields": [{
            "key": "amount",
            "name": "Sum of Amount",
            "kind": "Measure",
            "supported_aggregations": ["Sum", "Average"]
        }],
        "filter_fields": [{
            "key": "channel",
            "name": "Channel",
            "kind": "Filter",
            "supported_aggregations": ["Count"],
            "aggregation": "Count",
            "exclude_values": [{ "Text": "Online" }]
        }]
    }"#;
    let snapshot: DefinitionSnapshot = serde_json::from_str(json).unwrap();
    let def = PivotDefinition::<DataRecord>::from_snapshot(&snapshot);

    let records = vec![
        record(&[
            ("region", Some(PivotValue::text("East"))),
            ("amount", Some(PivotValue::Number(10.0))),
            ("channel", Some(PivotValue::text("Store"))),
        ]),
        record(&[
            ("region", Some(PivotValue::text("East"))),
            ("amount", Some(PivotValue::Number(99.0))),
            ("channel", Some(PivotValue::text("Online"))),
        ]),
        record(&[
            ("region", Some(PivotValue::text("West"))),
            ("amount", Some(PivotValue::text("7"))),
            ("channel", Some(PivotValue::text("Store"))),
        ]),
    ];

    let engine = PivotEngine::new();
    let result = engine.process(&records, &def, &CancellationToken::new()).unwrap();
    assert_eq!(result.filtered_count, 2);
    assert_cell_number(&result, &["East"], &["Total"], "amount", 10.0);
    assert_cell_number(&result, &["Grand Total"], &["Total"], "amount", 17.0);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.definition.id, 9);
}

#[test]
fn test_validate_through_engine() {
    let engine = PivotEngine::new();
    assert!(!engine.validate::<Sale>(None).is_valid);
    assert!(engine.validate(Some(&SalesFixture::definition())).is_valid);
}
