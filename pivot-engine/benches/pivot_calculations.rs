//! FILENAME: benches/pivot_calculations.rs
//! Pivot computation benchmarks.
//!
//! Benchmarks for:
//! - Two-level rows by one column field at growing record counts
//! - Cached re-processing through `PivotEngine`
//! - CSV export of a finished result
//!
//! Run with:
//!   cargo bench --bench pivot_calculations

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pivot_engine::{
    calculate_pivot, export, CancellationToken, ExportConfig, PivotDefinition, PivotEngine,
    PivotField, PivotValue,
};

/// (region, product, month, amount)
type Row = (u32, u32, u32, f64);

// =============================================================================
// Test Data Generation
// =============================================================================

/// Deterministic synthetic sales rows: 8 regions, 25 products, 12 months.
fn generate_rows(count: usize) -> Vec<Row> {
    (0..count as u32)
        .map(|i| (i % 8, (i / 8) % 25, (i / 200) % 12, f64::from(i % 997) * 1.5))
        .collect()
}

fn definition() -> PivotDefinition<Row> {
    PivotDefinition::new(1)
        .with_row(PivotField::dimension("region", "Region", |r: &Row| PivotValue::from(r.0)))
        .with_row(PivotField::dimension("product", "Product", |r: &Row| PivotValue::from(r.1)))
        .with_column(PivotField::dimension("month", "Month", |r: &Row| PivotValue::from(r.2)))
        .with_value(PivotField::measure("amount", "Amount", |r: &Row| PivotValue::Number(r.3)))
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_calculate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_pivot");
    let def = definition();

    for &count in &[1_000usize, 10_000, 100_000] {
        let rows = generate_rows(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &rows, |b, rows| {
            b.iter(|| calculate_pivot(black_box(rows), &def))
        });
    }
    group.finish();
}

fn bench_cached(c: &mut Criterion) {
    let engine = PivotEngine::new();
    let rows = generate_rows(10_000);
    let def = definition();
    let cancel = CancellationToken::new();
    let _ = engine.process(&rows, &def, &cancel);

    c.bench_function("process_cached_10k", |b| {
        b.iter(|| engine.process(black_box(&rows), &def, &cancel))
    });
}

fn bench_export_csv(c: &mut Criterion) {
    let rows = generate_rows(10_000);
    let Ok(result) = calculate_pivot(&rows, &definition()) else {
        return;
    };
    let config = ExportConfig::default();

    c.bench_function("export_csv_10k", |b| b.iter(|| export(black_box(&result), &config)));
}

criterion_group!(benches, bench_calculate, bench_cached, bench_export_csv);
criterion_main!(benches);
