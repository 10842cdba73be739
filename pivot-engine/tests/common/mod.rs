//! FILENAME: tests/common/mod.rs
//! Fixtures and assertion helpers for pivot-engine integration tests.

#![allow(dead_code)]

use pivot_engine::{
    DataRecord, PivotDefinition, PivotField, PivotResult, PivotValue,
};

// ============================================================================
// SALES FIXTURE
// ============================================================================

/// (region, product, quarter, sales, quantity)
pub type Sale = (&'static str, &'static str, &'static str, f64, f64);

pub struct SalesFixture;

impl SalesFixture {
    pub fn data() -> Vec<Sale> {
        vec![
            ("North", "Widget", "Q1", 10000.0, 100.0),
            ("North", "Widget", "Q2", 12000.0, 120.0),
            ("North", "Gadget", "Q1", 8000.0, 80.0),
            ("North", "Gadget", "Q2", 9000.0, 90.0),
            ("South", "Widget", "Q1", 15000.0, 150.0),
            ("South", "Widget", "Q2", 14000.0, 140.0),
            ("South", "Gadget", "Q1", 11000.0, 110.0),
            ("South", "Gadget", "Q2", 13000.0, 130.0),
            ("East", "Widget", "Q1", 9000.0, 90.0),
            ("East", "Widget", "Q2", 11000.0, 110.0),
            ("East", "Gadget", "Q1", 7000.0, 70.0),
            ("East", "Gadget", "Q2", 8500.0, 85.0),
        ]
    }

    pub fn total_sales() -> f64 {
        Self::data().iter().map(|s| s.3).sum()
    }

    pub fn region() -> PivotField<Sale> {
        PivotField::dimension("region", "Region", |s: &Sale| PivotValue::text(s.0))
    }

    pub fn product() -> PivotField<Sale> {
        PivotField::dimension("product", "Product", |s: &Sale| PivotValue::text(s.1))
    }

    pub fn quarter() -> PivotField<Sale> {
        PivotField::dimension("quarter", "Quarter", |s: &Sale| PivotValue::text(s.2))
    }

    pub fn sales() -> PivotField<Sale> {
        PivotField::measure("sales", "Sum of Sales", |s: &Sale| PivotValue::Number(s.3))
    }

    pub fn quantity() -> PivotField<Sale> {
        PivotField::measure("quantity", "Sum of Quantity", |s: &Sale| PivotValue::Number(s.4))
    }

    /// Region down, quarter across, sum of sales.
    pub fn definition() -> PivotDefinition<Sale> {
        PivotDefinition::new(1)
            .with_row(Self::region())
            .with_column(Self::quarter())
            .with_value(Self::sales())
    }
}

// ============================================================================
// GEOGRAPHY FIXTURE (three row levels)
// ============================================================================

/// (continent, country, city, amount)
pub type Place = (&'static str, &'static str, &'static str, f64);

pub struct GeoFixture;

impl GeoFixture {
    pub fn data() -> Vec<Place> {
        vec![
            ("Europe", "France", "Paris", 10.0),
            ("Europe", "France", "Lyon", 20.0),
            ("Europe", "Germany", "Berlin", 30.0),
            ("America", "USA", "Boston", 40.0),
            ("America", "USA", "Denver", 50.0),
            ("America", "Canada", "Toronto", 60.0),
        ]
    }

    pub fn definition() -> PivotDefinition<Place> {
        PivotDefinition::new(2)
            .with_row(PivotField::dimension("continent", "Continent", |p: &Place| PivotValue::text(p.0)))
            .with_row(PivotField::dimension("country", "Country", |p: &Place| PivotValue::text(p.1)))
            .with_row(PivotField::dimension("city", "City", |p: &Place| PivotValue::text(p.2)))
            .with_value(PivotField::measure("amount", "Amount", |p: &Place| PivotValue::Number(p.3)))
    }
}

// ============================================================================
// MAP RECORDS
// ============================================================================

/// Builds a `DataRecord`; `None` values are left out of the map.
pub fn record(entries: &[(&str, Option<PivotValue>)]) -> DataRecord {
    let mut record = DataRecord::default();
    for (key, value) in entries {
        if let Some(value) = value {
            record.insert(key.to_string(), value.clone());
        }
    }
    record
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Numeric value of the cell at the given label paths.
pub fn cell_number(result: &PivotResult, rows: &[&str], columns: &[&str], measure: &str) -> f64 {
    let cell = result
        .cell_at(rows, columns, measure)
        .unwrap_or_else(|| panic!("no cell at {:?} x {:?} ({})", rows, columns, measure));
    match &cell.value {
        PivotValue::Number(n) => *n,
        other => panic!("expected a number at {:?} x {:?}, got {:?}", rows, columns, other),
    }
}

/// Assert that a cell holds an expected number.
pub fn assert_cell_number(result: &PivotResult, rows: &[&str], columns: &[&str], measure: &str, expected: f64) {
    let actual = cell_number(result, rows, columns, measure);
    assert!(
        (actual - expected).abs() < 1e-9,
        "cell {:?} x {:?} ({}): expected {}, got {}",
        rows,
        columns,
        measure,
        expected,
        actual
    );
}

/// Header labels of an axis in display order.
pub fn labels(axis: &pivot_engine::HeaderAxis) -> Vec<String> {
    axis.nodes.iter().map(|n| n.formatted_value.clone()).collect()
}
