//! FILENAME: pivot-engine/src/error.rs

use thiserror::Error;

use crate::export::ExportFormat;

#[derive(Error, Debug)]
pub enum PivotError {
    #[error("Invalid pivot configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    #[error("Pivot needs {cells} cells, budget is {limit}")]
    CellBudgetExceeded { cells: usize, limit: usize },

    #[error("Pivot computation was cancelled")]
    Cancelled,

    #[error("Pivot worker failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export format not supported: {0:?}")]
    UnsupportedFormat(ExportFormat),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
