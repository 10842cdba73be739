//! FILENAME: pivot-engine/src/export.rs
//! Exporter - serializes a finished result.
//!
//! CSV writes one line per stored cell in display order (rows outer,
//! columns inner, measures innermost). JSON writes the whole `PivotResult`.
//! Excel and PDF fail with `ExportError::UnsupportedFormat`.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::view::PivotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Excel,
    Pdf,
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> char {
    ','
}

/// How to export a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,

    /// CSV only: write the `row,column,value` header line.
    #[serde(default = "default_true")]
    pub include_header: bool,

    /// CSV only.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// JSON only.
    #[serde(default)]
    pub pretty_json: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            format: ExportFormat::Csv,
            include_header: true,
            delimiter: default_delimiter(),
            pretty_json: false,
        }
    }
}

impl ExportConfig {
    pub fn new(format: ExportFormat) -> Self {
        ExportConfig {
            format,
            ..ExportConfig::default()
        }
    }
}

/// Serializes `result` into bytes of the configured format.
pub fn export(result: &PivotResult, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
    match config.format {
        ExportFormat::Csv => export_csv(result, config),
        ExportFormat::Json => {
            let bytes = if config.pretty_json {
                serde_json::to_vec_pretty(result)?
            } else {
                serde_json::to_vec(result)?
            };
            Ok(bytes)
        }
        ExportFormat::Excel | ExportFormat::Pdf => Err(ExportError::UnsupportedFormat(config.format)),
    }
}

fn export_csv(result: &PivotResult, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
    let delimiter = config.delimiter;
    let multi_measure = result.definition.value_fields.len() > 1;
    let mut out = Vec::new();

    if config.include_header {
        write_line(&mut out, delimiter, ["row", "column", "value"])?;
    }

    for cell in result.cells_in_order() {
        let row_label = result.rows.path_labels(cell.row).join(" / ");
        let mut column_label = result.columns.path_labels(cell.column).join(" / ");
        if multi_measure {
            let measure_name = result
                .definition
                .value_fields
                .iter()
                .find(|f| f.key == cell.measure_key)
                .map_or(cell.measure_key.as_str(), |f| f.name.as_str());
            column_label.push_str(" - ");
            column_label.push_str(measure_name);
        }
        write_line(&mut out, delimiter, [row_label.as_str(), column_label.as_str(), cell.formatted_value.as_str()])?;
    }

    Ok(out)
}

fn write_line<'a>(
    out: &mut Vec<u8>,
    delimiter: char,
    fields: impl IntoIterator<Item = &'a str>,
) -> Result<(), ExportError> {
    let mut first = true;
    for field in fields {
        if !first {
            write!(out, "{}", delimiter)?;
        }
        first = false;
        out.write_all(quote_field(field, delimiter).as_bytes())?;
    }
    out.write_all(b"\r\n")?;
    Ok(())
}

/// RFC 4180 quoting: wrap in quotes when the field holds the delimiter, a
/// quote or a line break; double inner quotes.
fn quote_field(field: &str, delimiter: char) -> String {
    let needs_quotes = field
        .chars()
        .any(|c| c == delimiter || c == '"' || c == '\n' || c == '\r');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
