//! FILENAME: pivot-engine/src/format.rs
//! PURPOSE: Format-string driven conversion of pivot values to display text.
//! CONTEXT: Used by `PivotField::format` when no custom formatter is set.
//! Numeric strings accept standard specifiers (`N2`, `F0`, `C2`, `P1`, `E3`,
//! `D`, `G`) or simple patterns (`#,##0.00`, `0.0%`, `$#,##0`). Dates use
//! strftime patterns (`%Y-%m-%d`).

use chrono::format::{Item, StrftimeItems};
use std::fmt::Write;

use crate::value::PivotValue;

/// A parsed numeric format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberPattern {
    General,
    Fixed { decimals: u8, thousands: bool },
    Currency { decimals: u8 },
    Percent { decimals: u8, thousands: bool },
    Scientific { decimals: u8 },
}

/// Formats a value with a format string.
/// Returns `None` when the string does not apply to the value or is invalid,
/// so the caller can fall back to plain text conversion.
pub fn format_with_pattern(value: &PivotValue, pattern: &str) -> Option<String> {
    match value {
        PivotValue::Date(d) => {
            let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
            if !pattern.contains('%') || items.iter().any(|i| matches!(i, Item::Error)) {
                return None;
            }
            let mut out = String::new();
            write!(out, "{}", d.format_with_items(items.into_iter())).ok()?;
            Some(out)
        }
        PivotValue::Number(n) => parse_number_pattern(pattern).map(|p| format_number(*n, p)),
        _ => None,
    }
}

/// Parses a numeric format string.
pub fn parse_number_pattern(pattern: &str) -> Option<NumberPattern> {
    let pattern = pattern.trim();
    let mut chars = pattern.chars();
    let first = chars.next()?;
    let rest = chars.as_str();

    if first.is_ascii_alphabetic() {
        if !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let precision: Option<u8> = if rest.is_empty() { None } else { rest.parse().ok() };
        return match first.to_ascii_uppercase() {
            'G' => Some(NumberPattern::General),
            'N' => Some(NumberPattern::Fixed { decimals: precision.unwrap_or(2), thousands: true }),
            'F' => Some(NumberPattern::Fixed { decimals: precision.unwrap_or(2), thousands: false }),
            'D' => Some(NumberPattern::Fixed { decimals: 0, thousands: false }),
            'C' => Some(NumberPattern::Currency { decimals: precision.unwrap_or(2) }),
            'P' => Some(NumberPattern::Percent { decimals: precision.unwrap_or(2), thousands: false }),
            'E' => Some(NumberPattern::Scientific { decimals: precision.unwrap_or(6) }),
            _ => None,
        };
    }

    if !pattern.chars().all(|c| matches!(c, '#' | '0' | ',' | '.' | '%' | '$')) {
        return None;
    }
    let (integer_part, decimal_part) = match pattern.split_once('.') {
        Some((i, d)) => (i, d),
        None => (pattern, ""),
    };
    if !integer_part.contains('0') && !integer_part.contains('#') {
        return None;
    }
    let decimals = u8::try_from(decimal_part.chars().filter(|c| matches!(c, '0' | '#')).count()).ok()?;
    let thousands = integer_part.contains(',');

    if pattern.contains('%') {
        Some(NumberPattern::Percent { decimals, thousands })
    } else if pattern.starts_with('$') {
        Some(NumberPattern::Currency { decimals })
    } else {
        Some(NumberPattern::Fixed { decimals, thousands })
    }
}

/// Formats a number according to a parsed pattern.
pub fn format_number(value: f64, pattern: NumberPattern) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    match pattern {
        NumberPattern::General => format_general(value),
        NumberPattern::Fixed { decimals, thousands } => format_decimal(value, decimals, thousands),
        NumberPattern::Currency { decimals } => format_currency(value, decimals),
        NumberPattern::Percent { decimals, thousands } => {
            format!("{}%", format_decimal(value * 100.0, decimals, thousands))
        }
        NumberPattern::Scientific { decimals } => {
            format!("{:.prec$e}", value, prec = decimals as usize).replace('e', "E")
        }
    }
}

/// Format a number in general format (auto-detect best representation).
pub fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let abs_value = value.abs();

    if abs_value >= 1e15 || abs_value < 1e-4 {
        return format!("{:e}", value);
    }

    if value.fract() == 0.0 {
        return format!("{:.0}", value);
    }

    let formatted = format!("{:.10}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_decimal(value: f64, decimal_places: u8, use_thousands_separator: bool) -> String {
    let rounded = format!("{:.prec$}", value, prec = decimal_places as usize);

    if use_thousands_separator {
        add_thousands_separator(&rounded)
    } else {
        rounded
    }
}

fn format_currency(value: f64, decimal_places: u8) -> String {
    let formatted = add_thousands_separator(&format!(
        "{:.prec$}",
        value.abs(),
        prec = decimal_places as usize
    ));

    if value < 0.0 {
        format!("(${})", formatted)
    } else {
        format!("${}", formatted)
    }
}

/// Add thousands separators to a numeric string.
fn add_thousands_separator(s: &str) -> String {
    let (integer_part, decimal_part) = match s.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (s, None),
    };

    let negative = integer_part.starts_with('-');
    let digits: Vec<char> = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let len = digits.len();

    let mut result = String::with_capacity(s.len() + len / 3 + 1);
    if negative {
        result.push('-');
    }
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn standard_specifiers() {
        let n = PivotValue::Number(1234.567);
        assert_eq!(format_with_pattern(&n, "N2").as_deref(), Some("1,234.57"));
        assert_eq!(format_with_pattern(&n, "F0").as_deref(), Some("1235"));
        assert_eq!(format_with_pattern(&n, "C2").as_deref(), Some("$1,234.57"));
        assert_eq!(
            format_with_pattern(&PivotValue::Number(0.256), "P1").as_deref(),
            Some("25.6%")
        );
        assert_eq!(
            format_with_pattern(&PivotValue::Number(-5.0), "C2").as_deref(),
            Some("($5.00)")
        );
    }

    #[test]
    fn picture_patterns() {
        let n = PivotValue::Number(-1234567.891);
        assert_eq!(format_with_pattern(&n, "#,##0.00").as_deref(), Some("-1,234,567.89"));
        assert_eq!(
            format_with_pattern(&PivotValue::Number(0.5), "0%").as_deref(),
            Some("50%")
        );
    }

    #[test]
    fn invalid_patterns_fall_through() {
        assert_eq!(format_with_pattern(&PivotValue::Number(1.0), "XYZ"), None);
        assert_eq!(format_with_pattern(&PivotValue::text("a"), "N2"), None);
    }

    #[test]
    fn oversized_precision_is_rejected() {
        let pattern = format!("0.{}", "0".repeat(300));
        assert_eq!(parse_number_pattern(&pattern), None);
        assert_eq!(format_with_pattern(&PivotValue::Number(1.5), &pattern), None);
        assert!(parse_number_pattern(&format!("0.{}", "0".repeat(255))).is_some());
    }

    #[test]
    fn non_finite_numbers_keep_their_text() {
        let fixed = NumberPattern::Fixed { decimals: 2, thousands: true };
        assert_eq!(format_number(f64::INFINITY, fixed), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY, fixed), "-inf");
        assert_eq!(format_number(f64::NAN, NumberPattern::Currency { decimals: 2 }), "NaN");
        assert_eq!(
            format_with_pattern(&PivotValue::Number(f64::INFINITY), "P1").as_deref(),
            Some("inf")
        );
    }

    #[test]
    fn date_patterns() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).map(PivotValue::from);
        let formatted = d.and_then(|d| format_with_pattern(&d, "%d/%m/%Y"));
        assert_eq!(formatted.as_deref(), Some("31/01/2024"));
    }

    #[test]
    fn general_format_trims() {
        assert_eq!(format_general(30.0), "30");
        assert_eq!(format_general(2.50), "2.5");
        assert_eq!(format_general(-0.125), "-0.125");
    }
}
