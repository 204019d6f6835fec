//! Parsing of administratively entered numbers.
//!
//! Fee schedules arrive either as JSON numbers or as display strings such as
//! `"R$ 1.234,56"`, `"50.000 GS"` or `"1,500"`. Everything is reduced to a
//! plain `f64` here so rule code never sees text.

use serde::{Deserialize, Serialize};

/// A configuration value that may be a number or a decorated string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Number(f64),
    Text(String),
}

impl NumericValue {
    /// The numeric value, or `None` when the text holds no usable number
    pub fn value(&self) -> Option<f64> {
        match self {
            NumericValue::Number(n) if n.is_finite() => Some(*n),
            NumericValue::Number(_) => None,
            NumericValue::Text(text) => parse_numeric(text),
        }
    }
}

impl From<f64> for NumericValue {
    fn from(value: f64) -> Self {
        NumericValue::Number(value)
    }
}

impl From<&str> for NumericValue {
    fn from(value: &str) -> Self {
        NumericValue::Text(value.to_string())
    }
}

/// Missing or unparsable values count as zero.
pub fn numeric_or_zero(value: Option<&NumericValue>) -> f64 {
    value.and_then(NumericValue::value).unwrap_or(0.0)
}

/// Parse a display-formatted number.
///
/// Separator rules:
/// - both `.` and `,` present: the rightmost one is the decimal mark
/// - one kind repeated (`1.000.000`): grouping
/// - a single separator followed by exactly three digits, with a non-zero
///   integer part (`50.000`, `1,500`): grouping
/// - any other single separator: decimal mark
///
/// A `-` before the first digit makes the value negative.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let first_digit = raw.find(|c: char| c.is_ascii_digit())?;
    let negative = raw[..first_digit].contains('-');

    let kept: String = raw[first_digit..]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let kept = kept.trim_end_matches(['.', ',']);

    let decimal_at = decimal_mark(kept);
    let normalized: String = kept
        .char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal_at => Some('.'),
            '.' | ',' => None,
            digit => Some(digit),
        })
        .collect();

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn decimal_mark(digits: &str) -> Option<usize> {
    match (digits.rfind('.'), digits.rfind(',')) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(_), None) => single_separator_decimal(digits, '.'),
        (None, Some(_)) => single_separator_decimal(digits, ','),
        (None, None) => None,
    }
}

fn single_separator_decimal(digits: &str, separator: char) -> Option<usize> {
    if digits.matches(separator).count() > 1 {
        return None;
    }
    let at = digits.find(separator)?;
    let fraction_len = digits.len() - at - 1;
    let integer_part = &digits[..at];
    let looks_grouped = fraction_len == 3 && !integer_part.is_empty() && !integer_part.starts_with('0');
    if looks_grouped { None } else { Some(at) }
}
