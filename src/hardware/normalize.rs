//! Field Normalizer
//!
//! Turns raw `key: value` text into typed values, and applies the unit
//! policy for sizes, temperatures and error counters.

use crate::error::NormalizationError;

/// Value returned by [`error_count`] for text that is not a count
pub const ERROR_COUNT_SUPPRESSED: f64 = -1.0;

const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Declared semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    String,
}

/// Typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// Integer value, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }

    /// String value, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Take the string out, if this is a `Str`
    pub fn into_string(self) -> Option<String> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Normalize `line` by stripping `key` and parsing the remainder as `field_type`.
///
/// Numeric types parse only the first whitespace-separated token, so trailing
/// units (`"66 C"`, `"512 MB"`) are discarded. Strings are returned verbatim
/// after trimming, including the empty string.
pub fn normalize(
    line: &str,
    key: &str,
    field_type: FieldType,
) -> Result<FieldValue, NormalizationError> {
    let value = line.strip_prefix(key).unwrap_or(line).trim();

    match field_type {
        FieldType::String => Ok(FieldValue::Str(value.to_string())),
        FieldType::Integer => {
            let token = first_token(value, key)?;
            token
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| unparsable(key, token))
        }
        FieldType::Float => {
            let token = first_token(value, key)?;
            token
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| unparsable(key, token))
        }
    }
}

fn first_token<'a>(value: &'a str, key: &str) -> Result<&'a str, NormalizationError> {
    value
        .split_whitespace()
        .next()
        .ok_or_else(|| NormalizationError::EmptyValue {
            key: key.to_string(),
        })
}

fn unparsable(key: &str, token: &str) -> NormalizationError {
    NormalizationError::UnparsableNumber {
        key: key.to_string(),
        token: token.to_string(),
    }
}

/// Check whether a raw value carries a reading at all
pub fn is_reported(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && raw != "N/A"
}

/// Convert a size such as `"1TB"`, `"557.861 GB"` or `"512MB"` to bytes.
///
/// Empty and `N/A` map to `0`, the unknown-size sentinel. A value without a
/// recognized suffix is taken as bytes.
pub fn size_bytes(raw: &str) -> f64 {
    let raw = raw.trim();
    if !is_reported(raw) {
        return 0.0;
    }

    let (number, multiplier) = if let Some(n) = raw.strip_suffix("TB") {
        (n, TIB)
    } else if let Some(n) = raw.strip_suffix("GB") {
        (n, GIB)
    } else if let Some(n) = raw.strip_suffix("MB") {
        (n, MIB)
    } else {
        (raw, 1.0)
    };

    number
        .trim()
        .parse::<f64>()
        .map(|n| n * multiplier)
        .unwrap_or(0.0)
}

/// Convert a temperature such as `"38C"` to degrees Celsius.
///
/// Empty, `N/A` and unparsable values map to `0`.
pub fn temperature_celsius(raw: &str) -> f64 {
    let raw = raw.trim();
    if !is_reported(raw) {
        return 0.0;
    }
    raw.trim_end_matches('C')
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0)
}

/// Convert an error counter to a number.
///
/// `""`, `"N/A"` and `"-"` mean no errors were observed and map to `0`.
/// Anything else that is not a non-negative number maps to
/// [`ERROR_COUNT_SUPPRESSED`].
pub fn error_count(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" || raw == "-" {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(count) if count.is_finite() && count >= 0.0 => count,
        _ => ERROR_COUNT_SUPPRESSED,
    }
}

/// `Some(size)` for a reported size, `None` otherwise
pub fn reported_size(raw: &str) -> Option<f64> {
    is_reported(raw).then(|| size_bytes(raw))
}

/// `Some(temperature)` for a reported temperature, `None` otherwise
pub fn reported_temperature(raw: &str) -> Option<f64> {
    is_reported(raw).then(|| temperature_celsius(raw))
}
