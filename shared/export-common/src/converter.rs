//! Type-directed conversion of raw field values into column values

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::borrow::Cow;
use serde::Serialize;
use serde_json::Value;

use crate::error::ConversionError;
use crate::types::{ColumnType, ColumnValue};

/// Sentinel selecting epoch-seconds interpretation
pub const UNIX_TIME_FORMAT: &str = "unix";

/// How timestamp columns read their raw values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TimeFormat {
    /// Raw value is a number of seconds since the epoch
    Unix,
    /// Raw value is text parsed with a `strptime`-style pattern
    Pattern(String),
}

impl TimeFormat {
    pub fn parse(format: &str) -> Self {
        if format == UNIX_TIME_FORMAT {
            TimeFormat::Unix
        } else {
            TimeFormat::Pattern(format.to_string())
        }
    }

    fn as_str(&self) -> &str {
        match self {
            TimeFormat::Unix => UNIX_TIME_FORMAT,
            TimeFormat::Pattern(pattern) => pattern,
        }
    }
}

impl ColumnType {
    /// Convert a raw value for a column of this type.
    ///
    /// Null passes through for numeric and text columns, is `false` for
    /// `bool` and is rejected for timestamps.
    pub fn coerce(
        &self,
        value: &Value,
        time_format: Option<&TimeFormat>,
    ) -> Result<ColumnValue, ConversionError> {
        match self {
            ColumnType::Bool => Ok(ColumnValue::Bool(is_truthy(value))),
            ColumnType::Timestamp => {
                to_datetime(value, time_format).map(|dt| ColumnValue::Timestamp(dt.naive_utc()))
            }
            ColumnType::TimestampTz => to_datetime(value, time_format).map(ColumnValue::TimestampTz),
            _ if value.is_null() => Ok(ColumnValue::Null),
            ColumnType::SmallInt => {
                let v = to_i64(value, self)?;
                i16::try_from(v)
                    .map(ColumnValue::SmallInt)
                    .map_err(|_| out_of_range(self, value))
            }
            ColumnType::Integer => {
                let v = to_i64(value, self)?;
                i32::try_from(v)
                    .map(ColumnValue::Integer)
                    .map_err(|_| out_of_range(self, value))
            }
            ColumnType::BigInt => to_i64(value, self).map(ColumnValue::BigInt),
            ColumnType::Real => to_f64(value, self).map(|v| ColumnValue::Real(v as f32)),
            ColumnType::Double => to_f64(value, self).map(ColumnValue::Double),
            ColumnType::Varchar | ColumnType::Text => Ok(ColumnValue::Text(to_text(value))),
        }
    }
}

fn not_numeric(column_type: &ColumnType, value: &Value) -> ConversionError {
    ConversionError::NotNumeric {
        column_type: column_type.to_string(),
        value: value.to_string(),
    }
}

fn out_of_range(column_type: &ColumnType, value: &Value) -> ConversionError {
    ConversionError::OutOfRange {
        column_type: column_type.to_string(),
        value: value.to_string(),
    }
}

/// Empty and zero-like values are false
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn to_i64(value: &Value, column_type: &ColumnType) -> Result<i64, ConversionError> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            // u64 beyond i64 or a float; floats truncate toward zero
            match n.as_f64().map(f64::trunc) {
                Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(out_of_range(column_type, value)),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| not_numeric(column_type, value)),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(not_numeric(column_type, value)),
    }
}

fn to_f64(value: &Value, column_type: &ColumnType) -> Result<f64, ConversionError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| not_numeric(column_type, value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| not_numeric(column_type, value)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(not_numeric(column_type, value)),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_datetime(
    value: &Value,
    time_format: Option<&TimeFormat>,
) -> Result<DateTime<Utc>, ConversionError> {
    let format = time_format.ok_or(ConversionError::MissingTimeFormat)?;
    let invalid = |reason: &str| ConversionError::InvalidTimestamp {
        value: value.to_string(),
        format: format.as_str().to_string(),
        reason: reason.to_string(),
    };

    match format {
        TimeFormat::Unix => {
            let seconds = value
                .as_f64()
                .ok_or_else(|| invalid("expected seconds since epoch"))?;
            from_epoch_seconds(value, seconds).ok_or_else(|| invalid("out of range"))
        }
        TimeFormat::Pattern(pattern) => {
            let text = value.as_str().ok_or_else(|| invalid("expected a string"))?;
            parse_with_pattern(text, pattern).map_err(|e| invalid(&e.to_string()))
        }
    }
}

fn from_epoch_seconds(value: &Value, seconds: f64) -> Option<DateTime<Utc>> {
    // Integral values avoid float rounding entirely
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Offset-aware first, then naive date-time (UTC), then bare date.
///
/// Patterns use `strptime` directives; see [`chrono_pattern`] for the ones
/// chrono reads differently.
fn parse_with_pattern(text: &str, pattern: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let pattern = chrono_pattern(pattern);
    let text = utc_designator_as_offset(text, &pattern);

    if let Ok(dt) = DateTime::parse_from_str(&text, &pattern) {
        return Ok(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(&text, &pattern) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(err) => match NaiveDate::parse_from_str(&text, &pattern) {
            Ok(date) => Ok(date.and_time(chrono::NaiveTime::MIN).and_utc()),
            Err(_) => Err(err),
        },
    }
}

/// Rewrite `strptime` fraction directives for chrono.
///
/// `.%f` becomes `%.f` (any number of fraction digits after the dot) and a
/// bare `%f` becomes `%6f` (microseconds). `%%` stays a literal percent.
fn chrono_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('f') if out.ends_with('.') => {
                out.pop();
                out.push_str("%.f");
            }
            Some('f') => out.push_str("%6f"),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// `%z` accepts a trailing `Z` for UTC; chrono wants a numeric offset
fn utc_designator_as_offset<'a>(text: &'a str, pattern: &str) -> Cow<'a, str> {
    match text.strip_suffix('Z') {
        Some(rest) if pattern.ends_with("%z") => Cow::Owned(format!("{rest}+0000")),
        _ => Cow::Borrowed(text),
    }
}
