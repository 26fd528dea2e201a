//! Typed value conversion for `convert` transformations and dated simple
//! mappings.
//!
//! Date formats in configuration use the original tool's .NET-style tokens
//! (`yyyy`, `MM`, `dd`, `HH`, `mm`, `ss`, `fff`, ...); they are translated
//! to chrono specifiers before parsing. Without a format, parsing is
//! permissive ISO-8601.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::TargetType;
use crate::core::Value;

/// Translate a .NET-style date format into a chrono format string.
///
/// Unknown tokens pass through literally, which matches the invariant-culture
/// behaviour of treating unrecognized characters as literals.
pub fn translate_date_format(format: &str) -> String {
    let mut out = String::with_capacity(format.len() + 4);
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        match (c, run) {
            ('y', 4..) => {
                out.push_str("%Y");
                i += 4;
            }
            ('y', _) => {
                out.push_str("%y");
                i += run.min(2);
            }
            ('M', 2..) => {
                out.push_str("%m");
                i += 2;
            }
            ('d', 2..) => {
                out.push_str("%d");
                i += 2;
            }
            ('H', 2..) => {
                out.push_str("%H");
                i += 2;
            }
            ('h', 2..) => {
                out.push_str("%I");
                i += 2;
            }
            ('m', 2..) => {
                out.push_str("%M");
                i += 2;
            }
            ('s', 2..) => {
                out.push_str("%S");
                i += 2;
            }
            ('f', 3..) => {
                out.push_str("%3f");
                i += run;
            }
            ('t', 2..) => {
                out.push_str("%p");
                i += 2;
            }
            ('%', _) => {
                out.push_str("%%");
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Parse a datetime, strictly against a configured format or permissively
/// as ISO-8601 when none is given.
pub fn parse_datetime(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let text = text.trim();
    match format {
        Some(fmt) => {
            let chrono_fmt = translate_date_format(fmt);
            NaiveDateTime::parse_from_str(text, &chrono_fmt)
                .ok()
                .or_else(|| {
                    // Date-only formats parse as a date at midnight
                    NaiveDate::parse_from_str(text, &chrono_fmt)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        None => permissive_iso(text),
    }
}

fn permissive_iso(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert a non-null value into the declared target type.
///
/// The error message feeds a row-level warning; the caller substitutes the
/// nullDefault (or null).
pub fn convert_value(
    value: &Value,
    target: TargetType,
    source_format: Option<&str>,
) -> Result<Value, String> {
    match target {
        TargetType::DateTime | TargetType::DateTime2 | TargetType::SmallDateTime => {
            to_datetime(value, source_format).map(Value::DateTime)
        }
        TargetType::Date => to_datetime(value, source_format).map(|dt| Value::Date(dt.date())),
        TargetType::Int | TargetType::BigInt => to_int(value).map(Value::Int),
        TargetType::Decimal => to_decimal(value).map(Value::Decimal),
        TargetType::Float => to_decimal(value)
            .and_then(|d| {
                d.to_f64()
                    .ok_or_else(|| format!("'{}' out of float range", d))
            })
            .map(Value::Float),
        TargetType::Bit => to_bool(value).map(Value::Bool),
        TargetType::Varchar | TargetType::NVarchar => Ok(Value::Text(value.display_text())),
        TargetType::UniqueIdentifier => match value {
            Value::Uuid(u) => Ok(Value::Uuid(*u)),
            other => Uuid::parse_str(other.display_text().trim())
                .map(Value::Uuid)
                .map_err(|_| format!("'{}' is not a valid uniqueidentifier", other.display_text())),
        },
    }
}

fn to_datetime(value: &Value, source_format: Option<&str>) -> Result<NaiveDateTime, String> {
    match value {
        Value::DateTime(dt) => Ok(*dt),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| "date out of range".to_string()),
        other => {
            let text = other.display_text();
            parse_datetime(&text, source_format)
                .ok_or_else(|| format!("'{}' does not parse as a date/time", text))
        }
    }
}

fn to_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Decimal(d) if d.fract().is_zero() => d
            .to_i64()
            .ok_or_else(|| format!("'{}' out of integer range", d)),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' does not parse as an integer", s)),
        other => Err(format!(
            "'{}' does not convert to an integer",
            other.display_text()
        )),
    }
}

fn to_decimal(value: &Value) -> Result<Decimal, String> {
    value
        .as_decimal()
        .ok_or_else(|| format!("'{}' does not parse as a number", value.display_text()))
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(0) => Ok(false),
        Value::Int(1) => Ok(true),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(format!("'{}' does not parse as a bit", other)),
        },
        other => Err(format!("'{}' does not parse as a bit", other.display_text())),
    }
}
