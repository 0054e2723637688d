use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use serde::Deserialize;
use serde_json::Value;

const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d %B %Y", "%B %d, %Y", "%b %d, %Y",
];

/// Output type coercion applied to an extracted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Reformat as `YYYY-MM-DD HH:MM:SS` (UTC)
    Date,
    /// Integer cast
    Int,
    /// Unknown type names pass the value through
    #[serde(other)]
    Raw,
}

pub fn coerce(value: Value, field_type: Option<FieldType>) -> Value {
    match field_type {
        Some(FieldType::Date) => Value::String(format_date(&value).unwrap_or_default()),
        Some(FieldType::Int) => Value::from(int_cast(&value)),
        Some(FieldType::Raw) | None => value,
    }
}

/// Integer-looking values are Unix timestamps, anything else is parsed as a
/// date string. Unparseable values and the zero timestamp yield `None`.
fn format_date(value: &Value) -> Option<String> {
    let timestamp = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(timestamp) => timestamp,
            Err(_) => parse_date(s.trim())?.timestamp(),
        },
        _ => return None,
    };

    if timestamp == 0 {
        return None;
    }

    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|date| date.format(OUTPUT_FORMAT).to_string())
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(s) {
        return Some(date.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Integer cast: numbers truncate, strings use their leading integer
/// (`"42abc"` is 42, `"abc"` is 0), booleans are 0/1, empty values are 0.
fn int_cast(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => leading_integer(s),
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Object(fields) => i64::from(!fields.is_empty()),
    }
}

fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    let digits = &digits[..end];
    if digits.is_empty() {
        return 0;
    }

    // Only overflow is left as a parse failure; saturate like a cast
    match digits.parse::<i64>() {
        Ok(n) => sign * n,
        Err(_) if sign < 0 => i64::MIN,
        Err(_) => i64::MAX,
    }
}
