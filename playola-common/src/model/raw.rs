//! Field accessors for raw server payloads
//!
//! Every accessor distinguishes "absent or null" from "present with the wrong
//! type"; the latter is always a [`Error::MalformedPayload`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{Error, Result};

fn malformed(context: &str, field: &str, expected: &str) -> Error {
    Error::MalformedPayload(format!("{}: field `{}` {}", context, field, expected))
}

fn present<'a>(raw: &'a Value, field: &str) -> Option<&'a Value> {
    raw.get(field).filter(|v| !v.is_null())
}

pub(crate) fn ensure_object(raw: &Value, context: &str) -> Result<()> {
    if raw.is_object() {
        Ok(())
    } else {
        Err(Error::MalformedPayload(format!("{}: expected a JSON object", context)))
    }
}

pub(crate) fn required_str<'a>(raw: &'a Value, field: &str, context: &str) -> Result<&'a str> {
    optional_str(raw, field, context)?.ok_or_else(|| malformed(context, field, "is required"))
}

pub(crate) fn optional_str<'a>(
    raw: &'a Value,
    field: &str,
    context: &str,
) -> Result<Option<&'a str>> {
    match present(raw, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(malformed(context, field, "must be a string")),
    }
}

/// Non-negative millisecond quantities; the server sometimes sends floats.
/// Longest marker or duration accepted from the server: one week
pub(crate) const MAX_MILLIS: u64 = 7 * 24 * 60 * 60 * 1000;

pub(crate) fn optional_millis(raw: &Value, field: &str, context: &str) -> Result<Option<u64>> {
    let ms = match present(raw, field) {
        None => return Ok(None),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => v,
            (None, Some(f)) if f >= 0.0 && f.is_finite() => f.round() as u64,
            _ => return Err(malformed(context, field, "must be a non-negative number")),
        },
        Some(_) => return Err(malformed(context, field, "must be a number")),
    };
    if ms > MAX_MILLIS {
        return Err(malformed(context, field, "is longer than a week"));
    }
    Ok(Some(ms))
}

pub(crate) fn required_millis(raw: &Value, field: &str, context: &str) -> Result<u64> {
    optional_millis(raw, field, context)?.ok_or_else(|| malformed(context, field, "is required"))
}

pub(crate) fn required_i64(raw: &Value, field: &str, context: &str) -> Result<i64> {
    match present(raw, field) {
        None => Err(malformed(context, field, "is required")),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| malformed(context, field, "must be an integer")),
    }
}

pub(crate) fn optional_bool(raw: &Value, field: &str, context: &str) -> Result<Option<bool>> {
    match present(raw, field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(malformed(context, field, "must be a boolean")),
    }
}

pub(crate) fn optional_datetime(
    raw: &Value,
    field: &str,
    context: &str,
) -> Result<Option<DateTime<Utc>>> {
    match optional_str(raw, field, context)? {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| malformed(context, field, "must be an RFC 3339 timestamp")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_and_null_are_none() {
        let raw = json!({ "a": null });
        assert_eq!(optional_str(&raw, "a", "t").unwrap(), None);
        assert_eq!(optional_str(&raw, "b", "t").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let raw = json!({ "a": 12 });
        assert!(matches!(
            optional_str(&raw, "a", "t"),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_millis_accepts_floats() {
        let raw = json!({ "eom": 1234.6 });
        assert_eq!(optional_millis(&raw, "eom", "t").unwrap(), Some(1235));
    }

    #[test]
    fn test_millis_rejects_negative() {
        let raw = json!({ "eom": -5 });
        assert!(optional_millis(&raw, "eom", "t").is_err());
    }

    #[test]
    fn test_millis_rejects_out_of_range() {
        let raw = json!({ "duration": 9_000_000_000_000_000_000u64, "eom": 1e300 });
        assert!(matches!(
            optional_millis(&raw, "duration", "t"),
            Err(Error::MalformedPayload(_))
        ));
        assert!(optional_millis(&raw, "eom", "t").is_err());

        let week = json!({ "eom": MAX_MILLIS });
        assert_eq!(optional_millis(&week, "eom", "t").unwrap(), Some(MAX_MILLIS));
    }

    #[test]
    fn test_datetime_parsing() {
        let raw = json!({ "airtime": "2024-03-01T10:00:00.000Z" });
        let parsed = optional_datetime(&raw, "airtime", "t").unwrap().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:00:00+00:00");

        let bad = json!({ "airtime": "yesterday" });
        assert!(optional_datetime(&bad, "airtime", "t").is_err());
    }
}
