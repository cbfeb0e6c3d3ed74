//! Dynamically typed field values returned by record accessors.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A single field value read from a record.
///
/// `Null` stands for both a null and an absent field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Whether this value is null or absent.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Stringified form used by text comparisons.
    ///
    /// Returns `None` for null values so callers can fail closed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Numeric coercion used by the ordering operators.
    ///
    /// Returns `None` when the value has no numeric meaning (null, blank or
    /// non-numeric text, NaN). Text spelling out infinity or NaN is
    /// non-numeric too.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Null => return None,
            FieldValue::Number(n) => *n,
            FieldValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            FieldValue::Timestamp(ts) => ts.timestamp_millis() as f64,
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let n = trimmed.parse::<f64>().ok()?;
                if !n.is_finite() {
                    return None;
                }
                n
            }
        };
        if n.is_nan() { None } else { Some(n) }
    }

    /// Convert a JSON value into a field value.
    ///
    /// Arrays and objects are kept as their compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(f64::from(n))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Number(f64::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(FieldValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_numbers_must_be_finite() {
        assert_eq!(FieldValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(FieldValue::from("1e3").as_number(), Some(1000.0));
        assert_eq!(FieldValue::from("inf").as_number(), None);
        assert_eq!(FieldValue::from("-Infinity").as_number(), None);
        assert_eq!(FieldValue::from("   ").as_number(), None);
    }

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(FieldValue::Number(18.0).to_string(), "18");
        assert_eq!(FieldValue::Number(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(FieldValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(FieldValue::from(true).as_number(), Some(1.0));
        assert_eq!(FieldValue::from("abc").as_number(), None);
        assert_eq!(FieldValue::from("").as_number(), None);
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
        assert_eq!(FieldValue::Null.as_number(), None);
    }

    #[test]
    fn test_null_has_no_text() {
        assert_eq!(FieldValue::Null.as_text(), None);
        assert_eq!(FieldValue::from(Option::<i32>::None), FieldValue::Null);
        assert_eq!(FieldValue::from("").as_text(), Some(String::new()));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(FieldValue::from_json(&serde_json::json!(3)), FieldValue::Number(3.0));
        assert_eq!(FieldValue::from_json(&serde_json::json!(null)), FieldValue::Null);
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(["a", 1])),
            FieldValue::Text("[\"a\",1]".to_string())
        );
    }
}
