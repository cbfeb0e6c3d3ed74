//! Parsers for command-line values.

use serde_json::Value;
use tidepool_store::{FieldValue, FilterCriteria, FilterOperator, SortCriteria, SortDirection};

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
pub fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

/// `field:operator:value`. The value is read as JSON when it parses
/// (`18`, `true`), else as text.
pub fn parse_filter(s: &str) -> Result<FilterCriteria, String> {
    let mut parts = s.splitn(3, ':');
    let (Some(field), Some(operator), Some(raw)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected field:operator:value, got '{}'", s));
    };
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    let operator: FilterOperator = operator.parse()?;
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(json @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => FieldValue::from_json(&json),
        _ => FieldValue::from(raw),
    };
    Ok(FilterCriteria::new(field, operator, value))
}

/// `field` or `field:asc` / `field:desc`.
pub fn parse_sort(s: &str) -> Result<SortCriteria, String> {
    let (field, direction) = match s.split_once(':') {
        Some((field, direction)) => (field, direction.parse::<SortDirection>()?),
        None => (s, SortDirection::Asc),
    };
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    Ok(SortCriteria {
        field: field.to_string(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_filter_numeric() {
        let criteria = parse_filter("age:gte:18").unwrap();
        assert_eq!(criteria.field, "age");
        assert_eq!(criteria.operator, FilterOperator::Gte);
        assert_eq!(criteria.value, FieldValue::Number(18.0));
    }

    #[test]
    fn test_parse_filter_text_keeps_colons() {
        let criteria = parse_filter("url:startsWith:https://x").unwrap();
        assert_eq!(criteria.operator, FilterOperator::StartsWith);
        assert_eq!(criteria.value, FieldValue::Text("https://x".to_string()));
    }

    #[test]
    fn test_parse_filter_rejects_garbage() {
        assert!(parse_filter("age").is_err());
        assert!(parse_filter("age:between:3").is_err());
        assert!(parse_filter(":eq:3").is_err());
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort("title").unwrap(), SortCriteria::asc("title"));
        assert_eq!(parse_sort("title:desc").unwrap(), SortCriteria::desc("title"));
        assert!(parse_sort("title:sideways").is_err());
    }

    #[test]
    fn test_parse_bool_env() {
        assert_eq!(parse_bool_env("YES"), Ok(true));
        assert_eq!(parse_bool_env(""), Ok(false));
        assert!(parse_bool_env("maybe").is_err());
    }
}
