//! Validation of parsed import rows against a field schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields an import row may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSchema {
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl ImportSchema {
    pub fn new<S: Into<String>>(required: impl IntoIterator<Item = S>) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: Vec::new(),
        }
    }

    pub fn with_optional<S: Into<String>>(mut self, optional: impl IntoIterator<Item = S>) -> Self {
        self.optional = optional.into_iter().map(Into::into).collect();
        self
    }

    fn knows(&self, field: &str) -> bool {
        self.required.iter().any(|f| f == field) || self.optional.iter().any(|f| f == field)
    }
}

/// One problem found in one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIssue {
    /// 1-based row number.
    pub row: usize,
    pub field: String,
    pub message: String,
}

/// Rows that passed, plus everything found along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportValidation {
    pub data: Vec<Map<String, Value>>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
}

impl ImportValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every row against `schema`.
///
/// A row with any required field missing, null or blank is left out of
/// `data` and gets one error per such field. Fields outside the schema
/// produce a warning each but do not reject the row.
pub fn validate_import(rows: Vec<Map<String, Value>>, schema: &ImportSchema) -> ImportValidation {
    let mut result = ImportValidation::default();

    for (index, row) in rows.into_iter().enumerate() {
        let number = index + 1;

        let missing: Vec<ImportIssue> = schema
            .required
            .iter()
            .filter(|field| is_blank(row.get(field.as_str())))
            .map(|field| ImportIssue {
                row: number,
                field: field.clone(),
                message: format!("Row {}: missing required field '{}'", number, field),
            })
            .collect();

        result.warnings.extend(
            row.keys()
                .filter(|field| !schema.knows(field))
                .map(|field| ImportIssue {
                    row: number,
                    field: field.clone(),
                    message: format!("Row {}: unknown field '{}' will be ignored", number, field),
                }),
        );

        if missing.is_empty() {
            result.data.push(row);
        } else {
            result.errors.extend(missing);
        }
    }

    result
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_missing_required_fields_reject_row() {
        let schema = ImportSchema::new(["title", "author"]);
        let result = validate_import(
            rows(json!([
                {"title": "Dune", "author": "Herbert"},
                {"title": "  ", "author": null},
                {"author": "Le Guin"},
            ])),
            &schema,
        );

        assert_eq!(result.data.len(), 1);
        assert!(!result.is_valid());
        let found: Vec<(usize, &str)> = result
            .errors
            .iter()
            .map(|e| (e.row, e.field.as_str()))
            .collect();
        assert_eq!(found, vec![(2, "title"), (2, "author"), (3, "title")]);
    }

    #[test]
    fn test_unknown_fields_warn_but_pass() {
        let schema = ImportSchema::new(["title"]).with_optional(["pages"]);
        let result = validate_import(
            rows(json!([{"title": "Dune", "pages": 412, "mood": "sandy"}])),
            &schema,
        );

        assert!(result.is_valid());
        assert_eq!(result.data.len(), 1);
        assert_eq!(
            result.warnings,
            vec![ImportIssue {
                row: 1,
                field: "mood".to_string(),
                message: "Row 1: unknown field 'mood' will be ignored".to_string(),
            }]
        );
    }

    #[test]
    fn test_zero_and_false_are_present() {
        let schema = ImportSchema::new(["count", "done"]);
        let result = validate_import(rows(json!([{"count": 0, "done": false}])), &schema);
        assert!(result.is_valid());
    }
}
