//! Filter and sort criteria.
//!
//! The operator semantics live here, next to the types, so that backends
//! evaluating `Repository::search` and the in-memory query engine agree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FieldValue, Record};

/// Comparison operator of a filter criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl FilterOperator {
    /// Apply the operator to a field value and a criterion value.
    ///
    /// Null field values never satisfy any operator. Text operators compare
    /// lowercased stringified values; numeric operators fail when either side
    /// does not coerce to a number.
    pub fn evaluate(self, field: &FieldValue, expected: &FieldValue) -> bool {
        if field.is_null() {
            return false;
        }

        match self {
            FilterOperator::Equals => compare_text(field, expected, |lhs, rhs| lhs == rhs),
            FilterOperator::Contains => compare_text(field, expected, |lhs, rhs| lhs.contains(rhs)),
            FilterOperator::StartsWith => {
                compare_text(field, expected, |lhs, rhs| lhs.starts_with(rhs))
            }
            FilterOperator::EndsWith => compare_text(field, expected, |lhs, rhs| lhs.ends_with(rhs)),
            FilterOperator::Gt => compare_numbers(field, expected, |lhs, rhs| lhs > rhs),
            FilterOperator::Lt => compare_numbers(field, expected, |lhs, rhs| lhs < rhs),
            FilterOperator::Gte => compare_numbers(field, expected, |lhs, rhs| lhs >= rhs),
            FilterOperator::Lte => compare_numbers(field, expected, |lhs, rhs| lhs <= rhs),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::Gt => "gt",
            FilterOperator::Lt => "lt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lte => "lte",
        }
    }
}

fn compare_text(field: &FieldValue, expected: &FieldValue, op: impl Fn(&str, &str) -> bool) -> bool {
    match (field.as_text(), expected.as_text()) {
        (Some(lhs), Some(rhs)) => op(&lhs.to_lowercase(), &rhs.to_lowercase()),
        _ => false,
    }
}

fn compare_numbers(field: &FieldValue, expected: &FieldValue, op: impl Fn(f64, f64) -> bool) -> bool {
    match (field.as_number(), expected.as_number()) {
        (Some(lhs), Some(rhs)) => op(lhs, rhs),
        _ => false,
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" | "eq" => Ok(FilterOperator::Equals),
            "contains" => Ok(FilterOperator::Contains),
            "startsWith" | "starts_with" => Ok(FilterOperator::StartsWith),
            "endsWith" | "ends_with" => Ok(FilterOperator::EndsWith),
            "gt" => Ok(FilterOperator::Gt),
            "lt" => Ok(FilterOperator::Lt),
            "gte" => Ok(FilterOperator::Gte),
            "lte" => Ok(FilterOperator::Lte),
            other => Err(format!("unknown filter operator '{}'", other)),
        }
    }
}

/// A single filter predicate over one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FieldValue,
}

impl FilterCriteria {
    /// Create a criterion.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Whether the record satisfies this criterion.
    pub fn matches<T: Record>(&self, record: &T) -> bool {
        self.operator.evaluate(&record.field(&self.field), &self.value)
    }
}

/// Check a record against every criterion (AND-combined).
pub fn matches_all<T: Record>(record: &T, criteria: &[FilterCriteria]) -> bool {
    criteria.iter().all(|c| c.matches(record))
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{}'", other)),
        }
    }
}

/// The active sort of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCriteria {
    pub field: String,
    pub direction: SortDirection,
}

impl SortCriteria {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}
