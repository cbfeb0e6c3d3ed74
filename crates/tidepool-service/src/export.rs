//! CSV and JSON export.

use std::fmt;
use std::str::FromStr;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Output format of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// What to export and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Fields to keep, in output order. `None` keeps every field.
    pub fields: Option<Vec<String>>,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            fields: None,
        }
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Errors raised while exporting.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize item: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Serialize `items` in the requested format.
///
/// Items are serialized to JSON objects first, so the field order is the
/// declaration order of the record type.
pub fn export<T: Serialize>(items: &[T], options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let rows = items
        .iter()
        .map(|item| to_row(item, options.fields.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;

    match options.format {
        ExportFormat::Csv => to_csv(&rows, options.fields.as_deref()),
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(&rows)?),
    }
}

fn to_row<T: Serialize>(item: &T, fields: Option<&[String]>) -> Result<Map<String, Value>, serde_json::Error> {
    let mut row = match serde_json::to_value(item)? {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Some(fields) = fields {
        row = fields
            .iter()
            .filter_map(|field| row.remove(field).map(|value| (field.clone(), value)))
            .collect();
    }
    Ok(row)
}

/// Header from the allow-list when given, else the first row's keys.
///
/// Fields are quoted only when they hold a comma, quote, CR or LF. Lines
/// are joined with `\n` and the last one is not terminated.
fn to_csv(rows: &[Map<String, Value>], fields: Option<&[String]>) -> Result<Vec<u8>, ExportError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = match fields {
        Some(fields) => fields.iter().map(String::as_str).collect(),
        None => first.keys().map(String::as_str).collect(),
    };

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header.iter())?;
    for row in rows {
        writer.write_record(header.iter().map(|key| csv_value(row.get(*key))))?;
    }

    let mut bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    Ok(bytes)
}

fn csv_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
