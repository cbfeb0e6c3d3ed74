//! Schemaless document records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{FieldValue, Record};

/// Keys managed by the store rather than the document body.
const RESERVED_KEYS: &[&str] = &["id", "createdAt", "updatedAt"];

/// A record whose fields are an ordered JSON object.
///
/// Serializes flat: `id`, `createdAt`, `updatedAt`, then the fields in
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Build a document with both timestamps set to now.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    /// Build a document from a JSON object literal.
    ///
    /// Non-object values produce a document without fields.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(id, fields),
            _ => Self::new(id, Map::new()),
        }
    }
}

impl Record for Document {
    type Draft = Map<String, Value>;
    type Patch = Map<String, Value>;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Text(self.id.clone()),
            "createdAt" => FieldValue::Timestamp(self.created_at),
            "updatedAt" => FieldValue::Timestamp(self.updated_at),
            _ => self
                .fields
                .get(name)
                .map_or(FieldValue::Null, FieldValue::from_json),
        }
    }

    fn materialize(id: String, now: DateTime<Utc>, draft: Self::Draft) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            fields: draft,
        }
    }

    fn apply_patch(&mut self, patch: Self::Patch, now: DateTime<Utc>) {
        for (key, value) in patch {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.fields.insert(key, value);
        }
        self.updated_at = now;
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), String> {
        match RESERVED_KEYS.iter().find(|k| draft.contains_key(**k)) {
            Some(key) => Err(format!("field '{}' is assigned by the store", key)),
            None => Ok(()),
        }
    }
}
