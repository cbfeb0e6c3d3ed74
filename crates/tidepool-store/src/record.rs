//! The base record contract shared by every collection.

use chrono::{DateTime, Utc};

use crate::FieldValue;

/// A record stored in a collection.
///
/// Collections differ in shape but every record carries an id that is unique
/// within its collection and creation/update timestamps. Fields are read
/// through [`Record::field`], a concrete accessor each record type provides,
/// which lets one query engine serve many record shapes.
pub trait Record: Clone + Send + Sync + 'static {
    /// Payload accepted by `Repository::create`.
    type Draft: Send + Sync + 'static;

    /// Partial update accepted by `Repository::update`.
    type Patch: Send + Sync + 'static;

    /// Unique id within the collection.
    fn id(&self) -> &str;

    /// When the record was created.
    fn created_at(&self) -> DateTime<Utc>;

    /// When the record was last updated.
    fn updated_at(&self) -> DateTime<Utc>;

    /// Read a field by name. Unknown fields read as [`FieldValue::Null`].
    fn field(&self, name: &str) -> FieldValue;

    /// Build a stored record from a draft, as a backend does on create.
    fn materialize(id: String, now: DateTime<Utc>, draft: Self::Draft) -> Self;

    /// Apply a partial update in place, stamping `updated_at`.
    fn apply_patch(&mut self, patch: Self::Patch, now: DateTime<Utc>);

    /// Check a draft before creation.
    fn validate_draft(_draft: &Self::Draft) -> Result<(), String> {
        Ok(())
    }
}
