//! JSON file data source.

use std::path::Path;

use miette::{IntoDiagnostic, Result, WrapErr};
use serde_json::{Map, Value};
use tracing::debug;

use tidepool_store::Document;

/// Read a file holding a JSON array of objects.
pub async fn read_rows(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not valid JSON", path.display()))?;

    let Value::Array(items) = value else {
        return Err(miette::miette!(
            "{} must contain a JSON array of objects",
            path.display()
        ));
    };

    let rows = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(miette::miette!(
                "row {} of {} is not an object: {}",
                index + 1,
                path.display(),
                other
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(path = %path.display(), count = rows.len(), "read rows");
    Ok(rows)
}

/// Read a file of documents. Every row needs an `id`; `createdAt` and
/// `updatedAt` default to now.
pub async fn load_documents(path: &Path) -> Result<Vec<Document>> {
    read_rows(path)
        .await?
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<Document>(Value::Object(row))
                .map_err(|e| miette::miette!("row {} of {}: {}", index + 1, path.display(), e))
        })
        .collect()
}

/// Collection key for a data file: its file stem.
pub fn collection_key(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("books")
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_documents() {
        let file = write_temp(
            r#"[{"id": "1", "title": "Dune"}, {"id": "2", "createdAt": "2024-01-01T00:00:00Z", "title": "Emma"}]"#,
        );
        let docs = load_documents(file.path()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].fields["title"], "Dune");
        assert_eq!(docs[1].created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_rejects_non_array_and_non_objects() {
        let file = write_temp(r#"{"id": "1"}"#);
        assert!(load_documents(file.path()).await.is_err());

        let file = write_temp(r#"[{"id": "1"}, 3]"#);
        assert!(read_rows(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_id_is_an_error() {
        let file = write_temp(r#"[{"title": "anonymous"}]"#);
        assert!(load_documents(file.path()).await.is_err());
    }

    #[test]
    fn test_collection_key_is_stem() {
        assert_eq!(collection_key(Path::new("/data/books.json")), "books");
    }
}
