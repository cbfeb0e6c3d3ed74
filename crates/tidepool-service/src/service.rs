//! Collection service: repository access with normalized errors, the query
//! pipeline over repository data, and export.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use tidepool_query::{filter, search_filter_sort};
use tidepool_store::{
    CollectionError, ErrorKind, FilterCriteria, Operation, Record, Repository, RepositoryError,
    SortCriteria,
};

use crate::export::{ExportOptions, export};

/// Thin orchestration over a repository.
pub struct CollectionService<T: Record> {
    repository: Arc<dyn Repository<T>>,
}

impl<T: Record> Clone for CollectionService<T> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<T: Record> CollectionService<T> {
    pub fn new(repository: Arc<dyn Repository<T>>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<T>> {
        &self.repository
    }

    /// Every record, narrowed by `filters` when any are given.
    #[tracing::instrument(skip(self, filters), fields(filters = filters.len()))]
    pub async fn get_items(&self, filters: &[FilterCriteria]) -> Result<Vec<T>, CollectionError> {
        let items = self.fetch(Operation::Fetch).await?;
        if filters.is_empty() {
            return Ok(items);
        }
        Ok(filter(&items, filters))
    }

    /// One record by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, id: &str) -> Result<T, CollectionError> {
        self.require(Operation::Fetch, id).await
    }

    /// Repository data through search, filter and sort.
    #[tracing::instrument(skip(self, fields, filters, sort))]
    pub async fn search_items<S: AsRef<str> + Sync>(
        &self,
        query: &str,
        fields: &[S],
        filters: &[FilterCriteria],
        sort: Option<&SortCriteria>,
    ) -> Result<Vec<T>, CollectionError> {
        let items = self.fetch(Operation::Search).await?;
        let result = search_filter_sort(&items, query, fields, filters, sort);
        debug!(total = items.len(), matched = result.len(), "search complete");
        Ok(result)
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn create_item(&self, draft: T::Draft) -> Result<T, CollectionError> {
        self.repository
            .create(draft)
            .await
            .map_err(|err| normalize(Operation::Create, err))
    }

    /// Update an existing record; `NOT_FOUND` when it does not exist.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_item(&self, id: &str, patch: T::Patch) -> Result<T, CollectionError> {
        self.require(Operation::Update, id).await?;
        self.repository
            .update(id, patch)
            .await
            .map_err(|err| normalize(Operation::Update, err))
    }

    /// Delete an existing record; `NOT_FOUND` when it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete_item(&self, id: &str) -> Result<(), CollectionError> {
        self.require(Operation::Delete, id).await?;
        self.repository
            .delete(id)
            .await
            .map_err(|err| normalize(Operation::Delete, err))
    }

    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_delete_items(&self, ids: &[String]) -> Result<(), CollectionError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.repository
            .bulk_delete(ids)
            .await
            .map_err(|err| normalize(Operation::BulkDelete, err))?;
        info!(count = ids.len(), "bulk delete complete");
        Ok(())
    }

    async fn fetch(&self, operation: Operation) -> Result<Vec<T>, CollectionError> {
        self.repository
            .get_all()
            .await
            .map_err(|err| normalize(operation, err))
    }

    async fn require(&self, operation: Operation, id: &str) -> Result<T, CollectionError> {
        match self.repository.get_by_id(id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                debug!(id = %id, %operation, "record not found");
                Err(CollectionError::not_found(operation, id))
            }
            Err(err) => Err(normalize(operation, err)),
        }
    }
}

impl<T: Record + Serialize> CollectionService<T> {
    /// Filtered records serialized as CSV or JSON.
    #[tracing::instrument(skip(self, filters), fields(format = %options.format))]
    pub async fn export_items(
        &self,
        options: &ExportOptions,
        filters: &[FilterCriteria],
    ) -> Result<Vec<u8>, CollectionError> {
        let items = self.fetch(Operation::Export).await?;
        let items = if filters.is_empty() {
            items
        } else {
            filter(&items, filters)
        };
        let bytes = export(&items, options).map_err(|err| {
            CollectionError::new(ErrorKind::OperationFailed, Operation::Export, err.to_string())
        })?;
        info!(count = items.len(), bytes = bytes.len(), "export complete");
        Ok(bytes)
    }
}

fn normalize(operation: Operation, err: RepositoryError) -> CollectionError {
    let error = CollectionError::from_repository(operation, err);
    warn!(code = error.code(), error = %error, "repository call failed");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};
    use tidepool_store::{Document, FilterOperator, MemoryRepository};

    fn draft(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn service() -> (Arc<MemoryRepository<Document>>, CollectionService<Document>) {
        let repo = Arc::new(MemoryRepository::with_records(vec![
            Document::from_json("1", json!({"name": "Ada", "age": 36})),
            Document::from_json("2", json!({"name": "Tim", "age": 12})),
            Document::from_json("3", json!({"name": "Grace", "age": null})),
        ]));
        (repo.clone(), CollectionService::new(repo))
    }

    #[tokio::test]
    async fn test_get_items_applies_filters() {
        let (_, service) = service();
        assert_eq!(service.get_items(&[]).await.unwrap().len(), 3);
        let adults = service
            .get_items(&[FilterCriteria::new("age", FilterOperator::Gte, 18)])
            .await
            .unwrap();
        assert_eq!(adults.len(), 1);
        assert_eq!(adults[0].id, "1");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_failed() {
        let (repo, service) = service();
        repo.fail_next(RepositoryError::Network("offline".to_string()));
        let err = service.get_items(&[]).await.unwrap_err();
        assert_eq!(err.code(), "FETCH_FAILED");
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_are_not_found() {
        let (_, service) = service();
        let err = service.update_item("nope", draft(json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "UPDATE_FAILED");
        assert!(!err.is_recoverable());

        let err = service.delete_item("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "DELETE_FAILED");

        let err = service.get_item("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_existing() {
        let (_, service) = service();
        let doc = service.update_item("2", draft(json!({"age": 13}))).await.unwrap();
        assert_eq!(doc.fields["age"], json!(13));
        assert!(doc.updated_at >= doc.created_at);
    }

    #[tokio::test]
    async fn test_search_items_runs_pipeline() {
        let (_, service) = service();
        let found = service
            .search_items("a", &["name"], &[], Some(&SortCriteria::desc("name")))
            .await
            .unwrap();
        let names: Vec<_> = found.iter().map(|d| d.fields["name"].clone()).collect();
        assert_eq!(names, vec![json!("Grace"), json!("Ada")]);
    }

    #[tokio::test]
    async fn test_create_validation_error_passes_message() {
        let (_, service) = service();
        let err = service.create_item(draft(json!({"id": "x"}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.code(), "CREATE_FAILED");
        assert_eq!(err.user_message(), err.message());
    }
}
