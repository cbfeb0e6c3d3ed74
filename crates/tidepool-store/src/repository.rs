//! The repository contract every document store backend satisfies.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{FilterCriteria, Record, RepositoryError};

/// Callback receiving a full collection snapshot from the upstream.
pub type DataCallback<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

/// Callback receiving upstream errors.
pub type ErrorCallback = Arc<dyn Fn(RepositoryError) + Send + Sync>;

/// Handle that tears down an upstream live subscription.
///
/// Calling [`Unsubscribe::unsubscribe`] or dropping the handle detaches the
/// callbacks; either way the teardown runs once.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct Unsubscribe {
    teardown: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Unsubscribe {
    pub fn new(teardown: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// Capability interface of a remote document collection.
///
/// All calls except [`Repository::subscribe`] suspend until the store
/// answers. `subscribe` registers callbacks and returns immediately; data
/// arrives later, whenever the upstream pushes a new snapshot.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Fetch every record in the collection.
    async fn get_all(&self) -> Result<Vec<T>, RepositoryError>;

    /// Fetch one record, `None` when absent.
    async fn get_by_id(&self, id: &str) -> Result<Option<T>, RepositoryError>;

    /// Create a record; the backend assigns id and timestamps.
    async fn create(&self, draft: T::Draft) -> Result<T, RepositoryError>;

    /// Apply a partial update to an existing record.
    async fn update(&self, id: &str, patch: T::Patch) -> Result<T, RepositoryError>;

    /// Delete one record.
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Delete many records in one call.
    ///
    /// Partial-failure behavior is backend specific; see the backend docs.
    async fn bulk_delete(&self, ids: &[String]) -> Result<(), RepositoryError>;

    /// Fetch the records matching every criterion.
    async fn search(&self, criteria: &[FilterCriteria]) -> Result<Vec<T>, RepositoryError>;

    /// Register for live snapshots of the collection.
    ///
    /// `on_error` may fire any time after this returns.
    fn subscribe(&self, on_data: DataCallback<T>, on_error: ErrorCallback) -> Unsubscribe;
}

#[async_trait]
impl<T, R> Repository<T> for Arc<R>
where
    T: Record,
    R: Repository<T> + ?Sized,
{
    async fn get_all(&self) -> Result<Vec<T>, RepositoryError> {
        (**self).get_all().await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        (**self).get_by_id(id).await
    }

    async fn create(&self, draft: T::Draft) -> Result<T, RepositoryError> {
        (**self).create(draft).await
    }

    async fn update(&self, id: &str, patch: T::Patch) -> Result<T, RepositoryError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        (**self).delete(id).await
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<(), RepositoryError> {
        (**self).bulk_delete(ids).await
    }

    async fn search(&self, criteria: &[FilterCriteria]) -> Result<Vec<T>, RepositoryError> {
        (**self).search(criteria).await
    }

    fn subscribe(&self, on_data: DataCallback<T>, on_error: ErrorCallback) -> Unsubscribe {
        (**self).subscribe(on_data, on_error)
    }
}
