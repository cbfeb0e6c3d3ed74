//! Mutation coordinator.
//!
//! Issues writes against a repository and tracks which kinds of write are
//! in flight. Failures never escape as `Err`: they are normalized, reported
//! to the error handler, remembered, and the call resolves to `None` or
//! `false`.
//!
//! The coordinator never touches a cache. Results become visible through the
//! live subscription or an explicit refetch.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tidepool_store::{CollectionError, Operation, Record, Repository, RepositoryError};

/// The kinds of write the coordinator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    BulkDelete,
}

impl MutationKind {
    const ALL: [MutationKind; 4] = [
        MutationKind::Create,
        MutationKind::Update,
        MutationKind::Delete,
        MutationKind::BulkDelete,
    ];

    pub fn operation(self) -> Operation {
        match self {
            MutationKind::Create => Operation::Create,
            MutationKind::Update => Operation::Update,
            MutationKind::Delete => Operation::Delete,
            MutationKind::BulkDelete => Operation::BulkDelete,
        }
    }

    fn index(self) -> usize {
        match self {
            MutationKind::Create => 0,
            MutationKind::Update => 1,
            MutationKind::Delete => 2,
            MutationKind::BulkDelete => 3,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
            MutationKind::BulkDelete => "bulkDelete",
        };
        f.write_str(name)
    }
}

/// In-flight flags, one per mutation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationState {
    pub creating: bool,
    pub updating: bool,
    pub deleting: bool,
    pub bulk_deleting: bool,
}

impl MutationState {
    /// Whether any mutation is in flight.
    pub fn is_busy(&self) -> bool {
        self.creating || self.updating || self.deleting || self.bulk_deleting
    }

    pub fn get(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Create => self.creating,
            MutationKind::Update => self.updating,
            MutationKind::Delete => self.deleting,
            MutationKind::BulkDelete => self.bulk_deleting,
        }
    }

    fn set(&mut self, kind: MutationKind, value: bool) {
        match kind {
            MutationKind::Create => self.creating = value,
            MutationKind::Update => self.updating = value,
            MutationKind::Delete => self.deleting = value,
            MutationKind::BulkDelete => self.bulk_deleting = value,
        }
    }
}

/// Handler for normalized mutation failures.
pub type MutationErrorCallback = Arc<dyn Fn(&CollectionError, MutationKind) + Send + Sync>;

/// Bulk delete progress: `(completed, total)`.
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Sequences writes against a repository.
pub struct MutationCoordinator<T: Record> {
    repository: Arc<dyn Repository<T>>,
    /// In-flight operations per kind, indexed by `MutationKind::index`.
    in_flight: Mutex<[usize; 4]>,
    state_tx: watch::Sender<MutationState>,
    on_error: Option<MutationErrorCallback>,
    last_error: Mutex<Option<CollectionError>>,
}

impl<T: Record> MutationCoordinator<T> {
    pub fn new(repository: Arc<dyn Repository<T>>) -> Self {
        let (state_tx, _) = watch::channel(MutationState::default());
        Self {
            repository,
            in_flight: Mutex::new([0; 4]),
            state_tx,
            on_error: None,
            last_error: Mutex::new(None),
        }
    }

    /// Report failures to `handler` in addition to logging them.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&CollectionError, MutationKind) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Current in-flight flags.
    pub fn state(&self) -> MutationState {
        *self.state_tx.borrow()
    }

    /// Receiver notified whenever a flag changes.
    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.state_tx.subscribe()
    }

    /// The most recent failure, if any.
    pub fn last_error(&self) -> Option<CollectionError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Create a record. `None` on failure.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create(&self, draft: T::Draft) -> Option<T> {
        let _guard = self.begin(MutationKind::Create);
        match self.repository.create(draft).await {
            Ok(record) => {
                debug!(id = %record.id(), "record created");
                Some(record)
            }
            Err(err) => {
                self.fail(MutationKind::Create, err);
                None
            }
        }
    }

    /// Update a record. `None` on failure.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: T::Patch) -> Option<T> {
        let _guard = self.begin(MutationKind::Update);
        match self.repository.update(id, patch).await {
            Ok(record) => {
                debug!(id = %id, "record updated");
                Some(record)
            }
            Err(err) => {
                self.fail(MutationKind::Update, err);
                None
            }
        }
    }

    /// Delete one record. `false` on failure.
    #[tracing::instrument(skip(self))]
    pub async fn delete_one(&self, id: &str) -> bool {
        let _guard = self.begin(MutationKind::Delete);
        match self.repository.delete(id).await {
            Ok(()) => {
                debug!(id = %id, "record deleted");
                true
            }
            Err(err) => {
                self.fail(MutationKind::Delete, err);
                false
            }
        }
    }

    /// Delete many records.
    ///
    /// With a progress callback and more than one id, deletes run one at a
    /// time and `on_progress(completed, total)` fires after each; the first
    /// failure stops the batch. Otherwise the whole batch goes to the
    /// repository in a single call.
    #[tracing::instrument(skip(self, ids, on_progress), fields(count = ids.len()))]
    pub async fn bulk_delete(&self, ids: &[String], on_progress: Option<ProgressCallback<'_>>) -> bool {
        if ids.is_empty() {
            return true;
        }
        let _guard = self.begin(MutationKind::BulkDelete);

        let result = match on_progress {
            Some(on_progress) if ids.len() > 1 => {
                self.delete_sequentially(ids, on_progress).await
            }
            _ => self.repository.bulk_delete(ids).await,
        };

        match result {
            Ok(()) => {
                info!(count = ids.len(), "bulk delete complete");
                true
            }
            Err(err) => {
                self.fail(MutationKind::BulkDelete, err);
                false
            }
        }
    }

    async fn delete_sequentially(
        &self,
        ids: &[String],
        on_progress: ProgressCallback<'_>,
    ) -> Result<(), RepositoryError> {
        let total = ids.len();
        for (index, id) in ids.iter().enumerate() {
            if let Err(err) = self.repository.delete(id).await {
                warn!(id = %id, completed = index, total, "bulk delete stopped");
                return Err(err);
            }
            on_progress(index + 1, total);
        }
        Ok(())
    }

    fn fail(&self, kind: MutationKind, err: RepositoryError) {
        let error = CollectionError::from_repository(kind.operation(), err);
        warn!(operation = %kind, code = error.code(), error = %error, "mutation failed");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        if let Some(on_error) = &self.on_error {
            on_error(&error, kind);
        }
    }

    fn begin(&self, kind: MutationKind) -> InFlight<'_, T> {
        self.adjust(kind, true);
        InFlight {
            coordinator: self,
            kind,
        }
    }

    fn adjust(&self, kind: MutationKind, starting: bool) {
        let mut counts = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let count = &mut counts[kind.index()];
        if starting {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
        let active = *count > 0;
        self.state_tx.send_if_modified(|state| {
            let changed = state.get(kind) != active;
            state.set(kind, active);
            changed
        });
    }

    /// In-flight operation counts, for diagnostics.
    pub fn in_flight(&self) -> Vec<(MutationKind, usize)> {
        let counts = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        MutationKind::ALL
            .iter()
            .map(|kind| (*kind, counts[kind.index()]))
            .collect()
    }
}

/// Clears an in-flight flag when the operation ends, including when its
/// future is dropped.
struct InFlight<'a, T: Record> {
    coordinator: &'a MutationCoordinator<T>,
    kind: MutationKind,
}

impl<T: Record> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.coordinator.adjust(self.kind, false);
    }
}
