//! In-process repository backend.
//!
//! Holds a collection in memory and pushes full snapshots to live listeners
//! after every successful mutation, mirroring how a document store's
//! snapshot listener behaves. Used by the CLI and as the reference backend in
//! tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::criteria::matches_all;
use crate::{
    DataCallback, ErrorCallback, FilterCriteria, Record, Repository, RepositoryError, Unsubscribe,
};

struct Listener<T> {
    on_data: DataCallback<T>,
    on_error: ErrorCallback,
}

/// An in-memory collection.
///
/// `bulk_delete` is all-or-nothing: it runs under a single write lock and
/// skips ids that do not exist.
pub struct MemoryRepository<T: Record> {
    /// Records in insertion order.
    records: RwLock<Vec<T>>,
    /// Live listeners by registration id.
    listeners: Arc<DashMap<u64, Listener<T>>>,
    next_listener: AtomicU64,
    /// Errors injected for upcoming calls, consumed one per call.
    faults: Mutex<VecDeque<RepositoryError>>,
    /// Ids whose single-record delete fails.
    undeletable: Mutex<HashSet<String>>,
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryRepository<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Create a collection seeded with existing records.
    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: RwLock::new(records),
            listeners: Arc::new(DashMap::new()),
            next_listener: AtomicU64::new(0),
            faults: Mutex::new(VecDeque::new()),
            undeletable: Mutex::new(HashSet::new()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Make the next call fail with `err`. Queued faults apply in order.
    pub fn fail_next(&self, err: RepositoryError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Make every single-record delete of `id` fail with a network error.
    pub fn fail_deletes_of(&self, id: impl Into<String>) {
        self.undeletable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Push an upstream error to every listener.
    pub fn emit_error(&self, err: RepositoryError) {
        let callbacks: Vec<_> = self
            .listeners
            .iter()
            .map(|l| Arc::clone(&l.on_error))
            .collect();
        for on_error in callbacks {
            on_error(err.clone());
        }
    }

    /// Push the current snapshot to every listener.
    pub fn emit_snapshot(&self) {
        let snapshot = self.read_records().clone();
        let callbacks: Vec<_> = self
            .listeners
            .iter()
            .map(|l| Arc::clone(&l.on_data))
            .collect();
        trace!(listeners = callbacks.len(), count = snapshot.len(), "emitting snapshot");
        for on_data in callbacks {
            on_data(snapshot.clone());
        }
    }

    fn take_fault(&self) -> Result<(), RepositoryError> {
        match self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read_records(&self) -> std::sync::RwLockReadGuard<'_, Vec<T>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_records(&self) -> std::sync::RwLockWriteGuard<'_, Vec<T>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>, RepositoryError> {
        self.take_fault()?;
        Ok(self.read_records().clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        self.take_fault()?;
        Ok(self.read_records().iter().find(|r| r.id() == id).cloned())
    }

    async fn create(&self, draft: T::Draft) -> Result<T, RepositoryError> {
        self.take_fault()?;
        T::validate_draft(&draft).map_err(RepositoryError::Validation)?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = T::materialize(id, Utc::now(), draft);
        self.write_records().push(record.clone());
        debug!(id = %record.id(), "created record");

        self.emit_snapshot();
        Ok(record)
    }

    async fn update(&self, id: &str, patch: T::Patch) -> Result<T, RepositoryError> {
        self.take_fault()?;
        let updated = {
            let mut records = self.write_records();
            let record = records
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })?;
            record.apply_patch(patch, Utc::now());
            record.clone()
        };
        debug!(id = %id, "updated record");

        self.emit_snapshot();
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.take_fault()?;
        if self
            .undeletable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(RepositoryError::Network(format!("delete of {} failed", id)));
        }
        {
            let mut records = self.write_records();
            let index = records
                .iter()
                .position(|r| r.id() == id)
                .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })?;
            records.remove(index);
        }
        debug!(id = %id, "deleted record");

        self.emit_snapshot();
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<(), RepositoryError> {
        self.take_fault()?;
        let removed = {
            let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let mut records = self.write_records();
            let before = records.len();
            records.retain(|r| !doomed.contains(r.id()));
            before - records.len()
        };
        debug!(requested = ids.len(), removed, "bulk deleted records");

        self.emit_snapshot();
        Ok(())
    }

    async fn search(&self, criteria: &[FilterCriteria]) -> Result<Vec<T>, RepositoryError> {
        self.take_fault()?;
        Ok(self
            .read_records()
            .iter()
            .filter(|r| matches_all(*r, criteria))
            .cloned()
            .collect())
    }

    fn subscribe(&self, on_data: DataCallback<T>, on_error: ErrorCallback) -> Unsubscribe {
        let listener_id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(
            listener_id,
            Listener {
                on_data: Arc::clone(&on_data),
                on_error,
            },
        );
        debug!(listener_id, "listener attached");

        // Initial snapshot, as a document store listener delivers on attach.
        let snapshot = self.read_records().clone();
        on_data(snapshot);

        let listeners = Arc::clone(&self.listeners);
        Unsubscribe::new(move || {
            listeners.remove(&listener_id);
            debug!(listener_id, "listener detached");
        })
    }
}
