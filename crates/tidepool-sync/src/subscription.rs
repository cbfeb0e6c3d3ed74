//! Shared live subscriptions.
//!
//! Every collection key has at most one upstream live stream open against
//! the repository, however many consumers are attached. Snapshots from the
//! upstream are written to the cache and fanned out to every consumer;
//! upstream errors are fanned out the same way. The upstream is torn down
//! when the last consumer detaches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace, warn};

use tidepool_store::{
    CollectionError, Operation, Record, Repository, RepositoryError, Unsubscribe,
};

use crate::CacheStore;

/// Consumer callback for new snapshots.
pub type SnapshotCallback<T> = Arc<dyn Fn(Arc<Vec<T>>) + Send + Sync>;

/// Consumer callback for upstream failures.
pub type FailureCallback = Arc<dyn Fn(&CollectionError) + Send + Sync>;

struct Consumer<T> {
    on_data: SnapshotCallback<T>,
    on_error: FailureCallback,
    /// Newest snapshot generation delivered to this consumer.
    delivered: Arc<AtomicU64>,
}

/// A snapshot bound for one consumer.
struct Delivery<T> {
    on_data: SnapshotCallback<T>,
    delivered: Arc<AtomicU64>,
}

impl<T> Delivery<T> {
    fn of(consumer: &Consumer<T>) -> Self {
        Self {
            on_data: Arc::clone(&consumer.on_data),
            delivered: Arc::clone(&consumer.delivered),
        }
    }

    /// Deliver unless the consumer already has a newer generation.
    fn send(&self, generation: u64, snapshot: Arc<Vec<T>>) -> bool {
        if self.delivered.fetch_max(generation, Ordering::SeqCst) >= generation {
            return false;
        }
        (self.on_data)(snapshot);
        true
    }
}

/// Per-key fan-out state.
struct Channel<T> {
    consumers: BTreeMap<u64, Consumer<T>>,
    /// Upstream handle; `None` while the upstream is being opened.
    upstream: Option<Unsubscribe>,
    /// Identifies the upstream this channel owns. Callbacks from any other
    /// upstream are ignored.
    upstream_id: u64,
    /// Newest upstream snapshot and its generation, starting at 1.
    latest: Option<(u64, Arc<Vec<T>>)>,
}

type Channels<T> = DashMap<String, Channel<T>>;

/// Deduplicates live subscriptions per collection key.
pub struct SubscriptionManager<T: Record> {
    cache: Arc<CacheStore>,
    channels: Arc<Channels<T>>,
    next_consumer: AtomicU64,
    next_upstream: AtomicU64,
}

impl<T: Record> SubscriptionManager<T> {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            channels: Arc::new(DashMap::new()),
            next_consumer: AtomicU64::new(0),
            next_upstream: AtomicU64::new(0),
        }
    }

    /// Attach a consumer to the live stream for `key`.
    ///
    /// The first consumer of a key opens the upstream. Later consumers join
    /// the existing one and, if it has already delivered data, immediately
    /// receive the newest snapshot.
    pub fn subscribe<R>(
        &self,
        key: &str,
        repository: &R,
        on_data: SnapshotCallback<T>,
        on_error: FailureCallback,
    ) -> Subscription<T>
    where
        R: Repository<T> + ?Sized,
    {
        let consumer_id = self.next_consumer.fetch_add(1, Ordering::SeqCst);
        let consumer = Consumer {
            on_data,
            on_error,
            delivered: Arc::new(AtomicU64::new(0)),
        };

        // Decide under the entry lock; call out only after releasing it.
        let (open_upstream, catch_up) = match self.channels.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                let upstream_id = self.next_upstream.fetch_add(1, Ordering::SeqCst);
                let mut consumers = BTreeMap::new();
                consumers.insert(consumer_id, consumer);
                vacant.insert(Channel {
                    consumers,
                    upstream: None,
                    upstream_id,
                    latest: None,
                });
                (Some(upstream_id), None)
            }
            Entry::Occupied(mut occupied) => {
                let channel = occupied.get_mut();
                let catch_up = channel
                    .latest
                    .clone()
                    .map(|(generation, snapshot)| (Delivery::of(&consumer), generation, snapshot));
                channel.consumers.insert(consumer_id, consumer);
                (None, catch_up)
            }
        };
        debug!(key = %key, consumer_id, "consumer attached");

        if let Some((delivery, generation, snapshot)) = catch_up {
            let count = snapshot.len();
            if delivery.send(generation, snapshot) {
                trace!(key = %key, consumer_id, generation, count, "delivered catch-up snapshot");
            }
        }

        if let Some(upstream_id) = open_upstream {
            self.open_upstream(key, repository, upstream_id);
        }

        Subscription {
            key: key.to_string(),
            consumer_id,
            channels: Arc::downgrade(&self.channels),
            detached: false,
        }
    }

    fn open_upstream<R>(&self, key: &str, repository: &R, upstream_id: u64)
    where
        R: Repository<T> + ?Sized,
    {
        debug!(key = %key, upstream_id, "opening upstream subscription");

        let on_data = {
            let channels = Arc::downgrade(&self.channels);
            let cache = Arc::clone(&self.cache);
            let key = key.to_string();
            Arc::new(move |items: Vec<T>| {
                let Some(channels) = channels.upgrade() else {
                    return;
                };
                let (generation, snapshot, deliveries) = {
                    let Some(mut channel) = channels.get_mut(&key) else {
                        return;
                    };
                    if channel.upstream_id != upstream_id {
                        return;
                    }
                    // Recorded under the channel lock so a consumer joining
                    // concurrently either catches up with this snapshot or
                    // receives it through the fan-out.
                    let snapshot = cache.write(&key, items);
                    let generation = channel.latest.as_ref().map_or(1, |(g, _)| g + 1);
                    channel.latest = Some((generation, Arc::clone(&snapshot)));
                    let deliveries: Vec<_> = channel.consumers.values().map(Delivery::of).collect();
                    (generation, snapshot, deliveries)
                };
                trace!(key = %key, generation, consumers = deliveries.len(), count = snapshot.len(), "fanning out snapshot");
                for delivery in deliveries {
                    delivery.send(generation, Arc::clone(&snapshot));
                }
            })
        };

        let on_error = {
            let channels = Arc::downgrade(&self.channels);
            let key = key.to_string();
            Arc::new(move |err: RepositoryError| {
                let Some(channels) = channels.upgrade() else {
                    return;
                };
                let error = CollectionError::from_repository(Operation::Subscribe, err);
                warn!(key = %key, code = error.code(), error = %error, "live subscription error");
                let callbacks: Vec<_> = {
                    let Some(channel) = channels.get(&key) else {
                        return;
                    };
                    if channel.upstream_id != upstream_id {
                        return;
                    }
                    channel
                        .consumers
                        .values()
                        .map(|c| Arc::clone(&c.on_error))
                        .collect()
                };
                for callback in callbacks {
                    callback(&error);
                }
            })
        };

        let handle = repository.subscribe(on_data, on_error);

        // Every consumer may have left while the upstream was opening.
        let orphaned = match self.channels.get_mut(key) {
            Some(mut channel) if channel.upstream_id == upstream_id => {
                channel.upstream = Some(handle);
                None
            }
            _ => Some(handle),
        };
        if let Some(handle) = orphaned {
            debug!(key = %key, upstream_id, "closing orphaned upstream subscription");
            handle.unsubscribe();
        }
    }

    /// Number of consumers attached to `key`.
    pub fn consumer_count(&self, key: &str) -> usize {
        self.channels
            .get(key)
            .map(|channel| channel.consumers.len())
            .unwrap_or(0)
    }

    /// Whether an upstream subscription is open for `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.channels
            .get(key)
            .is_some_and(|channel| channel.upstream.is_some())
    }

    /// Keys with at least one consumer, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.channels.iter().map(|c| c.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// A consumer's attachment to a shared live stream.
///
/// Detaches on [`Subscription::cancel`] or on drop.
#[must_use = "dropping the subscription detaches the consumer"]
pub struct Subscription<T: Record> {
    key: String,
    consumer_id: u64,
    channels: Weak<Channels<T>>,
    detached: bool,
}

impl<T: Record> Subscription<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Detach this consumer, closing the upstream if it was the last one.
    pub fn cancel(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;

        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        if let Some(mut channel) = channels.get_mut(&self.key) {
            channel.consumers.remove(&self.consumer_id);
        }
        debug!(key = %self.key, consumer_id = self.consumer_id, "consumer detached");

        let removed = channels.remove_if(&self.key, |_, channel| channel.consumers.is_empty());
        if let Some((_, channel)) = removed {
            debug!(key = %self.key, upstream_id = channel.upstream_id, "closing upstream subscription");
            if let Some(upstream) = channel.upstream {
                upstream.unsubscribe();
            }
        }
    }
}

impl<T: Record> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T: Record> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("consumer_id", &self.consumer_id)
            .field("detached", &self.detached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tidepool_store::{Document, ErrorKind, MemoryRepository};

    type Seen = Arc<Mutex<Vec<usize>>>;

    fn recorder() -> (Seen, SnapshotCallback<Document>) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let callback: SnapshotCallback<Document> =
            Arc::new(move |items: Arc<Vec<Document>>| s.lock().unwrap().push(items.len()));
        (seen, callback)
    }

    fn ignore_errors() -> FailureCallback {
        Arc::new(|_: &CollectionError| {})
    }

    fn draft(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_consumers_share_one_upstream() {
        let repo = MemoryRepository::<Document>::new();
        let manager = SubscriptionManager::new(CacheStore::new());

        let (first, on_first) = recorder();
        let (second, on_second) = recorder();
        let a = manager.subscribe("tasks", &repo, on_first, ignore_errors());
        let b = manager.subscribe("tasks", &repo, on_second, ignore_errors());

        assert_eq!(repo.listener_count(), 1);
        assert_eq!(manager.consumer_count("tasks"), 2);
        assert!(manager.is_active("tasks"));

        repo.create(draft(json!({"title": "x"}))).await.unwrap();
        assert_eq!(*first.lock().unwrap(), vec![0, 1]);
        // Catch-up of the initial snapshot, then the fan-out.
        assert_eq!(*second.lock().unwrap(), vec![0, 1]);

        a.cancel();
        assert_eq!(repo.listener_count(), 1);
        b.cancel();
        assert_eq!(repo.listener_count(), 0);
        assert!(!manager.is_active("tasks"));
        assert_eq!(manager.consumer_count("tasks"), 0);
    }

    #[tokio::test]
    async fn test_snapshots_are_cached() {
        let repo = MemoryRepository::with_records(vec![Document::from_json("1", json!({}))]);
        let cache = CacheStore::new();
        let manager = SubscriptionManager::new(Arc::clone(&cache));

        let (_seen, on_data) = recorder();
        let _sub = manager.subscribe("tasks", &repo, on_data, ignore_errors());
        assert_eq!(cache.latest::<Document>("tasks").map(|s| s.len()), Some(1));
    }

    #[tokio::test]
    async fn test_late_joiner_catches_up_after_cache_invalidation() {
        let repo = MemoryRepository::with_records(vec![Document::from_json("1", json!({}))]);
        let cache = CacheStore::new();
        let manager = SubscriptionManager::new(Arc::clone(&cache));

        let (_first, on_first) = recorder();
        let _a = manager.subscribe("tasks", &repo, on_first, ignore_errors());
        cache.invalidate_all();

        let (second, on_second) = recorder();
        let _b = manager.subscribe("tasks", &repo, on_second, ignore_errors());
        assert_eq!(*second.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_older_generation_is_not_delivered() {
        let (seen, on_data) = recorder();
        let consumer = Consumer {
            on_data,
            on_error: ignore_errors(),
            delivered: Arc::new(AtomicU64::new(0)),
        };
        let delivery = Delivery::of(&consumer);

        assert!(delivery.send(2, Arc::new(vec![Document::from_json("1", json!({}))])));
        assert!(!delivery.send(1, Arc::new(Vec::new())));
        assert!(!delivery.send(2, Arc::new(Vec::new())));
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let repo = MemoryRepository::<Document>::new();
        let manager = SubscriptionManager::new(CacheStore::new());
        {
            let (_seen, on_data) = recorder();
            let _sub = manager.subscribe("tasks", &repo, on_data, ignore_errors());
            assert_eq!(repo.listener_count(), 1);
        }
        assert_eq!(repo.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_opens_fresh_upstream() {
        let repo = MemoryRepository::<Document>::new();
        let manager = SubscriptionManager::new(CacheStore::new());

        let (_seen, on_data) = recorder();
        manager
            .subscribe("tasks", &repo, on_data, ignore_errors())
            .cancel();
        assert_eq!(repo.listener_count(), 0);

        let (seen, on_data) = recorder();
        let _sub = manager.subscribe("tasks", &repo, on_data, ignore_errors());
        assert_eq!(repo.listener_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_errors_fan_out_as_subscribe_failures() {
        let repo = MemoryRepository::<Document>::new();
        let manager = SubscriptionManager::new(CacheStore::new());

        let codes = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for _ in 0..3 {
            let c = Arc::clone(&codes);
            let (_seen, on_data) = recorder();
            subs.push(manager.subscribe(
                "tasks",
                &repo,
                on_data,
                Arc::new(move |err: &CollectionError| {
                    c.lock().unwrap().push((err.code(), err.kind()));
                }),
            ));
        }

        repo.emit_error(RepositoryError::PermissionDenied("revoked".to_string()));
        let codes = codes.lock().unwrap();
        assert_eq!(codes.len(), 3);
        assert!(
            codes
                .iter()
                .all(|(code, kind)| *code == "SUBSCRIBE_FAILED" && *kind == ErrorKind::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_keys_have_independent_upstreams() {
        let repo = MemoryRepository::<Document>::new();
        let manager = SubscriptionManager::new(CacheStore::new());

        let (_a, on_a) = recorder();
        let (_b, on_b) = recorder();
        let a = manager.subscribe("a", &repo, on_a, ignore_errors());
        let _b = manager.subscribe("b", &repo, on_b, ignore_errors());
        assert_eq!(repo.listener_count(), 2);
        assert_eq!(manager.active_keys(), vec!["a".to_string(), "b".to_string()]);

        a.cancel();
        assert_eq!(repo.listener_count(), 1);
        assert_eq!(manager.active_keys(), vec!["b".to_string()]);
    }
}
