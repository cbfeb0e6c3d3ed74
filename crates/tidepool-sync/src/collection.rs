//! Collection views: a consumer-side handle that keeps one collection
//! current through the cache and, optionally, a live subscription.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use tidepool_store::{CollectionError, Operation, Record, Repository};

use crate::{CacheStore, SubscriptionManager, Subscription, SyncConfig};

/// What a consumer renders.
#[derive(Debug, Clone)]
pub struct CollectionState<T> {
    pub items: Arc<Vec<T>>,
    pub loading: bool,
    pub error: Option<CollectionError>,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            loading: false,
            error: None,
        }
    }
}

/// A consumer of one collection key.
///
/// Results that arrive after [`CollectionView::detach`] are still written to
/// the cache but never published to the view's state.
pub struct CollectionView<T: Record> {
    key: String,
    repository: Arc<dyn Repository<T>>,
    cache: Arc<CacheStore>,
    config: SyncConfig,
    state_tx: Arc<watch::Sender<CollectionState<T>>>,
    alive: Arc<AtomicBool>,
    subscription: Mutex<Option<Subscription<T>>>,
}

impl<T: Record> CollectionView<T> {
    /// Open a view on `key`.
    ///
    /// In realtime mode the view joins the shared live subscription for the
    /// key; otherwise it loads once, from the cache when fresh.
    #[tracing::instrument(skip(repository, cache, subscriptions))]
    pub async fn open(
        key: &str,
        repository: Arc<dyn Repository<T>>,
        cache: Arc<CacheStore>,
        subscriptions: &SubscriptionManager<T>,
        config: SyncConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(CollectionState::default());
        let view = Self {
            key: key.to_string(),
            repository,
            cache,
            config,
            state_tx: Arc::new(state_tx),
            alive: Arc::new(AtomicBool::new(true)),
            subscription: Mutex::new(None),
        };

        if view.config.realtime {
            view.attach(subscriptions).await;
        } else {
            view.load().await;
        }
        view
    }

    async fn attach(&self, subscriptions: &SubscriptionManager<T>) {
        self.state_tx.send_modify(|state| state.loading = true);

        let on_data = {
            let state_tx = Arc::clone(&self.state_tx);
            let alive = Arc::clone(&self.alive);
            Arc::new(move |items: Arc<Vec<T>>| {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                state_tx.send_modify(|state| {
                    state.items = items;
                    state.loading = false;
                    state.error = None;
                });
            })
        };
        let on_error = {
            let state_tx = Arc::clone(&self.state_tx);
            let alive = Arc::clone(&self.alive);
            Arc::new(move |err: &CollectionError| {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                let err = err.clone();
                state_tx.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(err);
                });
            })
        };

        let subscription =
            subscriptions.subscribe(&self.key, &*self.repository, on_data, on_error);
        *self.subscription.lock().await = Some(subscription);
    }

    /// Serve from the cache when fresh, otherwise fetch.
    async fn load(&self) {
        match self.cache.read::<T>(&self.key, self.config.cache_ttl) {
            Some(items) => {
                debug!(key = %self.key, count = items.len(), "served from cache");
                self.publish(|state| {
                    state.items = items;
                    state.loading = false;
                    state.error = None;
                });
            }
            None => self.fetch().await,
        }
    }

    async fn fetch(&self) {
        self.publish(|state| state.loading = true);

        match self.repository.get_all().await {
            Ok(items) => {
                let items = self.cache.write(&self.key, items);
                debug!(key = %self.key, count = items.len(), "fetched collection");
                self.publish(|state| {
                    state.items = items;
                    state.loading = false;
                    state.error = None;
                });
            }
            Err(err) => {
                let error = CollectionError::from_repository(Operation::Fetch, err);
                warn!(key = %self.key, code = error.code(), error = %error, "fetch failed");
                self.publish(|state| {
                    state.loading = false;
                    state.error = Some(error);
                });
            }
        }
    }

    /// Discard the cached snapshot and fetch again.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub async fn refetch(&self) {
        self.cache.invalidate(&self.key);
        self.fetch().await;
    }

    fn publish(&self, update: impl FnOnce(&mut CollectionState<T>)) {
        if self.alive.load(Ordering::SeqCst) {
            self.state_tx.send_modify(update);
        } else {
            debug!(key = %self.key, "view detached, discarding result");
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state.
    pub fn state(&self) -> CollectionState<T> {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<CollectionState<T>> {
        self.state_tx.subscribe()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop publishing and leave the live subscription, if any.
    pub async fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.cancel();
        }
        debug!(key = %self.key, "view detached");
    }
}

impl<T: Record> fmt::Debug for CollectionView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionView")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("alive", &self.is_alive())
            .finish()
    }
}
