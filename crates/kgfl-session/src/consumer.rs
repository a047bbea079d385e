//! Read-side cached queries that re-fetch on invalidation.
//!
//! Each fetch is stamped with a generation number. Only the response to the
//! most recently issued fetch is applied; an older response that arrives late
//! is dropped instead of overwriting newer data.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::coordinator::TokenRefreshCoordinator;
use crate::endpoints::ConsumerQuery;
use crate::error::{Result, SessionError};
use crate::http::{ApiRequest, ApiResponse};
use crate::invalidation::{EntityKind, InvalidationBus, Subscription};

/// Cached result of a consumer plus its fetch status.
#[derive(Debug, Clone)]
pub struct ConsumerState<T> {
    /// Last successfully fetched result; kept when a later fetch fails.
    pub result: Option<T>,
    pub loading: bool,
    pub error: Option<Arc<SessionError>>,
    /// Generation of the fetch that produced `result`; 0 before the first success.
    pub last_fetched_version: u64,
}

impl<T> Default for ConsumerState<T> {
    fn default() -> Self {
        Self {
            result: None,
            loading: false,
            error: None,
            last_fetched_version: 0,
        }
    }
}

/// What happened to one `refresh()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// Fetch failed; the previous result was kept and `error` set.
    Failed,
    /// A newer fetch was issued before this one resolved; response dropped.
    Superseded,
}

type Decoder<T> = fn(&ApiResponse) -> Result<T>;

pub struct DataConsumer<T> {
    coordinator: TokenRefreshCoordinator,
    request: ApiRequest,
    kinds: Vec<EntityKind>,
    cache_bust: bool,
    decode: Decoder<T>,
    state: watch::Sender<ConsumerState<T>>,
    issued: AtomicU64,
}

impl<T> DataConsumer<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Consumer whose response body decodes directly into `T`.
    pub fn new(coordinator: TokenRefreshCoordinator, query: ConsumerQuery) -> Self {
        Self::with_decoder(coordinator, query, ApiResponse::json::<T>)
    }
}

impl<U> DataConsumer<Vec<U>>
where
    U: DeserializeOwned + Send + Sync + 'static,
{
    /// Consumer for a list endpoint; paginated envelopes are unwrapped.
    pub fn list(coordinator: TokenRefreshCoordinator, query: ConsumerQuery) -> Self {
        Self::with_decoder(coordinator, query, ApiResponse::json_list::<U>)
    }
}

impl<T> DataConsumer<T>
where
    T: Send + Sync + 'static,
{
    fn with_decoder(
        coordinator: TokenRefreshCoordinator,
        query: ConsumerQuery,
        decode: Decoder<T>,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::default());
        Self {
            coordinator,
            request: query.request,
            kinds: query.kinds,
            cache_bust: true,
            decode,
            state,
            issued: AtomicU64::new(0),
        }
    }

    pub fn cache_bust(mut self, enabled: bool) -> Self {
        self.cache_bust = enabled;
        self
    }

    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<ConsumerState<T>> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn last_fetched_version(&self) -> u64 {
        self.state.borrow().last_fetched_version
    }

    /// Number of fetches issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Fetch through the coordinator and apply the result if this is still
    /// the latest fetch.
    pub async fn refresh(&self) -> FetchOutcome {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|s| s.loading = true);
        let _pending = PendingFetch {
            consumer: self,
            generation,
        };
        debug!(path = %self.request.path(), generation, "Consumer fetch started");

        let result = self.fetch().await;

        let mut outcome = FetchOutcome::Superseded;
        self.state.send_if_modified(|s| {
            if self.issued.load(Ordering::SeqCst) != generation {
                return false;
            }
            s.loading = false;
            match result {
                Ok(value) => {
                    s.result = Some(value);
                    s.error = None;
                    s.last_fetched_version = generation;
                    outcome = FetchOutcome::Applied;
                }
                Err(e) => {
                    warn!(path = %self.request.path(), error = %e, "Consumer fetch failed, keeping last result");
                    s.error = Some(Arc::new(e));
                    outcome = FetchOutcome::Failed;
                }
            }
            true
        });
        if outcome == FetchOutcome::Superseded {
            debug!(path = %self.request.path(), generation, "Discarded superseded response");
        }
        outcome
    }

    async fn fetch(&self) -> Result<T> {
        let mut request = self.request.clone();
        if self.cache_bust {
            let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            request = request.query("_ts", millis.to_string());
        }
        let response = self.coordinator.send(request).await?.error_for_status()?;
        (self.decode)(&response)
    }

    /// Subscribe to the bus for this consumer's kinds and run the initial fetch.
    ///
    /// Each matching invalidation spawns a `refresh()` on the current runtime.
    /// The subscription ends when the returned handle is unmounted or dropped.
    pub async fn mount(self: &Arc<Self>, bus: &InvalidationBus) -> Result<MountedConsumer<T>> {
        let runtime = Handle::try_current()
            .map_err(|e| SessionError::config(format!("consumer mounted outside a tokio runtime: {e}")))?;
        let weak = Arc::downgrade(self);
        let path = self.request.path().to_string();

        let subscription = bus.subscribe(self.kinds.iter().cloned(), move |event| {
            let Some(consumer) = weak.upgrade() else {
                return;
            };
            debug!(path = %path, kind = %event.kind, "Invalidation received, refreshing");
            runtime.spawn(async move {
                consumer.refresh().await;
            });
        });

        self.refresh().await;
        Ok(MountedConsumer {
            consumer: Arc::clone(self),
            subscription,
        })
    }
}

/// Clears `loading` when the latest fetch is dropped before it resolves.
struct PendingFetch<'a, T> {
    consumer: &'a DataConsumer<T>,
    generation: u64,
}

impl<T> Drop for PendingFetch<'_, T> {
    fn drop(&mut self) {
        let consumer = self.consumer;
        consumer.state.send_if_modified(|s| {
            if consumer.issued.load(Ordering::SeqCst) != self.generation || !s.loading {
                return false;
            }
            s.loading = false;
            true
        });
    }
}

impl<T: Clone> DataConsumer<T> {
    pub fn state(&self) -> ConsumerState<T> {
        self.state.borrow().clone()
    }

    pub fn result(&self) -> Option<T> {
        self.state.borrow().result.clone()
    }
}

impl<T> std::fmt::Debug for DataConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConsumer")
            .field("path", &self.request.path())
            .field("kinds", &self.kinds)
            .field("issued", &self.issued.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// A consumer attached to the bus. Dropping it unsubscribes.
pub struct MountedConsumer<T> {
    consumer: Arc<DataConsumer<T>>,
    subscription: Subscription,
}

impl<T> MountedConsumer<T> {
    pub fn consumer(&self) -> &Arc<DataConsumer<T>> {
        &self.consumer
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    /// Detach from the bus and hand back the consumer.
    pub fn unmount(self) -> Arc<DataConsumer<T>> {
        let Self {
            consumer,
            subscription,
        } = self;
        subscription.unsubscribe();
        consumer
    }
}

impl<T> std::ops::Deref for MountedConsumer<T> {
    type Target = DataConsumer<T>;

    fn deref(&self) -> &Self::Target {
        &self.consumer
    }
}

impl<T> std::fmt::Debug for MountedConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedConsumer")
            .field("consumer", &self.consumer)
            .field("subscription", &self.subscription)
            .finish()
    }
}
