//! In-process invalidation bus.
//!
//! Unlike a buffered broadcast channel, delivery here is synchronous: a
//! publish runs every matching handler before it returns, there is no replay
//! for late subscribers and nothing is queued when nobody listens.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use time::OffsetDateTime;
use tracing::{debug, trace};

use super::types::{EntityKind, InvalidationEvent};

pub type InvalidationHandler = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    kinds: HashSet<EntityKind>,
    handler: InvalidationHandler,
    active: Arc<AtomicBool>,
}

struct BusInner {
    subscribers: RwLock<Vec<SubscriberEntry>>,
    // Serializes dispatch across publishers; reentrant so a handler may publish.
    dispatch: ReentrantMutex<()>,
    next_id: AtomicU64,
}

/// Publish/subscribe channel keyed by [`EntityKind`].
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                dispatch: ReentrantMutex::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for every publish of one of `kinds`.
    ///
    /// The subscription lasts until the returned handle is dropped or
    /// [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<I, K, F>(&self, kinds: I, handler: F) -> Subscription
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        let kinds: HashSet<EntityKind> = kinds.into_iter().map(Into::into).collect();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        debug!(subscription = id, kinds = ?kinds, "Subscribed to invalidations");

        self.inner.subscribers.write().push(SubscriberEntry {
            id,
            kinds,
            handler: Arc::new(handler),
            active: Arc::clone(&active),
        });

        Subscription {
            id,
            active,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `kind` to every current subscriber of it, in subscription order.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, kind: impl Into<EntityKind>, occurred_at: OffsetDateTime) -> usize {
        self.publish_event(&InvalidationEvent::new(kind, occurred_at))
    }

    /// Publish `kind` stamped with the current time.
    pub fn publish_now(&self, kind: impl Into<EntityKind>) -> usize {
        self.publish(kind, OffsetDateTime::now_utc())
    }

    pub fn publish_event(&self, event: &InvalidationEvent) -> usize {
        let _dispatch = self.inner.dispatch.lock();

        // Snapshot so handlers can subscribe or unsubscribe without deadlocking.
        let targets: Vec<(Arc<AtomicBool>, InvalidationHandler)> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kinds.contains(&event.kind))
            .map(|s| (Arc::clone(&s.active), Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (active, handler) in targets {
            // Skip anyone who unsubscribed after the snapshot was taken.
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            handler(event);
            delivered += 1;
        }
        trace!(kind = %event.kind, delivered, "Published invalidation");
        delivered
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Live subscriptions interested in `kind`.
    pub fn subscribers_for(&self, kind: &EntityKind) -> usize {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kinds.contains(kind))
            .count()
    }

    /// Drop every subscription. Used at context teardown.
    pub fn clear(&self) {
        let mut subscribers = self.inner.subscribers.write();
        for entry in subscribers.iter() {
            entry.active.store(false, Ordering::SeqCst);
        }
        let removed = subscribers.len();
        subscribers.clear();
        debug!(removed, "Cleared invalidation subscriptions");
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Unsubscribe handle returned by [`InvalidationBus::subscribe`].
///
/// Dropping it unsubscribes, so a consumer that goes away can never be
/// invoked again.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    bus: std::sync::Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    fn detach(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.write().retain(|s| s.id != self.id);
            debug!(subscription = self.id, "Unsubscribed from invalidations");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
