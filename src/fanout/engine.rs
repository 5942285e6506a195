//! Fanout engine
//!
//! Bridges the broker and the live connections. For every topic with at least
//! one interested connection the engine holds exactly one broker feed and one
//! delivery task draining it; when the last member leaves, both go away.
//!
//! # Architecture
//!
//! ```text
//! Broker ──feed──▶ run_delivery(topic) ──fan_out──▶ ConnectionSender (per member)
//!                                                        │
//!                                                 transport write loop
//! ```
//!
//! # Locking
//!
//! - Each topic has an async lock. Everything that changes a topic's
//!   membership or its subscription (join, leave, deregister,
//!   `ensure_subscribed`, `ensure_unsubscribed`) holds it, so broker calls for
//!   one topic are serialized while unrelated topics proceed independently.
//! - The registry and the subscription map share one synchronous lock, held
//!   only for short non-async sections. A membership change and the matching
//!   subscription change land in the same critical section.
//! - Deregistration first marks the connection as closing. From then on joins
//!   fail with `UnknownConnection`, which gives a total order between a
//!   deregister and any join racing with it.
//!
//! # Ended feeds
//!
//! A feed the broker closes on its own ends its delivery task. The task hands
//! the topic to a recovery task, which removes the dead subscription (only if
//! it is still the same generation) and subscribes again while members remain.
//! If that fails, the next `join` or `ensure_subscribed` retries.

use super::connection::{ConnectionId, ConnectionSender, Delivery};
use super::registry::{ConnectionRegistry, JoinOutcome, LeaveOutcome};
use crate::core::broker::{Broker, Feed};
use crate::core::error::FanoutError;
use crate::core::events::PublishedEvent;
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default capacity of each connection's outbound queue
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Outcome of handing one payload to a topic's members
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the payload was queued for
    pub delivered: usize,
    /// Connections whose send failed; they are deregistered
    pub dropped: Vec<ConnectionId>,
}

/// A live broker feed plus the task draining it
struct TopicSubscription {
    generation: u64,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TopicSubscription {
    /// Stop the delivery task and wait until it has released the feed
    async fn shutdown(self, topic: &str) {
        let TopicSubscription { stop, task, .. } = self;
        drop(stop);
        if let Err(e) = task.await
            && e.is_panic()
        {
            tracing::warn!(topic = %topic, error = %e, "Delivery task panicked");
        }
        tracing::debug!(topic = %topic, "Broker subscription closed");
    }
}

#[derive(Default)]
struct FanoutState {
    registry: ConnectionRegistry,
    subscriptions: HashMap<String, TopicSubscription>,
}

struct EngineInner {
    broker: Arc<dyn Broker>,
    state: RwLock<FanoutState>,
    topic_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    outbound_buffer: usize,
    next_generation: AtomicU64,
}

/// Holds a topic's async lock; forgets the lock once nobody else wants it
struct TopicGuard<'a> {
    inner: &'a EngineInner,
    topic: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TopicGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .inner
            .topic_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if let Some(lock) = locks.get(&self.topic)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.topic);
        }
    }
}

impl EngineInner {
    fn read_state(&self) -> RwLockReadGuard<'_, FanoutState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FanoutState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock_topic(&self, topic: &str) -> TopicGuard<'_> {
        let lock = {
            let mut locks = self
                .topic_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(topic.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        TopicGuard {
            inner: self,
            topic: topic.to_string(),
            guard: Some(guard),
        }
    }

    /// Remove one membership; hands back the subscription if the topic emptied
    fn remove_member(&self, id: &ConnectionId, topic: &str) -> Option<TopicSubscription> {
        let mut state = self.write_state();
        match state.registry.leave(id, topic) {
            LeaveOutcome::Left { emptied: true } => state.subscriptions.remove(topic),
            LeaveOutcome::Left { emptied: false } | LeaveOutcome::NotMember => None,
        }
    }

    /// Queue `payload` for every live member of `topic`
    fn fan_out(&self, topic: &str, payload: Delivery) -> DeliveryReport {
        let recipients = self.read_state().registry.recipients(topic);

        let mut report = DeliveryReport::default();
        for (id, sender) in recipients {
            match sender.send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %id,
                        topic = %topic,
                        error = %e,
                        "Send failed, dropping connection"
                    );
                    report.dropped.push(id);
                }
            }
        }
        report
    }
}

/// Relays broker traffic to interested connections
///
/// Cheap to clone; every clone drives the same registry and subscriptions.
#[derive(Clone)]
pub struct FanoutEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for FanoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEngine")
            .field("connections", &self.connection_count())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl FanoutEngine {
    /// Create an engine over `broker` with the default outbound queue size
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_outbound_buffer(broker, DEFAULT_OUTBOUND_BUFFER)
    }

    /// Create an engine whose connections buffer up to `outbound_buffer` payloads
    pub fn with_outbound_buffer(broker: Arc<dyn Broker>, outbound_buffer: usize) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                broker,
                state: RwLock::new(FanoutState::default()),
                topic_locks: Mutex::new(HashMap::new()),
                outbound_buffer: outbound_buffer.max(1),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Register a new connection
    ///
    /// Returns its id and the receiver the transport's write loop must drain.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Delivery>) {
        let (sender, rx) = ConnectionSender::channel(self.inner.outbound_buffer);
        let id = self.inner.write_state().registry.register(sender);
        tracing::debug!(connection_id = %id, "Connection registered");
        (id, rx)
    }

    /// Add a connection to a topic, opening the broker subscription if it is the first
    ///
    /// No-op if already a member of a subscribed topic. On `BrokerUnavailable`
    /// nothing is recorded.
    pub async fn join(&self, id: &ConnectionId, topic: &str) -> Result<(), FanoutError> {
        let _guard = self.inner.lock_topic(topic).await;

        let (member, subscribed) = {
            let state = self.inner.read_state();
            let member = state.registry.check_join(id, topic)?;
            (member, state.subscriptions.contains_key(topic))
        };
        if member && subscribed {
            return Ok(());
        }

        let mut fresh = if subscribed {
            None
        } else {
            Some(self.open_subscription(topic).await?)
        };

        let outcome = {
            let mut state = self.inner.write_state();
            let outcome = state.registry.join(id, topic);
            if outcome.is_ok()
                && let Some(subscription) = fresh.take()
            {
                state.subscriptions.insert(topic.to_string(), subscription);
            }
            outcome
        };

        if let Some(subscription) = fresh {
            // The connection began deregistering while the feed was opening.
            subscription.shutdown(topic).await;
        }

        match outcome? {
            JoinOutcome::Joined { first } => {
                tracing::debug!(connection_id = %id, topic = %topic, first, "Joined topic")
            }
            JoinOutcome::AlreadyMember => {
                tracing::debug!(connection_id = %id, topic = %topic, "Subscription restored")
            }
        }
        Ok(())
    }

    /// Remove a connection from a topic, closing the subscription if it was the last
    ///
    /// No-op if the connection is not a member.
    pub async fn leave(&self, id: &ConnectionId, topic: &str) {
        let _guard = self.inner.lock_topic(topic).await;
        if let Some(subscription) = self.inner.remove_member(id, topic) {
            subscription.shutdown(topic).await;
        }
        tracing::debug!(connection_id = %id, topic = %topic, "Left topic");
    }

    /// Remove a connection from every topic and forget it
    ///
    /// Repeated calls, and calls for unknown ids, are no-ops.
    pub async fn deregister(&self, id: &ConnectionId) {
        let topics = self.inner.write_state().registry.begin_deregister(id);
        let Some(topics) = topics else {
            return;
        };

        for topic in &topics {
            let _guard = self.inner.lock_topic(topic).await;
            if let Some(subscription) = self.inner.remove_member(id, topic) {
                subscription.shutdown(topic).await;
            }
        }

        self.inner.write_state().registry.finish_deregister(id);
        tracing::debug!(connection_id = %id, topics = topics.len(), "Connection deregistered");
    }

    // =========================================================================
    // Subscription lifecycle
    // =========================================================================

    /// Make sure a topic with members has its broker subscription
    ///
    /// Does nothing for topics without members or already subscribed.
    pub async fn ensure_subscribed(&self, topic: &str) -> Result<(), FanoutError> {
        let _guard = self.inner.lock_topic(topic).await;
        if !self.needs_subscription(topic) {
            return Ok(());
        }

        let subscription = self.open_subscription(topic).await?;
        let leftover = {
            let mut state = self.inner.write_state();
            if state.registry.is_topic_empty(topic) || state.subscriptions.contains_key(topic) {
                Some(subscription)
            } else {
                state.subscriptions.insert(topic.to_string(), subscription);
                None
            }
        };
        if let Some(subscription) = leftover {
            subscription.shutdown(topic).await;
        }
        Ok(())
    }

    /// Tear down a topic's subscription if the topic has no members
    pub async fn ensure_unsubscribed(&self, topic: &str) {
        let _guard = self.inner.lock_topic(topic).await;
        let subscription = {
            let mut state = self.inner.write_state();
            if state.registry.is_topic_empty(topic) {
                state.subscriptions.remove(topic)
            } else {
                None
            }
        };
        if let Some(subscription) = subscription {
            subscription.shutdown(topic).await;
        }
    }

    fn needs_subscription(&self, topic: &str) -> bool {
        let state = self.inner.read_state();
        !state.registry.is_topic_empty(topic) && !state.subscriptions.contains_key(topic)
    }

    async fn open_subscription(&self, topic: &str) -> Result<TopicSubscription, FanoutError> {
        let feed = self.inner.broker.subscribe(topic).await.map_err(|e| {
            tracing::warn!(topic = %topic, error = %e, "Broker subscribe failed");
            FanoutError::from(e)
        })?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_delivery(
            Arc::downgrade(&self.inner),
            topic.to_string(),
            generation,
            feed,
            stop_rx,
        ));
        tracing::debug!(topic = %topic, generation, "Broker subscription opened");

        Ok(TopicSubscription {
            generation,
            stop,
            task,
        })
    }

    /// Replace a subscription whose feed the broker closed
    ///
    /// Spawned from `run_delivery`, which it may start again, hence the box.
    fn recover_ended_feed(self, topic: String, generation: u64) -> BoxFuture<'static, ()> {
        async move {
            let _guard = self.inner.lock_topic(&topic).await;
            let ended = {
                let mut state = self.inner.write_state();
                let current = state.subscriptions.get(&topic).map(|s| s.generation);
                if current == Some(generation) {
                    state.subscriptions.remove(&topic)
                } else {
                    None
                }
            };
            let Some(ended) = ended else {
                return;
            };
            ended.shutdown(&topic).await;

            if !self.needs_subscription(&topic) {
                return;
            }
            match self.open_subscription(&topic).await {
                Ok(subscription) => {
                    self.inner
                        .write_state()
                        .subscriptions
                        .insert(topic.clone(), subscription);
                    tracing::info!(topic = %topic, "Broker subscription reopened");
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Could not reopen broker subscription")
                }
            }
        }
        .boxed()
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Hand `payload` to every member of `topic`
    ///
    /// Each send is independent. Connections whose send fails are
    /// deregistered before this returns.
    pub async fn deliver(&self, topic: &str, payload: PublishedEvent) -> DeliveryReport {
        let report = self.inner.fan_out(topic, Arc::new(payload));
        for id in &report.dropped {
            self.deregister(id).await;
        }
        report
    }

    /// Publish an event through the broker
    ///
    /// Works whether or not this engine holds a subscription for `topic`.
    /// Returns how many broker feeds received it.
    pub async fn publish(&self, topic: &str, event: PublishedEvent) -> Result<usize, FanoutError> {
        event.validate_for(topic)?;
        let receivers = self.inner.broker.publish(topic, event).await?;
        Ok(receivers)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Snapshot of a topic's members
    pub fn members_of(&self, topic: &str) -> HashSet<ConnectionId> {
        self.inner.read_state().registry.members_of(topic)
    }

    pub fn is_topic_empty(&self, topic: &str) -> bool {
        self.inner.read_state().registry.is_topic_empty(topic)
    }

    /// Topics a connection currently watches
    pub fn topics_of(&self, id: &ConnectionId) -> HashSet<String> {
        self.inner.read_state().registry.topics_of(id)
    }

    /// Whether the connection is registered and not being deregistered
    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.inner.read_state().registry.is_registered(id)
    }

    /// Whether the engine holds a broker subscription for `topic`
    pub fn has_subscription(&self, topic: &str) -> bool {
        self.inner.read_state().subscriptions.contains_key(topic)
    }

    /// Number of open broker subscriptions
    pub fn subscription_count(&self) -> usize {
        self.inner.read_state().subscriptions.len()
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.inner.read_state().registry.connection_count()
    }
}

/// Drain one topic's feed until stopped or the broker ends it
async fn run_delivery(
    engine: Weak<EngineInner>,
    topic: String,
    generation: u64,
    mut feed: Feed,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            next = feed.next() => {
                let Some(payload) = next else {
                    tracing::warn!(topic = %topic, generation, "Broker feed ended");
                    if let Some(inner) = engine.upgrade() {
                        let engine = FanoutEngine { inner };
                        tokio::spawn(engine.recover_ended_feed(topic.clone(), generation));
                    }
                    break;
                };
                let Some(inner) = engine.upgrade() else {
                    break;
                };

                let report = inner.fan_out(&topic, Arc::new(payload));
                if !report.dropped.is_empty() {
                    // Deregistration takes topic locks, including possibly this
                    // topic's while it waits on this task; run it separately.
                    let engine = FanoutEngine { inner };
                    tokio::spawn(async move {
                        for id in &report.dropped {
                            engine.deregister(id).await;
                        }
                    });
                }
            }
        }
    }
    drop(feed);
}
