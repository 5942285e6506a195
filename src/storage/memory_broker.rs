//! In-process broker over `tokio::sync::broadcast`
//!
//! One broadcast channel per topic, created on first subscribe and removed
//! when its last feed is dropped. Publishing to a topic nobody subscribes to
//! is accepted and reaches no one.

use crate::core::broker::{Broker, Feed};
use crate::core::error::BrokerError;
use crate::core::events::PublishedEvent;
use async_trait::async_trait;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Default number of payloads a slow feed may fall behind before skipping
pub const DEFAULT_BROKER_CAPACITY: usize = 1024;

type TopicMap = Arc<Mutex<HashMap<String, broadcast::Sender<PublishedEvent>>>>;

/// Broker for a single process
///
/// Clones share the same topics.
#[derive(Clone)]
pub struct InMemoryBroker {
    topics: TopicMap,
    capacity: usize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROKER_CAPACITY)
    }

    /// Create a broker whose per-topic channels hold `capacity` payloads
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with at least one open feed
    pub fn topic_count(&self) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of open feeds on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> BrokerError {
    BrokerError::Unavailable(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: PublishedEvent) -> Result<usize, BrokerError> {
        let topics = self.topics.lock().map_err(poisoned)?;
        let Some(tx) = topics.get(topic) else {
            return Ok(0);
        };
        // A send error only means every receiver is gone
        Ok(tx.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &str) -> Result<Feed, BrokerError> {
        let rx = {
            let mut topics = self.topics.lock().map_err(poisoned)?;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        tracing::debug!(topic = %topic, "Broker feed opened");
        Ok(MemoryFeed {
            topic: topic.to_string(),
            inner: Some(BroadcastStream::new(rx).boxed()),
            topics: self.topics.clone(),
        }
        .boxed())
    }
}

/// A feed on one topic; releases the topic's channel when it is the last one
struct MemoryFeed {
    topic: String,
    inner: Option<BoxStream<'static, Result<PublishedEvent, BroadcastStreamRecvError>>>,
    topics: TopicMap,
}

impl Stream for MemoryFeed {
    type Item = PublishedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        loop {
            match inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(payload))) => return Poll::Ready(Some(payload)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(topic = %this.topic, skipped, "Broker feed lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for MemoryFeed {
    fn drop(&mut self) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.inner.take());
        if let Some(tx) = topics.get(&self.topic)
            && tx.receiver_count() == 0
        {
            topics.remove(&self.topic);
        }
        tracing::debug!(topic = %self.topic, "Broker feed closed");
    }
}
